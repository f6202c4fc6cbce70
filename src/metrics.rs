use crate::NutritionError;
use metrics::{
    counter, describe_counter, describe_histogram, register_counter, register_histogram, Counter,
    Histogram,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const CACHE_HITS: &str = "nutrition_cache_hits_total";
pub const CACHE_MISSES: &str = "nutrition_cache_misses_total";
pub const SCRAPES_SUCCEEDED: &str = "nutrition_scrapes_succeeded_total";
pub const SCRAPES_FAILED: &str = "nutrition_scrapes_failed_total";
pub const SCRAPE_FAILURES: &str = "nutrition_scrape_failures_total";
pub const SCRAPE_DURATION: &str = "nutrition_scrape_duration_seconds";
pub const BROWSER_LAUNCHES: &str = "nutrition_browser_launches_total";

/// Handles for the service's counters and histograms.
///
/// Handles registered before a recorder is installed are no-ops, so build this
/// after [`install_prometheus_recorder`] when exporting.
pub struct Metrics {
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub scrapes_succeeded: Counter,
    pub scrapes_failed: Counter,
    pub scrape_duration: Histogram,
    pub browser_launches: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        describe_counter!(CACHE_HITS, "Lookups answered from the store");
        describe_counter!(CACHE_MISSES, "Lookups that required a scrape");
        describe_counter!(SCRAPES_SUCCEEDED, "Scrapes that produced a stored record");
        describe_counter!(SCRAPES_FAILED, "Scrapes that failed at any stage");
        describe_counter!(SCRAPE_FAILURES, "Scrape failures by error kind");
        describe_histogram!(SCRAPE_DURATION, "Wall time of cache-miss scrapes");
        describe_counter!(BROWSER_LAUNCHES, "Chromium processes launched");

        Self {
            cache_hits: register_counter!(CACHE_HITS),
            cache_misses: register_counter!(CACHE_MISSES),
            scrapes_succeeded: register_counter!(SCRAPES_SUCCEEDED),
            scrapes_failed: register_counter!(SCRAPES_FAILED),
            scrape_duration: register_histogram!(SCRAPE_DURATION),
            browser_launches: register_counter!(BROWSER_LAUNCHES),
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.increment(1);
    }

    pub fn record_scrape(&self, duration: Duration, success: bool) {
        if success {
            self.scrapes_succeeded.increment(1);
        } else {
            self.scrapes_failed.increment(1);
        }

        self.scrape_duration.record(duration.as_secs_f64());
    }

    pub fn record_failure(&self, kind: &'static str) {
        counter!(SCRAPE_FAILURES, 1, "kind" => kind);
    }

    pub fn record_browser_launch(&self) {
        self.browser_launches.increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global Prometheus recorder and return the handle `/metrics`
/// renders from. Fails if a recorder is already installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, NutritionError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| NutritionError::ConfigurationError(format!("metrics recorder: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_scrape(Duration::from_millis(1200), true);
        metrics.record_scrape(Duration::from_millis(300), false);
        metrics.record_failure(NutritionError::Timeout(Duration::from_secs(45)).kind());
        metrics.record_browser_launch();
    }
}
