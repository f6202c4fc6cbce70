use crate::{BrowserSession, NutritionStore, SessionStats};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub browser: HealthLevel,
    pub store: HealthLevel,
    pub browser_launches: usize,
    pub pages_opened: usize,
    /// Pages opened but not yet closed
    pub pages_in_flight: usize,
    pub session_age_secs: Option<u64>,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

pub struct HealthChecker {
    session: Arc<BrowserSession>,
    store: Arc<dyn NutritionStore>,
}

impl HealthChecker {
    pub fn new(session: Arc<BrowserSession>, store: Arc<dyn NutritionStore>) -> Self {
        Self { session, store }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let start_time = Instant::now();

        let stats = self.session.stats().await;
        let browser = browser_health(&stats);
        let store = self.check_store_health().await;
        let overall = determine_overall_health(&[browser, store]);

        debug!(
            "Health check completed in {:?}: {:?}",
            start_time.elapsed(),
            overall
        );

        HealthStatus {
            overall,
            browser,
            store,
            browser_launches: stats.launches,
            pages_opened: stats.pages_opened,
            pages_in_flight: stats.pages_opened.saturating_sub(stats.pages_closed),
            session_age_secs: stats.age.map(|age| age.as_secs()),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    async fn check_store_health(&self) -> HealthLevel {
        match self.store.ping().await {
            Ok(()) => HealthLevel::Healthy,
            Err(e) => {
                error!("Store health critical: {}", e);
                HealthLevel::Critical
            }
        }
    }
}

/// A session that has never launched is healthy since it starts on demand. One
/// whose handler died is relaunched by the next request, so it only warns.
fn browser_health(stats: &SessionStats) -> HealthLevel {
    if stats.shut_down {
        return HealthLevel::Critical;
    }
    if stats.launches > 0 && !stats.active {
        warn!("Browser session is down, the next request will relaunch it");
        return HealthLevel::Warning;
    }
    HealthLevel::Healthy
}

fn determine_overall_health(healths: &[HealthLevel]) -> HealthLevel {
    if healths.contains(&HealthLevel::Critical) {
        HealthLevel::Critical
    } else if healths.contains(&HealthLevel::Warning) {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    }
}
