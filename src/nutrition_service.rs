//! Cache-first nutrition lookups
//!
//! This module provides [`NutritionService`], which answers a food id from
//! the store when it can and otherwise scrapes the nutrition page once,
//! persists the result and returns it.

use crate::{
    build_source_url, extract_record, format_duration, normalize_food_id, Config, ErrorSeverity,
    Metrics, NutritionError, NutritionRecord, NutritionStore, PageSource, ScaleInput,
    ScaledMacroResult,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Store-backed scraper for nutrition records
///
/// # Examples
///
/// ```rust,no_run
/// use nutrition_scraper::{
///     BrowserPageSource, BrowserSession, Config, MemoryStore, Metrics, NutritionService,
///     ScaleInput,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let metrics = Arc::new(Metrics::new());
///     let session = Arc::new(BrowserSession::new(config.clone(), metrics.clone()));
///     let pages = Arc::new(BrowserPageSource::new(session.clone(), config.clone()));
///     let service = NutritionService::new(config, Arc::new(MemoryStore::new()), pages, metrics);
///
///     let result = service.calculate_macro_data("pizza", ScaleInput::Count(2)).await?;
///     println!("{} kcal", result.calories);
///
///     session.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct NutritionService {
    config: Config,
    store: Arc<dyn NutritionStore>,
    pages: Arc<dyn PageSource>,
    metrics: Arc<Metrics>,
}

impl NutritionService {
    pub fn new(
        config: Config,
        store: Arc<dyn NutritionStore>,
        pages: Arc<dyn PageSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            store,
            pages,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn NutritionStore> {
        &self.store
    }

    /// Return the stored record for `food_id`, scraping and storing it first
    /// if there is none.
    pub async fn fetch_nutritional_data(
        &self,
        food_id: &str,
    ) -> Result<NutritionRecord, NutritionError> {
        let food_id = normalize_food_id(food_id)?;

        if let Some(record) = self.store.lookup(food_id).await? {
            debug!(food_id, "Serving stored nutrition record");
            self.metrics.record_cache_hit();
            return Ok(record);
        }
        self.metrics.record_cache_miss();

        let span = info_span!("scrape", food_id, scrape_id = %Uuid::new_v4());
        self.scrape(food_id).instrument(span).await
    }

    async fn scrape(&self, food_id: &str) -> Result<NutritionRecord, NutritionError> {
        let start_time = Instant::now();

        let result = match timeout(self.config.request_timeout, self.scrape_and_store(food_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(NutritionError::Timeout(self.config.request_timeout)),
        };

        let duration = start_time.elapsed();
        self.metrics.record_scrape(duration, result.is_ok());

        match &result {
            Ok(_) => info!("Scraped and stored in {}", format_duration(duration)),
            Err(e) => {
                self.metrics.record_failure(e.kind());
                let elapsed = format_duration(duration);
                match e.severity() {
                    ErrorSeverity::High | ErrorSeverity::Critical => {
                        error!(kind = e.kind(), "Scrape failed after {}: {}", elapsed, e)
                    }
                    ErrorSeverity::Low | ErrorSeverity::Medium => {
                        warn!(kind = e.kind(), "Scrape failed after {}: {}", elapsed, e)
                    }
                }
            }
        }

        result
    }

    async fn scrape_and_store(&self, food_id: &str) -> Result<NutritionRecord, NutritionError> {
        let url = build_source_url(&self.config.nutrition_data_url, food_id)?;
        debug!(%url, "Rendering nutrition page");

        let html = self.render_detached(url.to_string()).await?;
        let extraction = extract_record(food_id, &html, &self.config.content_marker)?;

        if !extraction.degraded.is_empty() {
            let fields: Vec<&str> = extraction.degraded.iter().map(|f| f.name()).collect();
            warn!(?fields, "Fields missing or unparseable, stored with defaults");
        }

        self.store.upsert(&extraction.record).await?;
        Ok(extraction.record)
    }

    /// Render on its own task so the page source always reaches its cleanup,
    /// even when the request budget expires and this future is dropped.
    async fn render_detached(&self, url: String) -> Result<String, NutritionError> {
        let pages = self.pages.clone();
        let task = tokio::spawn(async move { pages.render(&url).await }.in_current_span());

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(NutritionError::Page(format!("render task cancelled: {e}"))),
        }
    }

    /// Scale the record for `food_id` by a serving count or a weight in grams.
    pub async fn calculate_macro_data(
        &self,
        food_id: &str,
        scale: ScaleInput,
    ) -> Result<ScaledMacroResult, NutritionError> {
        let record = self.fetch_nutritional_data(food_id).await?;
        ScaledMacroResult::from_record(&record, scale)
    }
}
