//! # Nutrition Scraper
//!
//! A small web service that answers "how many calories and macros are in N
//! servings (or G grams) of this food?". The first request for a food item
//! renders its nutrition-facts page in a shared headless Chromium, extracts the
//! panel, and stores the record. Every later request is answered from the
//! store and scaled on the fly.
//!
//! ## Pipeline
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Lookup | [`store`] | Postgres, or in-memory without `DATABASE_URL` |
//! | Render | [`page_loader`] | One page per request in the shared [`browser_session`] |
//! | Extract | [`extractor`] | Rule table applied to the rendered DOM |
//! | Scale | [`models`] | `count` or `weight / servingSize`, rounded to tenths |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nutrition_scraper::{
//!     BrowserPageSource, BrowserSession, Config, MemoryStore, Metrics, NutritionService,
//!     ScaleInput,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let metrics = Arc::new(Metrics::new());
//!     let session = Arc::new(BrowserSession::new(config.clone(), metrics.clone()));
//!     let pages = Arc::new(BrowserPageSource::new(session.clone(), config.clone()));
//!     let service = NutritionService::new(config, Arc::new(MemoryStore::new()), pages, metrics);
//!
//!     let result = service.calculate_macro_data("bagel", ScaleInput::Weight(100.0)).await?;
//!     println!("{}: {} kcal", result.food_name, result.calories);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! nutrition-scraper serve --port 8000
//! nutrition-scraper lookup --food-item pizza --count 2
//! nutrition-scraper validate --config config.json
//! ```
//!
//! ## Benchmarks
//!
//! ```bash
//! # Parsing, extraction and scaling (no Chrome required)
//! cargo bench
//!
//! # Adds a live scrape against the configured source
//! cargo bench --features integration_benchmarks
//! ```

/// Configuration and settings for the scraper
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Nutrition records and scaling
pub mod models;

/// Record persistence (Postgres and in-memory)
pub mod store;

/// Shared headless Chromium session
pub mod browser_session;

/// Rendering nutrition pages in the browser
pub mod page_loader;

/// Field extraction from rendered pages
pub mod extractor;

/// Cache-first lookup and scaling service
pub mod nutrition_service;

/// HTTP routes and server
pub mod api;

/// Command-line interface implementation
pub mod cli;

/// Counters and histograms exported to Prometheus
pub mod metrics;

/// Health checks for the browser session and store
pub mod health;

/// Utility functions and helpers
pub mod utils;


pub use api::*;
pub use browser_session::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use extractor::*;
pub use health::*;
pub use crate::metrics::*;
pub use models::*;
pub use nutrition_service::*;
pub use page_loader::*;
pub use store::*;
pub use utils::*;
