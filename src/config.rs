//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration for the scraper: where nutrition pages
//! live, how the headless browser is launched, how long each pipeline stage may
//! take, and where records are persisted.

use crate::NutritionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the nutrition scraper
///
/// Built in layers: [`Config::default`], then an optional JSON file, then
/// environment variables ([`Config::apply_env`]), then CLI flags.
///
/// # Examples
///
/// ```rust
/// use nutrition_scraper::Config;
///
/// let config = Config {
///     port: 9000,
///     block_resources: false,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the nutrition-facts pages; the food id is appended as the
    /// last path segment (default: `https://www.nutritionix.com/food/`)
    pub nutrition_data_url: String,

    /// Postgres connection string. When absent the in-memory store is used.
    pub database_url: Option<String>,

    /// Maximum pooled Postgres connections (default: 10)
    pub database_max_connections: u32,

    /// Address the HTTP server binds to (default: 0.0.0.0)
    pub listen_host: String,

    /// Port the HTTP server listens on (default: 8000)
    pub port: u16,

    /// CSS selector whose presence means the nutrition panel has rendered
    /// (default: `.nf`)
    pub content_marker: String,

    /// How long to wait for the content marker (default: 10 seconds)
    ///
    /// Expiry is a hard failure; the page is considered unscrapable for this
    /// attempt.
    pub content_wait_timeout: Duration,

    /// Upper bound on navigation until the DOM is parsed (default: 30 seconds)
    pub navigation_timeout: Duration,

    /// Overall budget for a cache-miss scrape, page load through extraction
    /// (default: 45 seconds)
    pub request_timeout: Duration,

    /// Block non-essential subresources during page loads (default: true)
    pub block_resources: bool,

    /// CDP resource types failed at the interception layer when
    /// `block_resources` is set (default: image, stylesheet, font)
    pub blocked_resource_types: Vec<String>,

    /// Browser window size
    pub viewport: Viewport,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for page loads (default: Chrome default)
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nutrition_data_url: "https://www.nutritionix.com/food/".to_string(),
            database_url: None,
            database_max_connections: 10,
            listen_host: "0.0.0.0".to_string(),
            port: 8000,
            content_marker: ".nf".to_string(),
            content_wait_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(45),
            block_resources: true,
            blocked_resource_types: vec![
                "image".to_string(),
                "stylesheet".to_string(),
                "font".to_string(),
            ],
            viewport: Viewport::default(),
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    /// Override fields from the process environment.
    ///
    /// Recognised variables: `NUTRITIONAL_DATA_URL`, `DATABASE_URL`,
    /// `DATABASE_MAX_CONNECTIONS`, `APP_HOST`, `PORT`, `CHROME_PATH`,
    /// `CONTENT_MARKER`. Unparseable numeric values are reported rather than
    /// ignored.
    pub fn apply_env(&mut self) -> Result<(), NutritionError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_vars<F>(&mut self, lookup: F) -> Result<(), NutritionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NUTRITIONAL_DATA_URL") {
            self.nutrition_data_url = url;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database_max_connections = max.parse().map_err(|_| {
                NutritionError::ConfigurationError(format!(
                    "DATABASE_MAX_CONNECTIONS is not a number: {max}"
                ))
            })?;
        }
        if let Some(host) = lookup("APP_HOST") {
            self.listen_host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.parse().map_err(|_| {
                NutritionError::ConfigurationError(format!("PORT is not a valid port: {port}"))
            })?;
        }
        if let Some(path) = lookup("CHROME_PATH") {
            self.chrome_path = Some(path);
        }
        if let Some(marker) = lookup("CONTENT_MARKER") {
            self.content_marker = marker;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), NutritionError> {
        crate::validate_url(&self.nutrition_data_url).map_err(|e| {
            NutritionError::ConfigurationError(format!(
                "nutrition_data_url '{}' is not an http(s) URL: {e}",
                self.nutrition_data_url
            ))
        })?;

        if self.port == 0 {
            return Err(NutritionError::ConfigurationError(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.database_max_connections == 0 {
            return Err(NutritionError::ConfigurationError(
                "Database max connections must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("content_wait_timeout", self.content_wait_timeout),
            ("navigation_timeout", self.navigation_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(NutritionError::ConfigurationError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.content_marker.trim().is_empty() {
            return Err(NutritionError::ConfigurationError(
                "Content marker selector must not be empty".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(NutritionError::ConfigurationError(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Browser window dimensions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1280)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// The browser runs without the OS sandbox, which restricted container
/// environments require.
///
/// # Examples
///
/// ```rust
/// use nutrition_scraper::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--no-sandbox".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--disable-features=TranslateUI".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        // Unique profile dir so a restarted session never trips the singleton lock
        format!("--user-data-dir=/tmp/nutrition-scraper-{unique_id}"),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, NutritionError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .map_err(NutritionError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.content_marker, ".nf");
        assert_eq!(config.content_wait_timeout, Duration::from_secs(10));
        assert!(config.database_url.is_none());
        assert!(config.block_resources);
        assert_eq!(config.blocked_resource_types.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NUTRITIONAL_DATA_URL", "http://localhost:3000/food/"),
            ("DATABASE_URL", "postgres://localhost/nutrition"),
            ("PORT", "9090"),
            ("CONTENT_MARKER", "#panel"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.nutrition_data_url, "http://localhost:3000/food/");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/nutrition")
        );
        assert_eq!(config.port, 9090);
        assert_eq!(config.content_marker, "#panel");
        assert_eq!(config.listen_host, "0.0.0.0");
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = Config::default();
        let result = config.apply_vars(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(NutritionError::ConfigurationError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            nutrition_data_url: "ftp://example.com/food/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            content_wait_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            content_marker: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 8123}"#).unwrap();
        assert_eq!(config.port, 8123);
        assert_eq!(config.content_marker, ".nf");
    }

    #[test]
    fn test_chrome_args_generation() {
        let config = Config {
            user_agent: Some("nutrition-bot".to_string()),
            ..Default::default()
        };
        let args = get_chrome_args(&config);

        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-setuid-sandbox".to_string()));
        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(args.contains(&"--user-agent=nutrition-bot".to_string()));
    }
}
