use crate::{
    build_app, serve, AppState, BrowserPageSource, BrowserSession,
    Config, HealthChecker, MemoryStore, Metrics, NutritionService, NutritionStore, PgStore,
    ScaleInput,
};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nutrition-scraper")]
#[command(about = "Scrapes, stores and scales nutrition facts for food items")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Base URL of the nutrition pages")]
    pub nutrition_data_url: Option<String>,

    #[arg(long, help = "Postgres connection string")]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(short, long, help = "Server port")]
        port: Option<u16>,

        #[arg(long, help = "Bind address")]
        bind: Option<String>,
    },

    /// Look up one food item and print it as JSON
    Lookup {
        #[arg(short, long, help = "Food item id, as used in the source URL")]
        food_item: String,

        #[arg(short, long, conflicts_with = "weight", help = "Number of servings")]
        count: Option<u32>,

        #[arg(short, long, help = "Weight in grams")]
        weight: Option<f64>,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if let Some(url) = &self.nutrition_data_url {
            config.nutrition_data_url = url.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Commands::Serve { port, bind } = &self.command {
            if let Some(port) = port {
                config.port = *port;
            }
            if let Some(bind) = bind {
                config.listen_host = bind.clone();
            }
        }
    }
}

pub struct CliRunner {
    pub config: Config,
    pub session: Arc<BrowserSession>,
    pub service: NutritionService,
    pub metrics: Arc<Metrics>,
    metrics_handle: Option<PrometheusHandle>,
    store: Arc<dyn NutritionStore>,
}

impl CliRunner {
    /// Wire up the store, browser session and service. The browser itself is
    /// not launched here.
    pub async fn new(
        config: Config,
        metrics: Arc<Metrics>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn NutritionStore> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url, config.database_max_connections).await?;
                store.migrate().await?;
                info!("Database migrations applied");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, records are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let session = Arc::new(BrowserSession::new(config.clone(), metrics.clone()));
        let pages = Arc::new(BrowserPageSource::new(session.clone(), config.clone()));
        let service = NutritionService::new(config.clone(), store.clone(), pages, metrics.clone());

        Ok(Self {
            config,
            session,
            service,
            metrics,
            metrics_handle,
            store,
        })
    }

    pub async fn run(
        &self,
        command: Commands,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Serve { .. } => self.run_server(shutdown_rx).await,
            Commands::Lookup {
                food_item,
                count,
                weight,
            } => self.run_lookup(&food_item, count, weight).await,
            Commands::Validate { config } => validate_config(config).await,
        }
    }

    pub async fn run_server(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // A browser that cannot start now will not start for requests either
        if let Err(e) = self.session.ensure_session().await {
            error!("Failed to launch browser: {}", e);
            return Err(e.into());
        }

        let state = AppState {
            service: self.service.clone(),
            health: Arc::new(HealthChecker::new(self.session.clone(), self.store.clone())),
            metrics: self.metrics_handle.clone(),
        };

        let (host, port) = (self.config.listen_host.as_str(), self.config.port);
        info!("Starting server on {}:{}", host, port);

        serve(build_app(state), host, port, async move {
            let _ = shutdown_rx.recv().await;
            info!("Received shutdown signal, draining connections");
        })
        .await?;

        Ok(())
    }

    pub async fn run_lookup(
        &self,
        food_item: &str,
        count: Option<u32>,
        weight: Option<f64>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let output = match (count, weight) {
            (None, None) => {
                let record = self.service.fetch_nutritional_data(food_item).await?;
                serde_json::to_string_pretty(&record)?
            }
            (count, weight) => {
                let scale = ScaleInput::from_query(
                    count.map(|c| c.to_string()).as_deref(),
                    weight.map(|w| w.to_string()).as_deref(),
                )?;
                let result = self.service.calculate_macro_data(food_item, scale).await?;
                serde_json::to_string_pretty(&result)?
            }
        };

        println!("{output}");
        Ok(())
    }
}

pub async fn validate_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration: {}", config_path.display());

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = serde_json::from_str(&config_content)?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Nutrition data URL: {}", config.nutrition_data_url);
    println!("  Listen: {}:{}", config.listen_host, config.port);
    println!("  Content marker: {}", config.content_marker);
    println!("  Content wait timeout: {:?}", config.content_wait_timeout);
    println!("  Request timeout: {:?}", config.request_timeout);
    println!(
        "  Store: {}",
        if config.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    );

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`;
/// `LOG_FORMAT=json` has the same effect as `json`.
pub fn setup_logging(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nutrition_scraper={default_level},tower_http={default_level},chromiumoxide=warn"
        ))
    });

    let json = json
        || std::env::var("LOG_FORMAT")
            .map(|v| v == "json")
            .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .try_init()
            .map_err(|e| e as Box<dyn std::error::Error>)?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init()
            .map_err(|e| e as Box<dyn std::error::Error>)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_lookup() {
        let cli = Cli::try_parse_from([
            "nutrition-scraper",
            "lookup",
            "--food-item",
            "pizza",
            "--count",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Lookup {
                food_item,
                count,
                weight,
            } => {
                assert_eq!(food_item, "pizza");
                assert_eq!(count, Some(2));
                assert_eq!(weight, None);
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn test_cli_rejects_count_with_weight() {
        let result = Cli::try_parse_from([
            "nutrition-scraper",
            "lookup",
            "--food-item",
            "pizza",
            "--count",
            "2",
            "--weight",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "nutrition-scraper",
            "--database-url",
            "postgres://localhost/nutrition",
            "serve",
            "--port",
            "9100",
            "--bind",
            "127.0.0.1",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.port, 9100);
        assert_eq!(config.listen_host, "127.0.0.1");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/nutrition")
        );
    }
}
