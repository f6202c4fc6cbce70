use anyhow::Context;
use clap::Parser;
use nutrition_scraper::{
    install_prometheus_recorder, setup_logging, validate_config, Cli, CliRunner, Commands, Config,
    Metrics,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Cli::parse();

    dotenvy::dotenv().ok();
    setup_logging(args.verbose, args.json_logs)?;

    if let Commands::Validate { config } = &args.command {
        if let Err(e) = validate_config(config.clone()).await {
            error!("Configuration is invalid: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting nutrition-scraper v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    // Handles registered before the recorder exists are no-ops
    let metrics_handle = match install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics export disabled: {}", e);
            None
        }
    };
    let metrics = Arc::new(Metrics::new());

    let cli_runner = match CliRunner::new(config, metrics, metrics_handle).await {
        Ok(runner) => runner,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    // Setup graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx.clone());

    let is_server = matches!(args.command, Commands::Serve { .. });
    let command_rx = shutdown_tx.subscribe();

    let result = if is_server {
        // The server drains in-flight requests itself when the signal arrives
        cli_runner.run(args.command, command_rx).await
    } else {
        tokio::select! {
            result = cli_runner.run(args.command, command_rx) => result,
            _ = shutdown_rx.recv() => {
                info!("Received shutdown signal");
                Ok(())
            }
        }
    };

    // The browser is released on every exit path
    info!("Shutting down...");
    cli_runner.session.shutdown().await;

    if let Err(e) = result {
        error!("Application error: {}", e);
        std::process::exit(1);
    }

    info!("nutrition-scraper stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        let config_content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("read config file {}", config_path.display()))?;
        serde_json::from_str(&config_content)
            .with_context(|| format!("parse config file {}", config_path.display()))?
    } else {
        Config::default()
    };

    config.apply_env().context("apply environment overrides")?;
    args.apply_overrides(&mut config);
    config.validate().context("validate configuration")?;

    info!("Configuration loaded successfully");
    info!("Nutrition data URL: {}", config.nutrition_data_url);
    info!(
        "Timeouts: content wait {:?}, navigation {:?}, request {:?}",
        config.content_wait_timeout, config.navigation_timeout, config.request_timeout
    );

    Ok(config)
}

fn setup_shutdown_handler(shutdown_tx: broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
