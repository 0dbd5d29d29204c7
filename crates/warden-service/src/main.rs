//! Warden Service
//!
//! Loads the pipeline configuration and the start-up rule sets, runs the
//! rule repository's watcher and exports metrics until shut down.

use anyhow::Context as _;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_service::config::{Config, LogFormat};
use warden_service::observability::metrics::init_metrics_exporter;
use warden_service::pipeline::factory::{PipelineConfig, PrototypeHandlerFactory};
use warden_service::rules::provider::load_rule_set_files;
use warden_service::rules::Repository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before tracing so the log format is known
    let config = Config::from_env().context("Failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warden=info,warden_service=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    info!("Starting Warden Service");
    info!(
        rule_set_files = config.rule_set_paths.len(),
        rule_event_queue_capacity = config.rule_event_queue_capacity,
        metrics_enabled = config.metrics_bind_address.is_some(),
        "Configuration loaded successfully"
    );

    if let Some(addr) = config.metrics_bind_address {
        init_metrics_exporter(addr).map_err(|e| {
            error!("Failed to initialize metrics: {}", e);
            anyhow::anyhow!(e)
        })?;
        info!("Metrics exporter listening on {}", addr);
    }

    let pipeline_yaml = tokio::fs::read_to_string(&config.pipeline_config_path)
        .await
        .context("Failed to read pipeline configuration")?;
    let pipeline = PipelineConfig::from_yaml(&pipeline_yaml)?;
    let factory = Arc::new(PrototypeHandlerFactory::new(&pipeline)?);
    info!("Pipeline handlers created");

    let (tx, rx) = mpsc::channel(config.rule_event_queue_capacity);
    let repository = Repository::new(factory, pipeline.default_rule, rx);
    repository.start().await?;

    let published = load_rule_set_files(config.rule_set_paths.as_slice(), &tx).await?;
    info!(published, "Start-up rule sets published");

    shutdown_signal().await;

    drop(tx);
    repository.stop().await?;

    info!("Warden Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
