use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avcnv_core::{
    load_config, validate_config, EncoderCapabilities, FfmpegTranscoder, FileCatalog,
    FormatCatalog, TaskOrchestrator, TaskRegistry, Transcoder,
};
use avcnv_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("AVCNV_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Upload dir: {:?}", config.storage.upload_dir);
    info!("Output dir: {:?}", config.storage.output_dir);

    // Storage
    let catalog = Arc::new(FileCatalog::new(config.storage.clone()));
    catalog
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;

    // Transcoder
    let transcoder = Arc::new(FfmpegTranscoder::new(config.converter.clone()));
    match transcoder.validate().await {
        Ok(()) => info!("Transcoder ready: {}", transcoder.name()),
        Err(e) => warn!("Transcoder not usable, conversions will fail: {}", e),
    }

    let hardware = EncoderCapabilities::detect(&config.converter).await;
    if hardware.has_hardware_encoder() {
        info!("Hardware encoders detected: {:?}", hardware);
    } else {
        info!("No hardware encoders detected, using software encoding");
    }

    // Orchestrator
    let registry = TaskRegistry::new(config.registry.clone());
    let orchestrator = TaskOrchestrator::new(
        config.orchestrator.clone(),
        transcoder,
        catalog,
        registry,
    );
    orchestrator.start_sweeper();

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        orchestrator.clone(),
        FormatCatalog::new(hardware),
    ));
    let app = create_router(state);

    info!("avcnv v{} listening on {}", VERSION, addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping running conversions");
    orchestrator.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
