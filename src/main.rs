//! Archive Viewer Server
//!
//! Serves lazily-paged archive documents out of S3-compatible storage and
//! coordinates the backend jobs that split and optimize them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archive_viewer::config::Config;
use archive_viewer::db::{self, SqliteMetadataStore};
use archive_viewer::decoder::{default_decoder, DecoderEnvironment};
use archive_viewer::jobs::{HttpJobInvoker, PollConfig, ProcessingCoordinator};
use archive_viewer::routes;
use archive_viewer::state::AppState;
use archive_viewer::storage::S3Client;
use archive_viewer::viewer::{ResourceRegistry, ViewerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archive_viewer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Archive Viewer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("S3 endpoint: {}", config.storage.endpoint);
    tracing::info!("S3 bucket: {}", config.storage.bucket);

    let s3_client = S3Client::new(&config.storage)
        .await
        .context("Failed to initialize S3 client")?;

    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);
    let metadata = Arc::new(SqliteMetadataStore::new(db_pool));

    let decoder = Arc::new(DecoderEnvironment::new(default_decoder()));
    decoder.init();
    tracing::info!("Page decoder: {}", decoder.decoder_name());

    let viewer = ViewerContext {
        metadata: metadata.clone(),
        blobs: Arc::new(s3_client),
        decoder,
        registry: Arc::new(ResourceRegistry::new()),
    };
    let coordinator = ProcessingCoordinator::new(
        Arc::new(HttpJobInvoker::new(&config.jobs)),
        metadata,
        PollConfig::from(&config.jobs),
    );
    tracing::info!("Job functions at {}", config.jobs.functions_url);

    let app_state = AppState::new(config.clone(), viewer, coordinator);
    let app = routes::app(app_state.clone());

    let sweeper = app_state
        .sessions()
        .clone()
        .start_cleanup_task(config.viewer.session_sweep_interval());
    tracing::info!(
        idle_ttl_secs = config.viewer.session_idle_ttl_secs,
        "Viewer session sweep started"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Archive Viewer listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
