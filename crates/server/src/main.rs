// uplink-server entry point.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use uplink_server::config::ServerConfig;
use uplink_server::processing::{MediaPipeline, MetadataPipeline};
use uplink_server::rooms::RoomRegistry;
use uplink_server::store::{BlobStore, FsBlobStore};
use uplink_server::upload::{UploadLimits, UploadManager};
use uplink_server::{build_router, spawn_heartbeat, spawn_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(BlobStore::Fs(
        FsBlobStore::open(&config.data_dir)
            .with_context(|| format!("failed to open blob store at {}", config.data_dir.display()))?,
    ));
    let rooms = Arc::new(RoomRegistry::default());
    let manager = Arc::new(UploadManager::new(
        store,
        Arc::clone(&rooms),
        MediaPipeline::Metadata(MetadataPipeline),
        UploadLimits {
            max_file_size: config.max_file_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
        },
        config.processing_concurrency,
    ));

    spawn_heartbeat(Arc::clone(&rooms), config.heartbeat_interval);
    spawn_sweeper(Arc::clone(&manager), config.sweep_interval, config.session_max_age);

    let app = build_router(
        Arc::clone(&manager),
        Arc::clone(&rooms),
        config.max_request_body_bytes,
        config.cors_origins.as_deref(),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        "starting upload server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("upload server exited unexpectedly")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
