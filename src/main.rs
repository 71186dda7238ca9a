use next_image_s3::{config::ServerConfig, fetch::S3Source, router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

/// Image variant server entry point.
///
/// Initializes tracing, reads configuration from the environment, serves
/// until Ctrl-C or SIGTERM, then flushes pending cache writes.
///
/// # Configuration
/// Environment variables:
/// - `BACKEND_S3`: S3-compatible endpoint, `host[:port]` (required)
/// - `BACKEND_S3_SECURE`: `true` to talk https to the endpoint
/// - `BACKEND_STORAGE_PATH`: cache root directory (default: `./cache`)
/// - `PORT`: HTTP listen port (default: 4050)
/// - `MAX_INPUT_SIZE`, `MAX_WIDTH`, `TRANSFORM_WORKERS`, `CACHE_WRITE_QUEUE`
/// - `RUST_LOG`: Logging verbosity (default: "next_image_s3=debug,tower_http=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "next_image_s3=debug,tower_http=debug".into())
        )
        .init();

    tracing::info!(
        "Starting next-image-s3 {} (branch {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("BUILD_BRANCH").unwrap_or("unknown"),
        option_env!("BUILD_COMMIT").unwrap_or("unknown"),
    );

    let cfg = ServerConfig::from_env()?;
    let source = S3Source::new(&cfg.s3_base_url(), cfg.max_input_size)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    let state = Arc::new(AppState::new(cfg, Arc::new(source)));
    let app = router(state.clone());

    tracing::info!("Server listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received, draining connections");
}
