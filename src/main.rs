use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use qdsync::api::ApiClient;
use qdsync::config::Config;
use qdsync::db;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting QuickDowntime sync agent");

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    tracing::info!("Outbox store ready ({})", config.database_url);

    // One client for the whole process, shared by both contexts.
    let api = Arc::new(ApiClient::new(config.log_url(), config.request_timeout)?);
    tracing::info!("Delivering to {}", api.log_url());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let addr = SocketAddr::new(config.host, config.port);
    let app = qdsync::build_app(pool.clone(), config, api, shutdown_rx);
    let router = app.router.clone();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    app.join().await;
    pool.close().await;

    tracing::info!("Stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
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
                tracing::error!("failed to install signal handler: {e}");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    shutdown.send_replace(true);
}
