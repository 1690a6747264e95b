//! adboard server binary.

use adboard_server::{app, config, AppState};
use std::error::Error;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// First CLI argument, then `ADBOARD_CONFIG_PATH`, then `config.toml`.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ADBOARD_CONFIG_PATH").ok())
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| "config.toml".to_string())
}

fn init_logging(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let path = config_path();
    let config = config::load_config(Some(path.as_str()))?;
    init_logging(&config.logging);
    tracing::info!(path = %path, "configuration loaded");

    let pool = adboard_db::create_pool(&config.database.path, config.database.runtime_settings())?;
    let created = adboard_db::init_schema(&*pool.get()?)?;
    tracing::info!(
        db = %config.database.path,
        tables_created = created,
        "database ready"
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app(AppState { pool }))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    tracing::info!("shutdown requested");
}
