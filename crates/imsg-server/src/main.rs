use std::sync::Arc;

use clap::Parser;
use tracing::info;

use imsg_api::sender::AppleScriptSender;
use imsg_db::Database;
use imsg_server::config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = ServerConfig::resolve(Cli::parse())?;

    // RUST_LOG wins over the config file
    let level = &config.settings.log_level;
    // Targets match by prefix, so `imsg` covers every imsg_* crate
    let default_filter = format!("imsg={level},tower_http=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    }
    info!("Message store: {}", config.db_path.display());

    // Opens lazily; /health reports degraded until chat.db is readable
    let store = Arc::new(Database::open(&config.db_path));
    let sender = Arc::new(AppleScriptSender::new(config.settings.send_timeout()));

    let app = imsg_server::app(store, sender, config.settings.clone());

    info!("imsg server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
