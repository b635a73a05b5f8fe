//! Command line, environment and config-file resolution.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use directories::{BaseDirs, ProjectDirs};

use imsg_api::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "imsg", about = "Serve the local Messages database over HTTP and WebSocket")]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "IMSG_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "IMSG_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Path to chat.db (default: ~/Library/Messages/chat.db).
    #[arg(long, env = "IMSG_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// JSON config file (default: the platform config dir).
    #[arg(long, env = "IMSG_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Everything `main` needs to start serving.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub settings: Settings,
}

impl ServerConfig {
    /// CLI/env beats the config file, which beats built-in defaults.
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.or_else(default_config_path);
        let settings = config_path
            .as_deref()
            .map(Settings::load)
            .unwrap_or_default();

        let db_path = cli
            .db_path
            .or_else(|| settings.db_path.clone())
            .or_else(default_db_path)
            .ok_or_else(|| anyhow::anyhow!("cannot locate home directory; pass --db-path"))?;

        let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

        Ok(Self {
            addr,
            db_path,
            config_path,
            settings,
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "imsg", "imsg").map(|dirs| dirs.config_dir().join("config.json"))
}

pub fn default_db_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join("Library/Messages/chat.db"))
}
