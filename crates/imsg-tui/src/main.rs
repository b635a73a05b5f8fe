use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

use imsg_tui::api::ApiClient;
use imsg_tui::app::{App, AppEvent};
use imsg_tui::engine::DEFAULT_PAGE_SIZE;
use imsg_tui::live::{self, ListenerConfig};

#[derive(Debug, Parser)]
#[command(name = "imsg-tui", version, about = "Terminal client for the imsg server")]
struct Cli {
    /// Server host
    #[arg(long, env = "IMSG_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, env = "IMSG_PORT", default_value_t = 8000)]
    port: u16,

    /// Messages per history page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=500))]
    page_size: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logs go to stderr so they can be redirected away from the screen
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imsg_tui=warn".into()),
        )
        .init();

    let client = Arc::new(ApiClient::new(format!("http://{}:{}", cli.host, cli.port))?);
    match client.health().await {
        Ok(health) if health.database_accessible => info!("Connected to {}", client.base_url()),
        Ok(_) => warn!("Server at {} cannot read the message store", client.base_url()),
        Err(e) => warn!("{}", e),
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_input(tx.clone()));
    tokio::spawn(live::run(client.ws_url(None), ListenerConfig::default(), tx.clone()));

    let app = App::new(client, tx, cli.page_size);
    app.run(rx, &mut std::io::stdout()).await
}

async fn read_input(events: UnboundedSender<AppEvent>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if events.send(AppEvent::Input(line)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Cannot read input: {}", e);
                break;
            }
        }
    }
    let _ = events.send(AppEvent::InputClosed);
}
