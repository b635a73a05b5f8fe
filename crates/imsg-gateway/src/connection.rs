use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, trace, warn};

use imsg_db::{FetchRequest, MessageStore, Page, StoreError};
use imsg_types::events::{LiveCommand, LiveEvent};

use crate::session::{LiveConfig, LiveSession};

type Sink = SplitSink<WebSocket, Message>;

/// Drive one live channel connection until the peer goes away.
///
/// A single loop: poll, push, then wait up to one poll interval (or the
/// error backoff after a failed poll) for a client frame. A frame cuts the
/// wait short.
pub async fn handle_connection(
    socket: WebSocket,
    store: Arc<dyn MessageStore>,
    config: LiveConfig,
    chat_id: Option<i64>,
) {
    let (mut sender, mut receiver) = socket.split();
    info!("Live channel connected (chat_id={:?})", chat_id);

    let mut session = match fetch(&store, LiveSession::init_request(chat_id)).await {
        Ok(newest) => LiveSession::start(chat_id, &newest, config),
        Err(e) => {
            error!("Live channel init failed: {}", e);
            let _ = send_event(&mut sender, &LiveEvent::Error { message: e.to_string() }).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        let wait = match fetch(&store, session.next_request()).await {
            Ok(page) => {
                if let Some(event) = session.absorb(page) {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                if session.tick() {
                    trace!("Live channel keepalive ping");
                    if send_event(&mut sender, &LiveEvent::Ping).await.is_err() {
                        break;
                    }
                }
                config.poll_interval
            }
            Err(e) => {
                error!("Live channel poll error: {}", e);
                if send_event(&mut sender, &LiveEvent::Error { message: e.to_string() })
                    .await
                    .is_err()
                {
                    break;
                }
                config.error_backoff
            }
        };

        // Client frames are read during the error backoff too.
        let frame = match tokio::time::timeout(wait, receiver.next()).await {
            Err(_elapsed) => continue,
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        session.note_client_traffic();
        match frame {
            Message::Text(text) => match serde_json::from_str::<LiveCommand>(&text) {
                Ok(command) => session.apply(command),
                Err(e) => {
                    warn!(
                        "Live channel bad command: {} -- raw: {}",
                        e,
                        text.chars().take(200).collect::<String>()
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(
        "Live channel disconnected (chat_id={:?}, watermark={})",
        session.chat_id(),
        session.watermark()
    );
}

async fn fetch(store: &Arc<dyn MessageStore>, request: FetchRequest) -> Result<Page, StoreError> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.fetch(&request))
        .await
        .map_err(|e| StoreError::Unavailable(format!("fetch task failed: {}", e)))?
}

async fn send_event(sender: &mut Sink, event: &LiveEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!("Cannot encode live event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
