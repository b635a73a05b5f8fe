//! Live channel listener.
//!
//! Runs as its own task and never touches the engine: every frame becomes an
//! [`AppEvent`] on the app loop's queue.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use imsg_types::events::{LiveCommand, LiveEvent};

use crate::app::AppEvent;

#[derive(Debug, Clone, Copy)]
pub struct ListenerConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Connect, forward, reconnect. Returns once the app loop is gone.
///
/// After a reconnect the server starts from its current newest row, so the
/// listener asks it to replay from the last watermark it saw. The engine
/// drops whatever it already has.
pub async fn run(ws_url: String, config: ListenerConfig, events: UnboundedSender<AppEvent>) {
    let mut backoff = config.initial_backoff;
    let mut last_rowid: Option<i64> = None;

    loop {
        match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((ws_stream, _)) => {
                info!("Live channel connected: {}", ws_url);
                backoff = config.initial_backoff;
                if events.send(AppEvent::LiveConnected).is_err() {
                    return;
                }

                let (mut ws_tx, mut ws_rx) = ws_stream.split();

                if let Some(rowid) = last_rowid {
                    let command = LiveCommand::SetAfterRowid { rowid };
                    match serde_json::to_string(&command) {
                        Ok(text) => {
                            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                                warn!("Cannot request replay from {}: {}", rowid, e);
                            }
                        }
                        Err(e) => warn!("Cannot encode replay request: {}", e),
                    }
                }

                while let Some(frame) = ws_rx.next().await {
                    let text = match frame {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Live channel read failed: {}", e);
                            break;
                        }
                    };

                    let event = match serde_json::from_str::<LiveEvent>(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Ignoring undecodable live frame: {}", e);
                            continue;
                        }
                    };

                    let forwarded = match event {
                        LiveEvent::Messages { data, last_rowid: watermark } => {
                            last_rowid = Some(last_rowid.map_or(watermark, |w| w.max(watermark)));
                            events.send(AppEvent::LiveBatch(data))
                        }
                        LiveEvent::Ping => {
                            debug!("Live channel ping");
                            Ok(())
                        }
                        LiveEvent::Error { message } => events.send(AppEvent::LiveError(message)),
                    };
                    if forwarded.is_err() {
                        return;
                    }
                }

                info!("Live channel disconnected");
                if events.send(AppEvent::LiveDisconnected).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Live channel connect failed: {}", e);
            }
        }

        if events.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> AppEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("listener dropped the queue")
    }

    fn fast() -> ListenerConfig {
        ListenerConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn forwards_batches_and_replays_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, fast(), tx));

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, AppEvent::LiveConnected));

        let batch = json!({
            "type": "messages",
            "data": [{ "rowid": 5, "guid": "g-5", "text": "hi" }],
            "last_rowid": 5,
        });
        ws.send(Message::Text(batch.to_string().into())).await.unwrap();
        match next_event(&mut rx).await {
            AppEvent::LiveBatch(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].rowid, 5);
            }
            other => panic!("expected a batch, got {:?}", other),
        }

        // Pings and garbage produce nothing.
        ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"error","message":"store busy"}"#.into()))
            .await
            .unwrap();
        match next_event(&mut rx).await {
            AppEvent::LiveError(message) => assert_eq!(message, "store busy"),
            other => panic!("expected an error, got {:?}", other),
        }

        ws.close(None).await.unwrap();
        drop(ws);
        assert!(matches!(next_event(&mut rx).await, AppEvent::LiveDisconnected));

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, AppEvent::LiveConnected));

        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let command: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(command, json!({ "type": "set_after_rowid", "rowid": 5 }));

        task.abort();
    }

    #[tokio::test]
    async fn stops_when_app_loop_is_gone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), run(url, fast(), tx))
            .await
            .expect("listener kept retrying without a consumer");
    }
}
