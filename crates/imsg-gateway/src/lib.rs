pub mod connection;
pub mod session;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use imsg_db::MessageStore;

pub use session::{LiveConfig, LiveSession};

#[derive(Clone)]
pub struct LiveState {
    pub store: Arc<dyn MessageStore>,
    pub config: LiveConfig,
}

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub chat_id: Option<i64>,
}

/// `GET /ws?chat_id=`: upgrade to the live channel.
pub async fn ws_upgrade(
    State(state): State<LiveState>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.store, state.config, query.chat_id)
    })
}

pub fn router(state: LiveState) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}
