pub mod attachments;
pub mod chats;
pub mod error;
pub mod messages;
pub mod rate_limit;
pub mod search;
pub mod send;
pub mod sender;
pub mod settings;
pub mod state;
pub mod system;

use axum::{
    Router,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All HTTP routes. The live channel is mounted separately.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/config", get(system::get_config))
        .route("/config/defaults", get(system::get_config_defaults))
        .route("/chats", get(chats::list_chats))
        .route("/messages", get(messages::get_messages))
        .route("/poll", get(messages::poll))
        .route("/search", get(search::search))
        .route("/attachments/{attachment_id}", get(attachments::get_attachment))
        .route("/send", post(send::send_message))
        .with_state(state)
}
