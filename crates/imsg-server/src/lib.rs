pub mod config;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use imsg_api::sender::MessageSender;
use imsg_api::settings::Settings;
use imsg_api::AppStateInner;
use imsg_db::MessageStore;
use imsg_gateway::{LiveConfig, LiveState};

pub fn live_config(settings: &Settings) -> LiveConfig {
    LiveConfig {
        poll_interval: settings.poll_interval(),
        batch_limit: settings.websocket_batch_limit,
        ping_after_idle_cycles: settings.websocket_ping_cycles,
        error_backoff: settings.poll_interval(),
    }
}

/// HTTP routes plus `/ws`, with CORS and request tracing.
pub fn app(store: Arc<dyn MessageStore>, sender: Arc<dyn MessageSender>, settings: Settings) -> Router {
    let live = LiveState {
        store: store.clone(),
        config: live_config(&settings),
    };
    let api_state = AppStateInner::new(store, sender, settings);

    Router::new()
        .merge(imsg_api::router(api_state))
        .merge(imsg_gateway::router(live))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
