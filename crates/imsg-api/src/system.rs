use axum::{Json, extract::State, response::IntoResponse};
use tracing::warn;

use imsg_types::api::HealthResponse;

use crate::error::{ApiError, join_error};
use crate::settings::Settings;
use crate::state::AppState;

/// `GET /health`: always 200; `degraded` when chat.db cannot be read.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.clone();
    let database_accessible = tokio::task::spawn_blocking(move || store.probe())
        .await
        .map_err(join_error)?;
    if !database_accessible {
        warn!("Health check: message store is not readable");
    }

    Ok(Json(HealthResponse {
        status: if database_accessible { "ok" } else { "degraded" }.to_string(),
        database_accessible,
    }))
}

pub async fn get_config(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.clone())
}

pub async fn get_config_defaults() -> Json<Settings> {
    Json(Settings::default())
}
