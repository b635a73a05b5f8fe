use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use imsg_types::api::ChatResponse;

use crate::error::ApiError;
use crate::messages::clamp_limit;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, 500)?;
    let rows = state.read(move |store| store.chats(limit)).await?;
    let chats: Vec<ChatResponse> = rows.into_iter().map(ChatResponse::from).collect();
    Ok(Json(chats))
}
