use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use imsg_db::SearchQuery;
use imsg_types::api::{MessageResponse, SearchResponse};

use crate::error::ApiError;
use crate::messages::clamp_limit;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub chat_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// `GET /search`: substring match on message text, newest first.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("q must not be empty".into()));
    }
    let query = SearchQuery {
        text: params.q,
        chat_id: params.chat_id,
        limit: clamp_limit(params.limit, 100)?,
        offset: params.offset,
    };

    info!("Searching messages for {:?} (chat={:?})", query.text, query.chat_id);
    let page = state.read(move |store| store.search(&query)).await?;
    info!("Search returned {} results (has_more={})", page.rows.len(), page.has_more);

    let messages: Vec<MessageResponse> = page.rows.into_iter().map(MessageResponse::from).collect();
    Ok(Json(SearchResponse {
        total: messages.len(),
        messages,
        has_more: page.has_more,
    }))
}
