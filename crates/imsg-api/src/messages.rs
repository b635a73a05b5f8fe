use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use imsg_db::{FetchRequest, Page};
use imsg_types::api::{HistoryResponse, MessageResponse, PollResponse};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_PAGE: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub chat_id: Option<i64>,
    #[serde(default = "default_history_limit")]
    pub limit: u32,
    /// Rows newer than this id.
    #[serde(alias = "after_id")]
    pub after_rowid: Option<i64>,
    /// Rows older than this id (backfill).
    #[serde(alias = "before_id")]
    pub before_rowid: Option<i64>,
}

fn default_history_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default, alias = "after_id")]
    pub after_rowid: i64,
    pub chat_id: Option<i64>,
    #[serde(default = "default_poll_limit")]
    pub limit: u32,
}

fn default_poll_limit() -> u32 {
    100
}

pub(crate) fn clamp_limit(limit: u32, max: u32) -> Result<u32, ApiError> {
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be at least 1".into()));
    }
    Ok(limit.min(max))
}

fn to_responses(page: Page) -> Vec<MessageResponse> {
    page.rows.into_iter().map(MessageResponse::from).collect()
}

/// `GET /messages`: a page of history. With no cursor, the newest page.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, MAX_PAGE)?;
    let request = match (query.after_rowid, query.before_rowid) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "pass at most one of after_rowid and before_rowid".into(),
            ));
        }
        (Some(after), None) => FetchRequest::after(query.chat_id, after, limit),
        (None, Some(before)) => FetchRequest::before(query.chat_id, before, limit),
        (None, None) => FetchRequest::latest(query.chat_id, limit),
    };

    let page = state.read(move |store| store.fetch(&request)).await?;
    debug!(
        "History {:?} chat={:?} returned {} rows (more={})",
        request.cursor,
        request.chat_id,
        page.rows.len(),
        page.truncated
    );

    let has_more = page.truncated;
    Ok(Json(HistoryResponse {
        messages: to_responses(page),
        has_more,
    }))
}

/// `GET /poll`: rows after the caller's watermark. Stateless; the caller
/// feeds `last_rowid` back as `after_rowid`.
pub async fn poll(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, MAX_PAGE)?;
    let request = FetchRequest::after(query.chat_id, query.after_rowid, limit);

    let page = state.read(move |store| store.fetch(&request)).await?;
    let last_rowid = page.max_rowid().unwrap_or(query.after_rowid);
    if !page.rows.is_empty() {
        debug!(
            "Poll after {} returned {} rows, watermark now {}",
            query.after_rowid,
            page.rows.len(),
            last_rowid
        );
    }

    let has_more = page.truncated;
    Ok(Json(PollResponse {
        messages: to_responses(page),
        last_rowid,
        has_more,
    }))
}
