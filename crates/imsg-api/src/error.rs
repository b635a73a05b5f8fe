use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use imsg_db::StoreError;
use imsg_types::api::ErrorResponse;
use imsg_types::models::ErrorType;

use crate::sender::SendFailure;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Send(#[from] SendFailure),

    #[error("Rate limit exceeded. Max {max} messages per {window_secs}s")]
    RateLimited {
        retry_after: u64,
        max: usize,
        window_secs: u64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ApiError::BadRequest(_) => ErrorType::InvalidRequest,
            ApiError::NotFound(_) => ErrorType::NotFound,
            ApiError::Store(_) => ErrorType::StoreUnavailable,
            ApiError::Send(failure) => failure.kind,
            ApiError::RateLimited { .. } => ErrorType::RateLimited,
            ApiError::Internal(_) => ErrorType::Unknown,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = self.error_type();
        let status = StatusCode::from_u16(error_type.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let detail = match &self {
            ApiError::Send(failure) => failure.raw.clone().filter(|raw| *raw != failure.message),
            _ => None,
        };
        let error = match &self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error,
            error_type,
            detail,
        };
        let mut response = (status, Json(body)).into_response();

        if let ApiError::RateLimited { retry_after, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Map a `spawn_blocking` join failure.
pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    tracing::error!("spawn_blocking join error: {}", e);
    ApiError::Internal(e.to_string())
}
