use std::sync::LazyLock;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use regex::Regex;
use tracing::{info, warn};

use imsg_types::api::{SendRequest, SendResponse};

use crate::error::ApiError;
use crate::sender::is_chat_guid;
use crate::state::AppState;

pub const MAX_MESSAGE_LENGTH: usize = 10_000;
const MAX_RECIPIENT_LENGTH: usize = 320;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{6,14}$").expect("phone regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));
static PHONE_FORMATTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-\(\)]").expect("phone formatting regex"));

/// Normalize a recipient, or say why it is not one. Phone numbers lose
/// their formatting characters; e-mails and chat GUIDs pass through.
pub fn validate_recipient(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_RECIPIENT_LENGTH {
        return Err(ApiError::BadRequest("recipient must be 1-320 characters".into()));
    }

    let normalized = PHONE_FORMATTING.replace_all(trimmed, "");
    if PHONE.is_match(&normalized) {
        return Ok(normalized.into_owned());
    }
    if EMAIL.is_match(trimmed) || is_chat_guid(trimmed) {
        return Ok(trimmed.to_string());
    }
    Err(ApiError::BadRequest(
        "recipient must be a valid phone number, email, or chat GUID".into(),
    ))
}

pub fn validate_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty or whitespace only".into()));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "message exceeds {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}

/// `POST /send`. Only successful sends count against the rate limit.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let recipient = validate_recipient(&req.recipient)?;
    validate_message(&req.message)?;

    info!(
        "Sending message to {} (length={})",
        recipient,
        req.message.chars().count()
    );

    let slot = match state.limiter.reserve() {
        Ok(slot) => slot,
        Err(retry_after) => {
            warn!("Send rate limit hit, retry after {}s", retry_after);
            return Err(ApiError::RateLimited {
                retry_after,
                max: state.limiter.max(),
                window_secs: state.limiter.window().as_secs(),
            });
        }
    };

    if let Err(failure) = state.sender.send(&recipient, &req.message).await {
        state.limiter.release(slot);
        warn!("Send failed: {} (type={})", failure.message, failure.kind);
        return Err(failure.into());
    }

    info!("Message sent to {}", recipient);
    Ok(Json(SendResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(validate_recipient("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(validate_recipient(" 5551234567 ").unwrap(), "5551234567");
        assert!(validate_recipient("+0123456789").is_err());
        assert!(validate_recipient("12345").is_err());
    }

    #[test]
    fn emails_and_chat_guids_pass_through() {
        assert_eq!(validate_recipient("me@icloud.com").unwrap(), "me@icloud.com");
        assert_eq!(validate_recipient("iMessage;+;chat99").unwrap(), "iMessage;+;chat99");
        assert!(validate_recipient("not an address").is_err());
        assert!(validate_recipient("").is_err());
    }

    #[test]
    fn message_bounds() {
        assert!(validate_message("hi").is_ok());
        assert!(validate_message("  \n\t").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LENGTH)).is_ok());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }
}
