use serde::{Deserialize, Serialize};

/// What a message row carries, as far as sync is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    /// A tapback pointing at another message via `associated_guid`.
    Reaction,
    /// The row has one or more attachments (text may be empty).
    Attachment,
}

/// Machine-readable error class carried in every HTTP error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    RecipientNotFound,
    ServiceUnavailable,
    Timeout,
    RateLimited,
    StoreUnavailable,
    InvalidRequest,
    /// The requested resource (for now, an attachment) does not exist.
    NotFound,
    Unknown,
}

impl ErrorType {
    /// HTTP status used when this class is reported by the server.
    pub fn status_code(self) -> u16 {
        match self {
            Self::RecipientNotFound | Self::NotFound => 404,
            Self::ServiceUnavailable | Self::StoreUnavailable => 503,
            Self::Timeout => 504,
            Self::RateLimited => 429,
            Self::InvalidRequest => 400,
            Self::Unknown => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecipientNotFound => "recipient_not_found",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::StoreUnavailable => "store_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorType::RecipientNotFound).unwrap();
        assert_eq!(json, "\"recipient_not_found\"");
        assert_eq!(ErrorType::RecipientNotFound.as_str(), "recipient_not_found");
    }

    #[test]
    fn send_classes_map_to_distinct_statuses() {
        assert_eq!(ErrorType::RecipientNotFound.status_code(), 404);
        assert_eq!(ErrorType::ServiceUnavailable.status_code(), 503);
        assert_eq!(ErrorType::Timeout.status_code(), 504);
        assert_eq!(ErrorType::RateLimited.status_code(), 429);
        assert_eq!(ErrorType::Unknown.status_code(), 500);
    }
}
