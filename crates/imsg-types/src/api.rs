use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ErrorType, MessageKind};

// -- Messages --

/// One message row as it travels over HTTP and the live channel.
///
/// `rowid` and `guid` are required; everything else tolerates being absent so
/// older servers and sparse rows still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub rowid: i64,
    pub guid: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub handle_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub tapback_type: Option<String>,
    #[serde(default)]
    pub associated_guid: Option<String>,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentResponse>,
}

/// File metadata for one attachment. The bytes live at `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub rowid: i64,
    pub guid: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Original file name as sent.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub total_bytes: i64,
    pub url: String,
}

/// `GET /messages`: a page of history, ascending by `rowid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
}

/// `GET /poll`: everything after the caller's watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub messages: Vec<MessageResponse>,
    /// Pass back as `after_rowid` on the next poll.
    #[serde(alias = "last_id")]
    pub last_rowid: i64,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub messages: Vec<MessageResponse>,
    pub total: usize,
    pub has_more: bool,
}

// -- Chats --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub rowid: i64,
    pub guid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub last_message_is_from_me: bool,
    #[serde(default)]
    pub participants: Vec<String>,
}

impl ChatResponse {
    pub fn is_group(&self) -> bool {
        self.participants.len() > 1
    }

    /// Address to hand to `POST /send`: the chat GUID for groups, the
    /// counterpart's phone/e-mail for one-to-one chats.
    pub fn send_target(&self) -> &str {
        if self.is_group() {
            return &self.guid;
        }
        self.identifier.as_deref().unwrap_or(&self.guid)
    }

    pub fn title(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if self.is_group() {
            let mut title = self.participants[..self.participants.len().min(3)].join(", ");
            if self.participants.len() > 3 {
                title.push_str("...");
            }
            return title;
        }
        self.identifier.clone().unwrap_or_else(|| self.guid.clone())
    }
}

// -- Send --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendRequest {
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
}

// -- Errors --

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub success: bool,
    pub error: String,
    pub error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// -- Health --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_accessible: bool,
}
