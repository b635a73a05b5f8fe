//! Row types read from `chat.db`. Distinct from the imsg-types wire models
//! so the schema quirks stay inside this crate.

use chrono::{DateTime, Utc};

use imsg_types::api::{AttachmentResponse, ChatResponse, MessageResponse};
use imsg_types::models::MessageKind;

use crate::time::mac_absolute_to_utc;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub rowid: i64,
    pub guid: String,
    pub text: Option<String>,
    /// Raw Mac absolute time (ns since 2001-01-01 UTC).
    pub date: Option<i64>,
    pub is_from_me: bool,
    /// Sender address (phone or e-mail) from the `handle` table.
    pub handle_id: Option<String>,
    pub chat_id: Option<i64>,
    pub associated_message_type: i64,
    pub associated_message_guid: Option<String>,
    pub has_attachments: bool,
    pub attachments: Vec<AttachmentRow>,
}

impl MessageRow {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date.and_then(mac_absolute_to_utc)
    }

    /// Tapback name for reaction rows. 2000..=2005 add a reaction,
    /// 3000..=3005 remove the same one.
    pub fn tapback_type(&self) -> Option<String> {
        let (base, removed) = match self.associated_message_type {
            t @ 2000..=2005 => (t - 2000, false),
            t @ 3000..=3005 => (t - 3000, true),
            _ => return None,
        };
        let name = match base {
            0 => "love",
            1 => "like",
            2 => "dislike",
            3 => "laugh",
            4 => "emphasize",
            _ => "question",
        };
        Some(if removed {
            format!("remove_{}", name)
        } else {
            name.to_string()
        })
    }

    /// Target GUID of a reaction, without the `p:0/` or `bp:` part prefix.
    pub fn associated_guid(&self) -> Option<String> {
        let raw = self.associated_message_guid.as_deref()?;
        let guid = match raw.split_once('/') {
            Some((prefix, rest)) if prefix.starts_with("p:") => rest,
            _ => raw.strip_prefix("bp:").unwrap_or(raw),
        };
        Some(guid.to_string())
    }

    pub fn kind(&self) -> MessageKind {
        if self.tapback_type().is_some() {
            MessageKind::Reaction
        } else if self.has_attachments {
            MessageKind::Attachment
        } else {
            MessageKind::Text
        }
    }
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        let timestamp = row.timestamp();
        let tapback_type = row.tapback_type();
        let associated_guid = row.associated_guid();
        let kind = row.kind();
        Self {
            rowid: row.rowid,
            guid: row.guid,
            text: row.text,
            timestamp,
            is_from_me: row.is_from_me,
            handle_id: row.handle_id,
            chat_id: row.chat_id,
            kind,
            tapback_type,
            associated_guid,
            has_attachments: row.has_attachments,
            attachments: row.attachments.into_iter().map(AttachmentResponse::from).collect(),
        }
    }
}

/// A row of the `attachment` table. `filename` is the on-disk path, often
/// `~/Library/Messages/Attachments/...`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRow {
    pub rowid: i64,
    pub guid: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub uti: Option<String>,
    /// Name the file had when it was sent.
    pub transfer_name: Option<String>,
    pub total_bytes: i64,
}

impl AttachmentRow {
    /// Stored MIME type, else one derived from the UTI.
    pub fn resolved_mime_type(&self) -> Option<String> {
        if let Some(mime) = self.mime_type.as_deref().filter(|m| !m.is_empty()) {
            return Some(mime.to_string());
        }
        self.uti.as_deref().and_then(mime_for_uti).map(str::to_string)
    }
}

fn mime_for_uti(uti: &str) -> Option<&'static str> {
    Some(match uti {
        "public.heic" => "image/heic",
        "public.jpeg" => "image/jpeg",
        "public.png" => "image/png",
        "public.gif" | "com.compuserve.gif" => "image/gif",
        "public.tiff" => "image/tiff",
        "public.mpeg-4" => "video/mp4",
        "com.apple.quicktime-movie" => "video/quicktime",
        "public.mp3" => "audio/mpeg",
        "public.mpeg-4-audio" | "com.apple.m4a-audio" => "audio/mp4",
        "public.pdf" => "application/pdf",
        _ => return None,
    })
}

impl From<AttachmentRow> for AttachmentResponse {
    fn from(row: AttachmentRow) -> Self {
        let mime_type = row.resolved_mime_type();
        Self {
            url: format!("/attachments/{}", row.rowid),
            rowid: row.rowid,
            guid: row.guid,
            mime_type,
            filename: row.transfer_name,
            total_bytes: row.total_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub rowid: i64,
    pub guid: String,
    pub display_name: Option<String>,
    pub identifier: Option<String>,
    pub last_message_date: Option<i64>,
    pub last_message_text: Option<String>,
    pub last_message_is_from_me: bool,
    pub participants: Vec<String>,
}

impl From<ChatRow> for ChatResponse {
    fn from(row: ChatRow) -> Self {
        Self {
            rowid: row.rowid,
            guid: row.guid,
            display_name: row.display_name.filter(|n| !n.is_empty()),
            identifier: row.identifier,
            last_message_time: row.last_message_date.and_then(mac_absolute_to_utc),
            last_message_text: row.last_message_text,
            last_message_is_from_me: row.last_message_is_from_me,
            participants: row.participants,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub chat_id: Option<i64>,
    pub limit: u32,
    pub offset: u32,
}

/// Search hits, newest first.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub rows: Vec<MessageRow>,
    pub has_more: bool,
}
