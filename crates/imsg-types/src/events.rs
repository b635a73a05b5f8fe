use serde::{Deserialize, Serialize};

use crate::api::MessageResponse;

/// Frames pushed FROM server TO client on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// New rows, ascending by `rowid`. `last_rowid` is the server-side
    /// watermark after this batch.
    Messages {
        data: Vec<MessageResponse>,
        last_rowid: i64,
    },

    /// Keepalive
    Ping,

    /// A fetch failed; the connection stays open.
    Error { message: String },
}

/// Commands sent FROM client TO server on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveCommand {
    /// Replace the server-side watermark.
    SetAfterRowid { rowid: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_flat_type_tag() {
        let ping = serde_json::to_value(LiveEvent::Ping).unwrap();
        assert_eq!(ping, serde_json::json!({ "type": "ping" }));

        let batch = serde_json::to_value(LiveEvent::Messages { data: vec![], last_rowid: 9 }).unwrap();
        assert_eq!(
            batch,
            serde_json::json!({ "type": "messages", "data": [], "last_rowid": 9 })
        );
    }

    #[test]
    fn set_after_rowid_parses() {
        let cmd: LiveCommand =
            serde_json::from_str(r#"{"type":"set_after_rowid","rowid":41}"#).unwrap();
        assert_eq!(cmd, LiveCommand::SetAfterRowid { rowid: 41 });
    }
}
