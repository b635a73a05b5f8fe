//! Delivery through Messages.app. The HTTP layer only sees the
//! `MessageSender` trait; `AppleScriptSender` is the macOS implementation.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use imsg_types::models::ErrorType;

static CHAT_GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(iMessage|SMS|RCS);[+-];chat\d+$").expect("chat guid regex")
});

/// A send that did not go through, classified for the HTTP response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SendFailure {
    pub kind: ErrorType,
    /// Short user-facing explanation.
    pub message: String,
    /// Raw error text from the sender, if any.
    pub raw: Option<String>,
}

#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendFailure>;
}

pub fn is_chat_guid(recipient: &str) -> bool {
    CHAT_GUID.is_match(recipient)
}

/// Backslashes first, then quotes.
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn build_script(recipient: &str, text: &str) -> String {
    let body = escape_applescript(text);
    if is_chat_guid(recipient) {
        format!(
            "tell application \"Messages\"\n\
             \tset targetChat to chat id \"{}\"\n\
             \tsend \"{}\" to targetChat\n\
             end tell",
            escape_applescript(recipient),
            body
        )
    } else {
        format!(
            "tell application \"Messages\"\n\
             \tset targetService to 1st account whose service type = iMessage\n\
             \tset targetBuddy to participant \"{}\" of targetService\n\
             \tsend \"{}\" to targetBuddy\n\
             end tell",
            escape_applescript(recipient),
            body
        )
    }
}

const NOT_FOUND_PHRASES: &[&str] = &[
    "can't get buddy",
    "can't get participant",
    "not found",
    "invalid phone",
    "invalid email",
];

const UNAVAILABLE_PHRASES: &[&str] = &[
    "can't get service",
    "can't get account",
    "no account",
    "not signed in",
    "connection invalid",
];

/// Map raw AppleScript error text onto a failure class.
pub fn classify_send_error(raw: &str) -> SendFailure {
    let lower = raw.to_lowercase();
    let (kind, message) = if NOT_FOUND_PHRASES.iter().any(|p| lower.contains(p)) {
        (
            ErrorType::RecipientNotFound,
            "Recipient not found. Ensure the phone number or email is registered with iMessage.",
        )
    } else if UNAVAILABLE_PHRASES.iter().any(|p| lower.contains(p)) {
        (
            ErrorType::ServiceUnavailable,
            "iMessage service unavailable. Ensure Messages.app is running and signed in.",
        )
    } else if lower.contains("timeout") {
        (
            ErrorType::Timeout,
            "Request timed out. Messages.app may be unresponsive.",
        )
    } else {
        return SendFailure {
            kind: ErrorType::Unknown,
            message: raw.to_string(),
            raw: None,
        };
    };

    SendFailure {
        kind,
        message: message.to_string(),
        raw: Some(raw.to_string()),
    }
}

/// Runs `osascript -e <script>` per message.
pub struct AppleScriptSender {
    timeout: Duration,
}

impl AppleScriptSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MessageSender for AppleScriptSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendFailure> {
        let script = build_script(recipient, text);
        debug!("Executing AppleScript send to {}", recipient);

        let child = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Cannot spawn osascript: {}", e);
                return Err(classify_send_error(&e.to_string()));
            }
            Err(_) => {
                warn!("AppleScript timeout sending to {}", recipient);
                return Err(classify_send_error("Timeout: Messages.app did not respond"));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let raw = if stderr.is_empty() { "Unknown error".to_string() } else { stderr };
            warn!("AppleScript failed: {}", raw);
            return Err(classify_send_error(&raw));
        }

        info!("Message sent to {}", recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_backslash_before_quote() {
        assert_eq!(escape_applescript(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }

    #[test]
    fn script_targets_chat_or_buddy() {
        let group = build_script("iMessage;+;chat123456", "yo");
        assert!(group.contains("chat id \"iMessage;+;chat123456\""));
        assert!(!group.contains("participant"));

        let direct = build_script("+15551234567", "a \"quote\"");
        assert!(direct.contains("participant \"+15551234567\""));
        assert!(direct.contains("send \"a \\\"quote\\\"\" to targetBuddy"));
    }

    #[test]
    fn chat_guid_shapes() {
        assert!(is_chat_guid("SMS;-;chat42"));
        assert!(is_chat_guid("RCS;+;chat1"));
        assert!(!is_chat_guid("iMessage;-;+15551234567"));
        assert!(!is_chat_guid("chat42"));
    }

    #[test]
    fn classifies_known_phrases() {
        let f = classify_send_error("execution error: Messages got an error: Can't get buddy id \"x\".");
        assert_eq!(f.kind, ErrorType::RecipientNotFound);
        assert!(f.raw.is_some());

        assert_eq!(classify_send_error("Not signed in").kind, ErrorType::ServiceUnavailable);
        assert_eq!(
            classify_send_error("Timeout: Messages.app did not respond").kind,
            ErrorType::Timeout
        );

        let unknown = classify_send_error("something odd");
        assert_eq!(unknown.kind, ErrorType::Unknown);
        assert_eq!(unknown.message, "something odd");
        assert_eq!(unknown.raw, None);
    }
}
