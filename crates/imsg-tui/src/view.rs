use chrono::Local;

use imsg_types::api::{ChatResponse, MessageResponse};
use imsg_types::models::MessageKind;

use crate::engine::{Engine, Entry, LoadStatus, PendingState};

const PREVIEW_CHARS: usize = 40;

pub fn chat_list(chats: &[ChatResponse]) -> Vec<String> {
    if chats.is_empty() {
        return vec!["No conversations yet.".to_string()];
    }
    chats
        .iter()
        .enumerate()
        .map(|(i, chat)| {
            let preview = chat
                .last_message_text
                .as_deref()
                .map(|t| truncate(t, PREVIEW_CHARS))
                .unwrap_or_default();
            let who = if chat.last_message_is_from_me { "you: " } else { "" };
            format!("[{:>2}] {}  {}{}", i + 1, chat.title(), who, preview)
        })
        .collect()
}

/// The open chat, oldest at the top. `height` caps the message lines; with
/// `follow_tail` the newest rows are kept, otherwise the oldest loaded ones.
pub fn conversation(title: &str, engine: &Engine, height: usize, follow_tail: bool) -> Vec<String> {
    let mut lines = vec![format!("== {} ==", title)];

    match engine.status() {
        LoadStatus::NoChat => {
            lines.push("No chat open. /chats to list, /open <n> to pick one.".into());
            return lines;
        }
        LoadStatus::Loading => {
            lines.push("Loading...".into());
        }
        LoadStatus::Error(e) => {
            lines.push(format!("Could not load messages: {}", e));
            lines.push("Reopen the chat to retry.".into());
        }
        LoadStatus::Ready => {}
    }

    if engine.is_loading_older() {
        lines.push("  (loading earlier messages...)".into());
    } else if engine.has_more_older() {
        lines.push("  (/older for earlier messages)".into());
    }

    let body: Vec<String> = engine.messages_oldest_first().map(entry_line).collect();
    let shown = if body.len() <= height {
        &body[..]
    } else if follow_tail {
        &body[body.len() - height..]
    } else {
        &body[..height]
    };
    lines.extend(shown.iter().cloned());
    lines
}

pub fn search_results(query: &str, results: &[MessageResponse], total: usize) -> Vec<String> {
    let mut lines = vec![format!("== search: {} ({} found) ==", query, total)];
    if results.is_empty() {
        lines.push("No matches.".into());
    }
    lines.extend(results.iter().map(|m| {
        let chat = m.chat_id.map(|c| format!("#{} ", c)).unwrap_or_default();
        format!("{}{}", chat, message_line(m))
    }));
    lines
}

pub fn entry_line(entry: &Entry) -> String {
    match entry {
        Entry::Confirmed(m) => message_line(m),
        Entry::Pending(p) => match &p.state {
            PendingState::Sending => format!("  ...  me: {} (sending)", p.text),
            PendingState::Failed(reason) => {
                format!("  !!   me: {} (failed: {}; /retry)", p.text, reason)
            }
        },
    }
}

pub fn message_line(m: &MessageResponse) -> String {
    let time = m
        .timestamp
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let sender = if m.is_from_me {
        "me"
    } else {
        m.handle_id.as_deref().unwrap_or("them")
    };
    let text = m.text.as_deref().unwrap_or("");

    match m.kind {
        MessageKind::Reaction => {
            let tapback = m.tapback_type.as_deref().unwrap_or("reaction");
            format!("{}  * {} {}", time, sender, tapback)
        }
        MessageKind::Attachment if text.trim().is_empty() => {
            format!("{}  {}: {}", time, sender, attachment_label(m))
        }
        MessageKind::Attachment => format!("{}  {}: {} {}", time, sender, attachment_label(m), text),
        MessageKind::Text => format!("{}  {}: {}", time, sender, text),
    }
}

fn attachment_label(m: &MessageResponse) -> String {
    let names: Vec<&str> = m.attachments.iter().filter_map(|a| a.filename.as_deref()).collect();
    if names.is_empty() {
        "[attachment]".to_string()
    } else {
        format!("[{}]", names.join(", "))
    }
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imsg_types::api::AttachmentResponse;

    fn msg(rowid: i64, text: &str, is_from_me: bool) -> MessageResponse {
        MessageResponse {
            rowid,
            guid: format!("G{}", rowid),
            text: Some(text.into()),
            timestamp: None,
            is_from_me,
            handle_id: Some("+15550001".into()),
            chat_id: Some(1),
            kind: MessageKind::Text,
            tapback_type: None,
            associated_guid: None,
            has_attachments: false,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn message_lines_by_kind() {
        assert_eq!(message_line(&msg(1, "hey", false)), "--:--  +15550001: hey");
        assert_eq!(message_line(&msg(2, "yo", true)), "--:--  me: yo");

        let mut reaction = msg(3, "Loved \"hey\"", false);
        reaction.kind = MessageKind::Reaction;
        reaction.tapback_type = Some("love".into());
        assert_eq!(message_line(&reaction), "--:--  * +15550001 love");

        let mut photo = msg(4, "", true);
        photo.kind = MessageKind::Attachment;
        assert_eq!(message_line(&photo), "--:--  me: [attachment]");

        photo.text = Some("from the beach".into());
        photo.attachments.push(AttachmentResponse {
            rowid: 8,
            guid: "at_0_8".into(),
            mime_type: Some("image/jpeg".into()),
            filename: Some("IMG_0042.jpeg".into()),
            total_bytes: 1024,
            url: "/attachments/8".into(),
        });
        assert_eq!(message_line(&photo), "--:--  me: [IMG_0042.jpeg] from the beach");
    }

    #[test]
    fn pending_and_failed_are_flagged() {
        let mut engine = Engine::new(10);
        engine.switch_chat(1, "+15550001");
        engine.initial_page_loaded(engine.generation(), 1, Ok(vec![]));
        engine.submit("on my way");
        let lines = conversation("Alice", &engine, 10, true);
        assert_eq!(lines.last().unwrap(), "  ...  me: on my way (sending)");

        engine.send_finished(engine.generation(), "on my way", Err("Request timed out".into()));
        let lines = conversation("Alice", &engine, 10, true);
        assert!(lines.last().unwrap().contains("failed: Request timed out"));
    }

    #[test]
    fn conversation_window_follows_tail() {
        let mut engine = Engine::new(3);
        engine.switch_chat(1, "+15550001");
        let rows = vec![msg(1, "a", false), msg(2, "b", false), msg(3, "c", false)];
        engine.initial_page_loaded(engine.generation(), 1, Ok(rows));

        let tail = conversation("Alice", &engine, 2, true);
        assert_eq!(
            tail,
            vec![
                "== Alice ==".to_string(),
                "  (/older for earlier messages)".to_string(),
                "--:--  +15550001: b".to_string(),
                "--:--  +15550001: c".to_string(),
            ]
        );
        let head = conversation("Alice", &engine, 2, false);
        assert_eq!(head[2], "--:--  +15550001: a");
    }

    #[test]
    fn chat_list_is_numbered_from_one() {
        let chat = ChatResponse {
            rowid: 9,
            guid: "iMessage;-;+15550001".into(),
            display_name: Some("Alice".into()),
            identifier: Some("+15550001".into()),
            last_message_time: None,
            last_message_text: Some("see you\nsoon".into()),
            last_message_is_from_me: true,
            participants: vec!["+15550001".into()],
        };
        assert_eq!(chat_list(&[chat]), vec!["[ 1] Alice  you: see you soon".to_string()]);
        assert_eq!(chat_list(&[]), vec!["No conversations yet.".to_string()]);
    }

    #[test]
    fn long_previews_are_cut() {
        let long = "x".repeat(50);
        assert_eq!(truncate(&long, 40).chars().count(), 43);
    }
}
