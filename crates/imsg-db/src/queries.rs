use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};

use crate::Result;
use crate::models::{AttachmentRow, ChatRow, MessageRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Conditions ANDed onto the message query. All optional.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub chat_id: Option<i64>,
    /// Exclusive lower bound on `ROWID`.
    pub after: Option<i64>,
    /// Exclusive upper bound on `ROWID`.
    pub before: Option<i64>,
    /// Case-insensitive substring match on `text`.
    pub text_contains: Option<String>,
}

const MESSAGE_COLUMNS: &str = "m.ROWID, m.guid, m.text, m.date, m.is_from_me, h.id, {chat}, \
     m.associated_message_type, m.associated_message_guid, m.cache_has_attachments";

/// One message can sit in several chats (rare, e.g. after a merge); the
/// lowest join row wins when no chat filter is given.
const UNSCOPED_CHAT: &str =
    "(SELECT cmj2.chat_id FROM chat_message_join cmj2 WHERE cmj2.message_id = m.ROWID \
     ORDER BY cmj2.chat_id LIMIT 1)";

pub fn query_messages(
    conn: &Connection,
    filter: &MessageFilter,
    order: SortOrder,
    limit: u32,
    offset: u32,
) -> Result<Vec<MessageRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    let (join, chat_column) = match filter.chat_id {
        Some(chat_id) => {
            clauses.push("cmj.chat_id = ?");
            params.push(Value::Integer(chat_id));
            (
                "JOIN chat_message_join cmj ON cmj.message_id = m.ROWID",
                "cmj.chat_id",
            )
        }
        None => ("", UNSCOPED_CHAT),
    };

    if let Some(after) = filter.after {
        clauses.push("m.ROWID > ?");
        params.push(Value::Integer(after));
    }
    if let Some(before) = filter.before {
        clauses.push("m.ROWID < ?");
        params.push(Value::Integer(before));
    }
    if let Some(text) = &filter.text_contains {
        clauses.push("m.text LIKE ? ESCAPE '\\'");
        params.push(Value::Text(format!("%{}%", escape_like(text))));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM message m {} LEFT JOIN handle h ON h.ROWID = m.handle_id {} \
         ORDER BY m.ROWID {} LIMIT ? OFFSET ?",
        MESSAGE_COLUMNS.replace("{chat}", chat_column),
        join,
        where_sql,
        order.sql(),
    );
    params.push(Value::Integer(i64::from(limit)));
    params.push(Value::Integer(i64::from(offset)));

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt
        .query_map(params_from_iter(params), map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    load_attachments(conn, &mut rows)?;
    Ok(rows)
}

const ATTACHMENT_COLUMNS: &str =
    "a.ROWID, a.guid, a.filename, a.mime_type, a.uti, a.transfer_name, a.total_bytes";

/// Fill `attachments` for the rows flagged as having any, in one query.
fn load_attachments(conn: &Connection, rows: &mut [MessageRow]) -> Result<()> {
    let ids: Vec<i64> = rows.iter().filter(|r| r.has_attachments).map(|r| r.rowid).collect();
    if ids.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT maj.message_id, {}
         FROM message_attachment_join maj
         JOIN attachment a ON a.ROWID = maj.attachment_id
         WHERE maj.message_id IN ({})
         ORDER BY maj.message_id, a.ROWID",
        ATTACHMENT_COLUMNS,
        placeholders.join(", ")
    );

    let mut by_message: HashMap<i64, Vec<AttachmentRow>> = HashMap::new();
    let mut stmt = conn.prepare(&sql)?;
    let found = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, map_attachment_row(row, 1)?))
    })?;
    for entry in found {
        let (message_id, attachment) = entry?;
        by_message.entry(message_id).or_default().push(attachment);
    }
    for row in rows.iter_mut() {
        if let Some(attachments) = by_message.remove(&row.rowid) {
            row.attachments = attachments;
        }
    }
    Ok(())
}

pub fn query_attachment(conn: &Connection, attachment_id: i64) -> Result<Option<AttachmentRow>> {
    let sql = format!("SELECT {} FROM attachment a WHERE a.ROWID = ?1", ATTACHMENT_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let attachment = stmt
        .query_row([attachment_id], |row| map_attachment_row(row, 0))
        .optional()?;
    Ok(attachment)
}

/// Attachment columns starting at index `at`.
fn map_attachment_row(row: &Row<'_>, at: usize) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        rowid: row.get(at)?,
        guid: row.get::<_, Option<String>>(at + 1)?.unwrap_or_default(),
        filename: row.get(at + 2)?,
        mime_type: row.get(at + 3)?,
        uti: row.get(at + 4)?,
        transfer_name: row.get(at + 5)?,
        total_bytes: row.get::<_, Option<i64>>(at + 6)?.unwrap_or(0),
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        rowid: row.get(0)?,
        guid: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        text: row.get(2)?,
        date: row.get(3)?,
        is_from_me: row.get::<_, Option<i64>>(4)?.unwrap_or(0) != 0,
        handle_id: row.get(5)?,
        chat_id: row.get(6)?,
        associated_message_type: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        associated_message_guid: row.get(8)?,
        has_attachments: row.get::<_, Option<i64>>(9)?.unwrap_or(0) != 0,
        attachments: Vec::new(),
    })
}

/// Chats with their latest message, most recently active first.
pub fn query_chats(conn: &Connection, limit: u32) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.ROWID, c.guid, c.display_name, c.chat_identifier,
                lm.date, lm.text, COALESCE(lm.is_from_me, 0)
         FROM chat c
         LEFT JOIN (
             SELECT chat_id, MAX(message_id) AS last_id
             FROM chat_message_join
             GROUP BY chat_id
         ) latest ON latest.chat_id = c.ROWID
         LEFT JOIN message lm ON lm.ROWID = latest.last_id
         ORDER BY latest.last_id DESC, c.ROWID DESC
         LIMIT ?1",
    )?;

    let mut chats = stmt
        .query_map([i64::from(limit)], |row| {
            Ok(ChatRow {
                rowid: row.get(0)?,
                guid: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                display_name: row.get(2)?,
                identifier: row.get(3)?,
                last_message_date: row.get(4)?,
                last_message_text: row.get(5)?,
                last_message_is_from_me: row.get::<_, i64>(6)? != 0,
                participants: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let ids: Vec<i64> = chats.iter().map(|c| c.rowid).collect();
    let mut participants = query_participants(conn, &ids)?;
    for chat in &mut chats {
        chat.participants = participants.remove(&chat.rowid).unwrap_or_default();
    }
    Ok(chats)
}

/// Batch-fetch participant addresses for a set of chats.
fn query_participants(conn: &Connection, chat_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut by_chat: HashMap<i64, Vec<String>> = HashMap::new();
    if chat_ids.is_empty() {
        return Ok(by_chat);
    }

    let placeholders: Vec<String> = (1..=chat_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT chj.chat_id, h.id
         FROM chat_handle_join chj
         JOIN handle h ON h.ROWID = chj.handle_id
         WHERE chj.chat_id IN ({})
         ORDER BY chj.chat_id, h.ROWID",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(chat_ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (chat_id, address) = row?;
        by_chat.entry(chat_id).or_default().push(address);
    }
    Ok(by_chat)
}

/// Escape LIKE metacharacters so user input only ever matches literally.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
