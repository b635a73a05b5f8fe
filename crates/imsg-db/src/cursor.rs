//! Watermark-based incremental reads over the append-only `message` table.
//!
//! Row ids are assigned by Messages.app in strictly increasing order, so the
//! highest id a reader has seen is enough to resume from. Every mode orders
//! by row id, never by the `date` column.

use crate::models::{AttachmentRow, ChatRow, MessageRow, SearchPage, SearchQuery};
use crate::{Database, Result, queries};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// The newest `limit` rows.
    Latest,
    /// Rows with `rowid > watermark` (poll / live channel).
    After(i64),
    /// The `limit` rows immediately preceding `rowid` (history pagination).
    Before(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub chat_id: Option<i64>,
    pub cursor: Cursor,
    pub limit: u32,
}

impl FetchRequest {
    pub fn latest(chat_id: Option<i64>, limit: u32) -> Self {
        Self { chat_id, cursor: Cursor::Latest, limit }
    }

    pub fn after(chat_id: Option<i64>, watermark: i64, limit: u32) -> Self {
        Self { chat_id, cursor: Cursor::After(watermark), limit }
    }

    pub fn before(chat_id: Option<i64>, rowid: i64, limit: u32) -> Self {
        Self { chat_id, cursor: Cursor::Before(rowid), limit }
    }
}

/// A bounded batch of rows, always ascending by `rowid`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<MessageRow>,
    /// `After`: at least one more row exists past the page (exact, via a
    /// probe row). `Latest`/`Before`: the page came back full, so more
    /// *may* exist.
    pub truncated: bool,
}

impl Page {
    pub fn max_rowid(&self) -> Option<i64> {
        self.rows.iter().map(|r| r.rowid).max()
    }

    pub fn min_rowid(&self) -> Option<i64> {
        self.rows.iter().map(|r| r.rowid).min()
    }
}

/// Read-only view of the message store. Implementations block; async
/// callers go through `spawn_blocking`.
pub trait MessageStore: Send + Sync + 'static {
    fn fetch(&self, req: &FetchRequest) -> Result<Page>;

    /// Chats ordered by most recent activity.
    fn chats(&self, limit: u32) -> Result<Vec<ChatRow>>;

    fn search(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// `None` if no attachment has that id.
    fn attachment(&self, attachment_id: i64) -> Result<Option<AttachmentRow>>;

    /// True if the store can currently be read.
    fn probe(&self) -> bool;
}

impl MessageStore for Database {
    fn fetch(&self, req: &FetchRequest) -> Result<Page> {
        let limit = req.limit as usize;
        self.with_conn(|conn| match req.cursor {
            Cursor::After(watermark) => {
                let filter = queries::MessageFilter {
                    chat_id: req.chat_id,
                    after: Some(watermark),
                    ..Default::default()
                };
                let mut rows = queries::query_messages(
                    conn,
                    &filter,
                    queries::SortOrder::Ascending,
                    req.limit + 1,
                    0,
                )?;
                let truncated = rows.len() > limit;
                rows.truncate(limit);
                Ok(Page { rows, truncated })
            }
            Cursor::Before(rowid) => {
                let filter = queries::MessageFilter {
                    chat_id: req.chat_id,
                    before: Some(rowid),
                    ..Default::default()
                };
                Ok(newest_first_page(
                    queries::query_messages(conn, &filter, queries::SortOrder::Descending, req.limit, 0)?,
                    limit,
                ))
            }
            Cursor::Latest => {
                let filter = queries::MessageFilter {
                    chat_id: req.chat_id,
                    ..Default::default()
                };
                Ok(newest_first_page(
                    queries::query_messages(conn, &filter, queries::SortOrder::Descending, req.limit, 0)?,
                    limit,
                ))
            }
        })
    }

    fn chats(&self, limit: u32) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| queries::query_chats(conn, limit))
    }

    fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.with_conn(|conn| {
            let filter = queries::MessageFilter {
                chat_id: query.chat_id,
                text_contains: Some(query.text.clone()),
                ..Default::default()
            };
            let limit = query.limit as usize;
            let mut rows = queries::query_messages(
                conn,
                &filter,
                queries::SortOrder::Descending,
                query.limit + 1,
                query.offset,
            )?;
            let has_more = rows.len() > limit;
            rows.truncate(limit);
            Ok(SearchPage { rows, has_more })
        })
    }

    fn attachment(&self, attachment_id: i64) -> Result<Option<AttachmentRow>> {
        self.with_conn(|conn| queries::query_attachment(conn, attachment_id))
    }

    fn probe(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM message LIMIT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .is_ok()
    }
}

/// Flip a newest-first result into ascending order. A full page is the only
/// signal that older rows may remain.
fn newest_first_page(mut rows: Vec<MessageRow>, limit: usize) -> Page {
    rows.reverse();
    let truncated = limit > 0 && rows.len() == limit;
    Page { rows, truncated }
}
