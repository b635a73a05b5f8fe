//! Per-connection live channel state, kept apart from the socket so the
//! watermark and keepalive rules can be driven directly.

use std::time::Duration;

use imsg_db::{FetchRequest, Page};
use imsg_types::api::MessageResponse;
use imsg_types::events::{LiveCommand, LiveEvent};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveConfig {
    /// Time between polls; also the longest a client frame waits.
    pub poll_interval: Duration,
    pub batch_limit: u32,
    /// Poll cycles without client traffic before a ping goes out.
    pub ping_after_idle_cycles: u32,
    /// Pause after a failed poll.
    pub error_backoff: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::with_poll_interval(Duration::from_secs(1))
    }
}

impl LiveConfig {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            batch_limit: 100,
            ping_after_idle_cycles: 30,
            error_backoff: poll_interval,
        }
    }
}

#[derive(Debug)]
pub struct LiveSession {
    chat_id: Option<i64>,
    watermark: i64,
    idle_cycles: u32,
    config: LiveConfig,
}

impl LiveSession {
    /// The newest row in scope. Its id becomes the starting watermark, so a
    /// fresh connection never replays backlog.
    pub fn init_request(chat_id: Option<i64>) -> FetchRequest {
        FetchRequest::latest(chat_id, 1)
    }

    pub fn start(chat_id: Option<i64>, newest: &Page, config: LiveConfig) -> Self {
        let watermark = newest.max_rowid().unwrap_or(0);
        info!("Live session chat={:?} starting at rowid {}", chat_id, watermark);
        Self {
            chat_id,
            watermark,
            idle_cycles: 0,
            config,
        }
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    pub fn next_request(&self) -> FetchRequest {
        FetchRequest::after(self.chat_id, self.watermark, self.config.batch_limit)
    }

    /// Fold a poll result in. Returns the batch to push, if any.
    pub fn absorb(&mut self, page: Page) -> Option<LiveEvent> {
        let mut rows = page.rows;
        rows.retain(|r| r.rowid > self.watermark);
        if rows.is_empty() {
            return None;
        }
        rows.sort_by_key(|r| r.rowid);

        let newest = rows.last().map_or(self.watermark, |r| r.rowid);
        self.watermark = self.watermark.max(newest);
        debug!(
            "Live session chat={:?} pushing {} rows, watermark {}",
            self.chat_id,
            rows.len(),
            self.watermark
        );

        Some(LiveEvent::Messages {
            data: rows.into_iter().map(MessageResponse::from).collect(),
            last_rowid: self.watermark,
        })
    }

    /// Count one poll cycle. True when a keepalive ping is due.
    pub fn tick(&mut self) -> bool {
        self.idle_cycles += 1;
        if self.idle_cycles >= self.config.ping_after_idle_cycles {
            self.idle_cycles = 0;
            return true;
        }
        false
    }

    pub fn note_client_traffic(&mut self) {
        self.idle_cycles = 0;
    }

    pub fn apply(&mut self, command: LiveCommand) {
        match command {
            LiveCommand::SetAfterRowid { rowid } => {
                info!(
                    "Live session chat={:?} watermark reset {} -> {}",
                    self.chat_id, self.watermark, rowid
                );
                self.watermark = rowid;
            }
        }
    }
}
