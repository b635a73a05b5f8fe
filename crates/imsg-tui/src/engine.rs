//! Client-side view of the open chat.
//!
//! The engine is synchronous and owns no I/O. Every operation mutates state
//! and returns the [`Effect`]s the app loop should carry out; results come
//! back through the matching `*_loaded` / `send_finished` calls. The app
//! loop is the only caller, so there is exactly one writer.

use std::collections::{HashMap, HashSet};

use imsg_types::api::MessageResponse;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    Sending,
    Failed(String),
}

/// An outgoing message shown before the store has a row for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Negative, so it can never collide with a store row id.
    pub placeholder_id: i64,
    pub text: String,
    pub state: PendingState,
    /// Newest confirmed id when the entry was first submitted. Only a row
    /// past it can be the store's copy of this send.
    pub newer_than: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Confirmed(MessageResponse),
    Pending(PendingEntry),
}

impl Entry {
    pub fn id(&self) -> i64 {
        match self {
            Entry::Confirmed(m) => m.rowid,
            Entry::Pending(p) => p.placeholder_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Entry::Confirmed(m) => m.text.as_deref(),
            Entry::Pending(p) => Some(&p.text),
        }
    }

    pub fn is_from_me(&self) -> bool {
        match self {
            Entry::Confirmed(m) => m.is_from_me,
            Entry::Pending(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NoChat,
    Loading,
    Ready,
    Error(String),
}

/// Work the app loop must perform. Fetches carry the generation they were
/// issued under; results from an older generation are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchLatest {
        chat_id: i64,
        generation: u64,
        limit: u32,
    },
    FetchOlder {
        chat_id: i64,
        generation: u64,
        before: i64,
        limit: u32,
    },
    /// Newest page again after the live channel reconnects.
    FetchResync {
        chat_id: i64,
        generation: u64,
        limit: u32,
    },
    Send {
        generation: u64,
        recipient: String,
        text: String,
    },
    RefreshChats,
    ScrollToBottom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChat {
    pub chat_id: i64,
    /// Where `POST /send` should deliver.
    pub recipient: String,
}

/// Where a newly merged row goes in the newest-first list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Ordered by id among confirmed rows (history and backfill).
    Sorted,
    /// The newest slot, if the row is newer than everything confirmed.
    Newest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Duplicate,
    Confirmed,
    Inserted,
}

pub struct Engine {
    page_size: u32,
    chat: Option<ActiveChat>,
    generation: u64,
    status: LoadStatus,
    /// Newest first.
    messages: Vec<Entry>,
    seen_ids: HashSet<i64>,
    /// Literal text -> placeholder id of its pending entry.
    pending_by_text: HashMap<String, i64>,
    next_placeholder: i64,
    oldest_loaded_id: Option<i64>,
    has_more_older: bool,
    loading_older: bool,
}

impl Engine {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            chat: None,
            generation: 0,
            status: LoadStatus::NoChat,
            messages: Vec::new(),
            seen_ids: HashSet::new(),
            pending_by_text: HashMap::new(),
            next_placeholder: -1,
            oldest_loaded_id: None,
            has_more_older: false,
            loading_older: false,
        }
    }

    // -- Accessors --

    pub fn active_chat(&self) -> Option<&ActiveChat> {
        self.chat.as_ref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Newest first, as stored.
    pub fn messages(&self) -> &[Entry] {
        &self.messages
    }

    /// Display order: oldest at the top.
    pub fn messages_oldest_first(&self) -> impl Iterator<Item = &Entry> {
        self.messages.iter().rev()
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    pub fn oldest_loaded_id(&self) -> Option<i64> {
        self.oldest_loaded_id
    }

    pub fn is_pending(&self, text: &str) -> bool {
        self.pending_by_text.contains_key(text)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_by_text.len()
    }

    // -- Chat switching --

    /// Forget the current chat and load the newest page of `chat_id`.
    pub fn switch_chat(&mut self, chat_id: i64, recipient: impl Into<String>) -> Vec<Effect> {
        self.generation += 1;
        self.chat = Some(ActiveChat {
            chat_id,
            recipient: recipient.into(),
        });
        self.status = LoadStatus::Loading;
        self.messages.clear();
        self.seen_ids.clear();
        self.pending_by_text.clear();
        self.oldest_loaded_id = None;
        self.has_more_older = false;
        self.loading_older = false;

        vec![Effect::FetchLatest {
            chat_id,
            generation: self.generation,
            limit: self.page_size,
        }]
    }

    pub fn initial_page_loaded(
        &mut self,
        generation: u64,
        chat_id: i64,
        result: Result<Vec<MessageResponse>, String>,
    ) -> Vec<Effect> {
        if !self.is_current(generation, chat_id) {
            return Vec::new();
        }
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                self.status = LoadStatus::Error(e);
                return Vec::new();
            }
        };

        let count = rows.len();
        for row in sorted(rows) {
            if row.chat_id != Some(chat_id) {
                continue;
            }
            self.merge_row(row, Placement::Sorted, false);
        }
        self.refresh_oldest();
        self.has_more_older = count as u32 == self.page_size;
        self.status = LoadStatus::Ready;
        vec![Effect::ScrollToBottom]
    }

    // -- Backfill --

    pub fn load_older(&mut self) -> Vec<Effect> {
        if !self.has_more_older || self.loading_older || self.status != LoadStatus::Ready {
            return Vec::new();
        }
        let (Some(chat), Some(before)) = (&self.chat, self.oldest_loaded_id) else {
            return Vec::new();
        };
        self.loading_older = true;
        vec![Effect::FetchOlder {
            chat_id: chat.chat_id,
            generation: self.generation,
            before,
            limit: self.page_size,
        }]
    }

    /// Backfill never scrolls.
    pub fn older_page_loaded(
        &mut self,
        generation: u64,
        chat_id: i64,
        result: Result<Vec<MessageResponse>, String>,
    ) -> Vec<Effect> {
        if !self.is_current(generation, chat_id) {
            return Vec::new();
        }
        self.loading_older = false;
        let Ok(rows) = result else {
            return Vec::new();
        };

        if rows.is_empty() {
            self.has_more_older = false;
            return Vec::new();
        }
        let count = rows.len();
        for row in sorted(rows) {
            if row.chat_id != Some(chat_id) {
                continue;
            }
            self.merge_row(row, Placement::Sorted, false);
        }
        self.refresh_oldest();
        self.has_more_older = count as u32 == self.page_size;
        Vec::new()
    }

    // -- Sending --

    /// Show `text` immediately and ask the app to send it.
    ///
    /// The same text while it is still pending is sent again without a
    /// second bubble; a failed entry with that text goes back to sending.
    pub fn submit(&mut self, text: &str) -> Vec<Effect> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let Some(chat) = &self.chat else {
            return Vec::new();
        };
        let send = Effect::Send {
            generation: self.generation,
            recipient: chat.recipient.clone(),
            text: text.to_string(),
        };

        if let Some(&placeholder) = self.pending_by_text.get(text) {
            if let Some(idx) = self.position_of(placeholder) {
                let mut entry = self.messages.remove(idx);
                if let Entry::Pending(p) = &mut entry {
                    p.state = PendingState::Sending;
                }
                self.messages.insert(0, entry);
            }
            return vec![send, Effect::ScrollToBottom];
        }

        let placeholder_id = self.next_placeholder;
        self.next_placeholder -= 1;
        self.messages.insert(
            0,
            Entry::Pending(PendingEntry {
                placeholder_id,
                text: text.to_string(),
                state: PendingState::Sending,
                newer_than: self.newest_confirmed_id(),
            }),
        );
        self.pending_by_text.insert(text.to_string(), placeholder_id);
        vec![send, Effect::ScrollToBottom]
    }

    /// Success needs nothing: the live channel delivers the confirming row.
    pub fn send_finished(&mut self, generation: u64, text: &str, result: Result<(), String>) {
        if generation != self.generation {
            return;
        }
        let Err(reason) = result else {
            return;
        };
        let Some(&placeholder) = self.pending_by_text.get(text) else {
            return;
        };
        if let Some(idx) = self.position_of(placeholder) {
            if let Entry::Pending(p) = &mut self.messages[idx] {
                p.state = PendingState::Failed(reason);
            }
        }
    }

    /// Re-send the most recent failed entry, if any.
    pub fn retry_failed(&mut self) -> Vec<Effect> {
        let failed = self.messages.iter().find_map(|e| match e {
            Entry::Pending(p) if matches!(p.state, PendingState::Failed(_)) => Some(p.text.clone()),
            _ => None,
        });
        match failed {
            Some(text) => self.submit(&text),
            None => Vec::new(),
        }
    }

    // -- Live push --

    /// Merge a pushed batch. Rows for other chats only refresh the sidebar.
    pub fn receive_batch(&mut self, rows: Vec<MessageResponse>) -> Vec<Effect> {
        if rows.is_empty() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let Some(chat_id) = self.chat.as_ref().map(|c| c.chat_id) else {
            effects.push(Effect::RefreshChats);
            return effects;
        };

        let mut changed = false;
        for row in sorted(rows) {
            if row.chat_id != Some(chat_id) {
                continue;
            }
            if self.merge_row(row, Placement::Newest, true) != Merge::Duplicate {
                changed = true;
            }
        }
        if changed {
            self.refresh_oldest();
            effects.push(Effect::ScrollToBottom);
        }
        effects.push(Effect::RefreshChats);
        effects
    }

    // -- Reconnect --

    /// Close any gap left by a dropped live channel.
    pub fn resync(&mut self) -> Vec<Effect> {
        let Some(chat) = &self.chat else {
            return Vec::new();
        };
        match self.status {
            LoadStatus::Ready => vec![Effect::FetchResync {
                chat_id: chat.chat_id,
                generation: self.generation,
                limit: self.page_size,
            }],
            // Never loaded: start over.
            _ => {
                let chat = chat.clone();
                self.switch_chat(chat.chat_id, chat.recipient)
            }
        }
    }

    /// Rows older than the loaded window are left for backfill.
    pub fn resync_loaded(
        &mut self,
        generation: u64,
        chat_id: i64,
        result: Result<Vec<MessageResponse>, String>,
    ) -> Vec<Effect> {
        if !self.is_current(generation, chat_id) {
            return Vec::new();
        }
        let Ok(rows) = result else {
            return Vec::new();
        };

        let floor = self.oldest_loaded_id;
        let mut changed = false;
        for row in sorted(rows) {
            if floor.is_some_and(|oldest| row.rowid < oldest) {
                continue;
            }
            if row.chat_id != Some(chat_id) {
                continue;
            }
            if self.merge_row(row, Placement::Newest, true) != Merge::Duplicate {
                changed = true;
            }
        }
        if !changed {
            return Vec::new();
        }
        self.refresh_oldest();
        vec![Effect::ScrollToBottom]
    }

    // -- Internals --

    fn is_current(&self, generation: u64, chat_id: i64) -> bool {
        generation == self.generation && self.chat.as_ref().is_some_and(|c| c.chat_id == chat_id)
    }

    /// The one place rows enter `messages`. History pages never `confirm`:
    /// an old outgoing row with the same text is a different message.
    fn merge_row(&mut self, row: MessageResponse, placement: Placement, confirm: bool) -> Merge {
        if self.seen_ids.contains(&row.rowid) {
            return Merge::Duplicate;
        }

        if confirm && row.is_from_me {
            if let Some(idx) = self.confirmable(&row) {
                if let Some(text) = &row.text {
                    self.pending_by_text.remove(text);
                }
                self.seen_ids.insert(row.rowid);
                self.messages[idx] = Entry::Confirmed(row);
                return Merge::Confirmed;
            }
        }

        let idx = match placement {
            Placement::Newest if self.newest_confirmed_id().is_none_or(|n| row.rowid > n) => 0,
            _ => self.sorted_index(row.rowid),
        };
        self.seen_ids.insert(row.rowid);
        self.messages.insert(idx, Entry::Confirmed(row));
        Merge::Inserted
    }

    /// Slot of the pending entry `row` confirms, if any.
    fn confirmable(&self, row: &MessageResponse) -> Option<usize> {
        let placeholder = self.pending_by_text.get(row.text.as_deref()?).copied()?;
        let idx = self.position_of(placeholder)?;
        match &self.messages[idx] {
            Entry::Pending(p) if p.newer_than.is_none_or(|floor| row.rowid > floor) => Some(idx),
            _ => None,
        }
    }

    /// First slot holding a confirmed row older than `rowid`.
    fn sorted_index(&self, rowid: i64) -> usize {
        self.messages
            .iter()
            .position(|e| matches!(e, Entry::Confirmed(m) if m.rowid < rowid))
            .unwrap_or(self.messages.len())
    }

    fn newest_confirmed_id(&self) -> Option<i64> {
        self.seen_ids.iter().copied().max()
    }

    fn position_of(&self, placeholder: i64) -> Option<usize> {
        self.messages.iter().position(
            |e| matches!(e, Entry::Pending(p) if p.placeholder_id == placeholder),
        )
    }

    fn refresh_oldest(&mut self) {
        self.oldest_loaded_id = self.seen_ids.iter().copied().min();
    }
}

fn sorted(mut rows: Vec<MessageResponse>) -> Vec<MessageResponse> {
    rows.sort_by_key(|r| r.rowid);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use imsg_types::models::MessageKind;

    const CHAT: i64 = 7;
    const PAGE: u32 = 3;

    fn row(rowid: i64, text: &str, is_from_me: bool) -> MessageResponse {
        MessageResponse {
            rowid,
            guid: format!("G{}", rowid),
            text: Some(text.to_string()),
            timestamp: None,
            is_from_me,
            handle_id: None,
            chat_id: Some(CHAT),
            kind: MessageKind::Text,
            tapback_type: None,
            associated_guid: None,
            has_attachments: false,
            attachments: Vec::new(),
        }
    }

    fn in_chat(mut r: MessageResponse, chat_id: i64) -> MessageResponse {
        r.chat_id = Some(chat_id);
        r
    }

    /// Display order, pending entries as negative ids.
    fn shown(engine: &Engine) -> Vec<i64> {
        engine.messages_oldest_first().map(Entry::id).collect()
    }

    fn open(engine: &mut Engine, rows: Vec<MessageResponse>) -> u64 {
        engine.switch_chat(CHAT, "+15550001");
        let generation = engine.generation();
        engine.initial_page_loaded(generation, CHAT, Ok(rows));
        generation
    }

    fn assert_unique(engine: &Engine) {
        let mut ids = HashSet::new();
        for entry in engine.messages() {
            assert!(ids.insert(entry.id()), "id {} rendered twice", entry.id());
        }
    }

    #[test]
    fn switch_chat_requests_newest_page() {
        let mut engine = Engine::new(PAGE);
        let effects = engine.switch_chat(CHAT, "+15550001");
        assert_eq!(
            effects,
            vec![Effect::FetchLatest { chat_id: CHAT, generation: 1, limit: PAGE }]
        );
        assert_eq!(engine.status(), &LoadStatus::Loading);
    }

    #[test]
    fn initial_page_sets_cursor_and_flag() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![row(4, "a", false), row(5, "b", true), row(6, "c", false)]);
        assert_eq!(shown(&engine), vec![4, 5, 6]);
        assert_eq!(engine.oldest_loaded_id(), Some(4));
        assert!(engine.has_more_older());
        assert_eq!(engine.status(), &LoadStatus::Ready);

        open(&mut engine, vec![row(1, "only", false)]);
        assert_eq!(shown(&engine), vec![1]);
        assert!(!engine.has_more_older());
    }

    #[test]
    fn initial_failure_is_retryable_error_state() {
        let mut engine = Engine::new(PAGE);
        engine.switch_chat(CHAT, "x");
        let generation = engine.generation();
        engine.initial_page_loaded(generation, CHAT, Err("store unavailable".into()));
        assert_eq!(engine.status(), &LoadStatus::Error("store unavailable".into()));
        assert!(engine.messages().is_empty());

        let effects = engine.resync();
        assert!(matches!(effects[0], Effect::FetchLatest { generation: 2, .. }));
    }

    #[test]
    fn stale_responses_after_switch_are_dropped() {
        let mut engine = Engine::new(PAGE);
        engine.switch_chat(CHAT, "x");
        let stale = engine.generation();
        engine.switch_chat(CHAT + 1, "y");

        engine.initial_page_loaded(stale, CHAT, Ok(vec![row(1, "old chat", false)]));
        assert!(engine.messages().is_empty());
        assert_eq!(engine.status(), &LoadStatus::Loading);

        let current = engine.generation();
        engine.initial_page_loaded(current, CHAT + 1, Ok(vec![in_chat(row(9, "new", false), CHAT + 1)]));
        engine.older_page_loaded(stale, CHAT, Ok(vec![row(2, "late backfill", false)]));
        assert_eq!(shown(&engine), vec![9]);
    }

    #[test]
    fn pagination_terminates() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(7, "g", false), row(8, "h", false), row(9, "i", false)]);

        let effects = engine.load_older();
        assert_eq!(
            effects,
            vec![Effect::FetchOlder { chat_id: CHAT, generation, before: 7, limit: PAGE }]
        );
        // In flight: a second request is a no-op.
        assert!(engine.load_older().is_empty());

        engine.older_page_loaded(generation, CHAT, Ok(vec![row(4, "d", false), row(5, "e", false), row(6, "f", false)]));
        assert_eq!(shown(&engine), vec![4, 5, 6, 7, 8, 9]);
        assert!(engine.has_more_older());

        // Exactly one page left: full page heuristic asks once more.
        engine.load_older();
        engine.older_page_loaded(generation, CHAT, Ok(vec![row(1, "a", false), row(2, "b", false), row(3, "c", false)]));
        assert!(engine.has_more_older());
        assert_eq!(engine.oldest_loaded_id(), Some(1));

        assert!(!engine.load_older().is_empty());
        engine.older_page_loaded(generation, CHAT, Ok(vec![]));
        assert!(!engine.has_more_older());
        assert!(engine.load_older().is_empty());
        assert!(engine.load_older().is_empty());
        assert_eq!(shown(&engine), (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn failed_backfill_can_be_retried() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(7, "g", false), row(8, "h", false), row(9, "i", false)]);
        engine.load_older();
        engine.older_page_loaded(generation, CHAT, Err("timeout".into()));
        assert!(!engine.is_loading_older());
        assert!(engine.has_more_older());
        assert_eq!(engine.load_older().len(), 1);
    }

    #[test]
    fn submit_is_optimistic_and_confirmed_in_place() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(1, "yo", false)]);

        let effects = engine.submit("hi");
        assert_eq!(
            effects,
            vec![
                Effect::Send { generation, recipient: "+15550001".into(), text: "hi".into() },
                Effect::ScrollToBottom,
            ]
        );
        assert_eq!(shown(&engine), vec![1, -1]);
        assert!(engine.is_pending("hi"));

        engine.send_finished(generation, "hi", Ok(()));
        engine.receive_batch(vec![row(2, "hi", true)]);
        assert_eq!(shown(&engine), vec![1, 2]);
        assert!(!engine.is_pending("hi"));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn blank_submit_is_rejected() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![]);
        assert!(engine.submit("   ").is_empty());
        assert!(engine.submit("").is_empty());
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn incoming_row_with_same_text_does_not_confirm() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![]);
        engine.submit("ok");
        engine.receive_batch(vec![row(5, "ok", false)]);
        assert_eq!(shown(&engine), vec![-1, 5]);
        assert!(engine.is_pending("ok"));
    }

    #[test]
    fn failed_send_stays_visible_until_confirmed() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(1, "yo", false)]);
        engine.submit("lost?");
        engine.send_finished(generation, "lost?", Err("Recipient not found".into()));

        match &engine.messages()[0] {
            Entry::Pending(p) => assert_eq!(p.state, PendingState::Failed("Recipient not found".into())),
            other => panic!("expected pending entry, got {:?}", other),
        }

        // Unrelated traffic never removes it.
        engine.receive_batch(vec![row(2, "something else", true), row(3, "reply", false)]);
        assert!(engine.is_pending("lost?"));
        assert!(shown(&engine).contains(&-1));

        // Retry reuses the same bubble.
        let effects = engine.retry_failed();
        assert!(matches!(&effects[0], Effect::Send { text, .. } if text == "lost?"));
        assert_eq!(shown(&engine).iter().filter(|&&id| id < 0).count(), 1);
        match &engine.messages()[0] {
            Entry::Pending(p) => assert_eq!(p.state, PendingState::Sending),
            other => panic!("expected pending entry, got {:?}", other),
        }

        engine.receive_batch(vec![row(4, "lost?", true)]);
        assert!(!engine.is_pending("lost?"));
        assert_eq!(shown(&engine), vec![1, 2, 3, 4]);
    }

    #[test]
    fn duplicate_submit_while_pending_keeps_one_bubble() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![]);
        engine.submit("same");
        let effects = engine.submit("same");
        assert!(matches!(&effects[0], Effect::Send { text, .. } if text == "same"));
        assert_eq!(engine.messages().len(), 1);

        // First row confirms, the second is just a new message.
        engine.receive_batch(vec![row(10, "same", true), row(11, "same", true)]);
        assert_eq!(shown(&engine), vec![10, 11]);
    }

    #[test]
    fn batch_order_matches_store_order() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![row(49, "before", false)]);
        engine.submit("hi");

        // Delivered out of order on purpose.
        engine.receive_batch(vec![row(51, "new", false), row(50, "hi", true)]);
        assert_eq!(shown(&engine), vec![49, 50, 51]);
        assert_eq!(engine.messages()[1].text(), Some("hi"));
    }

    #[test]
    fn replays_never_render_twice() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(5, "e", false), row(6, "f", false), row(7, "g", false)]);
        engine.receive_batch(vec![row(8, "h", false), row(9, "i", true)]);

        // Replay from an older watermark plus an overlapping backfill.
        engine.receive_batch(vec![row(6, "f", false), row(7, "g", false), row(8, "h", false), row(10, "j", false)]);
        engine.load_older();
        engine.older_page_loaded(generation, CHAT, Ok(vec![row(3, "c", false), row(4, "d", false), row(5, "e", false)]));
        engine.resync();
        engine.resync_loaded(generation, CHAT, Ok(vec![row(8, "h", false), row(9, "i", true), row(10, "j", false)]));

        assert_unique(&engine);
        assert_eq!(shown(&engine), (3..=10).collect::<Vec<_>>());
    }

    #[test]
    fn other_chat_rows_only_refresh_sidebar() {
        let mut engine = Engine::new(PAGE);
        open(&mut engine, vec![row(1, "a", false)]);

        let effects = engine.receive_batch(vec![in_chat(row(2, "elsewhere", false), 99)]);
        assert_eq!(effects, vec![Effect::RefreshChats]);
        assert_eq!(shown(&engine), vec![1]);

        let effects = engine.receive_batch(vec![row(3, "here", false)]);
        assert_eq!(effects, vec![Effect::ScrollToBottom, Effect::RefreshChats]);
    }

    #[test]
    fn push_without_open_chat_refreshes_sidebar() {
        let mut engine = Engine::new(PAGE);
        assert_eq!(engine.receive_batch(vec![row(1, "a", false)]), vec![Effect::RefreshChats]);
        assert!(engine.receive_batch(vec![]).is_empty());
    }

    #[test]
    fn push_during_initial_load_survives_the_page() {
        let mut engine = Engine::new(PAGE);
        engine.switch_chat(CHAT, "x");
        let generation = engine.generation();
        engine.receive_batch(vec![row(9, "early push", false)]);

        engine.initial_page_loaded(generation, CHAT, Ok(vec![row(7, "g", false), row(8, "h", false), row(9, "early push", false)]));
        assert_eq!(shown(&engine), vec![7, 8, 9]);
        assert_eq!(engine.oldest_loaded_id(), Some(7));
    }

    #[test]
    fn resync_fills_gap_and_confirms_pending() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(1, "a", false), row(2, "b", false), row(3, "c", false)]);
        engine.submit("sent while offline");

        let effects = engine.resync();
        assert_eq!(
            effects,
            vec![Effect::FetchResync { chat_id: CHAT, generation, limit: PAGE }]
        );

        let effects = engine.resync_loaded(
            generation,
            CHAT,
            Ok(vec![row(4, "d", false), row(5, "sent while offline", true), row(6, "f", false)]),
        );
        assert_eq!(effects, vec![Effect::ScrollToBottom]);
        // The confirmed row keeps the slot its bubble had.
        assert_eq!(shown(&engine), vec![1, 2, 3, 5, 4, 6]);
        assert!(!engine.is_pending("sent while offline"));
        assert_unique(&engine);
    }

    #[test]
    fn backfill_never_confirms_pending() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(4, "d", false), row(5, "e", false), row(6, "f", false)]);
        engine.submit("ok");

        engine.load_older();
        engine.older_page_loaded(generation, CHAT, Ok(vec![row(1, "ok", true), row(2, "b", false), row(3, "c", false)]));
        assert_eq!(shown(&engine), vec![1, 2, 3, 4, 5, 6, -1]);
        assert!(engine.is_pending("ok"));

        engine.receive_batch(vec![row(7, "ok", true)]);
        assert_eq!(shown(&engine), (1..=7).collect::<Vec<_>>());
        assert!(!engine.is_pending("ok"));
        assert_unique(&engine);
    }

    #[test]
    fn initial_page_never_confirms_pending() {
        let mut engine = Engine::new(PAGE);
        engine.switch_chat(CHAT, "+15550001");
        let generation = engine.generation();
        engine.submit("ok");

        engine.initial_page_loaded(generation, CHAT, Ok(vec![row(1, "ok", true), row(2, "b", false)]));
        assert_eq!(shown(&engine), vec![1, 2, -1]);
        assert!(engine.is_pending("ok"));
    }

    #[test]
    fn resync_row_older_than_the_send_does_not_confirm() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(1, "a", false), row(2, "b", false), row(3, "c", false)]);
        engine.receive_batch(vec![row(10, "j", false)]);
        engine.submit("ok");

        // Row 4 fills a gap from before the send.
        engine.resync_loaded(generation, CHAT, Ok(vec![row(4, "ok", true), row(10, "j", false)]));
        assert_eq!(shown(&engine), vec![1, 2, 3, 4, 10, -1]);
        assert!(engine.is_pending("ok"));

        engine.resync_loaded(generation, CHAT, Ok(vec![row(10, "j", false), row(11, "ok", true)]));
        assert_eq!(shown(&engine), vec![1, 2, 3, 4, 10, 11]);
        assert!(!engine.is_pending("ok"));
    }

    #[test]
    fn rows_without_a_chat_stay_out_of_the_open_chat() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(1, "a", false)]);

        let mut orphan = row(2, "no chat join", false);
        orphan.chat_id = None;
        assert_eq!(engine.receive_batch(vec![orphan.clone()]), vec![Effect::RefreshChats]);
        assert!(engine.resync_loaded(generation, CHAT, Ok(vec![orphan])).is_empty());
        assert_eq!(shown(&engine), vec![1]);

        let mut stray = row(0, "elsewhere", false);
        stray.chat_id = None;
        engine.older_page_loaded(generation, CHAT, Ok(vec![stray]));
        assert_eq!(shown(&engine), vec![1]);
    }

    #[test]
    fn resync_ignores_rows_below_loaded_window() {
        let mut engine = Engine::new(PAGE);
        let generation = open(&mut engine, vec![row(10, "j", false), row(11, "k", false), row(12, "l", false)]);
        let effects = engine.resync_loaded(generation, CHAT, Ok(vec![row(8, "h", false), row(12, "l", false)]));
        assert!(effects.is_empty());
        assert_eq!(shown(&engine), vec![10, 11, 12]);
    }

    #[test]
    fn send_result_for_previous_chat_is_ignored() {
        let mut engine = Engine::new(PAGE);
        let old = open(&mut engine, vec![]);
        engine.submit("bye");
        open(&mut engine, vec![]);
        engine.submit("bye");
        engine.send_finished(old, "bye", Err("timeout".into()));
        match &engine.messages()[0] {
            Entry::Pending(p) => assert_eq!(p.state, PendingState::Sending),
            other => panic!("expected pending entry, got {:?}", other),
        }
    }
}
