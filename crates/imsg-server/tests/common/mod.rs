#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use imsg_api::sender::{MessageSender, SendFailure};
use imsg_api::settings::Settings;
use imsg_db::{
    AttachmentRow, ChatRow, Database, FetchRequest, MessageStore, Page, SearchPage, SearchQuery,
    StoreError,
};

#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SendFailure> {
        self.sent.lock().unwrap().push((recipient.into(), text.into()));
        Ok(())
    }
}

/// Reads through to a real store, but the fetch calls `fails` picks (by
/// 1-based call number) report the store as unavailable.
pub struct FlakyStore {
    inner: Database,
    calls: AtomicUsize,
    fails: Box<dyn Fn(usize) -> bool + Send + Sync>,
}

impl FlakyStore {
    pub fn new(db_path: &Path, fails: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner: Database::open(db_path),
            calls: AtomicUsize::new(0),
            fails: Box::new(fails),
        }
    }
}

impl MessageStore for FlakyStore {
    fn fetch(&self, req: &FetchRequest) -> imsg_db::Result<Page> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if (self.fails)(call) {
            return Err(StoreError::Unavailable(format!("database is locked (call {})", call)));
        }
        self.inner.fetch(req)
    }

    fn chats(&self, limit: u32) -> imsg_db::Result<Vec<ChatRow>> {
        self.inner.chats(limit)
    }

    fn search(&self, query: &SearchQuery) -> imsg_db::Result<SearchPage> {
        self.inner.search(query)
    }

    fn attachment(&self, attachment_id: i64) -> imsg_db::Result<Option<AttachmentRow>> {
        self.inner.attachment(attachment_id)
    }

    fn probe(&self) -> bool {
        self.inner.probe()
    }
}

pub fn fast_settings() -> Settings {
    Settings {
        websocket_poll_interval: 0.05,
        ..Settings::default()
    }
}

pub fn app_for(db_path: &Path, settings: Settings) -> (Router, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let app = imsg_server::app(Arc::new(Database::open(db_path)), sender.clone(), settings);
    (app, sender)
}

pub fn app_with_store(store: Arc<dyn MessageStore>, settings: Settings) -> Router {
    imsg_server::app(store, Arc::new(RecordingSender::default()), settings)
}

/// Serve on an ephemeral port for the rest of the test.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
