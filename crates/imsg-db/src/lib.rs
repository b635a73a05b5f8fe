pub mod cursor;
pub mod models;
pub mod queries;
pub mod time;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

pub use cursor::{Cursor, FetchRequest, MessageStore, Page};
pub use models::{AttachmentRow, ChatRow, MessageRow, SearchPage, SearchQuery};

const READER_POOL_SIZE: usize = 4;

/// Messages.app writes while we read; wait instead of failing on its locks.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// The backing store could not be read. This is the only failure the
/// message store reports; callers decide whether it is fatal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read-only handle on `chat.db` with a small round-robin reader pool.
///
/// Connections open lazily: the server can start before Full Disk Access is
/// granted, and a reader that errors is dropped and re-opened on next use.
pub struct Database {
    path: PathBuf,
    readers: Vec<Mutex<Option<Connection>>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Self {
        let readers = (0..READER_POOL_SIZE).map(|_| Mutex::new(None)).collect();
        Self {
            path: path.to_path_buf(),
            readers,
            reader_idx: AtomicUsize::new(0),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let mut slot = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("reader lock poisoned: {}", e)))?;

        if slot.is_none() {
            *slot = Some(self.connect()?);
        }
        let Some(conn) = slot.as_ref() else {
            return Err(StoreError::Unavailable("reader slot empty".into()));
        };

        let result = f(conn);
        if let Err(e) = &result {
            warn!("Dropping reader {} after error: {}", idx, e);
            *slot = None;
        }
        result
    }

    fn connect(&self) -> Result<Connection> {
        if !self.path.exists() {
            return Err(StoreError::Unavailable(format!(
                "chat.db not found at {}",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            StoreError::Unavailable(format!(
                "cannot open {} (is Full Disk Access granted?): {}",
                self.path.display(),
                e
            ))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        debug!("Opened read-only connection to {}", self.path.display());
        Ok(conn)
    }
}
