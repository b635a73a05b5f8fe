//! Throwaway `chat.db` files with the subset of the Messages.app schema the
//! queries touch. Test support only; panics on any SQLite error.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use tempfile::TempDir;

use crate::Database;
use crate::time::utc_to_mac_absolute;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS handle (
        ROWID   INTEGER PRIMARY KEY AUTOINCREMENT,
        id      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chat (
        ROWID           INTEGER PRIMARY KEY AUTOINCREMENT,
        guid            TEXT NOT NULL UNIQUE,
        chat_identifier TEXT,
        display_name    TEXT
    );

    CREATE TABLE IF NOT EXISTS message (
        ROWID                   INTEGER PRIMARY KEY AUTOINCREMENT,
        guid                    TEXT NOT NULL UNIQUE,
        text                    TEXT,
        date                    INTEGER,
        is_from_me              INTEGER NOT NULL DEFAULT 0,
        handle_id               INTEGER NOT NULL DEFAULT 0,
        associated_message_type INTEGER DEFAULT 0,
        associated_message_guid TEXT,
        cache_has_attachments   INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS chat_message_join (
        chat_id     INTEGER REFERENCES chat(ROWID),
        message_id  INTEGER REFERENCES message(ROWID),
        PRIMARY KEY (chat_id, message_id)
    );

    CREATE TABLE IF NOT EXISTS attachment (
        ROWID           INTEGER PRIMARY KEY AUTOINCREMENT,
        guid            TEXT NOT NULL UNIQUE,
        filename        TEXT,
        uti             TEXT,
        mime_type       TEXT,
        transfer_name   TEXT,
        total_bytes     INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS message_attachment_join (
        message_id      INTEGER REFERENCES message(ROWID),
        attachment_id   INTEGER REFERENCES attachment(ROWID),
        UNIQUE(message_id, attachment_id)
    );

    CREATE TABLE IF NOT EXISTS chat_handle_join (
        chat_id     INTEGER REFERENCES chat(ROWID),
        handle_id   INTEGER REFERENCES handle(ROWID),
        UNIQUE(chat_id, handle_id)
    );
";

/// One row to insert. `date` defaults to a clock that advances one minute
/// per insert.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub chat_id: i64,
    pub text: Option<String>,
    pub is_from_me: bool,
    pub handle_id: Option<i64>,
    pub date: Option<i64>,
    pub associated_message_type: i64,
    pub associated_message_guid: Option<String>,
    pub has_attachments: bool,
}

pub struct FixtureDb {
    _dir: Option<TempDir>,
    path: PathBuf,
    conn: Connection,
    seq: Cell<i64>,
}

impl FixtureDb {
    /// Fresh, empty store in a private temp directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("chat.db");
        let mut fixture = Self::create_at(&path);
        fixture._dir = Some(dir);
        fixture
    }

    /// Create (or reopen) a store at `path`. The caller owns the directory.
    pub fn create_at(path: &Path) -> Self {
        let conn = Connection::open(path).expect("open fixture db");
        conn.execute_batch(SCHEMA).expect("create fixture schema");
        Self {
            _dir: None,
            path: path.to_path_buf(),
            conn,
            seq: Cell::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A read-only store over this file, as the server would open it.
    pub fn database(&self) -> Database {
        Database::open(&self.path)
    }

    pub fn add_handle(&self, address: &str) -> i64 {
        self.conn
            .execute("INSERT INTO handle (id) VALUES (?1)", [address])
            .expect("insert handle");
        self.conn.last_insert_rowid()
    }

    pub fn add_chat(&self, guid: &str, identifier: Option<&str>, display_name: Option<&str>) -> i64 {
        self.conn
            .execute(
                "INSERT INTO chat (guid, chat_identifier, display_name) VALUES (?1, ?2, ?3)",
                rusqlite::params![guid, identifier, display_name],
            )
            .expect("insert chat");
        self.conn.last_insert_rowid()
    }

    pub fn add_participant(&self, chat_id: i64, handle_id: i64) {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO chat_handle_join (chat_id, handle_id) VALUES (?1, ?2)",
                [chat_id, handle_id],
            )
            .expect("insert participant");
    }

    /// Plain text message. Incoming rows are attributed to the chat's first
    /// participant, if it has one.
    pub fn insert_text(&self, chat_id: i64, text: &str, is_from_me: bool) -> i64 {
        let handle_id = if is_from_me {
            None
        } else {
            self.first_participant(chat_id)
        };
        self.insert_message(NewMessage {
            chat_id,
            text: Some(text.to_string()),
            is_from_me,
            handle_id,
            ..Default::default()
        })
    }

    pub fn insert_message(&self, msg: NewMessage) -> i64 {
        let n = self.seq.get() + 1;
        self.seq.set(n);

        let date = msg.date.unwrap_or_else(|| {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
            utc_to_mac_absolute(base + chrono::Duration::minutes(n))
        });
        let guid = format!("FIXTURE-{:08}", n);

        self.conn
            .execute(
                "INSERT INTO message (guid, text, date, is_from_me, handle_id,
                     associated_message_type, associated_message_guid, cache_has_attachments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    guid,
                    msg.text,
                    date,
                    msg.is_from_me,
                    msg.handle_id.unwrap_or(0),
                    msg.associated_message_type,
                    msg.associated_message_guid,
                    msg.has_attachments,
                ],
            )
            .expect("insert message");
        let rowid = self.conn.last_insert_rowid();

        self.conn
            .execute(
                "INSERT INTO chat_message_join (chat_id, message_id) VALUES (?1, ?2)",
                [msg.chat_id, rowid],
            )
            .expect("insert chat_message_join");
        rowid
    }

    /// Attach a file at `filename` to an existing message and flag the
    /// message as having attachments. The transfer name is the path's last
    /// component.
    pub fn add_attachment(
        &self,
        message_id: i64,
        filename: &str,
        mime_type: Option<&str>,
        uti: Option<&str>,
        total_bytes: i64,
    ) -> i64 {
        let transfer_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let guid = format!("at_0_FIXTURE-{}-{}", message_id, filename);
        self.conn
            .execute(
                "INSERT INTO attachment (guid, filename, uti, mime_type, transfer_name, total_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![guid, filename, uti, mime_type, transfer_name, total_bytes],
            )
            .expect("insert attachment");
        let attachment_id = self.conn.last_insert_rowid();

        self.conn
            .execute(
                "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                [message_id, attachment_id],
            )
            .expect("insert message_attachment_join");
        self.conn
            .execute("UPDATE message SET cache_has_attachments = 1 WHERE ROWID = ?1", [message_id])
            .expect("flag message attachments");
        attachment_id
    }

    pub fn guid_of(&self, rowid: i64) -> String {
        self.conn
            .query_row("SELECT guid FROM message WHERE ROWID = ?1", [rowid], |r| r.get(0))
            .expect("message guid")
    }

    fn first_participant(&self, chat_id: i64) -> Option<i64> {
        self.conn
            .query_row(
                "SELECT handle_id FROM chat_handle_join WHERE chat_id = ?1 ORDER BY handle_id LIMIT 1",
                [chat_id],
                |r| r.get(0),
            )
            .optional()
            .expect("lookup participant")
    }
}

impl Default for FixtureDb {
    fn default() -> Self {
        Self::new()
    }
}
