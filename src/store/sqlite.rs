//! SQLite-backed [`RecordStore`] for hosts without a network store.
//!
//! One row per inserted record in the `guesses` table. The file is opened
//! lazily by `connect()` and reused until a failure or `shutdown()` drops it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode};
use tracing::debug;

use super::{CancelToken, RecordStore};
use crate::error::StoreError;
use crate::record::GuessRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS guesses (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence_index  INTEGER NOT NULL,
    guess           INTEGER NOT NULL,
    number          INTEGER NOT NULL,
    correct         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_guesses_correct ON guesses(correct);
";

pub struct SqliteRecordStore {
    path: PathBuf,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
    opens: AtomicUsize,
}

impl SqliteRecordStore {
    pub fn new(path: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeout,
            conn: Mutex::new(None),
            opens: AtomicUsize::new(0),
        }
    }

    /// How many underlying connections have been opened so far.
    pub fn connections_opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn classify(&self, e: rusqlite::Error) -> StoreError {
        match e.sqlite_error_code() {
            Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure) => {
                StoreError::Connectivity {
                    endpoint: self.endpoint(),
                    detail: e.to_string(),
                }
            }
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Timeout {
                endpoint: self.endpoint(),
                after: self.timeout,
            },
            _ => StoreError::Backend(e.to_string()),
        }
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(|e| self.classify(e))?;
        conn.busy_timeout(self.timeout)
            .map_err(|e| self.classify(e))?;
        conn.execute_batch(SCHEMA).map_err(|e| self.classify(e))?;
        Ok(conn)
    }

    /// Run `f` on the live connection; a connectivity failure drops it.
    fn with_conn<T>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        cancel.check()?;
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
        let conn = guard.as_ref().ok_or_else(|| StoreError::Connectivity {
            endpoint: self.endpoint(),
            detail: "not connected".to_string(),
        })?;
        match f(conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                let err = self.classify(e);
                if err.is_connectivity() {
                    *guard = None;
                }
                Err(err)
            }
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn endpoint(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.open()?);
        self.opens.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint(), "opened guess store");
        Ok(())
    }

    fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError> {
        self.with_conn(cancel, |conn| {
            conn.execute(
                "INSERT INTO guesses (sequence_index, guess, number, correct) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.sequence_index(),
                    record.guess(),
                    record.target(),
                    record.is_correct()
                ],
            )
            .map(|_| ())
        })
    }

    fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError> {
        self.with_conn(cancel, |conn| {
            conn.query_row("SELECT COUNT(*) FROM guesses", [], |row| row.get::<_, i64>(0))
        })
        .map(|n| n as u64)
    }

    fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError> {
        self.with_conn(cancel, |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM guesses WHERE correct = ?1",
                params![correct],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n as u64)
    }

    fn shutdown(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            guard.take();
        }
    }
}
