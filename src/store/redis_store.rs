//! # Stage: Redis-Backed Record Store
//!
//! ## Responsibility
//! Durable guess record collection in Redis. Every record is appended as one
//! JSON document to the list `guessing:guesses`; counts are recomputed over
//! the raw documents on every query.
//!
//! ## Guarantees
//! - Lazy: the `redis::Client` is created on first `connect()`, then reused
//! - Idempotent connect: one live connection per store handle
//! - Bounded blocking: connect, read and write all use the configured timeout
//! - Recoverable: a connectivity failure drops the live connection and the
//!   next `connect()` opens a fresh one
//!
//! ## NOT Responsible For
//! - Redis authentication / TLS (configure via the URL)
//! - Trimming or expiring old records

#![cfg(feature = "redis-backing")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::OnceCell;
use redis::{ErrorKind, RedisError, RedisResult};
use tracing::{debug, warn};

use super::{CancelToken, RecordStore};
use crate::error::StoreError;
use crate::record::{GuessDocument, GuessRecord};

// ---------------------------------------------------------------------------
// Redis key constants
// ---------------------------------------------------------------------------

const KEY_GUESSES: &str = "guessing:guesses";

// ---------------------------------------------------------------------------
// RedisOps
// ---------------------------------------------------------------------------

/// The Redis commands the record store needs.
/// Implemented by `redis::Connection` and by the in-process mock in tests.
pub(crate) trait RedisOps: Send {
    fn rpush(&mut self, key: &str, value: &str) -> RedisResult<()>;
    fn llen(&mut self, key: &str) -> RedisResult<u64>;
    fn lrange(&mut self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>>;
    fn ping(&mut self) -> RedisResult<()>;
}

impl RedisOps for redis::Connection {
    fn rpush(&mut self, key: &str, value: &str) -> RedisResult<()> {
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query::<i64>(self)
            .map(|_| ())
    }

    fn llen(&mut self, key: &str) -> RedisResult<u64> {
        redis::cmd("LLEN").arg(key).query::<u64>(self)
    }

    fn lrange(&mut self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query::<Vec<String>>(self)
    }

    fn ping(&mut self) -> RedisResult<()> {
        redis::cmd("PING").query::<String>(self).map(|_| ())
    }
}

/// Opens new [`RedisOps`] connections.
pub(crate) trait Connector: Send + Sync {
    fn open(&self) -> RedisResult<Box<dyn RedisOps>>;
}

struct ClientConnector {
    url: String,
    timeout: Duration,
    client: OnceCell<redis::Client>,
}

impl Connector for ClientConnector {
    fn open(&self) -> RedisResult<Box<dyn RedisOps>> {
        let client = self
            .client
            .get_or_try_init(|| redis::Client::open(self.url.as_str()))?;
        let mut conn = client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        RedisOps::ping(&mut conn)?;
        Ok(Box::new(conn))
    }
}

// ---------------------------------------------------------------------------
// RedisRecordStore
// ---------------------------------------------------------------------------

/// Redis implementation of [`RecordStore`].
///
/// # Construction
/// - `new(url, timeout)`: nothing is opened until `connect()`.
/// - `with_connector(url, timeout, connector)`: inject a connector (tests).
pub struct RedisRecordStore {
    url: String,
    timeout: Duration,
    connector: Box<dyn Connector>,
    conn: Mutex<Option<Box<dyn RedisOps>>>,
    opens: AtomicUsize,
}

impl RedisRecordStore {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let connector = ClientConnector {
            url: url.to_string(),
            timeout,
            client: OnceCell::new(),
        };
        Self::with_connector(url, timeout, Box::new(connector))
    }

    pub(crate) fn with_connector(url: &str, timeout: Duration, connector: Box<dyn Connector>) -> Self {
        Self {
            url: url.to_string(),
            timeout,
            connector,
            conn: Mutex::new(None),
            opens: AtomicUsize::new(0),
        }
    }

    /// How many underlying connections have been opened so far.
    pub fn connections_opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn classify(&self, e: RedisError) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                endpoint: self.url.clone(),
                after: self.timeout,
            }
        } else if e.kind() == ErrorKind::IoError
            || e.is_connection_dropped()
            || e.is_connection_refusal()
            || e.kind() == ErrorKind::InvalidClientConfig
        {
            StoreError::Connectivity {
                endpoint: self.url.clone(),
                detail: e.to_string(),
            }
        } else {
            StoreError::Backend(e.to_string())
        }
    }

    /// Run `f` on the live connection; a connectivity failure drops it.
    fn with_ops<T>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&mut dyn RedisOps) -> RedisResult<T>,
    ) -> Result<T, StoreError> {
        cancel.check()?;
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
        let ops = guard.as_mut().ok_or_else(|| StoreError::Connectivity {
            endpoint: self.url.clone(),
            detail: "not connected".to_string(),
        })?;
        match f(ops.as_mut()) {
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

impl RecordStore for RedisRecordStore {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }
        let ops = self.connector.open().map_err(|e| self.classify(e))?;
        *guard = Some(ops);
        self.opens.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.url, "connected to guess store");
        Ok(())
    }

    fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError> {
        let json = serde_json::to_string(&GuessDocument::from(record))?;
        self.with_ops(cancel, |ops| ops.rpush(KEY_GUESSES, &json))
    }

    fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError> {
        self.with_ops(cancel, |ops| ops.llen(KEY_GUESSES))
    }

    fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError> {
        let raw = self.with_ops(cancel, |ops| ops.lrange(KEY_GUESSES, 0, -1))?;
        let mut matching = 0u64;
        for json in &raw {
            match serde_json::from_str::<GuessDocument>(json) {
                Ok(doc) if doc.correct == correct => matching += 1,
                Ok(_) => {}
                Err(e) => warn!(endpoint = %self.url, error = %e, "skipping malformed guess document"),
            }
        }
        Ok(matching)
    }

    fn shutdown(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            guard.take();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
