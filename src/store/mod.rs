//! # Stage: Durable Record Store
//!
//! ## Responsibility
//! Persist guess records outside the host's own build history and answer
//! count queries over every record ever written.
//!
//! ## Guarantees
//! - `connect()` is idempotent: a live connection is reused, never duplicated
//! - Append-only: `insert` never deduplicates, equal records become distinct rows
//! - Counts are recomputed from raw records on every call; nothing is cached
//! - A failed operation drops the cached connection so that the next
//!   `connect()` re-establishes it without a process restart
//! - Every blocking call honours a timeout and checks a [`CancelToken`] first
//!
//! ## Consistency
//! The store handle is shared process-wide. Writers from concurrent build
//! completions are serialised only by the backing service; a count taken
//! while an insert is in flight may observe either the pre- or post-write
//! state.
//!
//! ## NOT Responsible For
//! - Deciding build status (see `aggregate`)
//! - Swallowing failures: callers decide whether a failure is fatal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{ConfigError, StoreError};
use crate::record::GuessRecord;

pub mod memory;
pub mod sqlite;

#[cfg(feature = "redis-backing")]
pub mod redis_store;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

#[cfg(feature = "redis-backing")]
pub use redis_store::RedisRecordStore;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between the host and a running stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(StoreError::Cancelled)` once the token has been tripped.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Durable, queryable persistence of [`GuessRecord`]s.
pub trait RecordStore: Send + Sync {
    /// Human-readable location of the backing service, for diagnostics.
    fn endpoint(&self) -> String;

    /// Establish the connection if none is live.
    fn connect(&self) -> Result<(), StoreError>;

    /// Append one record.
    fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError>;

    /// Total number of stored records.
    fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError>;

    /// Number of stored records whose `correct` flag equals `correct`.
    fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError>;

    /// Drop the live connection, if any. A later `connect()` reopens it.
    fn shutdown(&self) {}
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    fn connect(&self) -> Result<(), StoreError> {
        (**self).connect()
    }

    fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError> {
        (**self).insert(record, cancel)
    }

    fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError> {
        (**self).count(cancel)
    }

    fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError> {
        (**self).count_where(correct, cancel)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}

/// Build the store handle described by `config`.
///
/// Nothing is opened here; the first `connect()` does that.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, ConfigError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteRecordStore::new(&config.path, timeout))),
        #[cfg(feature = "redis-backing")]
        StoreBackend::Redis => Ok(Arc::new(RedisRecordStore::new(&config.url, timeout))),
        #[cfg(not(feature = "redis-backing"))]
        StoreBackend::Redis => Err(ConfigError::UnsupportedBackend("redis".to_string())),
    }
}
