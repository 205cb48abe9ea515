//! In-process [`RecordStore`] used by tests and the `memory` backend.
//!
//! The store can be switched unavailable to simulate an outage of the backing
//! service: `connect()` then fails and any live connection is dropped by the
//! next operation, exactly like a network backend losing its socket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{CancelToken, RecordStore};
use crate::error::StoreError;
use crate::record::GuessRecord;

const ENDPOINT: &str = "memory://guesses";

#[derive(Debug)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<GuessRecord>>,
    connected: AtomicBool,
    available: AtomicBool,
    opens: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            available: AtomicBool::new(true),
            opens: AtomicUsize::new(0),
        }
    }

    /// Take the simulated backing service down or bring it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// How many underlying connections have been opened so far.
    pub fn connections_opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<GuessRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn unreachable(&self) -> StoreError {
        StoreError::Connectivity {
            endpoint: ENDPOINT.to_string(),
            detail: "backing service unavailable".to_string(),
        }
    }

    /// Guard shared by every operation: cancelled, not connected, or outage.
    fn ready(&self, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Connectivity {
                endpoint: ENDPOINT.to_string(),
                detail: "not connected".to_string(),
            });
        }
        if !self.available.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(self.unreachable());
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("record list lock poisoned".to_string())
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }

    fn connect(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(self.unreachable());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError> {
        self.ready(cancel)?;
        self.records.lock().map_err(|_| Self::poisoned())?.push(*record);
        Ok(())
    }

    fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError> {
        self.ready(cancel)?;
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.len() as u64)
    }

    fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError> {
        self.ready(cancel)?;
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.iter().filter(|r| r.is_correct() == correct).count() as u64)
    }

    fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
