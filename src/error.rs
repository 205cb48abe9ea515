//! Error taxonomy shared by every stage.
//!
//! Configuration errors stop a step before it runs. Store errors are caught at
//! the boundary between the stages and the durable store and downgraded to
//! log lines. History errors propagate to whoever asked for a rollup.

use std::time::Duration;

use thiserror::Error;

/// Invalid or missing configuration. The step that hits one does not execute.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0} bound")]
    MissingBound(&'static str),

    #[error("lower bound {lower} is greater than upper bound {upper}")]
    InvertedBounds { lower: i64, upper: i64 },

    #[error("Has to be between 1 and {ceiling} (upper bound was {upper})")]
    AboveCeiling { upper: i64, ceiling: i64 },

    #[error("build parameter 'guess' is not an integer: {0:?}")]
    InvalidGuessParameter(String),

    #[error("store backend '{0}' is not available in this build")]
    UnsupportedBackend(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Failure talking to the durable record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store at {endpoint} is unreachable: {detail}")]
    Connectivity { endpoint: String, detail: String },

    #[error("store at {endpoint} did not answer within {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed guess document: {0}")]
    Document(#[from] serde_json::Error),
}

impl StoreError {
    /// Timeouts count as connectivity failures.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity { .. } | StoreError::Timeout { .. })
    }
}

/// Failure reading the host's build history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("build ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("corrupt build history: {0}")]
    Corrupt(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum GuessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    History(#[from] HistoryError),
}
