//! Number-guessing build step with cross-build correctness statistics.
//!
//! Each build step draws a guess and a target, attaches a [`GuessRecord`] to
//! the running build, and at completion the records are both judged (a build
//! with more wrong than right guesses becomes unstable) and mirrored into a
//! durable [`RecordStore`]. Statistics are recomputed on demand: locally by
//! walking the host's build history, globally from the store.
//!
//! The host build system is an external collaborator; it is reached through
//! [`BuildRun`] and [`BuildHistory`].

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod record;
pub mod stages;
pub mod store;

pub use aggregate::{
    global_rollup, local_rollup, per_build_outcome, AggregateCounts, BuildOutcome, BuildStatus,
};
pub use config::GameConfig;
pub use error::{ConfigError, GuessError, HistoryError, StoreError};
pub use generator::{Bounds, Draw, Generator};
pub use history::{BuildHistory, HistoryWalker, MemoryBuild, MemoryHistory, VisitedBuild};
pub use record::GuessRecord;
pub use stages::{BuildRun, CompletionListener, GuessStep, PersistReport, ProjectStatistics, Recorder};
pub use store::{CancelToken, RecordStore};
