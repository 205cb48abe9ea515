//! # Stage: Aggregator
//!
//! ## Responsibility
//! Turn guess records into pass/fail counts: per build, across the local
//! build history, and across the durable store.
//!
//! ## Guarantees
//! - Stateless: every call recomputes from raw records, nothing is cached
//! - `correct + incorrect` equals the number of records examined
//! - Ties pass; an empty record set passes vacuously
//! - A build is at worst marked unstable, never failed, by guess results
//! - Store failures propagate; they are never reported as zero counts
//!
//! ## NOT Responsible For
//! - Catching store failures (the completion listener does that)
//! - Attaching status to the host's build

use std::fmt;

use tracing::warn;

use crate::error::{HistoryError, StoreError};
use crate::history::{BuildHistory, HistoryWalker};
use crate::record::GuessRecord;
use crate::store::{CancelToken, RecordStore};

/// Correct/incorrect tallies for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateCounts {
    pub correct: u64,
    pub incorrect: u64,
}

impl AggregateCounts {
    pub fn total(&self) -> u64 {
        self.correct + self.incorrect
    }

    fn tally(&mut self, record: &GuessRecord) {
        if record.is_correct() {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
    }
}

impl std::ops::Add for AggregateCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            correct: self.correct + rhs.correct,
            incorrect: self.incorrect + rhs.incorrect,
        }
    }
}

impl std::ops::AddAssign for AggregateCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Final status contributed by guess aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    /// Degraded: more incorrect than correct guesses.
    Unstable,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Unstable => write!(f, "unstable"),
        }
    }
}

/// Outcome of one build's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub counts: AggregateCounts,
    pub passed: bool,
}

impl BuildOutcome {
    pub fn status(&self) -> BuildStatus {
        if self.passed {
            BuildStatus::Success
        } else {
            BuildStatus::Unstable
        }
    }
}

/// Count one build's records; the build passes when `correct >= incorrect`.
pub fn per_build_outcome(records: &[GuessRecord]) -> BuildOutcome {
    let mut counts = AggregateCounts::default();
    for r in records {
        counts.tally(r);
    }
    BuildOutcome {
        counts,
        passed: counts.correct >= counts.incorrect,
    }
}

/// Sum per-build counts over the whole walked history in one pass.
pub fn local_rollup<H: BuildHistory>(
    walker: HistoryWalker<'_, H>,
) -> Result<AggregateCounts, HistoryError> {
    let mut total = AggregateCounts::default();
    for build in walker {
        total += per_build_outcome(&build?.records).counts;
    }
    Ok(total)
}

/// Counts over every record in the durable store.
///
/// Also cross-checks the two predicate counts against the total and warns on
/// a mismatch; a concurrent writer can cause a transient one.
pub fn global_rollup(
    store: &dyn RecordStore,
    cancel: &CancelToken,
) -> Result<AggregateCounts, StoreError> {
    store.connect()?;
    let counts = AggregateCounts {
        correct: store.count_where(true, cancel)?,
        incorrect: store.count_where(false, cancel)?,
    };
    let total = store.count(cancel)?;
    if counts.total() != total {
        warn!(
            endpoint = %store.endpoint(),
            correct = counts.correct,
            incorrect = counts.incorrect,
            total,
            "store integrity: predicate counts do not add up to total"
        );
    }
    Ok(counts)
}
