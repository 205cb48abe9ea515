//! # Stage: History Walker
//!
//! ## Responsibility
//! Visit a project's builds newest first, starting from the most recently
//! completed build and following "previous build" links until none remain,
//! yielding each build's guess records.
//!
//! ## Guarantees
//! - Lazy: the host is asked for one build at a time, on demand
//! - Strict reverse-chronological order across builds
//! - A build's records keep their attachment order
//! - Restartable: every [`HistoryWalker::new`] starts again from the most
//!   recent completed build
//! - At most one host build handle is held at a time
//! - A host error is yielded once, then the walk ends
//!
//! ## NOT Responsible For
//! - Aggregation (see `aggregate`)
//! - Modelling the host's build graph beyond "previous build"
//!
//! [`MemoryHistory`] and [`MemoryBuild`] are a minimal in-process host for
//! embedding and tests; the CLI uses the SQLite ledger instead.

use std::collections::HashMap;

use crate::aggregate::BuildStatus;
use crate::error::HistoryError;
use crate::record::GuessRecord;
use crate::stages::BuildRun;

/// Host-supplied view of one project's build history.
pub trait BuildHistory {
    /// Opaque handle to one build.
    type Build;

    /// The most recently completed build, if any.
    fn last_completed(&self) -> Result<Option<Self::Build>, HistoryError>;

    /// The build before `build`, if any.
    fn previous(&self, build: &Self::Build) -> Result<Option<Self::Build>, HistoryError>;

    /// Guess records attached to `build`, in attachment order.
    fn records(&self, build: &Self::Build) -> Result<Vec<GuessRecord>, HistoryError>;

    /// Host build number, for diagnostics.
    fn number(&self, build: &Self::Build) -> u64;
}

/// One visited build and its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedBuild {
    pub number: u64,
    pub records: Vec<GuessRecord>,
}

enum Cursor<B> {
    Start,
    At(B),
    Done,
}

/// Lazy backward walk over a [`BuildHistory`].
pub struct HistoryWalker<'h, H: BuildHistory> {
    history: &'h H,
    cursor: Cursor<H::Build>,
}

impl<'h, H: BuildHistory> HistoryWalker<'h, H> {
    pub fn new(history: &'h H) -> Self {
        Self {
            history,
            cursor: Cursor::Start,
        }
    }

    fn step(&mut self) -> Result<Option<VisitedBuild>, HistoryError> {
        let next = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start => self.history.last_completed()?,
            Cursor::At(build) => self.history.previous(&build)?,
            Cursor::Done => None,
        };
        let Some(build) = next else {
            return Ok(None);
        };
        let visited = VisitedBuild {
            number: self.history.number(&build),
            records: self.history.records(&build)?,
        };
        self.cursor = Cursor::At(build);
        Ok(Some(visited))
    }
}

impl<H: BuildHistory> Iterator for HistoryWalker<'_, H> {
    type Item = Result<VisitedBuild, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        // The cursor is left at `Done` on error, so the walk fuses.
        self.step().transpose()
    }
}

// ---------------------------------------------------------------------------
// In-memory host
// ---------------------------------------------------------------------------

/// A running build held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryBuild {
    number: u64,
    parameters: HashMap<String, String>,
    records: Vec<GuessRecord>,
    status: BuildStatus,
    lines: Vec<String>,
}

impl MemoryBuild {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            parameters: HashMap::new(),
            records: Vec::new(),
            status: BuildStatus::Success,
            lines: Vec::new(),
        }
    }

    /// Set or replace a build parameter.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<String>) {
        self.parameters.insert(name.to_string(), value.into());
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn log_lines(&self) -> &[String] {
        &self.lines
    }
}

impl BuildRun for MemoryBuild {
    fn records(&self) -> &[GuessRecord] {
        &self.records
    }

    fn attach(&mut self, record: GuessRecord) {
        self.records.push(record);
    }

    fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.get(name).cloned()
    }

    fn mark_unstable(&mut self) {
        self.status = BuildStatus::Unstable;
    }

    fn log(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// Completed builds of one project, oldest first.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    completed: Vec<MemoryBuild>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next build.
    pub fn begin(&self) -> MemoryBuild {
        MemoryBuild::new(self.completed.len() as u64 + 1)
    }

    pub fn complete(&mut self, build: MemoryBuild) {
        self.completed.push(build);
    }

    pub fn builds(&self) -> &[MemoryBuild] {
        &self.completed
    }
}

impl BuildHistory for MemoryHistory {
    type Build = usize;

    fn last_completed(&self) -> Result<Option<usize>, HistoryError> {
        Ok(self.completed.len().checked_sub(1))
    }

    fn previous(&self, build: &usize) -> Result<Option<usize>, HistoryError> {
        Ok(build.checked_sub(1))
    }

    fn records(&self, build: &usize) -> Result<Vec<GuessRecord>, HistoryError> {
        self.completed
            .get(*build)
            .map(|b| b.records.clone())
            .ok_or_else(|| HistoryError::Corrupt(format!("no build at position {build}")))
    }

    fn number(&self, build: &usize) -> u64 {
        self.completed.get(*build).map_or(0, |b| b.number)
    }
}
