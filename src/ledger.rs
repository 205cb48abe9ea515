//! SQLite build ledger: the host-side build history the CLI drives.
//!
//! Each build belongs to a project, has a per-project number, a status and
//! a completion flag. Guess records are written with the build when it
//! completes; a running build keeps them in memory.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::aggregate::BuildStatus;
use crate::error::HistoryError;
use crate::history::BuildHistory;
use crate::record::GuessRecord;
use crate::stages::BuildRun;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS builds (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    project     TEXT NOT NULL,
    number      INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'running',
    completed   INTEGER NOT NULL DEFAULT 0,
    UNIQUE (project, number)
);
CREATE TABLE IF NOT EXISTS build_guesses (
    build_id        INTEGER NOT NULL REFERENCES builds(id),
    sequence_index  INTEGER NOT NULL,
    guess           INTEGER NOT NULL,
    number          INTEGER NOT NULL,
    PRIMARY KEY (build_id, sequence_index)
);
";

/// Stored status of a build closed by [`Ledger::fail`].
pub const FAILED: &str = "failed";

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Register a new running build with the next number for `project`.
    pub fn begin(
        &self,
        project: &str,
        parameters: HashMap<String, String>,
    ) -> Result<LedgerBuild, HistoryError> {
        let number: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM builds WHERE project = ?1",
            params![project],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO builds (project, number) VALUES (?1, ?2)",
            params![project, number],
        )?;
        Ok(LedgerBuild {
            id: self.conn.last_insert_rowid(),
            number: number as u64,
            parameters,
            records: Vec::new(),
            status: BuildStatus::Success,
            lines: Vec::new(),
            echo: false,
        })
    }

    /// Persist the build's records and final status, and mark it completed.
    pub fn complete(&mut self, build: &LedgerBuild) -> Result<(), HistoryError> {
        self.finish(build, &build.status.to_string())
    }

    /// Close a build whose steps errored. It keeps any records attached so
    /// far and is marked `failed`, so no build is left running.
    pub fn fail(&mut self, build: &LedgerBuild) -> Result<(), HistoryError> {
        self.finish(build, FAILED)
    }

    fn finish(&mut self, build: &LedgerBuild, status: &str) -> Result<(), HistoryError> {
        let tx = self.conn.transaction()?;
        for r in &build.records {
            tx.execute(
                "INSERT INTO build_guesses (build_id, sequence_index, guess, number)
                 VALUES (?1, ?2, ?3, ?4)",
                params![build.id, r.sequence_index(), r.guess(), r.target()],
            )?;
        }
        tx.execute(
            "UPDATE builds SET status = ?1, completed = 1 WHERE id = ?2",
            params![status, build.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn project<'a>(&'a self, name: &str) -> ProjectHistory<'a> {
        ProjectHistory {
            ledger: self,
            project: name.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerBuild
// ---------------------------------------------------------------------------

/// A running build registered in the ledger.
#[derive(Debug)]
pub struct LedgerBuild {
    id: i64,
    number: u64,
    parameters: HashMap<String, String>,
    records: Vec<GuessRecord>,
    status: BuildStatus,
    lines: Vec<String>,
    echo: bool,
}

impl LedgerBuild {
    /// Also print each build log line to stdout as it is written.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
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

impl BuildRun for LedgerBuild {
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
        if self.echo {
            println!("{line}");
        }
        self.lines.push(line.to_string());
    }
}

// ---------------------------------------------------------------------------
// ProjectHistory
// ---------------------------------------------------------------------------

/// [`BuildHistory`] over one project in the ledger.
pub struct ProjectHistory<'a> {
    ledger: &'a Ledger,
    project: String,
}

/// Handle to a stored build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRef {
    id: i64,
    number: u64,
}

fn build_ref(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuildRef> {
    Ok(BuildRef {
        id: row.get(0)?,
        number: row.get::<_, i64>(1)? as u64,
    })
}

impl BuildHistory for ProjectHistory<'_> {
    type Build = BuildRef;

    fn last_completed(&self) -> Result<Option<BuildRef>, HistoryError> {
        Ok(self
            .ledger
            .conn
            .query_row(
                "SELECT id, number FROM builds
                 WHERE project = ?1 AND completed = 1
                 ORDER BY number DESC LIMIT 1",
                params![self.project],
                build_ref,
            )
            .optional()?)
    }

    fn previous(&self, build: &BuildRef) -> Result<Option<BuildRef>, HistoryError> {
        Ok(self
            .ledger
            .conn
            .query_row(
                "SELECT id, number FROM builds
                 WHERE project = ?1 AND number < ?2
                 ORDER BY number DESC LIMIT 1",
                params![self.project, build.number as i64],
                build_ref,
            )
            .optional()?)
    }

    fn records(&self, build: &BuildRef) -> Result<Vec<GuessRecord>, HistoryError> {
        let mut stmt = self.ledger.conn.prepare(
            "SELECT sequence_index, guess, number FROM build_guesses
             WHERE build_id = ?1 ORDER BY sequence_index",
        )?;
        let rows = stmt.query_map(params![build.id], |row| {
            Ok(GuessRecord::new(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        for (i, r) in records.iter().enumerate() {
            if r.sequence_index() as usize != i + 1 {
                return Err(HistoryError::Corrupt(format!(
                    "build #{} has a gap before guess {}",
                    build.number,
                    r.sequence_index()
                )));
            }
        }
        Ok(records)
    }

    fn number(&self, build: &BuildRef) -> u64 {
        build.number
    }
}
