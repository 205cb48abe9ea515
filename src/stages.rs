//! Named stages the host invokes during a build's lifecycle.
//!
//! - [`GuessStep`]: given the records so far, produce and attach the next one
//! - [`Recorder`]: given the finished build, decide its status
//! - [`CompletionListener`]: given the completed build, persist its records
//! - [`ProjectStatistics`]: on demand, local and global rollups

use std::sync::Arc;

use rand::Rng;
use tracing::{error, info, warn};

use crate::aggregate::{
    global_rollup, local_rollup, per_build_outcome, AggregateCounts, BuildOutcome,
};
use crate::error::{ConfigError, HistoryError, StoreError};
use crate::generator::{Bounds, Generator};
use crate::history::{BuildHistory, HistoryWalker};
use crate::record::GuessRecord;
use crate::store::{CancelToken, RecordStore};

/// Build parameter that overrides the drawn guess.
pub const GUESS_PARAMETER: &str = "guess";

/// Parse a `guess` build parameter. Surrounding whitespace is ignored.
pub fn parse_guess(raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidGuessParameter(raw.to_string()))
}

/// What a stage needs from the host's running build.
pub trait BuildRun {
    /// Guess records attached so far, in attachment order.
    fn records(&self) -> &[GuessRecord];

    fn attach(&mut self, record: GuessRecord);

    /// Value of a user-supplied build parameter.
    fn parameter(&self, name: &str) -> Option<String>;

    /// Degrade the build. Never a hard failure.
    fn mark_unstable(&mut self);

    /// Append a line to the build's log.
    fn log(&mut self, line: &str);
}

// ---------------------------------------------------------------------------
// GuessStep
// ---------------------------------------------------------------------------

/// One "guess a number" build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessStep {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl GuessStep {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Draw, build and attach the next record.
    ///
    /// Invalid bounds or an unparsable `guess` parameter stop the step before
    /// anything is attached.
    pub fn perform<R: Rng>(
        &self,
        build: &mut dyn BuildRun,
        generator: &mut Generator<R>,
    ) -> Result<GuessRecord, ConfigError> {
        let bounds = Bounds::new(self.lower, self.upper)?;
        let supplied = build
            .parameter(GUESS_PARAMETER)
            .map(|raw| parse_guess(&raw))
            .transpose()?;
        build.log(&format!(
            "Guessing a number between {} and {}",
            bounds.lower(),
            bounds.upper()
        ));

        let draw = generator.draw(bounds, supplied);
        let index = build.records().len() as u32 + 1;
        let record = GuessRecord::new(index, draw.guess, draw.target);
        build.attach(record);
        info!(
            sequence_index = index,
            guess = record.guess(),
            target = record.target(),
            correct = record.is_correct(),
            "guess recorded"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Post-build decision: unstable when incorrect guesses outnumber correct ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct Recorder;

impl Recorder {
    pub fn perform(&self, build: &mut dyn BuildRun) -> BuildOutcome {
        let outcome = per_build_outcome(build.records());
        build.log(&format!(
            "{} correct guesses out of a total of {} guesses",
            outcome.counts.correct,
            outcome.counts.total()
        ));
        if !outcome.passed {
            build.mark_unstable();
            info!(
                correct = outcome.counts.correct,
                incorrect = outcome.counts.incorrect,
                "build marked unstable"
            );
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// CompletionListener
// ---------------------------------------------------------------------------

/// What happened when a completed build was persisted.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub stored: usize,
    /// Store totals after the writes: `(count, counts by correctness)`.
    pub totals: Option<(u64, AggregateCounts)>,
    /// The failure that stopped persisting, if any. Already logged.
    pub failure: Option<StoreError>,
}

impl PersistReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Pushes a completed build's records into the durable store.
///
/// Store failures are logged to both the process log and the build log and
/// never change the build's status.
pub struct CompletionListener {
    store: Arc<dyn RecordStore>,
}

impl CompletionListener {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn on_completed(&self, build: &mut dyn BuildRun, cancel: &CancelToken) -> PersistReport {
        let mut report = PersistReport::default();
        let mut failure = self.store.connect().err();

        // Every record gets its line, stored or not.
        let records = build.records().to_vec();
        for record in &records {
            build.log(&record.to_string());
            if failure.is_some() {
                continue;
            }
            match self.store.insert(record, cancel) {
                Ok(()) => report.stored += 1,
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            self.report_failure(build, &e, report.stored);
            report.failure = Some(e);
            return report;
        }

        match self.totals(cancel) {
            Ok((total, counts)) => {
                build.log(&format!("{total} answers stored in total"));
                build.log(&format!("{} correct answers", counts.correct));
                build.log(&format!("{} incorrect answers", counts.incorrect));
                report.totals = Some((total, counts));
            }
            Err(e) => {
                self.report_failure(build, &e, report.stored);
                report.failure = Some(e);
            }
        }
        report
    }

    fn totals(&self, cancel: &CancelToken) -> Result<(u64, AggregateCounts), StoreError> {
        let total = self.store.count(cancel)?;
        let counts = AggregateCounts {
            correct: self.store.count_where(true, cancel)?,
            incorrect: self.store.count_where(false, cancel)?,
        };
        Ok((total, counts))
    }

    fn report_failure(&self, build: &mut dyn BuildRun, e: &StoreError, stored: usize) {
        let endpoint = self.store.endpoint();
        match e {
            StoreError::Cancelled => {
                warn!(%endpoint, stored, "persisting guesses cancelled");
                build.log(&format!(
                    "Storing guesses cancelled after {stored} record(s); stored records are kept"
                ));
            }
            e if e.is_connectivity() => {
                error!(%endpoint, stored, error = %e, "guess store unreachable");
                build.log(&format!("Could not reach guess store at {endpoint}: {e}"));
            }
            e => {
                error!(%endpoint, stored, error = %e, "storing guesses failed");
                build.log(&format!("Storing guesses failed: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectStatistics
// ---------------------------------------------------------------------------

/// On-demand statistics for one project.
pub struct ProjectStatistics<'a, H: BuildHistory> {
    history: &'a H,
    store: &'a dyn RecordStore,
}

impl<'a, H: BuildHistory> ProjectStatistics<'a, H> {
    pub fn new(history: &'a H, store: &'a dyn RecordStore) -> Self {
        Self { history, store }
    }

    /// Counts over the host's retained build history.
    pub fn local(&self) -> Result<AggregateCounts, HistoryError> {
        local_rollup(HistoryWalker::new(self.history))
    }

    /// Counts over every record in the durable store.
    pub fn global(&self, cancel: &CancelToken) -> Result<AggregateCounts, StoreError> {
        global_rollup(self.store, cancel)
    }

    /// First record of the newest build that has any.
    pub fn last_record(&self) -> Result<Option<GuessRecord>, HistoryError> {
        for build in HistoryWalker::new(self.history) {
            if let Some(first) = build?.records.first() {
                return Ok(Some(*first));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBuild {
        records: Vec<GuessRecord>,
        params: HashMap<String, String>,
        unstable: bool,
        lines: Vec<String>,
    }

    impl BuildRun for FakeBuild {
        fn records(&self) -> &[GuessRecord] {
            &self.records
        }

        fn attach(&mut self, record: GuessRecord) {
            self.records.push(record);
        }

        fn parameter(&self, name: &str) -> Option<String> {
            self.params.get(name).cloned()
        }

        fn mark_unstable(&mut self) {
            self.unstable = true;
        }

        fn log(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
    }

    fn generator() -> Generator<StdRng> {
        Generator::with_rng(StdRng::seed_from_u64(42))
    }

    // -- GuessStep --------------------------------------------------------

    #[test]
    fn guess_step_assigns_sequential_indices() {
        let mut build = FakeBuild::default();
        let step = GuessStep::new(1, 6);
        let mut g = generator();
        for _ in 0..3 {
            step.perform(&mut build, &mut g).unwrap();
        }
        let idx: Vec<u32> = build.records.iter().map(|r| r.sequence_index()).collect();
        assert_eq!(idx, vec![1, 2, 3]);
        assert_eq!(build.lines[0], "Guessing a number between 1 and 6");
    }

    #[test]
    fn guess_step_uses_guess_parameter() {
        let mut build = FakeBuild::default();
        build.params.insert("guess".to_string(), " 4 ".to_string());
        let r = GuessStep::new(1, 6).perform(&mut build, &mut generator()).unwrap();
        assert_eq!(r.guess(), 4);
    }

    #[test]
    fn guess_step_rejects_bad_parameter_without_attaching() {
        let mut build = FakeBuild::default();
        build.params.insert("guess".to_string(), "four".to_string());
        let err = GuessStep::new(1, 6)
            .perform(&mut build, &mut generator())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGuessParameter(_)));
        assert!(build.records.is_empty());
    }

    #[test]
    fn guess_step_with_missing_bound_does_not_run() {
        let mut build = FakeBuild::default();
        let step = GuessStep {
            lower: Some(1),
            upper: None,
        };
        assert!(step.perform(&mut build, &mut generator()).is_err());
        assert!(build.records.is_empty());
        assert!(build.lines.is_empty());
    }

    // -- Recorder ---------------------------------------------------------

    #[test]
    fn recorder_marks_unstable_when_mostly_wrong() {
        let mut build = FakeBuild {
            records: vec![GuessRecord::new(1, 1, 2), GuessRecord::new(2, 3, 4)],
            ..FakeBuild::default()
        };
        let outcome = Recorder.perform(&mut build);
        assert!(!outcome.passed);
        assert!(build.unstable);
        assert_eq!(build.lines, vec!["0 correct guesses out of a total of 2 guesses"]);
    }

    #[test]
    fn recorder_passes_empty_build() {
        let mut build = FakeBuild::default();
        assert!(Recorder.perform(&mut build).passed);
        assert!(!build.unstable);
    }

    // -- CompletionListener -----------------------------------------------

    #[test]
    fn listener_stores_every_record_and_logs_totals() {
        let store = Arc::new(MemoryRecordStore::new());
        let listener = CompletionListener::new(store.clone());
        let mut build = FakeBuild {
            records: vec![GuessRecord::new(1, 2, 2), GuessRecord::new(2, 5, 3)],
            ..FakeBuild::default()
        };
        let report = listener.on_completed(&mut build, &CancelToken::new());
        assert!(report.is_complete());
        assert_eq!(report.stored, 2);
        assert_eq!(
            build.lines,
            vec![
                "2 - 2 - true",
                "5 - 3 - false",
                "2 answers stored in total",
                "1 correct answers",
                "1 incorrect answers",
            ]
        );
    }

    #[test]
    fn listener_survives_outage() {
        let store = Arc::new(MemoryRecordStore::new());
        store.set_available(false);
        let listener = CompletionListener::new(store.clone());
        let mut build = FakeBuild {
            records: vec![GuessRecord::new(1, 2, 2)],
            ..FakeBuild::default()
        };
        let report = listener.on_completed(&mut build, &CancelToken::new());
        assert!(report.failure.unwrap().is_connectivity());
        assert_eq!(report.stored, 0);
        assert!(!build.unstable);
        assert_eq!(build.lines[0], "2 - 2 - true");
        assert!(build.lines[1].starts_with("Could not reach guess store"));
    }

    #[test]
    fn listener_stops_on_cancel() {
        let store = Arc::new(MemoryRecordStore::new());
        let listener = CompletionListener::new(store.clone());
        let token = CancelToken::new();
        token.cancel();
        let mut build = FakeBuild {
            records: vec![GuessRecord::new(1, 2, 2)],
            ..FakeBuild::default()
        };
        let report = listener.on_completed(&mut build, &token);
        assert!(matches!(report.failure, Some(StoreError::Cancelled)));
        assert!(store.records().is_empty());
    }

    /// Memory store that trips something once the first insert has landed:
    /// the given token, or the backing service when there is none.
    struct TripAfterFirstInsert {
        inner: MemoryRecordStore,
        cancel: Option<CancelToken>,
    }

    impl RecordStore for TripAfterFirstInsert {
        fn endpoint(&self) -> String {
            self.inner.endpoint()
        }

        fn connect(&self) -> Result<(), StoreError> {
            self.inner.connect()
        }

        fn insert(&self, record: &GuessRecord, cancel: &CancelToken) -> Result<(), StoreError> {
            self.inner.insert(record, cancel)?;
            match &self.cancel {
                Some(token) => token.cancel(),
                None => self.inner.set_available(false),
            }
            Ok(())
        }

        fn count(&self, cancel: &CancelToken) -> Result<u64, StoreError> {
            self.inner.count(cancel)
        }

        fn count_where(&self, correct: bool, cancel: &CancelToken) -> Result<u64, StoreError> {
            self.inner.count_where(correct, cancel)
        }
    }

    fn three_records() -> FakeBuild {
        FakeBuild {
            records: vec![
                GuessRecord::new(1, 2, 2),
                GuessRecord::new(2, 5, 3),
                GuessRecord::new(3, 6, 6),
            ],
            ..FakeBuild::default()
        }
    }

    #[test]
    fn cancel_mid_persist_keeps_written_records() {
        let token = CancelToken::new();
        let store = Arc::new(TripAfterFirstInsert {
            inner: MemoryRecordStore::new(),
            cancel: Some(token.clone()),
        });
        let listener = CompletionListener::new(store.clone());
        let mut build = three_records();
        let report = listener.on_completed(&mut build, &token);
        assert_eq!(report.stored, 1);
        assert!(matches!(report.failure, Some(StoreError::Cancelled)));
        assert_eq!(store.inner.records(), vec![GuessRecord::new(1, 2, 2)]);
        assert!(build
            .lines
            .iter()
            .any(|l| l.starts_with("Storing guesses cancelled after 1 record(s)")));
        assert!(!build.unstable);
    }

    #[test]
    fn outage_mid_persist_still_logs_every_record() {
        let store = Arc::new(TripAfterFirstInsert {
            inner: MemoryRecordStore::new(),
            cancel: None,
        });
        let listener = CompletionListener::new(store.clone());
        let mut build = three_records();
        let report = listener.on_completed(&mut build, &CancelToken::new());
        assert_eq!(report.stored, 1);
        assert!(report.failure.unwrap().is_connectivity());
        assert_eq!(
            build.lines[..3],
            ["2 - 2 - true", "5 - 3 - false", "6 - 6 - true"]
        );
        assert!(build.lines[3].starts_with("Could not reach guess store"));
        assert_eq!(build.lines.len(), 4);
    }

    #[test]
    fn parse_guess_trims_and_rejects_garbage() {
        assert_eq!(parse_guess(" -3 ").unwrap(), -3);
        assert!(matches!(
            parse_guess("four"),
            Err(ConfigError::InvalidGuessParameter(raw)) if raw == "four"
        ));
    }

    // -- ProjectStatistics --------------------------------------------------

    #[test]
    fn last_record_is_first_guess_of_newest_build_with_any() {
        let mut history = crate::history::MemoryHistory::new();
        let mut b = history.begin();
        b.attach(GuessRecord::new(1, 1, 1));
        history.complete(b);
        let mut b = history.begin();
        b.attach(GuessRecord::new(1, 4, 2));
        b.attach(GuessRecord::new(2, 3, 3));
        history.complete(b);
        let b = history.begin();
        history.complete(b);

        let store = MemoryRecordStore::new();
        let stats = ProjectStatistics::new(&history, &store);
        assert_eq!(stats.last_record().unwrap(), Some(GuessRecord::new(1, 4, 2)));
    }
}
