//! End-to-end build lifecycle: guess steps, recorder decision, completion
//! listener, and statistics, against an in-memory host and store.

use std::sync::Arc;

use guessing_game::store::MemoryRecordStore;
use guessing_game::*;

// -- Helpers ------------------------------------------------------------

/// Run one build where step `i` guesses `pairs[i].0` against a target pinned
/// to `pairs[i].1` (a single-value range).
fn run_build(
    project: &mut MemoryHistory,
    listener: &CompletionListener,
    pairs: &[(i64, i64)],
) -> (BuildOutcome, PersistReport) {
    let mut build = project.begin();
    let mut generator = Generator::new();
    for (guess, target) in pairs {
        build.set_parameter("guess", guess.to_string());
        GuessStep::new(*target, *target)
            .perform(&mut build, &mut generator)
            .unwrap();
    }
    let outcome = Recorder.perform(&mut build);
    let report = listener.on_completed(&mut build, &CancelToken::new());
    assert_eq!(build.status(), outcome.status());
    project.complete(build);
    (outcome, report)
}

fn counts(correct: u64, incorrect: u64) -> AggregateCounts {
    AggregateCounts { correct, incorrect }
}

// -- Scenarios ------------------------------------------------------------

#[test]
fn three_builds_scenario() {
    let store = Arc::new(MemoryRecordStore::new());
    let listener = CompletionListener::new(store.clone());
    let mut project = MemoryHistory::new();

    let (first, _) = run_build(&mut project, &listener, &[(2, 2), (5, 3), (6, 6)]);
    assert_eq!(first.counts, counts(2, 1));
    assert!(first.passed);
    let recs = project.builds()[0].records();
    assert_eq!(recs[0], GuessRecord::new(1, 2, 2));
    assert_eq!(recs[1], GuessRecord::new(2, 5, 3));
    assert_eq!(recs[2], GuessRecord::new(3, 6, 6));
    assert_eq!(project.builds()[0].status(), BuildStatus::Success);

    let (second, _) = run_build(&mut project, &listener, &[(1, 3), (4, 4)]);
    assert_eq!(second.counts, counts(1, 1));
    assert!(second.passed, "a tie passes");

    let (third, _) = run_build(&mut project, &listener, &[(1, 2), (5, 6)]);
    assert_eq!(third.counts, counts(0, 2));
    assert!(!third.passed);
    assert_eq!(project.builds()[2].status(), BuildStatus::Unstable);

    let stats = ProjectStatistics::new(&project, &*store);
    assert_eq!(stats.local().unwrap(), counts(3, 4));
    assert_eq!(stats.global(&CancelToken::new()).unwrap(), counts(3, 4));
    assert_eq!(stats.last_record().unwrap(), Some(GuessRecord::new(1, 1, 2)));
}

#[test]
fn build_log_lines() {
    let store = Arc::new(MemoryRecordStore::new());
    let listener = CompletionListener::new(store);
    let mut project = MemoryHistory::new();
    run_build(&mut project, &listener, &[(2, 2), (5, 3)]);
    assert_eq!(
        project.builds()[0].log_lines(),
        vec![
            "Guessing a number between 2 and 2",
            "Guessing a number between 3 and 3",
            "1 correct guesses out of a total of 2 guesses",
            "2 - 2 - true",
            "5 - 3 - false",
            "2 answers stored in total",
            "1 correct answers",
            "1 incorrect answers",
        ]
    );
}

#[test]
fn build_without_guess_steps_passes() {
    let store = Arc::new(MemoryRecordStore::new());
    let listener = CompletionListener::new(store.clone());
    let mut project = MemoryHistory::new();
    let (outcome, report) = run_build(&mut project, &listener, &[]);
    assert_eq!(outcome.counts, counts(0, 0));
    assert!(outcome.passed);
    assert_eq!(report.stored, 0);
    assert!(report.is_complete());
}

#[test]
fn storage_outage_then_recovery() {
    let store = Arc::new(MemoryRecordStore::new());
    let listener = CompletionListener::new(store.clone());
    let mut project = MemoryHistory::new();

    store.set_available(false);
    let (outcome, report) = run_build(&mut project, &listener, &[(1, 2), (3, 4)]);
    assert!(!outcome.passed, "status still comes from local records");
    assert!(report.failure.as_ref().unwrap().is_connectivity());
    assert!(project.builds()[0]
        .log_lines()
        .iter()
        .any(|l| l.starts_with("Could not reach guess store")));

    // Global statistics surface the outage instead of reporting zero.
    let stats = ProjectStatistics::new(&project, &*store);
    assert!(stats.global(&CancelToken::new()).is_err());
    assert_eq!(stats.local().unwrap(), counts(0, 2));

    store.set_available(true);
    let (_, report) = run_build(&mut project, &listener, &[(4, 4)]);
    assert!(report.is_complete());
    assert_eq!(report.stored, 1);

    let stats = ProjectStatistics::new(&project, &*store);
    assert_eq!(stats.global(&CancelToken::new()).unwrap(), counts(1, 0));
    assert_eq!(stats.local().unwrap(), counts(1, 2));
}

#[test]
fn listener_reuses_one_connection_across_builds() {
    let store = Arc::new(MemoryRecordStore::new());
    let listener = CompletionListener::new(store.clone());
    let mut project = MemoryHistory::new();
    for _ in 0..3 {
        run_build(&mut project, &listener, &[(1, 1)]);
    }
    assert_eq!(store.connections_opened(), 1);
}

#[test]
fn empty_history_statistics() {
    let store = MemoryRecordStore::new();
    let project = MemoryHistory::new();
    let stats = ProjectStatistics::new(&project, &store);
    assert_eq!(stats.local().unwrap(), counts(0, 0));
    assert_eq!(stats.last_record().unwrap(), None);
    assert_eq!(stats.global(&CancelToken::new()).unwrap(), counts(0, 0));
}
