//! # Stage: Guess Record
//!
//! ## Responsibility
//! One guess outcome for one build: the 1-based position of the guess inside
//! the build, the guessed value, the drawn target, and whether they matched.
//!
//! ## Guarantees
//! - `correct` is always `guess == target`; there is no setter for it
//! - Immutable after construction
//! - The durable document uses the field names `sequenceIndex`, `guess`,
//!   `number` and `correct`
//!
//! ## NOT Responsible For
//! - Assigning sequence indices (the guess step does that)
//! - Persistence (see `store`)

use std::fmt;

use serde::{Deserialize, Serialize};

/// One guess outcome, owned by the build that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessRecord {
    sequence_index: u32,
    guess: i64,
    target: i64,
    correct: bool,
}

impl GuessRecord {
    pub fn new(sequence_index: u32, guess: i64, target: i64) -> Self {
        Self {
            sequence_index,
            guess,
            target,
            correct: guess == target,
        }
    }

    /// 1-based position within the owning build.
    pub fn sequence_index(&self) -> u32 {
        self.sequence_index
    }

    pub fn guess(&self) -> i64 {
        self.guess
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn is_correct(&self) -> bool {
        self.correct
    }
}

impl fmt::Display for GuessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.guess, self.target, self.correct)
    }
}

// ---------------------------------------------------------------------------
// Durable document form
// ---------------------------------------------------------------------------

/// Wire shape of a record in the durable store.
///
/// `correct` is written for interop with existing readers that filter on it,
/// but it is recomputed from `guess` and `number` when a document is turned
/// back into a [`GuessRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessDocument {
    #[serde(alias = "index", default)]
    pub sequence_index: u32,
    pub guess: i64,
    #[serde(alias = "target")]
    pub number: i64,
    #[serde(default)]
    pub correct: bool,
}

impl From<&GuessRecord> for GuessDocument {
    fn from(r: &GuessRecord) -> Self {
        Self {
            sequence_index: r.sequence_index,
            guess: r.guess,
            number: r.target,
            correct: r.correct,
        }
    }
}

impl From<GuessDocument> for GuessRecord {
    fn from(d: GuessDocument) -> Self {
        GuessRecord::new(d.sequence_index, d.guess, d.number)
    }
}
