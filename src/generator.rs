//! Guess and target generation.

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::error::ConfigError;

/// Fallback upper ceiling enforced at configuration time.
pub const DEFAULT_CEILING: i64 = 6;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Validated closed range `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    lower: i64,
    upper: i64,
}

impl Bounds {
    /// Build a range from optionally supplied bounds.
    ///
    /// Fails when either bound is missing or `lower > upper`.
    pub fn new(lower: Option<i64>, upper: Option<i64>) -> Result<Self, ConfigError> {
        let lower = lower.ok_or(ConfigError::MissingBound("lower"))?;
        let upper = upper.ok_or(ConfigError::MissingBound("upper"))?;
        if lower > upper {
            return Err(ConfigError::InvertedBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Configuration-time check that `upper` does not exceed `ceiling`.
    pub fn within_ceiling(self, ceiling: i64) -> Result<Self, ConfigError> {
        if self.upper > ceiling {
            return Err(ConfigError::AboveCeiling {
                upper: self.upper,
                ceiling,
            });
        }
        Ok(self)
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// A guess/target pair ready to become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub guess: i64,
    pub target: i64,
}

/// Draws guesses and targets uniformly from a [`Bounds`] range.
///
/// Generic over the RNG so tests can seed it; production code uses the
/// thread-local generator.
pub struct Generator<R: Rng = ThreadRng> {
    rng: R,
}

impl Generator<ThreadRng> {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for Generator<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Generator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Produce a guess/target pair.
    ///
    /// A `supplied` guess is used as-is; the target is always freshly drawn.
    pub fn draw(&mut self, bounds: Bounds, supplied: Option<i64>) -> Draw {
        let guess = match supplied {
            Some(g) => g,
            None => self.rng.gen_range(bounds.lower..=bounds.upper),
        };
        let target = self.rng.gen_range(bounds.lower..=bounds.upper);
        Draw { guess, target }
    }
}
