//! Expected search cost of a pattern.

use crate::error::{Result, VanityError};

use super::{Pattern, Position};

/// Effective alphabet size for case-sensitive matching.
pub const CASE_SENSITIVE_ALPHABET: f64 = 58.0;

/// Effective alphabet size once letter case is folded.
pub const CASE_INSENSITIVE_ALPHABET: f64 = 33.0;

/// Length of a full-width base58 encoding of a 32-byte key.
const ADDRESS_LEN: usize = 44;

/// Estimated cost of finding one match.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Complexity {
    /// Expected number of keypairs to generate.
    pub expected_attempts: f64,
    /// Expected wall-clock seconds at the given worker count.
    pub expected_seconds: f64,
    /// False when the attempts exceed the configured ceiling.
    pub is_reasonable: bool,
}

/// Estimates search cost and rejects patterns beyond a ceiling.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityEstimator {
    per_core_rate: f64,
    ceiling: Option<f64>,
}

impl ComplexityEstimator {
    /// Creates an estimator.
    ///
    /// `per_core_rate` is the calibrated attempts per second of one worker;
    /// `ceiling` of `None` admits every pattern.
    pub fn new(per_core_rate: f64, ceiling: Option<f64>) -> Self {
        Self {
            per_core_rate,
            ceiling,
        }
    }

    /// Expected attempts for one match: `alphabet^len`, divided by the
    /// number of offsets an `Anywhere` pattern can occupy.
    pub fn expected_attempts(&self, pattern: &Pattern) -> f64 {
        let alphabet = if pattern.case_sensitive() {
            CASE_SENSITIVE_ALPHABET
        } else {
            CASE_INSENSITIVE_ALPHABET
        };
        let attempts = alphabet.powi(pattern.len() as i32);

        match pattern.position() {
            Position::Anywhere => {
                let offsets = ADDRESS_LEN.saturating_sub(pattern.len()) + 1;
                attempts / offsets as f64
            }
            Position::Start | Position::End => attempts,
        }
    }

    /// Full estimate at the given worker count.
    pub fn estimate(&self, pattern: &Pattern, workers: usize) -> Complexity {
        let expected_attempts = self.expected_attempts(pattern);
        let throughput = self.per_core_rate * workers.max(1) as f64;

        Complexity {
            expected_attempts,
            expected_seconds: expected_attempts / throughput,
            is_reasonable: self.ceiling.map_or(true, |ceiling| expected_attempts <= ceiling),
        }
    }

    /// Fails with `PatternTooComplex` when the pattern exceeds the ceiling.
    pub fn check(&self, pattern: &Pattern) -> Result<f64> {
        let expected_attempts = self.expected_attempts(pattern);
        match self.ceiling {
            Some(ceiling) if expected_attempts > ceiling => Err(VanityError::PatternTooComplex {
                expected_attempts,
                ceiling,
            }),
            _ => Ok(expected_attempts),
        }
    }

    pub fn per_core_rate(&self) -> f64 {
        self.per_core_rate
    }
}

/// Returns a human-readable difficulty estimate for an attempt count.
pub fn difficulty_description(expected_attempts: f64) -> &'static str {
    match expected_attempts {
        a if a <= 1e3 => "Very Easy (< 1 second)",
        a if a <= 1e5 => "Easy (seconds)",
        a if a <= 1e7 => "Medium (minutes)",
        a if a <= 1e9 => "Hard (hours)",
        _ => "Very Hard (days or more)",
    }
}
