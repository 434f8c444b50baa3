//! Error types shared by every stage of a generation request.

use std::time::Duration;

use serde_json::{json, Value};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VanityError>;

/// Errors surfaced to callers of the engine.
///
/// Validation variants are returned before any worker is spawned. Runtime
/// variants (`Worker`, `Timeout`, `Cancelled`) are only returned after every
/// worker of the failed request has been stopped and joined.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VanityError {
    #[error("invalid pattern: {character:?} at index {index} is not in the base58 alphabet")]
    InvalidPattern { character: char, index: usize },

    #[error("invalid pattern length {length}: must be between {min} and {max} characters")]
    InvalidLength {
        length: usize,
        min: usize,
        max: usize,
    },

    #[error("pattern too complex: {expected_attempts:.3e} expected attempts exceeds the ceiling of {ceiling:.3e}")]
    PatternTooComplex { expected_attempts: f64, ceiling: f64 },

    #[error("worker {worker_id} failed: {reason}")]
    Worker { worker_id: usize, reason: String },

    #[error("no match within {timeout:?} ({attempts} keys tested)")]
    Timeout { timeout: Duration, attempts: u64 },

    #[error("generation was cancelled")]
    Cancelled,

    #[error("task could not be queued: {0}")]
    TaskAddFailed(String),

    #[error("result sink rejected the result: {0}")]
    Sink(String),

    #[error("engine has stopped")]
    EngineStopped,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VanityError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            VanityError::InvalidPattern { .. } => "INVALID_PATTERN",
            VanityError::InvalidLength { .. } => "INVALID_LENGTH",
            VanityError::PatternTooComplex { .. } => "PATTERN_TOO_COMPLEX",
            VanityError::Worker { .. } => "WORKER_ERROR",
            VanityError::Timeout { .. } => "TIMEOUT",
            VanityError::Cancelled => "CANCELLED",
            VanityError::TaskAddFailed(_) => "TASK_ADD_FAILED",
            VanityError::Sink(_) => "SINK_ERROR",
            VanityError::EngineStopped => "ENGINE_STOPPED",
            VanityError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Structured details for logging or API responses.
    pub fn details(&self) -> Value {
        match self {
            VanityError::InvalidPattern { character, index } => {
                json!({ "character": character.to_string(), "index": index })
            }
            VanityError::InvalidLength { length, min, max } => {
                json!({ "length": length, "min": min, "max": max })
            }
            VanityError::PatternTooComplex {
                expected_attempts,
                ceiling,
            } => json!({ "expectedAttempts": expected_attempts, "ceiling": ceiling }),
            VanityError::Worker { worker_id, reason } => {
                json!({ "workerId": worker_id, "reason": reason })
            }
            VanityError::Timeout { timeout, attempts } => {
                json!({ "timeoutMs": timeout.as_millis() as u64, "attempts": attempts })
            }
            VanityError::TaskAddFailed(reason)
            | VanityError::Sink(reason)
            | VanityError::Config(reason) => json!({ "reason": reason }),
            VanityError::Cancelled | VanityError::EngineStopped => Value::Null,
        }
    }

    /// Returns true for errors raised while checking a request, before any work ran.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VanityError::InvalidPattern { .. }
                | VanityError::InvalidLength { .. }
                | VanityError::PatternTooComplex { .. }
        )
    }
}
