use std::fmt;
use thiserror::Error;

/// Main error type for benchtrack
#[derive(Error, Debug)]
pub enum BenchtrackError {
    /// Malformed user input (e.g. a bad compare token). Surfaced to the
    /// caller for a friendly message, never logged as a system fault.
    #[error("validation error: {0}")]
    Validation(String),

    /// An identifier the caller supplied does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Valid inputs, but zero matched benchmark/case pairs. Surfaced
    /// distinctly so the caller can render a "no overlap" message.
    #[error("comparison yielded no matching benchmark/case pairs")]
    EmptyComparison,

    /// A result store call failed or timed out. Fatal for the refresh
    /// cycle or comparison call that triggered it.
    #[error("result store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Names the kind of entity a failed lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    BenchmarkResult,
    Run,
    BenchmarkName,
    Case,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::BenchmarkResult => "benchmark result",
            EntityKind::Run => "run",
            EntityKind::BenchmarkName => "benchmark name",
            EntityKind::Case => "case",
        };
        f.write_str(s)
    }
}

impl BenchtrackError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        BenchtrackError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchtrackError>;
