//! Error types for the core engine.

use thiserror::Error;

/// Errors that can occur in core engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A schedule entry's time field cannot be parsed as "HH:MM".
    #[error("malformed time input: {0:?}")]
    MalformedTime(String),

    /// Day index outside 0..=6.
    #[error("invalid day index: {0}")]
    InvalidDayIndex(usize),

    /// IO error reading the schedule source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schedule source is not valid JSON.
    #[error("schedule parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
