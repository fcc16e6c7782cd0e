//! Error taxonomy for a processing run.
//!
//! Everything here is terminal for the run except renderer failures, which
//! are recovered where they happen and only surface through the run summary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    /// Invalid or contradictory configuration. Raised before any record is read.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input data, including PE streams of unequal length.
    #[error("format error: {0}")]
    Format(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub fn config(msg: impl Into<String>) -> ProcessError {
        ProcessError::Config(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> ProcessError {
        ProcessError::Format(msg.into())
    }
}
