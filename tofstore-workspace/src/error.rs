//! Error types for workspace operations.

use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by [`crate::EventWorkspace`] and its summaries.
#[derive(Error, Debug)]
pub enum Error {
    /// Event list or histogram error.
    #[error(transparent)]
    Core(#[from] tofstore_core::Error),

    /// Parallel sort failure or bad scheduler configuration.
    #[error(transparent)]
    Scheduler(#[from] tofstore_algorithms::Error),

    /// Summary serialisation failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure while writing a summary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
