//! Scheduler error types.

use thiserror::Error;

/// Result type for scheduling operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while planning or running parallel work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed scheduler configuration.
    #[error("invalid scheduler argument: {0}")]
    InvalidArgument(String),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// An external interrupt stopped the batch before every list was done.
    #[error("sort cancelled after {completed} of {total} lists")]
    Cancelled {
        /// Lists sorted before the interrupt was seen.
        completed: usize,
        /// Lists in the batch.
        total: usize,
    },

    /// A sort task panicked.
    #[error("sort task panicked: {0}")]
    TaskPanicked(String),

    /// Core library error raised inside a task.
    #[error("core error: {0}")]
    Core(#[from] tofstore_core::Error),
}
