//! Error types for tofstore-core.

use thiserror::Error;

/// Result type alias for tofstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for event storage operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Spectrum or bin index outside the valid range.
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation not valid for the current list state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed argument or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Scalar division by zero.
    #[error("cannot divide an event list by zero")]
    DivideByZero,
}

impl Error {
    /// Checks `index` against `len`, returning `IndexOutOfRange` if outside.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] when `index >= len`.
    pub fn check_index(index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(Self::IndexOutOfRange { index, len })
        }
    }
}
