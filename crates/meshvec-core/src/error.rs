//! Error types for the core crate.

use thiserror::Error;

/// Errors that can occur in the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value could not be parsed from its textual form.
    #[error("parse error: {0}")]
    Parse(String),

    /// A metadata payload exceeded the configured maximum size.
    #[error("metadata payload is {size} bytes, maximum is {max}")]
    MetadataTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A validation error occurred.
    #[error("validation error: {0}")]
    Validation(String),
}
