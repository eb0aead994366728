//! Core domain errors.

use thiserror::Error;

/// Core domain errors for the bridge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A domain object violates one of its construction invariants.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Inline file bytes are not valid base64.
    #[error("Invalid file bytes: {0}")]
    InvalidBytes(String),
}
