//! Error taxonomy for the authorization engine.

use thiserror::Error;

/// Result type used across the engine.
pub type PassportResult<T> = Result<T, PassportError>;

/// Engine-level error.
///
/// `InvalidReference` is a programming/input error and short-circuits before
/// any store access. `Store` wraps an underlying transport or transaction
/// failure with the name of the operation that issued it; the engine performs
/// no retries and no further classification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassportError {
    /// A reference value had an unsupported or mixed-type shape.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Resolution yielded zero records where exactly one was required.
    #[error("not found")]
    NotFound,

    /// The underlying store failed. Carries the calling operation's name.
    #[error("{operation}: store failure: {message}")]
    Store { operation: String, message: String },
}

impl PassportError {
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn store(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
