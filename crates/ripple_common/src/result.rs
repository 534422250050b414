//! Common result and error types for the Ripple engine.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates a logic error inside the engine (for example an invalid
/// propagator state transition), not a user-facing problem. Cache and compile
/// problems are reported as diagnostics and degrade to a full rebuild.
pub type RippleResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in the engine, not a user input problem.
#[derive(Debug, thiserror::Error)]
#[error("internal engine error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
