//! Model invariant errors.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Raised when a block or block sequence breaks a structural invariant.
///
/// These are programming errors in whatever produced the blocks and must be
/// propagated to the caller, never rendered as a message state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("fatal assertion: {0}")]
    FatalAssertion(String),
}
