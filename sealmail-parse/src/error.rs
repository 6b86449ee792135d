//! Structural parse errors.

use thiserror::Error;

/// Result type for fallible parse helpers.
pub type ParseResult<T> = Result<T, ParseError>;

/// Problems found while walking a message.
///
/// The walker never fails on these: it records them on the decoded message
/// and renders the affected part as plain text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("multipart entity {0} has no boundary parameter")]
    MissingBoundary(String),

    #[error("boundary {0:?} never appears in multipart body")]
    BoundaryNotFound(String),

    #[error("multipart body for boundary {0:?} is not terminated")]
    Unterminated(String),

    #[error("invalid {encoding} body: {reason}")]
    TransferEncoding { encoding: String, reason: String },

    #[error("MIME nesting deeper than {0} levels")]
    TooDeep(usize),
}
