//! Key and backend error types.

use thiserror::Error;

/// Result type for key parsing and crypto backend operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised while parsing keys or running a family backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unexpected key type: {0}")]
    UnexpectedKeyType(String),

    #[error("malformed key: {0}")]
    KeyParse(String),

    #[error("wrong passphrase for key {0}")]
    WrongPassphrase(String),

    #[error("passphrase needed for key {0}")]
    NeedPassphrase(String),

    #[error("no usable key: {0}")]
    NoUsableKey(String),

    #[error("key does not match message: {0}")]
    KeyMismatch(String),

    #[error("corrupted ciphertext: {0}")]
    CorruptedCiphertext(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported message format: {0}")]
    UnsupportedFormat(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<openssl::error::ErrorStack> for CryptoError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Backend(err.to_string())
    }
}
