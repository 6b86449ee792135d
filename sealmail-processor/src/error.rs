//! Processor and collaborator error types.

use sealmail_crypto::CryptoError;
use sealmail_types::ModelError;
use thiserror::Error;

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Hard failures of processor operations.
///
/// Expected decrypt and verify failures are not errors: they come back as
/// [`crate::DecryptResult::Error`] or a [`sealmail_types::VerifyResult`].
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("no usable key: {0}")]
    NoUsableKey(String),

    #[error("recipients mix key families ({0}); request OpenPGP-only or S/MIME-only framing")]
    MixedFamilies(String),

    #[error("key store failure: {0}")]
    Store(String),

    #[error("worker task failed: {0}")]
    Task(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fatal assertion: {0}")]
    FatalAssertion(String),
}

impl From<ModelError> for ProcessorError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::FatalAssertion(msg) => Self::FatalAssertion(msg),
        }
    }
}

/// Failures of the public key lookup collaborator. Always recoverable: a
/// failed lookup leaves the signature in the missing-key state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup for {0} timed out")]
    Timeout(String),

    #[error("lookup request failed: {0}")]
    Network(String),

    #[error("lookup returned unusable key material: {0}")]
    InvalidKey(String),
}
