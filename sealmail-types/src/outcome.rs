//! Signature and decryption outcomes attached to rendered blocks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of checking a signed block against candidate public keys.
///
/// `matched` is tri-state: `None` when no candidate key intersects the
/// signer ids (validity unknown), `Some(false)` when verification ran and no
/// signature validated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    #[serde(rename = "match")]
    pub matched: Option<bool>,
    pub signer_ids: Vec<String>,
    pub supplied_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_error_fatal: bool,
}

impl VerifyResult {
    /// A result for signatures whose signer is not among the candidates.
    pub fn unknown_signer(signer_ids: Vec<String>, supplied_ids: Vec<String>) -> Self {
        Self {
            matched: None,
            signer_ids,
            supplied_ids,
            error: None,
            is_error_fatal: false,
        }
    }

    /// A result for signatures that could not be checked at all.
    pub fn fatal(error: impl Into<String>, supplied_ids: Vec<String>) -> Self {
        Self {
            matched: None,
            signer_ids: Vec::new(),
            supplied_ids,
            error: Some(error.into()),
            is_error_fatal: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.matched == Some(true)
    }

    /// True when a signer's public key was not available.
    pub fn is_missing_key(&self) -> bool {
        self.matched.is_none() && !self.is_error_fatal
    }
}

/// Why decrypting a block failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecryptErrorKind {
    /// A private key matched a recipient slot but could not recover the session key.
    KeyMismatch,
    WrongPassphrase,
    /// A matching private key is locked and no passphrase was supplied.
    NeedPassphrase,
    UnsupportedFormat,
    CorruptedData,
    /// No private key of the message's family matches any recipient.
    NoUsableKey,
}

impl DecryptErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyMismatch => "keyMismatch",
            Self::WrongPassphrase => "wrongPassphrase",
            Self::NeedPassphrase => "needPassphrase",
            Self::UnsupportedFormat => "unsupportedFormat",
            Self::CorruptedData => "corruptedData",
            Self::NoUsableKey => "noUsableKey",
        }
    }
}

impl fmt::Display for DecryptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decryption failure carried by a `decryptErr` block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptError {
    pub kind: DecryptErrorKind,
    pub message: String,
    /// Keys the renderer should prompt a passphrase for (`needPassphrase`,
    /// `wrongPassphrase`), or the recipients the message was encrypted for.
    #[serde(default)]
    pub key_ids: Vec<String>,
}

impl DecryptError {
    pub fn new(kind: DecryptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            key_ids: Vec::new(),
        }
    }

    pub fn with_key_ids(mut self, key_ids: Vec<String>) -> Self {
        self.key_ids = key_ids;
        self
    }
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
