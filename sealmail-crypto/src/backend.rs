//! The family backend seam.
//!
//! Every operation that depends on the key family goes through
//! [`CryptoBackend`]. [`backend_for`] is the single place a family is
//! mapped to an implementation.

use crate::error::CryptoResult;
use crate::openpgp::OpenPgpBackend;
use crate::x509::X509Backend;
use sealmail_types::{KeyFamily, KeyInfo};
use zeroize::Zeroizing;

/// A private key offered for decryption, with the passphrase that unlocks
/// it when it is still protected.
#[derive(Clone, Debug)]
pub struct DecryptionKey {
    pub key: KeyInfo,
    pub passphrase: Option<Zeroizing<String>>,
}

impl DecryptionKey {
    pub fn new(key: KeyInfo, passphrase: Option<Zeroizing<String>>) -> Self {
        Self { key, passphrase }
    }

    pub fn unlocked(key: KeyInfo) -> Self {
        Self {
            key,
            passphrase: None,
        }
    }
}

/// Signature found inside a decrypted message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureCheck {
    /// Issuer ids named by the signature, normalized.
    pub signer_ids: Vec<String>,
    /// `None` when no verification key matched an issuer.
    pub valid: Option<bool>,
}

/// Plaintext recovered by a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decrypted {
    pub content: Vec<u8>,
    pub signature: Option<SignatureCheck>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignMode {
    /// A separate signature over the exact input bytes.
    Detached,
    /// The data travels inside the signature (cleartext for OpenPGP).
    Inline,
}

/// Input to signature verification.
#[derive(Clone, Copy, Debug)]
pub enum SignedData<'a> {
    /// Cleartext-signed text or an opaque signed object.
    Inline(&'a [u8]),
    Detached { data: &'a [u8], signature: &'a [u8] },
}

impl SignedData<'_> {
    /// Bytes carrying the signature packets.
    pub fn signature_bytes(&self) -> &[u8] {
        match self {
            Self::Inline(bytes) => bytes,
            Self::Detached { signature, .. } => signature,
        }
    }
}

/// Family-specific key handling and message crypto. Implementations are
/// stateless and safe to call from blocking worker threads.
pub trait CryptoBackend: Send + Sync {
    fn family(&self) -> KeyFamily;

    /// Parses every key in `text`. Returned keys are normalized.
    fn parse_keys(&self, text: &str) -> CryptoResult<Vec<KeyInfo>>;

    /// Returns a new record whose private material is unprotected.
    fn decrypt_key(&self, key: &KeyInfo, passphrase: &str) -> CryptoResult<KeyInfo>;

    fn check_passphrase(&self, key: &KeyInfo, passphrase: &str) -> bool;

    /// Normalized recipient ids named by the message. Empty when the
    /// recipients are hidden or the format does not expose them.
    fn message_recipients(&self, message: &[u8]) -> CryptoResult<Vec<String>>;

    /// Normalized issuer ids named by a signature.
    fn signer_ids(&self, signature: &[u8]) -> CryptoResult<Vec<String>>;

    fn decrypt(
        &self,
        message: &[u8],
        keys: &[DecryptionKey],
        verification_keys: &[KeyInfo],
    ) -> CryptoResult<Decrypted>;

    fn encrypt(&self, plaintext: &[u8], recipients: &[KeyInfo], armor: bool) -> CryptoResult<Vec<u8>>;

    fn sign(
        &self,
        data: &[u8],
        key: &KeyInfo,
        passphrase: Option<&str>,
        mode: SignMode,
    ) -> CryptoResult<Vec<u8>>;

    /// True if at least one signature made by one of `keys` validates.
    fn verify(&self, signed: &SignedData<'_>, keys: &[KeyInfo]) -> CryptoResult<bool>;
}

static OPENPGP: OpenPgpBackend = OpenPgpBackend;
static X509: X509Backend = X509Backend;

pub fn backend_for(family: KeyFamily) -> &'static dyn CryptoBackend {
    match family {
        KeyFamily::OpenPgp => &OPENPGP,
        KeyFamily::X509 => &X509,
    }
}
