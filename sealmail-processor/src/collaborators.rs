//! Traits for the services the processor depends on but does not own.

use crate::error::{LookupError, ProcessorResult};
use async_trait::async_trait;
use sealmail_types::KeyInfo;
use zeroize::Zeroizing;

/// Account key storage.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Private keys of the account, in preference order.
    async fn decryption_keys(&self, acct_id: &str) -> ProcessorResult<Vec<KeyInfo>>;

    /// Remembered passphrase for one of the account's keys.
    async fn passphrase(&self, acct_id: &str, key_id: &str) -> ProcessorResult<Option<Zeroizing<String>>>;

    /// Saves a public key fetched during signature verification.
    async fn persist_fetched_pubkey(&self, email: &str, armored: &str) -> ProcessorResult<()>;
}

/// Public key directory (WKD, keyserver, attester, ...).
#[async_trait]
pub trait PubkeyLookup: Send + Sync {
    /// Armored public keys published for `email`. An empty list means the
    /// directory has nothing for that address.
    async fn lookup_by_email(&self, email: &str) -> Result<Vec<String>, LookupError>;
}
