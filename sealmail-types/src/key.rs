//! Normalized key records shared by both key families.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two key families a message may be protected with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFamily {
    #[serde(rename = "openpgp")]
    OpenPgp,
    X509,
}

impl KeyFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenPgp => "openpgp",
            Self::X509 => "x509",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw fields of a [`KeyInfo`], filled in by a key parser.
#[derive(Clone, Debug, Default)]
pub struct KeyInfoParts {
    pub id: String,
    pub key_ids: Vec<String>,
    pub public: String,
    pub private: Option<String>,
    pub usable_for_encryption: bool,
    pub usable_for_signing: bool,
    pub fully_encrypted: bool,
    pub fully_decrypted: bool,
    pub revoked: bool,
    pub emails: Vec<String>,
    pub user_ids: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub algorithm: Option<String>,
}

/// Immutable key record.
///
/// A key is never modified in place: unlocking a private key or normalizing
/// its identifiers produces a new `KeyInfo` through [`KeyInfo::into_parts`]
/// and [`KeyInfo::from_parts`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    id: String,
    key_ids: Vec<String>,
    family: KeyFamily,
    public: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private: Option<String>,
    usable_for_encryption: bool,
    usable_for_signing: bool,
    fully_encrypted: bool,
    fully_decrypted: bool,
    #[serde(default)]
    revoked: bool,
    emails: Vec<String>,
    #[serde(default)]
    user_ids: Vec<String>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    algorithm: Option<String>,
}

impl KeyInfo {
    pub fn from_parts(family: KeyFamily, parts: KeyInfoParts) -> Self {
        Self {
            id: parts.id,
            key_ids: parts.key_ids,
            family,
            public: parts.public,
            private: parts.private,
            usable_for_encryption: parts.usable_for_encryption,
            usable_for_signing: parts.usable_for_signing,
            fully_encrypted: parts.fully_encrypted,
            fully_decrypted: parts.fully_decrypted,
            revoked: parts.revoked,
            emails: parts.emails,
            user_ids: parts.user_ids,
            created: parts.created,
            expiration: parts.expiration,
            algorithm: parts.algorithm,
        }
    }

    pub fn into_parts(self) -> (KeyFamily, KeyInfoParts) {
        (
            self.family,
            KeyInfoParts {
                id: self.id,
                key_ids: self.key_ids,
                public: self.public,
                private: self.private,
                usable_for_encryption: self.usable_for_encryption,
                usable_for_signing: self.usable_for_signing,
                fully_encrypted: self.fully_encrypted,
                fully_decrypted: self.fully_decrypted,
                revoked: self.revoked,
                emails: self.emails,
                user_ids: self.user_ids,
                created: self.created,
                expiration: self.expiration,
                algorithm: self.algorithm,
            },
        )
    }

    /// Primary identifier: OpenPGP fingerprint or X.509 serial.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Every identifier that may name this key in a recipient or issuer slot.
    pub fn key_ids(&self) -> &[String] {
        &self.key_ids
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn public(&self) -> &str {
        &self.public
    }

    pub fn private(&self) -> Option<&str> {
        self.private.as_deref()
    }

    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }

    pub fn usable_for_encryption(&self) -> bool {
        self.usable_for_encryption
    }

    pub fn usable_for_signing(&self) -> bool {
        self.usable_for_signing
    }

    /// Every secret key packet is passphrase protected.
    pub fn fully_encrypted(&self) -> bool {
        self.fully_encrypted
    }

    /// No secret key packet is passphrase protected.
    pub fn fully_decrypted(&self) -> bool {
        self.fully_decrypted
    }

    pub fn revoked(&self) -> bool {
        self.revoked
    }

    pub fn emails(&self) -> &[String] {
        &self.emails
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= at)
    }

    /// True if `id` (already normalized) names this key or one of its subkeys.
    pub fn has_id(&self, id: &str) -> bool {
        self.id == id || self.key_ids.iter().any(|k| k == id)
    }

    /// True if any of `ids` (already normalized) names this key.
    pub fn matches_any(&self, ids: &[String]) -> bool {
        ids.iter().any(|id| self.has_id(id))
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }
}

impl fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyInfo")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("key_ids", &self.key_ids)
            .field("private", &self.private.as_ref().map(|_| "<redacted>"))
            .field("usable_for_encryption", &self.usable_for_encryption)
            .field("usable_for_signing", &self.usable_for_signing)
            .field("fully_encrypted", &self.fully_encrypted)
            .field("fully_decrypted", &self.fully_decrypted)
            .field("revoked", &self.revoked)
            .field("emails", &self.emails)
            .field("expiration", &self.expiration)
            .finish()
    }
}
