//! Key material model and crypto backends for sealmail.
//!
//! Two key families are supported, each behind the [`CryptoBackend`] trait:
//! - OpenPGP via sequoia ([`OpenPgpBackend`])
//! - X.509 / S/MIME via openssl PKCS#7 ([`X509Backend`])
//!
//! Keys are parsed into normalized, immutable [`KeyInfo`] records. Unlocking
//! a private key yields a new record rather than mutating the old one.
//!
//! [`KeyInfo`]: sealmail_types::KeyInfo

pub mod backend;
mod error;
pub mod ids;
mod keys;
mod openpgp;
pub mod packet;
mod x509;

pub use backend::{
    CryptoBackend, Decrypted, DecryptionKey, SignMode, SignatureCheck, SignedData, backend_for,
};
pub use error::{CryptoError, CryptoResult};
pub use ids::{normalize, normalize_id};
pub use keys::{check_passphrase, decrypt_key, detect_family, message_family, parse, parse_many};
pub use openpgp::OpenPgpBackend;
pub use x509::X509Backend;
