//! Processor configuration.

use sealmail_parse::ScanOptions;
use serde::{Deserialize, Serialize};

/// Configuration for [`crate::MessageProcessor`] and the flows it drives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// How many times a signature with a missing signer key may be retried
    /// after fetching public keys.
    pub max_pubkey_fetches: u32,

    /// Decrypt `encryptedAtt` blocks while rendering instead of leaving them
    /// for an explicit download.
    pub decrypt_attachments: bool,

    /// Scanner options used when re-scanning decrypted plaintext.
    pub scan: ScanOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_pubkey_fetches: 1,
            decrypt_attachments: true,
            scan: ScanOptions::default(),
        }
    }
}
