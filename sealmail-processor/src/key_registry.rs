//! In-memory key store.
//!
//! Holds account private keys, remembered passphrases and public keys
//! fetched during verification. Thread-safe via `RwLock`.

use crate::collaborators::KeyStore;
use crate::error::ProcessorResult;
use async_trait::async_trait;
use sealmail_crypto::normalize_id;
use sealmail_types::KeyInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct MemoryKeyStore {
    keys: Arc<RwLock<HashMap<String, Vec<KeyInfo>>>>,
    passphrases: Arc<RwLock<HashMap<(String, String), Zeroizing<String>>>>,
    fetched: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            passphrases: Arc::new(RwLock::new(HashMap::new())),
            fetched: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Adds a key to an account, replacing any key with the same id.
    pub async fn insert_key(&self, acct_id: &str, key: KeyInfo) {
        let mut keys = self.keys.write().await;
        let entry = keys.entry(acct_id.to_string()).or_default();
        entry.retain(|k| k.id() != key.id());
        entry.push(key);
    }

    pub async fn remove_key(&self, acct_id: &str, key_id: &str) -> Option<KeyInfo> {
        let id = normalize_id(key_id);
        let mut keys = self.keys.write().await;
        let entry = keys.get_mut(acct_id)?;
        let at = entry.iter().position(|k| k.has_id(&id))?;
        Some(entry.remove(at))
    }

    pub async fn set_passphrase(&self, acct_id: &str, key_id: &str, passphrase: &str) {
        self.passphrases.write().await.insert(
            (acct_id.to_string(), normalize_id(key_id)),
            Zeroizing::new(passphrase.to_string()),
        );
    }

    pub async fn forget_passphrase(&self, acct_id: &str, key_id: &str) -> bool {
        self.passphrases
            .write()
            .await
            .remove(&(acct_id.to_string(), normalize_id(key_id)))
            .is_some()
    }

    /// Armored public keys persisted for `email`.
    pub async fn fetched_pubkeys(&self, email: &str) -> Vec<String> {
        self.fetched
            .read()
            .await
            .get(&email.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self, acct_id: &str) -> usize {
        self.keys.read().await.get(acct_id).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, acct_id: &str) -> bool {
        self.len(acct_id).await == 0
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn decryption_keys(&self, acct_id: &str) -> ProcessorResult<Vec<KeyInfo>> {
        Ok(self
            .keys
            .read()
            .await
            .get(acct_id)
            .map(|keys| keys.iter().filter(|k| k.is_private()).cloned().collect())
            .unwrap_or_default())
    }

    async fn passphrase(&self, acct_id: &str, key_id: &str) -> ProcessorResult<Option<Zeroizing<String>>> {
        Ok(self
            .passphrases
            .read()
            .await
            .get(&(acct_id.to_string(), normalize_id(key_id)))
            .cloned())
    }

    async fn persist_fetched_pubkey(&self, email: &str, armored: &str) -> ProcessorResult<()> {
        let mut fetched = self.fetched.write().await;
        let entry = fetched.entry(email.to_lowercase()).or_default();
        if !entry.iter().any(|k| k == armored) {
            entry.push(armored.to_string());
        }
        Ok(())
    }
}
