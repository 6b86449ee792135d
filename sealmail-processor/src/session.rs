//! Account-scoped orchestration over the processor.
//!
//! Loads the account's keys and remembered passphrases from the
//! [`KeyStore`], drives the per-block flows and, for signatures whose signer
//! is unknown, fetches the sender's public keys from [`PubkeyLookup`] and
//! retries within the configured budget.

use crate::cancel::CancelToken;
use crate::collaborators::{KeyStore, PubkeyLookup};
use crate::error::ProcessorResult;
use crate::flow::{DecryptFlow, VerifyFlow, VerifyState};
use crate::processor::{MessageProcessor, Passphrases, RenderContext, RenderOutcome};
use sealmail_types::{KeyInfo, MsgBlock};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct MessageSession {
    processor: Arc<MessageProcessor>,
    store: Arc<dyn KeyStore>,
    lookup: Arc<dyn PubkeyLookup>,
    acct_id: String,
}

impl MessageSession {
    pub fn new(
        processor: Arc<MessageProcessor>,
        store: Arc<dyn KeyStore>,
        lookup: Arc<dyn PubkeyLookup>,
        acct_id: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            store,
            lookup,
            acct_id: acct_id.into(),
        }
    }

    pub fn acct_id(&self) -> &str {
        &self.acct_id
    }

    /// Private keys of the account and the passphrases remembered for them.
    async fn load_keys(&self) -> ProcessorResult<(Vec<KeyInfo>, Passphrases)> {
        let keys = self.store.decryption_keys(&self.acct_id).await?;
        let mut passphrases = Passphrases::new();
        for key in &keys {
            if key.fully_decrypted() {
                continue;
            }
            if let Some(passphrase) = self.store.passphrase(&self.acct_id, key.id()).await? {
                passphrases.insert(key.id().to_string(), passphrase);
            }
        }
        debug!(
            "loaded {} key(s), {} remembered passphrase(s) for {}",
            keys.len(),
            passphrases.len(),
            self.acct_id
        );
        Ok((keys, passphrases))
    }

    /// Decrypts `block` with the account's keys. A flow left in
    /// `PassphraseNeeded` continues with [`MessageSession::continue_decrypt`].
    pub async fn decrypt(
        &self,
        block: MsgBlock,
        verification_keys: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<DecryptFlow> {
        let (keys, passphrases) = self.load_keys().await?;
        let mut flow = DecryptFlow::with_passphrases(block, passphrases);
        flow.decrypt(&self.processor, &keys, verification_keys, cancel)
            .await?;
        Ok(flow)
    }

    /// Supplies a passphrase for `key_id` and decrypts again.
    pub async fn continue_decrypt(
        &self,
        flow: &mut DecryptFlow,
        key_id: &str,
        passphrase: &str,
        verification_keys: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<()> {
        flow.supply_passphrase(key_id, passphrase)?;
        let keys = self.store.decryption_keys(&self.acct_id).await?;
        flow.decrypt(&self.processor, &keys, verification_keys, cancel)
            .await?;
        Ok(())
    }

    /// Verifies `block`. When the signer is unknown and `sender_email` is
    /// given, fetches the sender's published keys and retries, at most
    /// `max_pubkey_fetches` times. Lookup failures leave the flow in
    /// `MissingKey`.
    pub async fn verify(
        &self,
        block: MsgBlock,
        pubkeys: &[KeyInfo],
        sender_email: Option<&str>,
        cancel: &CancelToken,
    ) -> ProcessorResult<VerifyFlow> {
        let mut candidates = pubkeys.to_vec();
        let mut flow = VerifyFlow::new(block, self.processor.config().max_pubkey_fetches);
        flow.verify(&self.processor, &candidates, cancel).await?;

        let Some(email) = sender_email else {
            return Ok(flow);
        };
        while matches!(flow.state(), VerifyState::MissingKey(_)) && flow.begin_fetch() {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    flow.mark_cancelled();
                    break;
                }
                fetched = self.lookup.lookup_by_email(email) => fetched,
            };
            let armored = match fetched {
                Ok(armored) => armored,
                Err(err) => {
                    warn!("pubkey lookup for {email} failed: {err}");
                    break;
                }
            };

            let signer_ids = flow.signer_ids().to_vec();
            let mut found = 0;
            for text in &armored {
                let keys = match sealmail_crypto::parse_many(text) {
                    Ok(keys) => keys,
                    Err(err) => {
                        warn!("discarding unreadable key fetched for {email}: {err}");
                        continue;
                    }
                };
                let matching: Vec<KeyInfo> = keys
                    .into_iter()
                    .filter(|k| signer_ids.is_empty() || k.matches_any(&signer_ids))
                    .collect();
                if matching.is_empty() {
                    continue;
                }
                found += matching.len();
                candidates.extend(matching);
                // persistence is best effort; verification goes on without it
                if let Err(err) = self.store.persist_fetched_pubkey(email, text).await {
                    warn!("could not save pubkey fetched for {email}: {err}");
                }
            }
            if found == 0 {
                info!("no published key for {email} matches signer(s) {:?}", signer_ids);
                break;
            }
            flow.retry(&self.processor, &candidates, cancel).await?;
        }
        Ok(flow)
    }

    /// Renders a block sequence with the account's keys.
    pub async fn render(
        &self,
        blocks: &[MsgBlock],
        verification_keys: Vec<KeyInfo>,
        cancel: &CancelToken,
    ) -> ProcessorResult<RenderOutcome> {
        let (decryption_keys, passphrases) = self.load_keys().await?;
        let ctx = RenderContext {
            decryption_keys,
            passphrases,
            verification_keys,
        };
        let outcome = self.processor.render_blocks(blocks, &ctx, cancel).await?;
        if let RenderOutcome::Rendered(out) = &outcome {
            info!("rendered {} block(s) into {} for {}", blocks.len(), out.len(), self.acct_id);
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for MessageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSession")
            .field("acct_id", &self.acct_id)
            .finish_non_exhaustive()
    }
}
