//! Per-block state machines for the renderer.
//!
//! ```text
//! VerifyFlow:  Detected -> Verifying -> Verified | VerifyFailed | MissingKey
//!              MissingKey -(fetch, bounded)-> Verifying
//!
//! DecryptFlow: Detected -> Decrypting -> Decrypted | DecryptFailed | PassphraseNeeded
//!              PassphraseNeeded -(passphrase supplied)-> Decrypting
//! ```
//!
//! Either flow moves to `Cancelled` when its token fires mid-operation.

use crate::cancel::CancelToken;
use crate::error::{ProcessorError, ProcessorResult};
use crate::processor::{DecryptResult, MessageProcessor, Passphrases, VerifyOutcome};
use sealmail_crypto::normalize_id;
use sealmail_types::{DecryptError, DecryptErrorKind, KeyInfo, MsgBlock, VerifyResult};
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Clone, Debug, PartialEq)]
pub enum VerifyState {
    Detected,
    Verifying,
    Verified(VerifyResult),
    /// Verification ran but no signature validated, or it could not run.
    VerifyFailed(VerifyResult),
    /// No candidate key matches a signer.
    MissingKey(VerifyResult),
    Cancelled,
}

impl VerifyState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Verifying => "verifying",
            Self::Verified(_) => "verified",
            Self::VerifyFailed(_) => "verifyFailed",
            Self::MissingKey(_) => "missingKey",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn result(&self) -> Option<&VerifyResult> {
        match self {
            Self::Verified(r) | Self::VerifyFailed(r) | Self::MissingKey(r) => Some(r),
            _ => None,
        }
    }
}

pub struct VerifyFlow {
    block: MsgBlock,
    state: VerifyState,
    fetches: u32,
    max_fetches: u32,
    fetch_pending: bool,
}

impl VerifyFlow {
    pub fn new(block: MsgBlock, max_fetches: u32) -> Self {
        Self {
            block,
            state: VerifyState::Detected,
            fetches: 0,
            max_fetches,
            fetch_pending: false,
        }
    }

    pub fn block(&self) -> &MsgBlock {
        &self.block
    }

    pub fn state(&self) -> &VerifyState {
        &self.state
    }

    /// Key fetches spent so far.
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    /// Signer ids from the last attempt.
    pub fn signer_ids(&self) -> &[String] {
        self.state
            .result()
            .map(|r| r.signer_ids.as_slice())
            .unwrap_or_default()
    }

    /// Runs the first verification.
    pub async fn verify(
        &mut self,
        processor: &MessageProcessor,
        candidates: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<&VerifyState> {
        if self.state != VerifyState::Detected {
            return Err(ProcessorError::FatalAssertion(format!(
                "verify started from {}",
                self.state.name()
            )));
        }
        self.run(processor, candidates, cancel).await
    }

    /// Spends one key fetch. Returns false when the flow is not missing a
    /// key or the fetch budget is used up; the caller must not retry then.
    pub fn begin_fetch(&mut self) -> bool {
        if !matches!(self.state, VerifyState::MissingKey(_)) || self.fetches >= self.max_fetches {
            return false;
        }
        self.fetches += 1;
        self.fetch_pending = true;
        true
    }

    /// Verifies again after a fetch begun with [`VerifyFlow::begin_fetch`].
    pub async fn retry(
        &mut self,
        processor: &MessageProcessor,
        candidates: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<&VerifyState> {
        if !self.fetch_pending {
            return Err(ProcessorError::FatalAssertion(
                "verify retried without a key fetch".into(),
            ));
        }
        self.fetch_pending = false;
        self.run(processor, candidates, cancel).await
    }

    pub fn mark_cancelled(&mut self) {
        self.fetch_pending = false;
        self.state = VerifyState::Cancelled;
    }

    async fn run(
        &mut self,
        processor: &MessageProcessor,
        candidates: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<&VerifyState> {
        self.state = VerifyState::Verifying;
        self.state = match processor.verify(&self.block, candidates, cancel).await? {
            VerifyOutcome::Cancelled => VerifyState::Cancelled,
            VerifyOutcome::Completed(result) if result.is_valid() => VerifyState::Verified(result),
            VerifyOutcome::Completed(result) if result.is_missing_key() => {
                VerifyState::MissingKey(result)
            }
            VerifyOutcome::Completed(result) => VerifyState::VerifyFailed(result),
        };
        debug!("verify flow now {} after {} fetch(es)", self.state.name(), self.fetches);
        Ok(&self.state)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecryptState {
    Detected,
    Decrypting,
    Decrypted {
        content: Vec<u8>,
        blocks: Vec<MsgBlock>,
        signature: Option<VerifyResult>,
    },
    DecryptFailed(DecryptError),
    /// Protected candidate keys are waiting for a passphrase.
    PassphraseNeeded { key_ids: Vec<String> },
    Cancelled,
}

impl DecryptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Decrypting => "decrypting",
            Self::Decrypted { .. } => "decrypted",
            Self::DecryptFailed(_) => "decryptFailed",
            Self::PassphraseNeeded { .. } => "passphraseNeeded",
            Self::Cancelled => "cancelled",
        }
    }
}

pub struct DecryptFlow {
    block: MsgBlock,
    state: DecryptState,
    passphrases: Passphrases,
    attempts: u32,
    supplied: bool,
}

impl DecryptFlow {
    pub fn new(block: MsgBlock) -> Self {
        Self::with_passphrases(block, Passphrases::new())
    }

    /// Starts with passphrases remembered from earlier sessions.
    pub fn with_passphrases(block: MsgBlock, passphrases: Passphrases) -> Self {
        Self {
            block,
            state: DecryptState::Detected,
            passphrases,
            attempts: 0,
            supplied: false,
        }
    }

    pub fn block(&self) -> &MsgBlock {
        &self.block
    }

    pub fn state(&self) -> &DecryptState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a passphrase typed by the user. Allowed only while a
    /// passphrase is needed or the last one was wrong.
    pub fn supply_passphrase(&mut self, key_id: &str, passphrase: &str) -> ProcessorResult<()> {
        let accepts = match &self.state {
            DecryptState::PassphraseNeeded { .. } => true,
            DecryptState::DecryptFailed(err) => err.kind == DecryptErrorKind::WrongPassphrase,
            _ => false,
        };
        if !accepts {
            return Err(ProcessorError::FatalAssertion(format!(
                "passphrase supplied in {}",
                self.state.name()
            )));
        }
        self.passphrases
            .insert(normalize_id(key_id), Zeroizing::new(passphrase.to_string()));
        self.supplied = true;
        Ok(())
    }

    /// Decrypts from `Detected`, or again once a passphrase was supplied.
    pub async fn decrypt(
        &mut self,
        processor: &MessageProcessor,
        keys: &[KeyInfo],
        verification_keys: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<&DecryptState> {
        let ready = self.state == DecryptState::Detected || self.supplied;
        if !ready {
            return Err(ProcessorError::FatalAssertion(format!(
                "decrypt started from {}",
                self.state.name()
            )));
        }
        self.supplied = false;
        self.attempts += 1;
        self.state = DecryptState::Decrypting;
        let result = processor
            .decrypt(&self.block, keys, &self.passphrases, verification_keys, cancel)
            .await?;
        self.state = match result {
            DecryptResult::Success {
                content,
                blocks,
                signature,
            } => DecryptState::Decrypted {
                content,
                blocks,
                signature,
            },
            DecryptResult::Error(err) if err.kind == DecryptErrorKind::NeedPassphrase => {
                DecryptState::PassphraseNeeded {
                    key_ids: err.key_ids,
                }
            }
            DecryptResult::Error(err) => DecryptState::DecryptFailed(err),
            DecryptResult::Cancelled => DecryptState::Cancelled,
        };
        debug!("decrypt flow now {} after {} attempt(s)", self.state.name(), self.attempts);
        Ok(&self.state)
    }
}
