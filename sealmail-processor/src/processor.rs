//! Decrypt, verify, encrypt and sign over message blocks.
//!
//! The processor is stateless between calls: every operation takes the keys
//! and passphrases it may use. Expected crypto failures are returned as data
//! ([`DecryptResult::Error`], a [`VerifyResult`]) so the renderer can show
//! them; only invariant violations and worker failures are `Err`.

use crate::cancel::{CancelToken, run_blocking};
use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, ProcessorResult};
use chrono::Utc;
use sealmail_crypto::{
    CryptoError, DecryptionKey, SignMode, SignedData, backend_for, message_family,
};
use sealmail_parse::mime::looks_like_mime;
use sealmail_parse::{clearsigned_text, decode_mime, detect_blocks_with};
use sealmail_types::{
    AttachmentMeta, BlockContent, BlockDetails, BlockType, DecryptError, DecryptErrorKind,
    KeyFamily, KeyInfo, MsgBlock, VerifyResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Passphrases keyed by normalized key id.
pub type Passphrases = HashMap<String, Zeroizing<String>>;

/// Outcome of decrypting one block.
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptResult {
    Success {
        /// Raw plaintext.
        content: Vec<u8>,
        /// Plaintext re-scanned into blocks (`decrypted*` types).
        blocks: Vec<MsgBlock>,
        /// Signature embedded in the encrypted message, if any.
        signature: Option<VerifyResult>,
    },
    Error(DecryptError),
    Cancelled,
}

/// Outcome of verifying one signed block.
#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    Completed(VerifyResult),
    Cancelled,
}

/// Outcome of rendering a block sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Rendered(Vec<MsgBlock>),
    Cancelled,
}

/// How recipients of different key families are handled on encryption.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Framing {
    /// Use the single family all usable recipients share; mixing families
    /// is an error.
    #[default]
    Auto,
    OpenPgpOnly,
    SmimeOnly,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptOptions {
    pub framing: Framing,
    /// ASCII armor (OpenPGP) or PEM (S/MIME) instead of binary output.
    pub armor: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            framing: Framing::Auto,
            armor: true,
        }
    }
}

/// Keys available while rendering a message.
#[derive(Clone, Debug, Default)]
pub struct RenderContext {
    pub decryption_keys: Vec<KeyInfo>,
    pub passphrases: Passphrases,
    /// Public keys of possible signers.
    pub verification_keys: Vec<KeyInfo>,
}

pub struct MessageProcessor {
    config: ProcessorConfig,
}

impl MessageProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    // ── Decrypt ──

    /// Decrypts an `encryptedMsg` or `encryptedAtt` block.
    ///
    /// Keys are narrowed to the private keys of the message's family whose
    /// ids intersect the recipients; hidden recipients make every key of
    /// the family a candidate. Protected keys need a passphrase in
    /// `passphrases` under any of their ids.
    pub async fn decrypt(
        &self,
        block: &MsgBlock,
        keys: &[KeyInfo],
        passphrases: &Passphrases,
        verification_keys: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<DecryptResult> {
        if !matches!(block.block_type, BlockType::EncryptedMsg | BlockType::EncryptedAtt) {
            return Err(ProcessorError::FatalAssertion(format!(
                "cannot decrypt a {} block",
                block.block_type
            )));
        }
        if !block.complete {
            return Ok(DecryptResult::Error(DecryptError::new(
                DecryptErrorKind::UnsupportedFormat,
                "encrypted message is incomplete",
            )));
        }

        let message = block.content.as_bytes().to_vec();
        let Some(family) = message_family(&message) else {
            return Ok(DecryptResult::Error(DecryptError::new(
                DecryptErrorKind::UnsupportedFormat,
                "not an OpenPGP or S/MIME message",
            )));
        };
        let backend = backend_for(family);

        let private: Vec<&KeyInfo> = keys
            .iter()
            .filter(|k| k.family() == family && k.is_private())
            .collect();
        if private.is_empty() {
            return Ok(DecryptResult::Error(DecryptError::new(
                DecryptErrorKind::NoUsableKey,
                format!("no {family} private key available"),
            )));
        }

        let recipients = match backend.message_recipients(&message) {
            Ok(ids) => ids,
            Err(err) => return Ok(DecryptResult::Error(decrypt_error(err))),
        };
        let candidates: Vec<KeyInfo> = private
            .into_iter()
            .filter(|k| recipients.is_empty() || k.matches_any(&recipients))
            .cloned()
            .collect();
        if candidates.is_empty() {
            debug!("none of {} private key(s) match recipients {:?}", keys.len(), recipients);
            return Ok(DecryptResult::Error(
                DecryptError::new(
                    DecryptErrorKind::NoUsableKey,
                    "message is not encrypted for any available key",
                )
                .with_key_ids(recipients),
            ));
        }

        let supplied: Vec<Option<Zeroizing<String>>> = candidates
            .iter()
            .map(|k| passphrase_for(passphrases, k))
            .collect();
        let embedded_supplied =
            supplied_ids(verification_keys.iter().filter(|k| k.family() == family));
        let verification_keys = verification_keys.to_vec();
        let attempt = run_blocking(cancel, move || {
            attempt_decrypt(family, &message, candidates, supplied, &verification_keys)
        })
        .await?;

        let decrypted = match attempt {
            None => {
                info!("decryption cancelled");
                return Ok(DecryptResult::Cancelled);
            }
            Some(Err(err)) => {
                debug!("decryption failed: {}", err.message);
                return Ok(DecryptResult::Error(err));
            }
            Some(Ok(decrypted)) => decrypted,
        };

        let signature = decrypted.signature.map(|check| VerifyResult {
            matched: check.valid,
            signer_ids: check.signer_ids,
            supplied_ids: embedded_supplied,
            error: None,
            is_error_fatal: false,
        });
        let blocks = match block.block_type {
            BlockType::EncryptedAtt => vec![decrypted_attachment(block, &decrypted.content)],
            _ => self.rescan(&decrypted.content),
        };
        info!("decrypted {} message into {} block(s)", family, blocks.len());
        Ok(DecryptResult::Success {
            content: decrypted.content,
            blocks,
            signature,
        })
    }

    /// Scans decrypted plaintext once, as MIME when it carries MIME headers
    /// and as armored text otherwise.
    fn rescan(&self, content: &[u8]) -> Vec<MsgBlock> {
        let blocks = if looks_like_mime(content) {
            decode_mime(content).blocks_with(&self.config.scan)
        } else {
            detect_blocks_with(&String::from_utf8_lossy(content), &self.config.scan).blocks
        };
        blocks.into_iter().map(into_decrypted).collect()
    }

    // ── Verify ──

    /// Verifies a `signedMsg` or `signedHtml` block against candidate
    /// public keys. Only candidates named by the signature are used; when
    /// none are, validity is unknown (`matched == None`).
    pub async fn verify(
        &self,
        block: &MsgBlock,
        candidates: &[KeyInfo],
        cancel: &CancelToken,
    ) -> ProcessorResult<VerifyOutcome> {
        if !matches!(block.block_type, BlockType::SignedMsg | BlockType::SignedHtml) {
            return Err(ProcessorError::FatalAssertion(format!(
                "cannot verify a {} block",
                block.block_type
            )));
        }
        let all_ids = supplied_ids(candidates.iter());
        let Some(signature) = block.signature.as_deref().filter(|_| block.complete) else {
            return Ok(VerifyOutcome::Completed(VerifyResult::fatal(
                "signed message has no signature",
                all_ids,
            )));
        };
        let Some(family) = message_family(signature.as_bytes()) else {
            return Ok(VerifyOutcome::Completed(VerifyResult::fatal(
                "unrecognized signature format",
                all_ids,
            )));
        };
        let backend = backend_for(family);
        let family_keys: Vec<KeyInfo> = candidates
            .iter()
            .filter(|k| k.family() == family)
            .cloned()
            .collect();
        let supplied = supplied_ids(family_keys.iter());

        let signer_ids = match backend.signer_ids(signature.as_bytes()) {
            Ok(ids) => ids,
            Err(err) => {
                return Ok(VerifyOutcome::Completed(VerifyResult::fatal(
                    err.to_string(),
                    supplied,
                )));
            }
        };
        let signers: Vec<KeyInfo> = family_keys
            .into_iter()
            .filter(|k| k.matches_any(&signer_ids))
            .collect();
        if signers.is_empty() {
            debug!("no candidate key for signer(s) {:?}", signer_ids);
            return Ok(VerifyOutcome::Completed(VerifyResult::unknown_signer(
                signer_ids, supplied,
            )));
        }

        let detached = block.is_detached_signed();
        let data = if detached {
            block.content.as_bytes().to_vec()
        } else {
            block.content.to_text().into_owned().into_bytes()
        };
        let signature = signature.as_bytes().to_vec();
        let checked = run_blocking(cancel, move || {
            let signed = if detached {
                SignedData::Detached {
                    data: &data,
                    signature: &signature,
                }
            } else {
                SignedData::Inline(&data)
            };
            backend.verify(&signed, &signers)
        })
        .await?;

        let result = match checked {
            None => return Ok(VerifyOutcome::Cancelled),
            Some(Ok(valid)) => VerifyResult {
                matched: Some(valid),
                signer_ids,
                supplied_ids: supplied,
                error: None,
                is_error_fatal: false,
            },
            Some(Err(err)) => {
                warn!("signature check failed: {err}");
                VerifyResult {
                    signer_ids,
                    ..VerifyResult::fatal(err.to_string(), supplied)
                }
            }
        };
        info!("verified {} signature: match={:?}", family, result.matched);
        Ok(VerifyOutcome::Completed(result))
    }

    // ── Encrypt & sign ──

    /// Encrypts `plaintext` for every recipient key usable for encryption.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        recipients: &[KeyInfo],
        options: &EncryptOptions,
    ) -> ProcessorResult<Vec<u8>> {
        let now = Utc::now();
        let usable: Vec<KeyInfo> = recipients
            .iter()
            .filter(|k| k.usable_for_encryption() && !k.revoked() && !k.is_expired_at(now))
            .filter(|k| match options.framing {
                Framing::Auto => true,
                Framing::OpenPgpOnly => k.family() == KeyFamily::OpenPgp,
                Framing::SmimeOnly => k.family() == KeyFamily::X509,
            })
            .cloned()
            .collect();
        let Some(family) = usable.first().map(KeyInfo::family) else {
            return Err(ProcessorError::NoUsableKey(format!(
                "none of {} recipient key(s) can encrypt",
                recipients.len()
            )));
        };
        if usable.iter().any(|k| k.family() != family) {
            return Err(ProcessorError::MixedFamilies(format!(
                "{} and {}",
                KeyFamily::OpenPgp,
                KeyFamily::X509
            )));
        }

        let count = usable.len();
        let armor = options.armor;
        let plaintext = plaintext.to_vec();
        let encrypted = run_blocking(&CancelToken::none(), move || {
            backend_for(family).encrypt(&plaintext, &usable, armor)
        })
        .await?
        .ok_or_else(|| ProcessorError::Task("encryption worker cancelled".into()))??;
        info!("encrypted {} message for {} recipient key(s)", family, count);
        Ok(encrypted)
    }

    /// Signs `data` with a private key. Detached output is a separate
    /// signature; otherwise the data travels inside the signature.
    pub async fn sign(
        &self,
        data: &[u8],
        key: &KeyInfo,
        passphrase: Option<&str>,
        detached: bool,
    ) -> ProcessorResult<Vec<u8>> {
        if !key.is_private() {
            return Err(ProcessorError::NoUsableKey(format!(
                "key {} has no private part",
                key.id()
            )));
        }
        let mode = if detached {
            SignMode::Detached
        } else {
            SignMode::Inline
        };
        let data = data.to_vec();
        let key = key.clone();
        let passphrase = passphrase.map(|p| Zeroizing::new(p.to_string()));
        let signed = run_blocking(&CancelToken::none(), move || {
            backend_for(key.family()).sign(&data, &key, passphrase.as_deref().map(String::as_str), mode)
        })
        .await?
        .ok_or_else(|| ProcessorError::Task("signing worker cancelled".into()))??;
        debug!("signed {} bytes ({:?})", signed.len(), mode);
        Ok(signed)
    }

    // ── Render ──

    /// Resolves every block that needs crypto: keys get their details,
    /// encrypted blocks are decrypted (or become `decryptErr`), signed
    /// blocks are verified. Cancellation abandons the whole render.
    pub async fn render_blocks(
        &self,
        blocks: &[MsgBlock],
        ctx: &RenderContext,
        cancel: &CancelToken,
    ) -> ProcessorResult<RenderOutcome> {
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            if cancel.is_cancelled() {
                return Ok(RenderOutcome::Cancelled);
            }
            match block.block_type {
                BlockType::PublicKey | BlockType::PrivateKey => out.push(render_key(block)),
                BlockType::EncryptedMsg | BlockType::EncryptedAtt if block.complete => {
                    if block.block_type == BlockType::EncryptedAtt && !self.config.decrypt_attachments {
                        out.push(block.clone());
                        continue;
                    }
                    let result = self
                        .decrypt(
                            block,
                            &ctx.decryption_keys,
                            &ctx.passphrases,
                            &ctx.verification_keys,
                            cancel,
                        )
                        .await?;
                    match result {
                        DecryptResult::Success {
                            blocks, signature, ..
                        } => out.extend(
                            with_embedded_signature(blocks, signature)
                                .into_iter()
                                .map(render_nested_key),
                        ),
                        DecryptResult::Error(err) => out.push(
                            MsgBlock::new(BlockType::DecryptErr, block.content.clone())
                                .with_details(BlockDetails::DecryptError(err)),
                        ),
                        DecryptResult::Cancelled => return Ok(RenderOutcome::Cancelled),
                    }
                }
                BlockType::SignedMsg | BlockType::SignedHtml if block.complete => {
                    match self.verify(block, &ctx.verification_keys, cancel).await? {
                        VerifyOutcome::Completed(result) => out.push(verified_block(block, result)),
                        VerifyOutcome::Cancelled => return Ok(RenderOutcome::Cancelled),
                    }
                }
                _ => out.push(block.clone()),
            }
        }
        for block in &out {
            block.validate_rendered()?;
        }
        Ok(RenderOutcome::Rendered(out))
    }
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

/// Checks passphrases, then runs the backend. Runs on a blocking worker.
fn attempt_decrypt(
    family: KeyFamily,
    message: &[u8],
    candidates: Vec<KeyInfo>,
    supplied: Vec<Option<Zeroizing<String>>>,
    verification_keys: &[KeyInfo],
) -> Result<sealmail_crypto::Decrypted, DecryptError> {
    let backend = backend_for(family);
    let mut offered = Vec::new();
    let mut missing = Vec::new();
    let mut wrong = Vec::new();
    for (key, passphrase) in candidates.into_iter().zip(supplied) {
        if key.fully_decrypted() {
            offered.push(DecryptionKey::unlocked(key));
            continue;
        }
        match passphrase {
            None => missing.push(key.id().to_string()),
            Some(p) if backend.check_passphrase(&key, &p) => {
                offered.push(DecryptionKey::new(key, Some(p)));
            }
            Some(_) => wrong.push(key.id().to_string()),
        }
    }

    let locked_out = |fallback: DecryptError| {
        if !missing.is_empty() {
            DecryptError::new(DecryptErrorKind::NeedPassphrase, "passphrase needed to decrypt")
                .with_key_ids(missing.clone())
        } else if !wrong.is_empty() {
            DecryptError::new(DecryptErrorKind::WrongPassphrase, "wrong passphrase")
                .with_key_ids(wrong.clone())
        } else {
            fallback
        }
    };

    if offered.is_empty() {
        return Err(locked_out(DecryptError::new(
            DecryptErrorKind::NoUsableKey,
            "no candidate key could be unlocked",
        )));
    }
    match backend.decrypt(message, &offered, verification_keys) {
        Ok(decrypted) => Ok(decrypted),
        // the right key may be one still waiting for its passphrase
        Err(err @ CryptoError::KeyMismatch(_)) => Err(locked_out(decrypt_error(err))),
        Err(err) => Err(decrypt_error(err)),
    }
}

fn decrypt_error(err: CryptoError) -> DecryptError {
    let kind = match &err {
        CryptoError::KeyMismatch(_) => DecryptErrorKind::KeyMismatch,
        CryptoError::WrongPassphrase(_) => DecryptErrorKind::WrongPassphrase,
        CryptoError::NeedPassphrase(_) => DecryptErrorKind::NeedPassphrase,
        CryptoError::NoUsableKey(_) | CryptoError::KeyParse(_) => DecryptErrorKind::NoUsableKey,
        CryptoError::CorruptedCiphertext(_) | CryptoError::Backend(_) => {
            DecryptErrorKind::CorruptedData
        }
        CryptoError::UnsupportedFormat(_)
        | CryptoError::UnsupportedKeyType(_)
        | CryptoError::UnexpectedKeyType(_) => DecryptErrorKind::UnsupportedFormat,
    };
    DecryptError::new(kind, err.to_string())
}

fn passphrase_for(passphrases: &Passphrases, key: &KeyInfo) -> Option<Zeroizing<String>> {
    std::iter::once(key.id())
        .chain(key.key_ids().iter().map(String::as_str))
        .find_map(|id| passphrases.get(id))
        .cloned()
}

/// Primary ids of `keys`, de-duplicated.
fn supplied_ids<'a>(keys: impl Iterator<Item = &'a KeyInfo>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for key in keys {
        if !ids.iter().any(|id| id == key.id()) {
            ids.push(key.id().to_string());
        }
    }
    ids
}

fn into_decrypted(mut block: MsgBlock) -> MsgBlock {
    block.block_type = match block.block_type {
        BlockType::PlainText => BlockType::DecryptedText,
        BlockType::PlainHtml => BlockType::DecryptedHtml,
        BlockType::PlainAtt => BlockType::DecryptedAtt,
        other => other,
    };
    block
}

fn decrypted_attachment(block: &MsgBlock, content: &[u8]) -> MsgBlock {
    let meta = block.attachment().cloned().map(|meta| {
        let lower = meta.name.to_ascii_lowercase();
        let name = if lower.ends_with(".pgp") || lower.ends_with(".gpg") {
            meta.name[..meta.name.len() - 4].to_string()
        } else {
            meta.name
        };
        AttachmentMeta {
            name,
            length: content.len() as u64,
            ..meta
        }
    });
    let out = MsgBlock::new(BlockType::DecryptedAtt, content.to_vec());
    match meta {
        Some(meta) => out.with_details(BlockDetails::Attachment(meta)),
        None => out,
    }
}

/// Decrypted text of a signed-and-encrypted message becomes `verifiedMsg`
/// carrying the signature outcome.
fn with_embedded_signature(blocks: Vec<MsgBlock>, signature: Option<VerifyResult>) -> Vec<MsgBlock> {
    let Some(signature) = signature else {
        return blocks;
    };
    blocks
        .into_iter()
        .map(|block| match block.block_type {
            BlockType::DecryptedText => MsgBlock {
                block_type: BlockType::VerifiedMsg,
                details: Some(BlockDetails::Verify(signature.clone())),
                ..block
            },
            _ => block,
        })
        .collect()
}

/// Attaches parsed key details to a key block. Truncated or unreadable key
/// material is shown as the text it is.
fn render_key(block: &MsgBlock) -> MsgBlock {
    if !block.complete {
        return MsgBlock::new(BlockType::PlainText, block.content.to_text().into_owned()).incomplete();
    }
    match sealmail_crypto::parse(&block.content.to_text()) {
        Ok(key) => block.clone().with_details(BlockDetails::Key(key)),
        Err(err) => {
            debug!("could not parse {} block: {err}", block.block_type);
            MsgBlock::new(BlockType::PlainText, block.content.to_text().into_owned())
        }
    }
}

/// Key blocks found in decrypted plaintext. A key that cannot be shown as a
/// key stays decrypted text.
fn render_nested_key(block: MsgBlock) -> MsgBlock {
    if block.block_type.is_key() {
        into_decrypted(render_key(&block))
    } else {
        block
    }
}

/// Builds the rendered form of a verified block: the signed text (or HTML)
/// without armor, with the outcome attached.
fn verified_block(block: &MsgBlock, result: VerifyResult) -> MsgBlock {
    let (block_type, text) = if block.is_detached_signed() {
        let bytes = block.content.as_bytes();
        if looks_like_mime(bytes) {
            let decoded = decode_mime(bytes);
            match (decoded.text(), decoded.html()) {
                (Some(text), _) => (BlockType::VerifiedMsg, text),
                (None, Some(html)) => (BlockType::SignedHtml, html),
                (None, None) => (BlockType::VerifiedMsg, String::new()),
            }
        } else {
            (BlockType::VerifiedMsg, String::from_utf8_lossy(bytes).into_owned())
        }
    } else {
        let armored = block.content.to_text();
        let text = clearsigned_text(&armored).unwrap_or_else(|| armored.into_owned());
        (BlockType::VerifiedMsg, text)
    };
    let block_type = if block.block_type == BlockType::SignedHtml {
        BlockType::SignedHtml
    } else {
        block_type
    };
    MsgBlock::new(block_type, BlockContent::Text(text)).with_details(BlockDetails::Verify(result))
}
