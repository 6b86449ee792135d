//! Message blocks produced by the scanner and the MIME walker.

use crate::error::{ModelError, ModelResult};
use crate::key::KeyInfo;
use crate::outcome::{DecryptError, VerifyResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Kind of a detected or rendered unit of message content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    PlainText,
    PlainHtml,
    PublicKey,
    PrivateKey,
    SignedMsg,
    EncryptedMsg,
    EncryptedMsgLink,
    PlainAtt,
    EncryptedAtt,
    DecryptedAtt,
    EncryptedAttLink,
    DecryptedText,
    DecryptedHtml,
    VerifiedMsg,
    SignedHtml,
    DecryptErr,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plainText",
            Self::PlainHtml => "plainHtml",
            Self::PublicKey => "publicKey",
            Self::PrivateKey => "privateKey",
            Self::SignedMsg => "signedMsg",
            Self::EncryptedMsg => "encryptedMsg",
            Self::EncryptedMsgLink => "encryptedMsgLink",
            Self::PlainAtt => "plainAtt",
            Self::EncryptedAtt => "encryptedAtt",
            Self::DecryptedAtt => "decryptedAtt",
            Self::EncryptedAttLink => "encryptedAttLink",
            Self::DecryptedText => "decryptedText",
            Self::DecryptedHtml => "decryptedHtml",
            Self::VerifiedMsg => "verifiedMsg",
            Self::SignedHtml => "signedHtml",
            Self::DecryptErr => "decryptErr",
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Self::PublicKey | Self::PrivateKey)
    }

    pub fn is_attachment(&self) -> bool {
        matches!(
            self,
            Self::PlainAtt | Self::EncryptedAtt | Self::DecryptedAtt | Self::EncryptedAttLink
        )
    }

    /// Block kinds that carry a signature check result.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::SignedMsg | Self::VerifiedMsg | Self::SignedHtml)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block payload: armored or extracted text, or raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "encoding", content = "data")]
pub enum BlockContent {
    Text(String),
    Binary(Vec<u8>),
}

impl BlockContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Text view of the content. Binary content is decoded lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<String> for BlockContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for BlockContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for BlockContent {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

/// Attachment metadata taken from MIME headers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub name: String,
    pub length: u64,
    pub mime_type: String,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub content_id: Option<String>,
}

/// The single typed detail slot of a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum BlockDetails {
    Key(KeyInfo),
    Attachment(AttachmentMeta),
    DecryptError(DecryptError),
    Verify(VerifyResult),
}

impl BlockDetails {
    fn name(&self) -> &'static str {
        match self {
            Self::Key(_) => "key details",
            Self::Attachment(_) => "attachment metadata",
            Self::DecryptError(_) => "decrypt error",
            Self::Verify(_) => "verify result",
        }
    }

    fn fits(&self, block_type: BlockType) -> bool {
        match self {
            Self::Key(_) => block_type.is_key(),
            Self::Attachment(_) => block_type.is_attachment(),
            Self::DecryptError(_) => block_type == BlockType::DecryptErr,
            Self::Verify(_) => block_type.is_signed(),
        }
    }
}

/// A detected unit within message text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgBlock {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: BlockContent,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BlockDetails>,
}

impl MsgBlock {
    pub fn new(block_type: BlockType, content: impl Into<BlockContent>) -> Self {
        Self {
            block_type,
            content: content.into(),
            complete: true,
            signature: None,
            details: None,
        }
    }

    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::new(BlockType::PlainText, BlockContent::Text(text.into()))
    }

    /// Marks the block as missing its closing marker.
    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_details(mut self, details: BlockDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn key_details(&self) -> Option<&KeyInfo> {
        match &self.details {
            Some(BlockDetails::Key(k)) => Some(k),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Option<&AttachmentMeta> {
        match &self.details {
            Some(BlockDetails::Attachment(a)) => Some(a),
            _ => None,
        }
    }

    pub fn verify_result(&self) -> Option<&VerifyResult> {
        match &self.details {
            Some(BlockDetails::Verify(v)) => Some(v),
            _ => None,
        }
    }

    pub fn decrypt_error(&self) -> Option<&DecryptError> {
        match &self.details {
            Some(BlockDetails::DecryptError(e)) => Some(e),
            _ => None,
        }
    }

    /// True for signed blocks whose signature travels separately from the
    /// signed bytes (PGP/MIME, S/MIME or a detached signature attachment).
    pub fn is_detached_signed(&self) -> bool {
        self.signature.is_some() && matches!(self.content, BlockContent::Binary(_))
    }

    /// Checks that the details slot matches the block type.
    pub fn validate(&self) -> ModelResult<()> {
        if let Some(details) = &self.details {
            if !details.fits(self.block_type) {
                return Err(ModelError::FatalAssertion(format!(
                    "{} attached to {} block",
                    details.name(),
                    self.block_type
                )));
            }
        }
        if self.signature.is_some() && !self.block_type.is_signed() {
            return Err(ModelError::FatalAssertion(format!(
                "signature attached to {} block",
                self.block_type
            )));
        }
        Ok(())
    }

    /// Stricter check applied before a block is handed to a renderer: key
    /// and decrypt error blocks must carry their details.
    pub fn validate_rendered(&self) -> ModelResult<()> {
        self.validate()?;
        let missing = match self.block_type {
            t if t.is_key() => self.key_details().is_none(),
            BlockType::DecryptErr => self.decrypt_error().is_none(),
            _ => false,
        };
        if missing {
            return Err(ModelError::FatalAssertion(format!(
                "{} block rendered without details",
                self.block_type
            )));
        }
        Ok(())
    }

    /// Validates an ordered block sequence: every block is well formed and
    /// only the last one may be incomplete.
    pub fn validate_sequence(blocks: &[MsgBlock]) -> ModelResult<()> {
        for (i, block) in blocks.iter().enumerate() {
            block.validate()?;
            if !block.complete && i + 1 != blocks.len() {
                return Err(ModelError::FatalAssertion(format!(
                    "incomplete {} block at position {i} of {}",
                    block.block_type,
                    blocks.len()
                )));
            }
        }
        Ok(())
    }
}
