//! Shared model types for sealmail.
//!
//! Everything the scanner, MIME walker and processor exchange lives here:
//! - [`MsgBlock`]: a detected unit of message text and its typed details
//! - [`KeyInfo`]: the normalized, immutable key record for both key families
//! - [`VerifyResult`] and [`DecryptError`]: outcomes the renderer consumes
//!
//! The types are plain data. Parsing, crypto and orchestration live in the
//! `sealmail-parse`, `sealmail-crypto` and `sealmail-processor` crates.

mod block;
mod error;
mod key;
mod outcome;

pub use block::{AttachmentMeta, BlockContent, BlockDetails, BlockType, MsgBlock};
pub use error::{ModelError, ModelResult};
pub use key::{KeyFamily, KeyInfo, KeyInfoParts};
pub use outcome::{DecryptError, DecryptErrorKind, VerifyResult};
