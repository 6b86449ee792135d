//! Armor block scanner and MIME structure walker.
//!
//! Both halves are pure and total: any input produces a block sequence,
//! malformed structure is reported as data rather than as a failure.
//!
//! - [`armor`]: finds OpenPGP armored blocks and encrypted-message links in text
//! - [`mime`]: walks a MIME entity into a part tree and flattens it to blocks

pub mod armor;
mod error;
mod links;
pub mod mime;
mod options;

pub use armor::{DetectedBlocks, clearsigned_text, detect_blocks, detect_blocks_with, normalize};
pub use error::{ParseError, ParseResult};
pub use links::{LinkKind, LinkRule};
pub use mime::{DecodedMime, MimePart, PartKind, decode_mime};
pub use options::ScanOptions;
