//! Scanner configuration.

use crate::links::LinkRule;
use serde::{Deserialize, Serialize};

/// Options for [`crate::detect_blocks_with`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanOptions {
    /// URL prefixes recognized as links to password-protected messages or attachments.
    pub link_rules: Vec<LinkRule>,

    /// Drop whitespace-only plain text between detected blocks.
    pub drop_blank_runs: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            link_rules: vec![
                LinkRule::message("https://secure.sealmail.io/msg/"),
                LinkRule::attachment("https://secure.sealmail.io/att/"),
            ],
            drop_blank_runs: true,
        }
    }
}

impl ScanOptions {
    /// Options that only look for armor, never for links.
    pub fn armor_only() -> Self {
        Self {
            link_rules: Vec::new(),
            ..Self::default()
        }
    }
}
