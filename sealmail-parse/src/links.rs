//! Detection of links to password-protected messages and attachments.

use sealmail_types::BlockType;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Message,
    Attachment,
}

impl LinkKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Message => BlockType::EncryptedMsgLink,
            Self::Attachment => BlockType::EncryptedAttLink,
        }
    }
}

/// A URL prefix followed by an opaque id, e.g. `https://host/msg/` + `Xy12-ab`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRule {
    pub prefix: String,
    pub kind: LinkKind,
}

impl LinkRule {
    pub fn message(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            kind: LinkKind::Message,
        }
    }

    pub fn attachment(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            kind: LinkKind::Attachment,
        }
    }
}

/// A link found in plain text: byte range and the rule that matched.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LinkMatch<'a> {
    pub start: usize,
    pub end: usize,
    pub rule: &'a LinkRule,
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%')
}

/// Finds the earliest link in `text`. A prefix with no id after it is not a link.
pub(crate) fn find_link<'a>(text: &str, rules: &'a [LinkRule]) -> Option<LinkMatch<'a>> {
    let mut best: Option<LinkMatch<'a>> = None;
    for rule in rules.iter().filter(|r| !r.prefix.is_empty()) {
        let mut from = 0;
        while let Some(off) = text[from..].find(rule.prefix.as_str()) {
            let start = from + off;
            if best.as_ref().is_some_and(|b| b.start <= start) {
                break;
            }
            let id_start = start + rule.prefix.len();
            let id_len: usize = text[id_start..]
                .chars()
                .take_while(|c| is_id_char(*c))
                .map(char::len_utf8)
                .sum();
            // trailing sentence punctuation is not part of the id
            let id_len = id_len - text[id_start..id_start + id_len]
                .chars()
                .rev()
                .take_while(|c| *c == '.')
                .count();
            if id_len > 0 {
                best = Some(LinkMatch {
                    start,
                    end: id_start + id_len,
                    rule,
                });
                break;
            }
            from = id_start;
        }
    }
    best
}
