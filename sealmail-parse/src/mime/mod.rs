//! MIME structure walker.
//!
//! [`decode_mime`] turns a raw message into a tree of [`MimePart`]s that keep
//! both the exact raw bytes of every part and its transfer-decoded body. The
//! raw bytes matter for `multipart/signed`, where the signature covers the
//! first child byte for byte. [`DecodedMime::blocks`] flattens the tree into
//! message blocks, running every text part through the armor scanner.

pub mod compose;
pub mod encoding;
pub mod header;
pub mod html;

use crate::armor::{BEGIN_MESSAGE, BEGIN_PUBLIC_KEY, detect_blocks_with};
use crate::error::ParseError;
use crate::options::ScanOptions;
use encoding::{canonicalize_crlf, decode_charset, decode_transfer, encode_base64_wrapped};
use header::{ContentType, Headers, is_field_name};
use sealmail_types::{AttachmentMeta, BlockContent, BlockDetails, BlockType, MsgBlock};
use tracing::debug;

pub use html::html_to_text;

const MAX_DEPTH: usize = 32;

/// Role of a part within the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    Multipart,
    TextPlain,
    TextHtml,
    Attachment,
    /// The armored payload of an RFC 3156 `multipart/encrypted` message.
    PgpMimeEncrypted,
    /// The `Version: 1` control part of `multipart/encrypted`.
    PgpMimeVersion,
    PgpMimeSignature,
    SmimeEncrypted,
    SmimeSignature,
    /// Structure that could not be parsed; rendered as plain text.
    Malformed,
}

/// One node of the MIME tree.
#[derive(Clone, Debug)]
pub struct MimePart {
    pub headers: Headers,
    pub content_type: ContentType,
    pub kind: PartKind,
    /// Exact bytes of the entity, headers included.
    pub raw: Vec<u8>,
    /// Transfer-decoded body (raw body for multiparts).
    pub body: Vec<u8>,
    pub children: Vec<MimePart>,
    pub attachment: Option<AttachmentMeta>,
}

impl MimePart {
    /// Body decoded with the part's declared charset.
    pub fn text(&self) -> String {
        decode_charset(&self.body, self.content_type.charset())
    }

    /// Depth-first iterator over this part and its descendants.
    pub fn walk(&self) -> Vec<&MimePart> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    fn first_of(&self, kind: PartKind) -> Option<&MimePart> {
        self.walk().into_iter().find(|p| p.kind == kind)
    }
}

/// A decoded message with its structural errors.
#[derive(Clone, Debug)]
pub struct DecodedMime {
    pub root: MimePart,
    pub errors: Vec<ParseError>,
}

impl DecodedMime {
    pub fn subject(&self) -> Option<String> {
        self.root.headers.get_decoded("subject")
    }

    pub fn from(&self) -> Option<String> {
        self.root.headers.get_decoded("from")
    }

    pub fn to(&self) -> Vec<String> {
        self.root
            .headers
            .get_decoded("to")
            .map(|v| {
                v.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First plain text body outside attachments.
    pub fn text(&self) -> Option<String> {
        self.root.first_of(PartKind::TextPlain).map(MimePart::text)
    }

    /// First HTML body outside attachments.
    pub fn html(&self) -> Option<String> {
        self.root.first_of(PartKind::TextHtml).map(MimePart::text)
    }

    pub fn attachments(&self) -> Vec<&AttachmentMeta> {
        self.root
            .walk()
            .into_iter()
            .filter_map(|p| p.attachment.as_ref())
            .collect()
    }

    pub fn blocks(&self) -> Vec<MsgBlock> {
        self.blocks_with(&ScanOptions::default())
    }

    /// Flattens the tree into message blocks in document order.
    pub fn blocks_with(&self, options: &ScanOptions) -> Vec<MsgBlock> {
        let mut out = Vec::new();
        collect_blocks(&self.root, options, &mut out);
        if out.is_empty() {
            out.push(MsgBlock::plain_text(""));
        }
        settle_truncated(&mut out);
        out
    }
}

/// Each part is scanned on its own, so a block cut short inside an early part
/// can end up ahead of later parts. Only the last block may stay incomplete;
/// earlier truncated blocks are shown as the text they carry.
fn settle_truncated(blocks: &mut [MsgBlock]) {
    let Some((_, earlier)) = blocks.split_last_mut() else {
        return;
    };
    for block in earlier.iter_mut().filter(|b| !b.complete) {
        debug!("truncated {} block inside a MIME part shown as text", block.block_type);
        *block = MsgBlock::plain_text(block.content.to_text().into_owned());
    }
}

/// True if `bytes` starts with a header block that declares a Content-Type,
/// i.e. it is a MIME entity rather than bare text.
pub fn looks_like_mime(bytes: &[u8]) -> bool {
    let (head, _) = split_head_body(bytes);
    let headers = Headers::parse(head);
    !headers.is_empty() && headers.get("content-type").is_some()
}

/// Walks a raw MIME message. Never fails: malformed structure becomes a
/// [`PartKind::Malformed`] node and an entry in [`DecodedMime::errors`].
pub fn decode_mime(raw: &[u8]) -> DecodedMime {
    let mut errors = Vec::new();
    let root = parse_part(raw, 0, &mut errors);
    if !errors.is_empty() {
        debug!("decoded MIME message with {} structural errors", errors.len());
    }
    DecodedMime { root, errors }
}

/// Splits an entity at the first empty line. Without one, the whole entity
/// is headers if it starts with a header line and body otherwise.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut at = 0;
    while at < raw.len() {
        let line_end = raw[at..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| at + i + 1);
        let line = &raw[at..line_end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..at], &raw[line_end..]);
        }
        if at == 0 && !starts_with_field(line) {
            return (&raw[..0], raw);
        }
        at = line_end;
    }
    (raw, &raw[raw.len()..])
}

fn starts_with_field(line: &[u8]) -> bool {
    let text = String::from_utf8_lossy(line);
    text.split_once(':')
        .is_some_and(|(name, _)| is_field_name(name))
}

fn parse_part(raw: &[u8], depth: usize, errors: &mut Vec<ParseError>) -> MimePart {
    let (head, body) = split_head_body(raw);
    let headers = Headers::parse(head);
    let content_type = headers.content_type();

    let mut part = MimePart {
        headers,
        content_type,
        kind: PartKind::Malformed,
        raw: raw.to_vec(),
        body: Vec::new(),
        children: Vec::new(),
        attachment: None,
    };

    if depth > MAX_DEPTH {
        errors.push(ParseError::TooDeep(MAX_DEPTH));
        part.body = body.to_vec();
        return part;
    }

    if part.content_type.is_multipart() {
        part.body = body.to_vec();
        let Some(boundary) = part.content_type.param("boundary").map(str::to_string) else {
            errors.push(ParseError::MissingBoundary(part.content_type.mime_type.clone()));
            return part;
        };
        match split_multipart(body, &boundary) {
            Ok((sections, warning)) => {
                errors.extend(warning);
                part.kind = PartKind::Multipart;
                part.children = sections
                    .into_iter()
                    .map(|s| parse_part(s, depth + 1, errors))
                    .collect();
                assign_protocol_roles(&mut part);
            }
            Err(e) => errors.push(e),
        }
        return part;
    }

    let encoding = part.headers.transfer_encoding();
    part.body = match decode_transfer(body, &encoding) {
        Ok(decoded) => decoded,
        Err(e) => {
            errors.push(e);
            body.to_vec()
        }
    };
    part.kind = classify_leaf(&part);
    if matches!(
        part.kind,
        PartKind::Attachment | PartKind::SmimeEncrypted | PartKind::PgpMimeSignature
    ) {
        part.attachment = Some(attachment_meta(&part));
    }
    part
}

/// Splits a multipart body into the raw bytes of each section. The line
/// break before a delimiter belongs to the delimiter, not to the section.
/// A missing close delimiter is reported but the sections are still used.
fn split_multipart<'a>(
    body: &'a [u8],
    boundary: &str,
) -> Result<(Vec<&'a [u8]>, Option<ParseError>), ParseError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut sections = Vec::new();
    let mut open: Option<usize> = None;

    let mut at = 0;
    while at < body.len() {
        let line_end = body[at..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| at + i + 1);
        let line = &body[at..line_end];
        if let Some(rest) = line.strip_prefix(delimiter) {
            let is_close = rest.starts_with(b"--");
            let rest = if is_close { &rest[2..] } else { rest };
            if rest.iter().all(|b| b.is_ascii_whitespace()) {
                if let Some(start) = open.take() {
                    sections.push(&body[start..strip_line_break(body, start, at)]);
                }
                if is_close {
                    return match sections.is_empty() {
                        true => Err(ParseError::BoundaryNotFound(boundary.to_string())),
                        false => Ok((sections, None)),
                    };
                }
                open = Some(line_end);
            }
        }
        at = line_end;
    }

    match open {
        Some(start) => {
            sections.push(&body[start..]);
            Ok((sections, Some(ParseError::Unterminated(boundary.to_string()))))
        }
        None => Err(ParseError::BoundaryNotFound(boundary.to_string())),
    }
}

/// End offset of a section that stops at the delimiter line starting at
/// `delimiter_at`, excluding the CRLF or LF that precedes it.
fn strip_line_break(body: &[u8], start: usize, delimiter_at: usize) -> usize {
    let mut end = delimiter_at;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn assign_protocol_roles(part: &mut MimePart) {
    match part.content_type.subtype() {
        "encrypted" => {
            let is_pgp = part
                .content_type
                .param("protocol")
                .is_none_or(|p| p.eq_ignore_ascii_case("application/pgp-encrypted"));
            if !is_pgp {
                return;
            }
            for child in &mut part.children {
                match child.content_type.mime_type.as_str() {
                    "application/pgp-encrypted" => {
                        child.kind = PartKind::PgpMimeVersion;
                        child.attachment = None;
                    }
                    "application/octet-stream" => {
                        child.kind = PartKind::PgpMimeEncrypted;
                        child.attachment = None;
                    }
                    _ => {}
                }
            }
        }
        "signed" => {
            if let Some(sig) = part.children.get_mut(1) {
                match sig.content_type.mime_type.as_str() {
                    "application/pgp-signature" => sig.kind = PartKind::PgpMimeSignature,
                    "application/pkcs7-signature" | "application/x-pkcs7-signature" => {
                        sig.kind = PartKind::SmimeSignature
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn classify_leaf(part: &MimePart) -> PartKind {
    let disposition = part.headers.disposition();
    let is_attachment = disposition.as_ref().is_some_and(|d| d.is_attachment());
    match part.content_type.mime_type.as_str() {
        "application/pgp-signature" => PartKind::PgpMimeSignature,
        "application/pkcs7-signature" | "application/x-pkcs7-signature" => PartKind::SmimeSignature,
        "application/pkcs7-mime" | "application/x-pkcs7-mime"
            if part
                .content_type
                .param("smime-type")
                .is_none_or(|t| !t.eq_ignore_ascii_case("signed-data")) =>
        {
            PartKind::SmimeEncrypted
        }
        "text/plain" if !is_attachment => PartKind::TextPlain,
        "text/html" if !is_attachment => PartKind::TextHtml,
        _ => PartKind::Attachment,
    }
}

fn attachment_meta(part: &MimePart) -> AttachmentMeta {
    let disposition = part.headers.disposition();
    let name = disposition
        .as_ref()
        .and_then(|d| d.filename().map(str::to_string))
        .or_else(|| part.content_type.param("name").map(str::to_string))
        .unwrap_or_default();
    AttachmentMeta {
        name,
        length: part.body.len() as u64,
        mime_type: part.content_type.mime_type.clone(),
        inline: disposition.as_ref().is_some_and(|d| d.is_inline()),
        content_id: part.headers.content_id(),
    }
}

fn collect_blocks(part: &MimePart, options: &ScanOptions, out: &mut Vec<MsgBlock>) {
    match part.kind {
        PartKind::Malformed => {
            out.push(MsgBlock::plain_text(String::from_utf8_lossy(&part.raw)));
        }
        PartKind::Multipart => collect_multipart(part, options, out),
        PartKind::TextPlain => {
            out.extend(detect_blocks_with(&part.text(), options).blocks);
        }
        PartKind::TextHtml => {
            let html = part.text();
            let detected = detect_blocks_with(&html_to_text(&html), options);
            if detected.has_armor() {
                out.extend(detected.blocks);
            } else {
                out.push(MsgBlock::new(BlockType::PlainHtml, html));
            }
        }
        PartKind::PgpMimeVersion => {}
        PartKind::PgpMimeEncrypted => match std::str::from_utf8(&part.body) {
            Ok(text) if text.contains(BEGIN_MESSAGE) => {
                out.extend(detect_blocks_with(text, options).blocks);
            }
            _ => out.push(MsgBlock::new(BlockType::EncryptedMsg, part.body.clone())),
        },
        PartKind::SmimeEncrypted => {
            out.push(MsgBlock::new(BlockType::EncryptedMsg, part.body.clone()));
        }
        PartKind::Attachment | PartKind::PgpMimeSignature | PartKind::SmimeSignature => {
            collect_attachment(part, options, out);
        }
    }
}

fn collect_multipart(part: &MimePart, options: &ScanOptions, out: &mut Vec<MsgBlock>) {
    match part.content_type.subtype() {
        "signed" if part.children.len() >= 2 => {
            if let Some(block) = signed_block(&part.children[0], &part.children[1]) {
                out.push(block);
                return;
            }
        }
        "alternative" => {
            if let Some(chosen) = choose_alternative(part, options) {
                collect_blocks(chosen, options, out);
                return;
            }
        }
        _ => {}
    }

    // a text body accompanied by a detached signature attachment
    let text_at = part
        .children
        .iter()
        .position(|c| c.kind == PartKind::TextPlain);
    let sig_at = part
        .children
        .iter()
        .position(|c| c.kind == PartKind::PgpMimeSignature);
    if let (Some(text_at), Some(sig_at)) = (text_at, sig_at) {
        let text = &part.children[text_at];
        let sig = &part.children[sig_at];
        for (i, child) in part.children.iter().enumerate() {
            if i == text_at {
                out.push(
                    MsgBlock::new(BlockType::SignedMsg, canonicalize_crlf(&text.body))
                        .with_signature(sig.text()),
                );
            } else if i != sig_at {
                collect_blocks(child, options, out);
            }
        }
        return;
    }

    for child in &part.children {
        collect_blocks(child, options, out);
    }
}

/// Prefers the plain alternative when it carries armor, then HTML, then plain.
fn choose_alternative<'a>(part: &'a MimePart, options: &ScanOptions) -> Option<&'a MimePart> {
    let plain = part.children.iter().find(|c| c.kind == PartKind::TextPlain);
    let html = part.children.iter().find(|c| c.kind == PartKind::TextHtml);
    if let Some(plain) = plain {
        if detect_blocks_with(&plain.text(), options).has_armor() {
            return Some(plain);
        }
    }
    html.or(plain).or_else(|| part.children.last())
}

/// Builds the detached-signature block for a `multipart/signed` pair.
fn signed_block(signed: &MimePart, signature: &MimePart) -> Option<MsgBlock> {
    let signature_text = match signature.kind {
        PartKind::PgpMimeSignature => signature.text(),
        PartKind::SmimeSignature => pem_pkcs7(&signature.body),
        _ => return None,
    };
    let renders_html = signed.first_of(PartKind::TextPlain).is_none()
        && signed.first_of(PartKind::TextHtml).is_some();
    let block_type = if renders_html {
        BlockType::SignedHtml
    } else {
        BlockType::SignedMsg
    };
    Some(
        MsgBlock::new(block_type, canonicalize_crlf(&signed.raw))
            .with_signature(signature_text),
    )
}

/// Wraps DER PKCS#7 in PEM so it can travel as block signature text.
pub fn pem_pkcs7(der: &[u8]) -> String {
    format!(
        "-----BEGIN PKCS7-----\r\n{}-----END PKCS7-----\r\n",
        encode_base64_wrapped(der, 64)
    )
}

fn collect_attachment(part: &MimePart, options: &ScanOptions, out: &mut Vec<MsgBlock>) {
    let meta = part.attachment.clone().unwrap_or_else(|| attachment_meta(part));
    let name = meta.name.to_ascii_lowercase();
    let text = std::str::from_utf8(&part.body).ok();

    if name.ends_with(".pgp") || name.ends_with(".gpg") {
        out.push(
            MsgBlock::new(BlockType::EncryptedAtt, part.body.clone())
                .with_details(BlockDetails::Attachment(meta)),
        );
        return;
    }
    if let Some(text) = text {
        let named_message = matches!(name.as_str(), "encrypted.asc" | "message.asc" | "msg.asc");
        if text.contains(BEGIN_MESSAGE) && (named_message || name.ends_with(".asc")) {
            out.push(MsgBlock::new(BlockType::EncryptedMsg, BlockContent::Text(text.to_string())));
            return;
        }
        let key_like = meta.mime_type == "application/pgp-keys"
            || name.ends_with(".asc")
            || name.ends_with(".key");
        if key_like && text.contains(BEGIN_PUBLIC_KEY) {
            out.extend(
                detect_blocks_with(text, options)
                    .blocks
                    .into_iter()
                    .filter(|b| b.block_type.is_key()),
            );
            return;
        }
    }
    out.push(
        MsgBlock::new(BlockType::PlainAtt, part.body.clone())
            .with_details(BlockDetails::Attachment(meta)),
    );
}
