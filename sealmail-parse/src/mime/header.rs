//! Header block parsing: folding, parameters and encoded words.

use super::encoding::{decode_charset, decode_quoted_printable};
use base64::Engine;

/// Ordered header fields of one MIME entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Parses a raw header block, unfolding continuation lines.
    pub fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut entries: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = entries.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                if is_field_name(name) {
                    entries.push((name.to_string(), value.trim().to_string()));
                }
            }
        }
        Self { entries }
    }

    /// First value of a field, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a field with RFC 2047 encoded words decoded.
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn content_type(&self) -> ContentType {
        self.get("content-type")
            .map(ContentType::parse)
            .filter(|ct| ct.mime_type.contains('/'))
            .unwrap_or_default()
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.get("content-disposition").map(Disposition::parse)
    }

    /// Lower-cased Content-Transfer-Encoding, `7bit` when absent.
    pub fn transfer_encoding(&self) -> String {
        self.get("content-transfer-encoding")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "7bit".to_string())
    }

    pub fn content_id(&self) -> Option<String> {
        self.get("content-id")
            .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|v| !v.is_empty())
    }
}

/// True if `name` is a syntactically valid header field name.
pub(crate) fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// A parsed Content-Type value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased `type/subtype`.
    pub mime_type: String,
    pub params: Vec<(String, String)>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            params: vec![("charset".to_string(), "us-ascii".to_string())],
        }
    }
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let (mime_type, params) = split_value(value);
        Self {
            mime_type: mime_type.to_ascii_lowercase(),
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }

    pub fn subtype(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map_or("", |(_, sub)| sub)
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }
}

/// A parsed Content-Disposition value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    /// Lower-cased disposition type (`inline`, `attachment`).
    pub kind: String,
    pub params: Vec<(String, String)>,
}

impl Disposition {
    pub fn parse(value: &str) -> Self {
        let (kind, params) = split_value(value);
        Self {
            kind: kind.to_ascii_lowercase(),
            params,
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    pub fn is_inline(&self) -> bool {
        self.kind == "inline"
    }

    pub fn filename(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("filename"))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `value; a=b; c="d"` into its leading token and parameters.
/// RFC 2231 extended (`name*`) and continued (`name*0*`) parameters are
/// decoded and joined under their base name.
fn split_value(value: &str) -> (String, Vec<(String, String)>) {
    let mut pieces = split_unquoted(value, ';').into_iter();
    let head = pieces.next().unwrap_or_default().trim().to_string();

    let mut plain: Vec<(String, String)> = Vec::new();
    let mut extended: Vec<(String, u32, String)> = Vec::new();
    for piece in pieces {
        let Some((name, raw)) = piece.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let raw = raw.trim();
        match name.split_once('*') {
            Some((base, section)) => {
                let encoded = section.ends_with('*') || section.is_empty();
                let index = section.trim_end_matches('*').parse::<u32>().unwrap_or(0);
                let text = unquote(raw);
                let text = if encoded {
                    decode_rfc2231(&text, index == 0)
                } else {
                    text
                };
                extended.push((base.to_string(), index, text));
            }
            None => plain.push((name, decode_encoded_words(&unquote(raw)))),
        }
    }

    extended.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    for (base, _, text) in extended {
        match plain.iter_mut().find(|(n, _)| *n == base) {
            Some((_, existing)) if !existing.is_empty() => existing.push_str(&text),
            Some((_, existing)) => *existing = text,
            None => plain.push((base, text)),
        }
    }
    (head, plain)
}

fn split_unquoted(value: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == sep && !quoted => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => raw.to_string(),
    }
}

/// Decodes `charset'lang'percent%20encoded` (the prefix only on the first section).
fn decode_rfc2231(text: &str, first: bool) -> String {
    let (charset, encoded) = if first {
        let mut parts = text.splitn(3, '\'');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(cs), Some(_lang), Some(rest)) => (Some(cs), rest),
            _ => (None, text),
        }
    } else {
        (None, text)
    };
    let bytes = percent_decode(encoded);
    decode_charset(&bytes, charset.filter(|c| !c.is_empty()))
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(b) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

pub(crate) fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let h = (hi as char).to_digit(16)?;
    let l = (lo as char).to_digit(16)?;
    Some((h * 16 + l) as u8)
}

/// Decodes RFC 2047 encoded words (`=?charset?B|Q?text?=`). Whitespace
/// between adjacent encoded words is dropped.
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut last_was_word = false;
    while let Some(start) = rest.find("=?") {
        let (before, tail) = rest.split_at(start);
        let Some((word, consumed)) = parse_encoded_word(tail) else {
            out.push_str(before);
            out.push_str("=?");
            rest = &tail[2..];
            last_was_word = false;
            continue;
        };
        if !(last_was_word && before.trim().is_empty()) {
            out.push_str(before);
        }
        out.push_str(&word);
        rest = &tail[consumed..];
        last_was_word = true;
    }
    out.push_str(rest);
    out
}

fn parse_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let text = &inner[..end];
    let bytes = match encoding.to_ascii_lowercase().as_str() {
        "b" => base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .ok()?,
        "q" => decode_quoted_printable(text.replace('_', " ").as_bytes()),
        _ => return None,
    };
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(&bytes, Some(charset)), consumed))
}
