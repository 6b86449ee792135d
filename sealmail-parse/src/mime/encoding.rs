//! Transfer encodings, charsets and line-ending canonicalization.

use crate::error::{ParseError, ParseResult};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use super::header::hex_pair;

/// Base64 as found in mail: padding optional, trailing bits tolerated.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes a body according to its (lower-cased) Content-Transfer-Encoding.
/// Unknown encodings pass the bytes through unchanged.
pub fn decode_transfer(body: &[u8], encoding: &str) -> ParseResult<Vec<u8>> {
    match encoding {
        "base64" => decode_base64(body),
        "quoted-printable" => Ok(decode_quoted_printable(body)),
        _ => Ok(body.to_vec()),
    }
}

pub fn decode_base64(body: &[u8]) -> ParseResult<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64
        .decode(&compact)
        .map_err(|e| ParseError::TransferEncoding {
            encoding: "base64".to_string(),
            reason: e.to_string(),
        })
}

/// Decodes quoted-printable, including soft line breaks. Malformed escapes
/// are kept literally.
pub fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        match body.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            Some([hi, lo]) => match hex_pair(*hi, *lo) {
                Some(decoded) => {
                    out.push(decoded);
                    i += 3;
                }
                None => {
                    out.push(b);
                    i += 1;
                }
            },
            _ if body.get(i + 1) == Some(&b'\n') => i += 2,
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Decodes `bytes` in the named charset. UTF-8 and ASCII decode lossily,
/// the Latin-1 family maps bytes to code points, anything else is treated
/// as UTF-8.
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(|c| c.trim().to_ascii_lowercase());
    match charset.as_deref() {
        Some("iso-8859-1" | "latin1" | "latin-1" | "iso8859-1" | "windows-1252" | "cp1252") => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Rewrites every bare LF as CRLF. Existing CRLF pairs are left alone, so
/// the result is the canonical form signatures over MIME parts are made on.
pub fn canonicalize_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 16);
    let mut prev = 0u8;
    for &b in bytes {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

/// Encodes `data` as base64 wrapped at `width` columns with CRLF breaks.
pub fn encode_base64_wrapped(data: &[u8], width: usize) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / width * 2 + 2);
    for chunk in encoded.as_bytes().chunks(width) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}
