//! Builders for outgoing RFC 3156 (PGP/MIME) bodies.
//!
//! The signing flow is: build the text part, canonicalize it, sign those
//! exact bytes detached, then wrap both with [`pgp_mime_signed`].

use super::encoding::{canonicalize_crlf, encode_base64_wrapped};

/// A `text/plain` UTF-8 entity in canonical CRLF form. ASCII text with
/// short lines is sent as 7bit, everything else as base64.
pub fn text_part(text: &str) -> Vec<u8> {
    let seven_bit = text.is_ascii() && text.lines().all(|l| l.len() <= 998);
    let mut out = Vec::new();
    if seven_bit {
        out.extend_from_slice(b"Content-Type: text/plain; charset=utf-8\r\n");
        out.extend_from_slice(b"Content-Transfer-Encoding: 7bit\r\n\r\n");
        out.extend_from_slice(&canonicalize_crlf(text.as_bytes()));
    } else {
        out.extend_from_slice(b"Content-Type: text/plain; charset=utf-8\r\n");
        out.extend_from_slice(b"Content-Transfer-Encoding: base64\r\n\r\n");
        out.extend_from_slice(encode_base64_wrapped(text.as_bytes(), 76).as_bytes());
    }
    out
}

/// Wraps an armored OpenPGP message as `multipart/encrypted`.
pub fn pgp_mime_encrypted(armored: &str, boundary: &str) -> Vec<u8> {
    let armored = String::from_utf8_lossy(&canonicalize_crlf(armored.trim_end().as_bytes()))
        .into_owned();
    format!(
        "Content-Type: multipart/encrypted; protocol=\"application/pgp-encrypted\"; boundary=\"{boundary}\"\r\n\
         \r\n\
         This is an OpenPGP/MIME encrypted message (RFC 3156)\r\n\
         --{boundary}\r\n\
         Content-Type: application/pgp-encrypted\r\n\
         Content-Description: PGP/MIME version identification\r\n\
         \r\n\
         Version: 1\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Type: application/octet-stream; name=\"encrypted.asc\"\r\n\
         Content-Description: OpenPGP encrypted message\r\n\
         Content-Disposition: inline; filename=\"encrypted.asc\"\r\n\
         \r\n\
         {armored}\r\n\
         --{boundary}--\r\n"
    )
    .into_bytes()
}

/// Wraps a signed entity and its armored detached signature as
/// `multipart/signed`. `signed_part` must be the exact bytes that were
/// signed; they are copied through unchanged.
pub fn pgp_mime_signed(signed_part: &[u8], armored_signature: &str, boundary: &str, micalg: &str) -> Vec<u8> {
    let signature = canonicalize_crlf(armored_signature.trim_end().as_bytes());
    let mut out = format!(
        "Content-Type: multipart/signed; micalg=\"{micalg}\"; protocol=\"application/pgp-signature\"; boundary=\"{boundary}\"\r\n\
         \r\n\
         This is an OpenPGP/MIME signed message (RFC 3156)\r\n\
         --{boundary}\r\n"
    )
    .into_bytes();
    out.extend_from_slice(signed_part);
    out.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\n\
             Content-Type: application/pgp-signature; name=\"signature.asc\"\r\n\
             Content-Description: OpenPGP digital signature\r\n\
             Content-Disposition: attachment; filename=\"signature.asc\"\r\n\
             \r\n"
        )
        .as_bytes(),
    );
    out.extend_from_slice(&signature);
    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}
