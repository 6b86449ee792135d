//! OpenPGP packet inspection.
//!
//! Reading recipient and issuer ids only needs the packet headers, not the
//! matching keys. Armored and binary input are both accepted; sequoia's
//! parser removes the armor.

use crate::error::{CryptoError, CryptoResult};
use openpgp::parse::{PacketParser, PacketParserResult, Parse};
use openpgp::{KeyHandle, Packet, PacketPile};
use sequoia_openpgp as openpgp;

/// Recipients named by the session key packets leading a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recipients {
    /// Key ids (v3 PKESK) or fingerprints (v6 PKESK), upper-case hex.
    pub ids: Vec<String>,
    /// At least one PKESK hides its recipient.
    pub anonymous: bool,
    /// Count of password-encrypted (SKESK) session keys.
    pub passwords: usize,
}

fn unreadable(err: anyhow::Error) -> CryptoError {
    CryptoError::CorruptedCiphertext(format!("unreadable OpenPGP packets: {err}"))
}

fn push_handle(ids: &mut Vec<String>, handle: &KeyHandle) {
    let id = handle.to_hex();
    if !ids.contains(&id) {
        ids.push(id);
    }
}

/// Walks the PKESK, SKESK and marker packets at the head of a message. The
/// first other packet (normally the encrypted data) ends the walk, so the
/// encrypted body is never read.
pub fn message_recipients(message: &[u8]) -> CryptoResult<Recipients> {
    let mut out = Recipients::default();
    let mut ppr = PacketParser::from_bytes(message).map_err(unreadable)?;
    while let PacketParserResult::Some(pp) = ppr {
        match &pp.packet {
            Packet::PKESK(pkesk) => match pkesk.recipient() {
                Some(handle) if handle.to_hex().bytes().all(|b| b == b'0') => out.anonymous = true,
                Some(handle) => push_handle(&mut out.ids, &handle),
                None => out.anonymous = true,
            },
            Packet::SKESK(_) => out.passwords += 1,
            Packet::Marker(_) => {}
            _ => break,
        }
        ppr = pp.next().map_err(unreadable)?.1;
    }
    Ok(out)
}

/// Issuer key ids and fingerprints of every signature packet, in order of
/// appearance and de-duplicated. Signatures inside compressed data count.
pub fn signature_issuers(signature: &[u8]) -> CryptoResult<Vec<String>> {
    let pile = PacketPile::from_bytes(signature).map_err(unreadable)?;
    let mut ids = Vec::new();
    for packet in pile.descendants() {
        if let Packet::Signature(sig) = packet {
            for issuer in sig.get_issuers() {
                push_handle(&mut ids, &issuer);
            }
        }
    }
    Ok(ids)
}
