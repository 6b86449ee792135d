//! OpenPGP backend built on sequoia.
//!
//! Recipient and issuer ids are read with the [`crate::packet`] inspector so
//! they are available without the matching keys.

use crate::backend::{
    CryptoBackend, Decrypted, DecryptionKey, SignMode, SignatureCheck, SignedData,
};
use crate::error::{CryptoError, CryptoResult};
use crate::ids::{email_from_user_id, normalize, normalize_ids};
use crate::packet;
use chrono::{DateTime, Utc};
use openpgp::armor::{Kind as ArmorKind, Writer as ArmorWriter};
use openpgp::cert::prelude::*;
use openpgp::crypto::{Password, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::Parse;
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, DetachedVerifierBuilder, MessageLayer, MessageStructure,
    VerificationHelper, VerifierBuilder,
};
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize;
use openpgp::serialize::stream::{
    Armorer, Encryptor, LiteralWriter, Message, Recipient, Signer,
};
use openpgp::types::{RevocationStatus, SymmetricAlgorithm};
use openpgp::{Cert, KeyHandle, Packet};
use sealmail_types::{KeyFamily, KeyInfo, KeyInfoParts};
use sequoia_openpgp as openpgp;
use std::io::{Read, Write};
use tracing::debug;

const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";

/// OpenPGP keys and messages (RFC 4880 / RFC 9580).
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenPgpBackend;

fn backend_err(context: &str) -> impl Fn(anyhow::Error) -> CryptoError + '_ {
    move |err| CryptoError::Backend(format!("{context}: {err}"))
}

fn io_err(context: &str) -> impl Fn(std::io::Error) -> CryptoError + '_ {
    move |err| CryptoError::Backend(format!("{context}: {err}"))
}

/// Splits text holding several armored blocks into one chunk per block.
fn armored_chunks(text: &str) -> Vec<&str> {
    let starts: Vec<usize> = text
        .match_indices("-----BEGIN PGP ")
        .map(|(at, _)| at)
        .filter(|at| *at == 0 || text.as_bytes()[at - 1] == b'\n')
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, start)| match starts.get(i + 1) {
            Some(next) => &text[*start..*next],
            None => &text[*start..],
        })
        .collect()
}

fn parse_certs(bytes: &[u8]) -> CryptoResult<Vec<Cert>> {
    let ppr = openpgp::parse::PacketParser::from_bytes(bytes)
        .map_err(|err| CryptoError::KeyParse(format!("parse failed: {err}")))?;
    let mut certs = Vec::new();
    for cert in openpgp::cert::CertParser::from(ppr) {
        certs.push(cert.map_err(|err| CryptoError::KeyParse(format!("invalid certificate: {err}")))?);
    }
    Ok(certs)
}

fn public_cert(key: &KeyInfo) -> CryptoResult<Cert> {
    parse_certs(key.public().as_bytes())?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::KeyParse(format!("no certificate for key {}", key.id())))
}

fn private_cert(key: &KeyInfo) -> CryptoResult<Cert> {
    let private = key
        .private()
        .ok_or_else(|| CryptoError::NoUsableKey(format!("key {} has no private part", key.id())))?;
    let cert = parse_certs(private.as_bytes())?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::KeyParse(format!("no certificate for key {}", key.id())))?;
    if !cert.is_tsk() {
        return Err(CryptoError::NoUsableKey(format!(
            "key {} has no secret key material",
            key.id()
        )));
    }
    Ok(cert)
}

fn armor_cert(cert: &Cert, secret: bool) -> CryptoResult<String> {
    let kind = if secret {
        ArmorKind::SecretKey
    } else {
        ArmorKind::PublicKey
    };
    let mut writer = ArmorWriter::new(Vec::new(), kind).map_err(io_err("armor failed"))?;
    if secret {
        cert.as_tsk().serialize(&mut writer)
    } else {
        cert.serialize(&mut writer)
    }
    .map_err(backend_err("serialize failed"))?;
    let bytes = writer.finalize().map_err(io_err("armor failed"))?;
    String::from_utf8(bytes).map_err(|err| CryptoError::Backend(err.to_string()))
}

fn to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Builds the normalized record for a certificate.
fn key_info(cert: &Cert) -> CryptoResult<KeyInfo> {
    let policy = StandardPolicy::new();

    let mut key_ids = Vec::new();
    for ka in cert.keys() {
        key_ids.push(ka.key().fingerprint().to_hex());
        key_ids.push(ka.key().keyid().to_hex());
    }

    let user_ids: Vec<String> = cert
        .userids()
        .map(|u| String::from_utf8_lossy(u.userid().value()).into_owned())
        .collect();
    let emails = user_ids
        .iter()
        .filter_map(|uid| email_from_user_id(uid))
        .collect();

    let protection: Vec<bool> = cert
        .keys()
        .secret()
        .map(|ka| ka.key().secret().is_encrypted())
        .collect();

    let usable_for_encryption = cert
        .keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .next()
        .is_some();
    let usable_for_signing = cert
        .keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_signing()
        .next()
        .is_some();

    let expiration = cert
        .with_policy(&policy, None)
        .ok()
        .and_then(|valid| valid.primary_key().key_expiration_time())
        .map(to_utc);

    let parts = KeyInfoParts {
        id: cert.fingerprint().to_hex(),
        key_ids,
        public: armor_cert(cert, false)?,
        private: if cert.is_tsk() {
            Some(armor_cert(cert, true)?)
        } else {
            None
        },
        usable_for_encryption,
        usable_for_signing,
        fully_encrypted: !protection.is_empty() && protection.iter().all(|p| *p),
        fully_decrypted: !protection.is_empty() && protection.iter().all(|p| !*p),
        revoked: matches!(
            cert.revocation_status(&policy, None),
            RevocationStatus::Revoked(_)
        ),
        emails,
        user_ids,
        created: Some(to_utc(cert.primary_key().key().creation_time())),
        expiration,
        algorithm: Some(cert.primary_key().key().pk_algo().to_string()),
    };
    Ok(normalize(KeyInfo::from_parts(KeyFamily::OpenPgp, parts)))
}

/// Decrypts every protected secret key of `cert`.
fn unlock_cert(cert: &Cert, id: &str, passphrase: &str) -> CryptoResult<Cert> {
    let password = Password::from(passphrase);
    let mut unlocked: Vec<Packet> = Vec::new();
    for ka in cert.keys().secret() {
        let key = ka.key().clone();
        if !key.secret().is_encrypted() {
            continue;
        }
        let key = key
            .decrypt_secret(&password)
            .map_err(|_| CryptoError::WrongPassphrase(id.to_string()))?;
        unlocked.push(if key.fingerprint() == cert.fingerprint() {
            key.role_into_primary().into()
        } else {
            key.role_into_subordinate().into()
        });
    }
    if unlocked.is_empty() {
        return Ok(cert.clone());
    }
    let (cert, _) = cert
        .clone()
        .insert_packets(unlocked)
        .map_err(backend_err("key update failed"))?;
    Ok(cert)
}

fn signature_part(bytes: &[u8]) -> &[u8] {
    let text = String::from_utf8_lossy(bytes);
    match text.find(SIGNATURE_BEGIN) {
        Some(at) if text.len() == bytes.len() => &bytes[at..],
        _ => bytes,
    }
}

/// Secret certificates and passphrases for decryption, plus the public
/// certificates of possible signers.
struct Helper {
    secrets: Vec<(Cert, Option<Password>)>,
    verifiers: Vec<Cert>,
    requested: Vec<String>,
    saw_signature: bool,
    good_signature: bool,
}

impl Helper {
    fn new(secrets: Vec<(Cert, Option<Password>)>, verifiers: Vec<Cert>) -> Self {
        Self {
            secrets,
            verifiers,
            requested: Vec::new(),
            saw_signature: false,
            good_signature: false,
        }
    }

    fn signature_check(&self) -> Option<SignatureCheck> {
        if !self.saw_signature {
            return None;
        }
        let matched = self.verifiers.iter().any(|cert| {
            self.requested.iter().any(|id| {
                cert.keys()
                    .any(|k| k.key().fingerprint().to_hex() == *id || k.key().keyid().to_hex() == *id)
            })
        });
        let valid = if self.good_signature {
            Some(true)
        } else if matched {
            Some(false)
        } else {
            None
        };
        Some(SignatureCheck {
            signer_ids: normalize_ids(&self.requested),
            valid,
        })
    }
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        for id in ids {
            let hex = id.to_hex();
            if !self.requested.contains(&hex) {
                self.requested.push(hex);
            }
        }
        Ok(self
            .verifiers
            .iter()
            .filter(|cert| {
                ids.iter().any(|id| {
                    cert.fingerprint().aliases(id)
                        || cert.keys().any(|k| k.key().fingerprint().aliases(id))
                })
            })
            .cloned()
            .collect())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    self.saw_signature = true;
                    if result.is_ok() {
                        self.good_signature = true;
                    }
                }
            }
        }
        Ok(())
    }
}

impl DecryptionHelper for Helper {
    fn decrypt(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        let policy = StandardPolicy::new();
        for pkesk in pkesks {
            for (cert, password) in &self.secrets {
                for ka in cert
                    .keys()
                    .secret()
                    .with_policy(&policy, None)
                    .supported()
                    .for_transport_encryption()
                    .for_storage_encryption()
                {
                    let mut key = ka.key().clone();
                    if key.secret().is_encrypted() {
                        let Some(password) = password else {
                            continue;
                        };
                        match key.decrypt_secret(password) {
                            Ok(decrypted) => key = decrypted,
                            Err(_) => continue,
                        }
                    }
                    let mut keypair = key.into_keypair()?;
                    if let Some((algo, sk)) = pkesk.decrypt(&mut keypair, sym_algo) {
                        if decrypt(algo, &sk) {
                            return Ok(Some(cert.clone()));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

fn classify_decrypt_error(err: anyhow::Error) -> CryptoError {
    match err.downcast_ref::<openpgp::Error>() {
        Some(openpgp::Error::MissingSessionKey(_)) => {
            CryptoError::KeyMismatch("no offered key recovers the session key".into())
        }
        Some(openpgp::Error::MalformedMessage(msg)) => CryptoError::UnsupportedFormat(msg.clone()),
        _ => CryptoError::CorruptedCiphertext(err.to_string()),
    }
}

impl CryptoBackend for OpenPgpBackend {
    fn family(&self) -> KeyFamily {
        KeyFamily::OpenPgp
    }

    fn parse_keys(&self, text: &str) -> CryptoResult<Vec<KeyInfo>> {
        let chunks = armored_chunks(text);
        if chunks.is_empty() {
            return Err(CryptoError::UnexpectedKeyType(
                "no OpenPGP armor found".into(),
            ));
        }
        let mut keys = Vec::new();
        for chunk in chunks {
            for cert in parse_certs(chunk.as_bytes())? {
                keys.push(key_info(&cert)?);
            }
        }
        if keys.is_empty() {
            return Err(CryptoError::KeyParse("armor holds no certificate".into()));
        }
        debug!("parsed {} OpenPGP key(s)", keys.len());
        Ok(keys)
    }

    fn decrypt_key(&self, key: &KeyInfo, passphrase: &str) -> CryptoResult<KeyInfo> {
        let cert = private_cert(key)?;
        let unlocked = unlock_cert(&cert, key.id(), passphrase)?;
        key_info(&unlocked)
    }

    fn check_passphrase(&self, key: &KeyInfo, passphrase: &str) -> bool {
        let Ok(cert) = private_cert(key) else {
            return false;
        };
        let password = Password::from(passphrase);
        let mut protected = cert
            .keys()
            .secret()
            .map(|ka| ka.key().clone())
            .filter(|k| k.secret().is_encrypted())
            .peekable();
        if protected.peek().is_none() {
            return true;
        }
        protected.any(|k| k.decrypt_secret(&password).is_ok())
    }

    fn message_recipients(&self, message: &[u8]) -> CryptoResult<Vec<String>> {
        let recipients = packet::message_recipients(message)?;
        if recipients.anonymous {
            return Ok(Vec::new());
        }
        Ok(normalize_ids(&recipients.ids))
    }

    fn signer_ids(&self, signature: &[u8]) -> CryptoResult<Vec<String>> {
        Ok(normalize_ids(packet::signature_issuers(signature_part(signature))?))
    }

    fn decrypt(
        &self,
        message: &[u8],
        keys: &[DecryptionKey],
        verification_keys: &[KeyInfo],
    ) -> CryptoResult<Decrypted> {
        let mut secrets = Vec::with_capacity(keys.len());
        for offered in keys {
            let cert = private_cert(&offered.key)?;
            let password = offered
                .passphrase
                .as_ref()
                .map(|p| Password::from(p.as_str()));
            secrets.push((cert, password));
        }
        let mut verifiers = Vec::new();
        for key in verification_keys {
            match public_cert(key) {
                Ok(cert) => verifiers.push(cert),
                Err(err) => debug!("skipping verification key {}: {}", key.id(), err),
            }
        }

        let policy = StandardPolicy::new();
        let mut decryptor = DecryptorBuilder::from_bytes(message)
            .map_err(|err| CryptoError::UnsupportedFormat(err.to_string()))?
            .with_policy(&policy, None, Helper::new(secrets, verifiers))
            .map_err(classify_decrypt_error)?;

        let mut content = Vec::new();
        decryptor
            .read_to_end(&mut content)
            .map_err(|err| CryptoError::CorruptedCiphertext(err.to_string()))?;
        let helper = decryptor.into_helper();
        Ok(Decrypted {
            content,
            signature: helper.signature_check(),
        })
    }

    fn encrypt(&self, plaintext: &[u8], recipients: &[KeyInfo], armor: bool) -> CryptoResult<Vec<u8>> {
        let policy = StandardPolicy::new();
        let certs = recipients
            .iter()
            .map(public_cert)
            .collect::<CryptoResult<Vec<_>>>()?;

        let mut targets: Vec<Recipient> = Vec::new();
        for cert in &certs {
            let before = targets.len();
            for key in cert
                .keys()
                .with_policy(&policy, None)
                .supported()
                .alive()
                .revoked(false)
                .for_transport_encryption()
            {
                targets.push(key.into());
            }
            if targets.len() == before {
                return Err(CryptoError::NoUsableKey(format!(
                    "{} has no encryption-capable key",
                    cert.fingerprint().to_hex()
                )));
            }
        }
        if targets.is_empty() {
            return Err(CryptoError::NoUsableKey("no recipients".into()));
        }

        let mut sink = Vec::new();
        let mut message = Message::new(&mut sink);
        if armor {
            message = Armorer::new(message)
                .build()
                .map_err(backend_err("armor failed"))?;
        }
        let message = Encryptor::for_recipients(message, targets)
            .build()
            .map_err(backend_err("encryptor failed"))?;
        let mut message = LiteralWriter::new(message)
            .build()
            .map_err(backend_err("literal writer failed"))?;
        message
            .write_all(plaintext)
            .map_err(io_err("write failed"))?;
        message.finalize().map_err(backend_err("finalize failed"))?;
        Ok(sink)
    }

    fn sign(
        &self,
        data: &[u8],
        key: &KeyInfo,
        passphrase: Option<&str>,
        mode: SignMode,
    ) -> CryptoResult<Vec<u8>> {
        let cert = private_cert(key)?;
        let policy = StandardPolicy::new();
        let signing = cert
            .keys()
            .secret()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_signing()
            .next()
            .ok_or_else(|| CryptoError::NoUsableKey(format!("{} cannot sign", key.id())))?;

        let mut secret = signing.key().clone();
        if secret.secret().is_encrypted() {
            let passphrase =
                passphrase.ok_or_else(|| CryptoError::NeedPassphrase(key.id().to_string()))?;
            secret = secret
                .decrypt_secret(&Password::from(passphrase))
                .map_err(|_| CryptoError::WrongPassphrase(key.id().to_string()))?;
        }
        let keypair = secret
            .into_keypair()
            .map_err(backend_err("keypair failed"))?;

        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let mut signer = match mode {
            SignMode::Inline => Signer::new(message, keypair)
                .map_err(backend_err("signer failed"))?
                .cleartext()
                .build()
                .map_err(backend_err("signer build failed"))?,
            SignMode::Detached => {
                let message = Armorer::new(message)
                    .kind(ArmorKind::Signature)
                    .build()
                    .map_err(backend_err("armor failed"))?;
                Signer::new(message, keypair)
                    .map_err(backend_err("signer failed"))?
                    .detached()
                    .build()
                    .map_err(backend_err("signer build failed"))?
            }
        };
        signer.write_all(data).map_err(io_err("write failed"))?;
        signer.finalize().map_err(backend_err("finalize failed"))?;
        Ok(sink)
    }

    fn verify(&self, signed: &SignedData<'_>, keys: &[KeyInfo]) -> CryptoResult<bool> {
        let certs = keys
            .iter()
            .map(public_cert)
            .collect::<CryptoResult<Vec<_>>>()?;
        let policy = StandardPolicy::new();
        let helper = Helper::new(Vec::new(), certs);

        let helper = match signed {
            SignedData::Inline(text) => {
                let mut verifier = VerifierBuilder::from_bytes(*text)
                    .map_err(|err| CryptoError::UnsupportedFormat(err.to_string()))?
                    .with_policy(&policy, None, helper)
                    .map_err(|err| CryptoError::CorruptedCiphertext(err.to_string()))?;
                let mut sink = Vec::new();
                verifier
                    .read_to_end(&mut sink)
                    .map_err(|err| CryptoError::CorruptedCiphertext(err.to_string()))?;
                verifier.into_helper()
            }
            SignedData::Detached { data, signature } => {
                let mut verifier = DetachedVerifierBuilder::from_bytes(*signature)
                    .map_err(|err| CryptoError::UnsupportedFormat(err.to_string()))?
                    .with_policy(&policy, None, helper)
                    .map_err(|err| CryptoError::CorruptedCiphertext(err.to_string()))?;
                verifier
                    .verify_bytes(*data)
                    .map_err(|err| CryptoError::CorruptedCiphertext(err.to_string()))?;
                verifier.into_helper()
            }
        };
        Ok(helper.good_signature)
    }
}
