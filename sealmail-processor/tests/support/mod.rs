//! Keys and fake collaborators shared by the processor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Builder, X509NameBuilder};
use sealmail_crypto::parse;
use sealmail_processor::{
    KeyStore, LookupError, MemoryKeyStore, ProcessorError, ProcessorResult, PubkeyLookup,
};
use sealmail_types::KeyInfo;
use sequoia_openpgp as openpgp;
use openpgp::armor::{Kind as ArmorKind, Writer as ArmorWriter};
use openpgp::cert::prelude::*;
use openpgp::crypto::Password;
use openpgp::parse::Parse;
use openpgp::PacketPile;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message, Recipient, Signer};
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use zeroize::Zeroizing;

pub const ACCT: &str = "acct-1";

// ── Keys ──

pub fn pgp_key(user_id: &str, password: Option<&str>) -> KeyInfo {
    let mut builder = CertBuilder::general_purpose(Some(user_id));
    if let Some(password) = password {
        builder = builder.set_password(Some(Password::from(password)));
    }
    let (cert, _revocation) = builder.generate().unwrap();
    let mut writer = ArmorWriter::new(Vec::new(), ArmorKind::SecretKey).unwrap();
    cert.as_tsk().serialize(&mut writer).unwrap();
    parse(&String::from_utf8(writer.finalize().unwrap()).unwrap()).unwrap()
}

pub fn public_half(key: &KeyInfo) -> KeyInfo {
    parse(key.public()).unwrap()
}

/// Self-signed RSA certificate with an unencrypted PKCS#8 key.
pub fn smime_key(email: &str, serial: u32) -> KeyInfo {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "Sealmail Test").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
    let san = SubjectAlternativeName::new()
        .email(email)
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let pem = format!(
        "{}{}",
        String::from_utf8(cert.to_pem().unwrap()).unwrap(),
        String::from_utf8(pkey.private_key_to_pem_pkcs8().unwrap()).unwrap()
    );
    parse(&pem).unwrap()
}

/// Joins armored detached signatures into one armored signature block
/// carrying every signature packet.
pub fn merge_signatures(signatures: &[Vec<u8>]) -> String {
    let mut writer = ArmorWriter::new(Vec::new(), ArmorKind::Signature).unwrap();
    for signature in signatures {
        PacketPile::from_bytes(signature)
            .unwrap()
            .serialize(&mut writer)
            .unwrap();
    }
    String::from_utf8(writer.finalize().unwrap()).unwrap()
}

/// Signs with `signer` and encrypts for `recipient` in one OpenPGP message,
/// the way mail clients send signed-and-encrypted mail.
pub fn sign_and_encrypt(plaintext: &[u8], signer: &KeyInfo, recipient: &KeyInfo) -> String {
    let policy = StandardPolicy::new();
    let signer_cert = Cert::from_bytes(signer.private().unwrap().as_bytes()).unwrap();
    let keypair = signer_cert
        .keys()
        .unencrypted_secret()
        .with_policy(&policy, None)
        .for_signing()
        .next()
        .unwrap()
        .key()
        .clone()
        .into_keypair()
        .unwrap();
    let recipient_cert = Cert::from_bytes(recipient.public().as_bytes()).unwrap();
    let recipients: Vec<Recipient> = recipient_cert
        .keys()
        .with_policy(&policy, None)
        .for_transport_encryption()
        .map(|ka| ka.into())
        .collect();

    let mut sink = Vec::new();
    let message = Armorer::new(Message::new(&mut sink)).build().unwrap();
    let message = Encryptor::for_recipients(message, recipients).build().unwrap();
    let message = Signer::new(message, keypair).unwrap().build().unwrap();
    let mut message = LiteralWriter::new(message).build().unwrap();
    message.write_all(plaintext).unwrap();
    message.finalize().unwrap();
    String::from_utf8(sink).unwrap()
}

// ── Collaborators ──

/// Directory returning fixed answers and counting calls.
#[derive(Default)]
pub struct FakeLookup {
    answers: Mutex<Vec<Result<Vec<String>, LookupError>>>,
    calls: AtomicUsize,
}

impl FakeLookup {
    /// Queues answers; the last one repeats.
    pub fn answering(answers: Vec<Result<Vec<String>, LookupError>>) -> Self {
        Self {
            answers: Mutex::new(answers),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PubkeyLookup for FakeLookup {
    async fn lookup_by_email(&self, _email: &str) -> Result<Vec<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        match answers.len() {
            0 => Ok(Vec::new()),
            1 => answers[0].clone(),
            _ => answers.remove(0),
        }
    }
}

/// Store that keeps keys in memory but cannot persist fetched keys.
pub struct ReadOnlyStore(pub MemoryKeyStore);

#[async_trait]
impl KeyStore for ReadOnlyStore {
    async fn decryption_keys(&self, acct_id: &str) -> ProcessorResult<Vec<KeyInfo>> {
        self.0.decryption_keys(acct_id).await
    }

    async fn passphrase(
        &self,
        acct_id: &str,
        key_id: &str,
    ) -> ProcessorResult<Option<Zeroizing<String>>> {
        self.0.passphrase(acct_id, key_id).await
    }

    async fn persist_fetched_pubkey(&self, _email: &str, _armored: &str) -> ProcessorResult<()> {
        Err(ProcessorError::Store("read-only key store".into()))
    }
}
