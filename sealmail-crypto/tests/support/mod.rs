//! Key generation helpers shared by the backend tests.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Builder, X509NameBuilder};
use sealmail_crypto::parse;
use sealmail_types::KeyInfo;
use sequoia_openpgp as openpgp;
use openpgp::armor::{Kind as ArmorKind, Writer as ArmorWriter};
use openpgp::cert::prelude::*;
use openpgp::crypto::Password;
use openpgp::serialize::Serialize;

/// A fresh general purpose OpenPGP key (signing + encryption subkeys).
pub fn pgp_cert(user_id: &str, password: Option<&str>) -> Cert {
    let mut builder = CertBuilder::general_purpose(Some(user_id));
    if let Some(password) = password {
        builder = builder.set_password(Some(Password::from(password)));
    }
    let (cert, _revocation) = builder.generate().unwrap();
    cert
}

pub fn armored_secret(cert: &Cert) -> String {
    let mut writer = ArmorWriter::new(Vec::new(), ArmorKind::SecretKey).unwrap();
    cert.as_tsk().serialize(&mut writer).unwrap();
    String::from_utf8(writer.finalize().unwrap()).unwrap()
}

/// Parsed private OpenPGP key.
pub fn pgp_key(user_id: &str, password: Option<&str>) -> KeyInfo {
    parse(&armored_secret(&pgp_cert(user_id, password))).unwrap()
}

/// The public half of `key`, as a correspondent would hold it.
pub fn public_half(key: &KeyInfo) -> KeyInfo {
    parse(key.public()).unwrap()
}

/// PEM bundle of a self-signed RSA certificate and its PKCS#8 key.
pub fn smime_pem(email: &str, serial: u32, password: Option<&str>, expired: bool) -> String {
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
    if expired {
        builder.set_not_before(&Asn1Time::from_unix(900_000_000).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::from_unix(1_000_000_000).unwrap()).unwrap();
    } else {
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
    }
    let san = SubjectAlternativeName::new()
        .email(email)
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let key_pem = match password {
        Some(password) => pkey
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
            .unwrap(),
        None => pkey.private_key_to_pem_pkcs8().unwrap(),
    };
    format!(
        "{}{}",
        String::from_utf8(cert.to_pem().unwrap()).unwrap(),
        String::from_utf8(key_pem).unwrap()
    )
}

pub fn smime_key(email: &str, serial: u32, password: Option<&str>) -> KeyInfo {
    parse(&smime_pem(email, serial, password, false)).unwrap()
}
