//! Display strings of crypto errors.

use sealmail_crypto::CryptoError;

#[test]
fn error_display_strings() {
    let cases = [
        (
            CryptoError::UnexpectedKeyType("no armor".into()),
            "unexpected key type: no armor",
        ),
        (CryptoError::KeyParse("bad".into()), "malformed key: bad"),
        (
            CryptoError::WrongPassphrase("ABCD".into()),
            "wrong passphrase for key ABCD",
        ),
        (
            CryptoError::NeedPassphrase("ABCD".into()),
            "passphrase needed for key ABCD",
        ),
        (CryptoError::NoUsableKey("none".into()), "no usable key: none"),
        (
            CryptoError::KeyMismatch("x".into()),
            "key does not match message: x",
        ),
        (
            CryptoError::CorruptedCiphertext("mdc".into()),
            "corrupted ciphertext: mdc",
        ),
        (
            CryptoError::UnsupportedKeyType("dsa".into()),
            "unsupported key type: dsa",
        ),
        (
            CryptoError::UnsupportedFormat("?".into()),
            "unsupported message format: ?",
        ),
        (CryptoError::Backend("boom".into()), "backend failure: boom"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn openssl_errors_become_backend_failures() {
    let stack = openssl::error::ErrorStack::get();
    let err: CryptoError = stack.into();
    assert!(matches!(err, CryptoError::Backend(_)));
}
