use sealmail_crypto::CryptoError;
use sealmail_processor::{LookupError, ProcessorError};
use sealmail_types::ModelError;

#[test]
fn crypto_error_display_is_wrapped() {
    let err: ProcessorError = CryptoError::KeyParse("bad packet".into()).into();
    assert_eq!(err.to_string(), "crypto error: malformed key: bad packet");
}

#[test]
fn model_error_becomes_fatal_assertion() {
    let err: ProcessorError = ModelError::FatalAssertion("key details attached to plainText block".into()).into();
    match err {
        ProcessorError::FatalAssertion(msg) => assert!(msg.contains("plainText")),
        other => panic!("expected FatalAssertion, got: {other:?}"),
    }
}

#[test]
fn mixed_families_message_names_framing_choice() {
    let err = ProcessorError::MixedFamilies("openpgp and x509".into());
    let msg = err.to_string();
    assert!(msg.contains("openpgp and x509"));
    assert!(msg.contains("S/MIME-only"));
}

#[test]
fn store_and_task_display() {
    assert_eq!(
        ProcessorError::Store("disk full".into()).to_string(),
        "key store failure: disk full"
    );
    assert_eq!(
        ProcessorError::Task("worker panicked".into()).to_string(),
        "worker task failed: worker panicked"
    );
}

#[test]
fn lookup_error_display() {
    assert_eq!(
        LookupError::Timeout("bob@example.com".into()).to_string(),
        "lookup for bob@example.com timed out"
    );
    assert_eq!(
        LookupError::Network("503".into()).to_string(),
        "lookup request failed: 503"
    );
}
