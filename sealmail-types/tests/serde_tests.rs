use sealmail_types::{
    BlockDetails, BlockType, DecryptError, DecryptErrorKind, KeyFamily, MsgBlock, VerifyResult,
};

#[test]
fn block_type_serializes_camel_case() {
    let json = serde_json::to_string(&BlockType::EncryptedMsgLink).unwrap();
    assert_eq!(json, "\"encryptedMsgLink\"");
    let back: BlockType = serde_json::from_str("\"decryptErr\"").unwrap();
    assert_eq!(back, BlockType::DecryptErr);
}

#[test]
fn key_family_wire_names() {
    assert_eq!(serde_json::to_string(&KeyFamily::OpenPgp).unwrap(), "\"openpgp\"");
    assert_eq!(serde_json::to_string(&KeyFamily::X509).unwrap(), "\"x509\"");
}

#[test]
fn verify_result_uses_match_field() {
    let result = VerifyResult {
        matched: Some(true),
        signer_ids: vec!["ABCD".into()],
        supplied_ids: vec!["ABCD".into()],
        error: None,
        is_error_fatal: false,
    };
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["match"], serde_json::json!(true));
    assert_eq!(value["signerIds"][0], "ABCD");
    assert!(value.get("error").is_none());
}

#[test]
fn rendered_block_roundtrip() {
    let block = MsgBlock::new(BlockType::DecryptErr, "-----BEGIN PGP MESSAGE-----").with_details(
        BlockDetails::DecryptError(
            DecryptError::new(DecryptErrorKind::NeedPassphrase, "locked")
                .with_key_ids(vec!["89ABCDEF01234567".into()]),
        ),
    );
    let json = serde_json::to_string(&block).unwrap();
    assert!(json.contains("\"type\":\"decryptErr\""));
    assert!(json.contains("\"needPassphrase\""));
    let back: MsgBlock = serde_json::from_str(&json).unwrap();
    assert_eq!(back, block);
}
