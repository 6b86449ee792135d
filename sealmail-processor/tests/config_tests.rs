use sealmail_processor::{EncryptOptions, Framing, ProcessorConfig};

// ── ProcessorConfig ──

#[test]
fn default_fetch_budget_is_one() {
    let config = ProcessorConfig::default();
    assert_eq!(config.max_pubkey_fetches, 1);
}

#[test]
fn default_decrypts_attachments() {
    let config = ProcessorConfig::default();
    assert!(config.decrypt_attachments);
}

#[test]
fn default_scan_options_recognize_links() {
    let config = ProcessorConfig::default();
    assert!(!config.scan.link_rules.is_empty());
    assert!(config.scan.drop_blank_runs);
}

#[test]
fn config_serialization_roundtrip() {
    let config = ProcessorConfig {
        max_pubkey_fetches: 3,
        decrypt_attachments: false,
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: ProcessorConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.max_pubkey_fetches, 3);
    assert!(!back.decrypt_attachments);
    assert_eq!(back.scan.link_rules, config.scan.link_rules);
}

#[test]
fn partial_config_fills_defaults() {
    let config: ProcessorConfig = serde_json::from_str(r#"{"max_pubkey_fetches": 0}"#).unwrap();
    assert_eq!(config.max_pubkey_fetches, 0);
    assert!(config.decrypt_attachments);
}

// ── EncryptOptions ──

#[test]
fn default_encrypt_options_are_armored_auto() {
    let options = EncryptOptions::default();
    assert_eq!(options.framing, Framing::Auto);
    assert!(options.armor);
}

#[test]
fn framing_serializes_camel_case() {
    let json = serde_json::to_string(&Framing::SmimeOnly).unwrap();
    assert_eq!(json, "\"smimeOnly\"");
    let back: Framing = serde_json::from_str("\"openPgpOnly\"").unwrap();
    assert_eq!(back, Framing::OpenPgpOnly);
}
