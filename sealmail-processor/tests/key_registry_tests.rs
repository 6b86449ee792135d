mod support;

use sealmail_processor::{KeyStore, MemoryKeyStore};
use std::sync::Arc;
use support::{ACCT, pgp_key, public_half};

#[tokio::test]
async fn empty_store_has_no_keys() {
    let store = MemoryKeyStore::new();
    assert!(store.is_empty(ACCT).await);
    assert!(store.decryption_keys(ACCT).await.unwrap().is_empty());
}

#[tokio::test]
async fn decryption_keys_skip_public_keys() {
    let store = MemoryKeyStore::new();
    let alice = pgp_key("Alice <alice@example.com>", None);
    store.insert_key(ACCT, public_half(&alice)).await;
    store.insert_key(ACCT, alice.clone()).await;

    // same id: the private record replaced the public one
    assert_eq!(store.len(ACCT).await, 1);
    let keys = store.decryption_keys(ACCT).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].is_private());
}

#[tokio::test]
async fn keys_are_scoped_per_account() {
    let store = MemoryKeyStore::new();
    store.insert_key(ACCT, pgp_key("Alice <alice@example.com>", None)).await;
    assert!(store.decryption_keys("acct-2").await.unwrap().is_empty());
}

#[tokio::test]
async fn remove_key_accepts_unnormalized_id() {
    let store = MemoryKeyStore::new();
    let alice = pgp_key("Alice <alice@example.com>", None);
    store.insert_key(ACCT, alice.clone()).await;

    let loose = format!("0x{}", alice.id().to_lowercase());
    let removed = store.remove_key(ACCT, &loose).await.unwrap();
    assert_eq!(removed.id(), alice.id());
    assert!(store.is_empty(ACCT).await);
    assert!(store.remove_key(ACCT, &loose).await.is_none());
}

#[tokio::test]
async fn passphrases_round_trip_by_normalized_id() {
    let store = MemoryKeyStore::new();
    store.set_passphrase(ACCT, "0xabcdef", "hunter2").await;

    let got = store.passphrase(ACCT, "ABCDEF").await.unwrap().unwrap();
    assert_eq!(got.as_str(), "hunter2");
    assert!(store.forget_passphrase(ACCT, "abcdef").await);
    assert!(store.passphrase(ACCT, "ABCDEF").await.unwrap().is_none());
}

#[tokio::test]
async fn fetched_pubkeys_are_deduplicated_per_email() {
    let store = MemoryKeyStore::new();
    store.persist_fetched_pubkey("Bob@Example.com", "KEY-A").await.unwrap();
    store.persist_fetched_pubkey("bob@example.com", "KEY-A").await.unwrap();
    store.persist_fetched_pubkey("bob@example.com", "KEY-B").await.unwrap();

    assert_eq!(store.fetched_pubkeys("bob@example.com").await, vec!["KEY-A", "KEY-B"]);
}

#[tokio::test]
async fn concurrent_inserts_are_all_kept() {
    let store = Arc::new(MemoryKeyStore::new());
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.set_passphrase(ACCT, &format!("{i:02X}"), "pw").await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    for i in 0..8 {
        assert!(store.passphrase(ACCT, &format!("{i:02X}")).await.unwrap().is_some());
    }
}
