mod support;

use pretty_assertions::assert_eq;
use sealmail_parse::{decode_mime, detect_blocks};
use sealmail_processor::{
    CancelHandle, CancelToken, EncryptOptions, MessageProcessor, ProcessorConfig, RenderContext,
    RenderOutcome,
};
use sealmail_types::{BlockType, DecryptErrorKind, MsgBlock};
use support::{pgp_key, public_half, sign_and_encrypt};

fn rendered(outcome: RenderOutcome) -> Vec<MsgBlock> {
    match outcome {
        RenderOutcome::Rendered(blocks) => blocks,
        RenderOutcome::Cancelled => panic!("render was cancelled"),
    }
}

#[tokio::test]
async fn mixed_message_renders_every_block() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    let bob = pgp_key("Bob <bob@example.com>", None);

    let encrypted = processor
        .encrypt(b"for alice only\n", &[public_half(&alice)], &EncryptOptions::default())
        .await
        .unwrap();
    let signed = processor.sign(b"bob says hi\n", &bob, None, false).await.unwrap();
    let text = format!(
        "intro\n{}\n{}\n{}outro\n",
        String::from_utf8(encrypted).unwrap(),
        String::from_utf8(signed).unwrap(),
        public_half(&bob).public()
    );
    let blocks = detect_blocks(&text).blocks;

    let ctx = RenderContext {
        decryption_keys: vec![alice],
        verification_keys: vec![public_half(&bob)],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());

    let types: Vec<BlockType> = out.iter().map(|b| b.block_type).collect();
    assert_eq!(
        types,
        vec![
            BlockType::PlainText,
            BlockType::DecryptedText,
            BlockType::VerifiedMsg,
            BlockType::PublicKey,
            BlockType::PlainText,
        ]
    );
    assert_eq!(out[1].content.to_text(), "for alice only\n");
    assert_eq!(out[2].content.to_text().trim_end(), "bob says hi");
    assert!(out[2].verify_result().unwrap().is_valid());
    assert!(bob.matches_any(out[3].key_details().unwrap().key_ids()));
}

#[tokio::test]
async fn undecryptable_block_becomes_decrypt_error() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    let bob = pgp_key("Bob <bob@example.com>", None);
    let encrypted = processor
        .encrypt(b"for bob\n", &[public_half(&bob)], &EncryptOptions::default())
        .await
        .unwrap();
    let blocks = detect_blocks(&String::from_utf8(encrypted).unwrap()).blocks;

    let ctx = RenderContext {
        decryption_keys: vec![alice],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].block_type, BlockType::DecryptErr);
    assert_eq!(out[0].decrypt_error().unwrap().kind, DecryptErrorKind::NoUsableKey);
    // the armored text stays available for display
    assert_eq!(out[0].content, blocks[0].content);
}

#[tokio::test]
async fn signed_and_encrypted_renders_verified_text() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    let bob = pgp_key("Bob <bob@example.com>", None);
    let blocks = detect_blocks(&sign_and_encrypt(b"both at once\n", &bob, &alice)).blocks;

    let ctx = RenderContext {
        decryption_keys: vec![alice],
        verification_keys: vec![public_half(&bob)],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].block_type, BlockType::VerifiedMsg);
    assert_eq!(out[0].content.to_text(), "both at once\n");
    assert!(out[0].verify_result().unwrap().is_valid());
}

#[tokio::test]
async fn unreadable_key_block_renders_as_text() {
    let processor = MessageProcessor::default();
    let text = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nnot really\n-----END PGP PUBLIC KEY BLOCK-----\n";
    let blocks = detect_blocks(text).blocks;

    let out = rendered(
        processor
            .render_blocks(&blocks, &RenderContext::default(), &CancelToken::none())
            .await
            .unwrap(),
    );
    assert_eq!(out[0].block_type, BlockType::PlainText);
}

#[tokio::test]
async fn truncated_key_block_renders_as_text() {
    let processor = MessageProcessor::default();
    let text = "hello\n-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQENBF";
    let blocks = detect_blocks(text).blocks;
    assert!(!blocks.last().unwrap().complete);

    let out = rendered(
        processor
            .render_blocks(&blocks, &RenderContext::default(), &CancelToken::none())
            .await
            .unwrap(),
    );
    let types: Vec<(BlockType, bool)> = out.iter().map(|b| (b.block_type, b.complete)).collect();
    assert_eq!(
        types,
        vec![(BlockType::PlainText, true), (BlockType::PlainText, false)]
    );
    assert!(out[1].content.to_text().contains("mQENBF"));
}

#[tokio::test]
async fn key_inside_encrypted_message_gets_details() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    let bob = pgp_key("Bob <bob@example.com>", None);
    let plaintext = format!("here is my key\n{}", public_half(&bob).public());
    let encrypted = processor
        .encrypt(plaintext.as_bytes(), &[public_half(&alice)], &EncryptOptions::default())
        .await
        .unwrap();
    let blocks = detect_blocks(&String::from_utf8(encrypted).unwrap()).blocks;

    let ctx = RenderContext {
        decryption_keys: vec![alice],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());
    assert_eq!(out[0].block_type, BlockType::DecryptedText);
    assert_eq!(out[0].content.to_text().trim_end(), "here is my key");
    let key = out
        .iter()
        .find(|b| b.block_type == BlockType::PublicKey)
        .expect("nested public key block");
    assert!(bob.matches_any(key.key_details().unwrap().key_ids()));
}

#[tokio::test]
async fn truncated_key_inside_encrypted_message_stays_decrypted_text() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    let plaintext = "key follows\n-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQENBF";
    let encrypted = processor
        .encrypt(plaintext.as_bytes(), &[public_half(&alice)], &EncryptOptions::default())
        .await
        .unwrap();
    let blocks = detect_blocks(&String::from_utf8(encrypted).unwrap()).blocks;

    let ctx = RenderContext {
        decryption_keys: vec![alice],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());
    let types: Vec<BlockType> = out.iter().map(|b| b.block_type).collect();
    assert_eq!(types, vec![BlockType::DecryptedText, BlockType::DecryptedText]);
    assert!(out[1].content.to_text().contains("mQENBF"));
}

#[tokio::test]
async fn signed_mime_renders_verified_text() {
    let processor = MessageProcessor::default();
    let alice = pgp_key("Alice <alice@example.com>", None);
    // the CRLF before the next boundary belongs to the delimiter
    let signed_part = "Content-Type: text/plain; charset=utf-8\r\n\r\nsigned mime body";
    let signature = processor
        .sign(signed_part.as_bytes(), &alice, None, true)
        .await
        .unwrap();
    let raw = format!(
        "Content-Type: multipart/signed; protocol=\"application/pgp-signature\"; micalg=pgp-sha256; boundary=\"b1\"\r\n\
         \r\n\
         --b1\r\n\
         {signed_part}\r\n\
         --b1\r\n\
         Content-Type: application/pgp-signature\r\n\
         \r\n\
         {}\r\n\
         --b1--\r\n",
        String::from_utf8(signature).unwrap()
    );
    let blocks = decode_mime(raw.as_bytes()).blocks();
    assert!(blocks[0].is_detached_signed());

    let ctx = RenderContext {
        verification_keys: vec![public_half(&alice)],
        ..Default::default()
    };
    let out = rendered(processor.render_blocks(&blocks, &ctx, &CancelToken::none()).await.unwrap());
    assert_eq!(out[0].block_type, BlockType::VerifiedMsg);
    assert!(out[0].content.to_text().contains("signed mime body"));
    assert_eq!(out[0].verify_result().unwrap().matched, Some(true));
}

#[tokio::test]
async fn attachments_stay_encrypted_when_disabled() {
    let processor = MessageProcessor::new(ProcessorConfig {
        decrypt_attachments: false,
        ..Default::default()
    });
    let block = MsgBlock::new(BlockType::EncryptedAtt, vec![0xC1, 0x00]);
    let out = rendered(
        processor
            .render_blocks(&[block.clone()], &RenderContext::default(), &CancelToken::none())
            .await
            .unwrap(),
    );
    assert_eq!(out, vec![block]);
}

#[tokio::test]
async fn cancelled_render_returns_nothing() {
    let processor = MessageProcessor::default();
    let handle = CancelHandle::new();
    handle.cancel();
    let outcome = processor
        .render_blocks(&[MsgBlock::plain_text("hi")], &RenderContext::default(), &handle.token())
        .await
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Cancelled);
}
