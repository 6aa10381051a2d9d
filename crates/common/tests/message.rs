//! Integration tests for multi-recipient messages

mod common;

use ::common::crypto::packet::{read_packets, Packet, Tag};
use ::common::crypto::{
    CryptoError, ErrorClass, Key, MessageReader, MessageWriter, SecureRandom, SignatureStatus,
};
use proptest::prelude::*;

fn reencode(packets: &[Packet]) -> Vec<u8> {
    let mut out = Vec::new();
    for packet in packets {
        packet.encode(&mut out);
    }
    out
}

#[tokio::test]
async fn test_roundtrip_every_recipient() {
    let alice = common::unlocked("alice <a@example.com>").await;
    let bob = common::unlocked("bob <b@example.com>").await;
    let carol = common::unlocked("carol <c@example.com>").await;
    let random = SecureRandom::new().unwrap();

    let recipients = [alice.key_set(), bob.key_set(), carol.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(b"the quarterly numbers")
        .unwrap();

    for recipient in [&alice, &bob, &carol] {
        let payload = MessageReader::new(alice.key_set(), recipient)
            .read(&message)
            .unwrap();
        assert_eq!(payload, b"the quarterly numbers");
    }
}

#[tokio::test]
async fn test_roundtrip_one_mebibyte() {
    let alice = common::unlocked("alice").await;
    let random = SecureRandom::new().unwrap();
    let mut payload = vec![0u8; 1024 * 1024];
    ::common::crypto::RandomSource::fill(&random, &mut payload).unwrap();

    let recipients = [alice.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(&payload)
        .unwrap();
    let read = MessageReader::new(alice.key_set(), &alice)
        .read_message(&message)
        .unwrap();
    assert_eq!(read.payload, payload);
    assert_eq!(read.signature, SignatureStatus::Verified);
}

#[tokio::test]
async fn test_empty_payload() {
    let alice = common::unlocked("alice").await;
    let random = SecureRandom::new().unwrap();
    let recipients = [alice.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(&[])
        .unwrap();
    assert!(MessageReader::new(alice.key_set(), &alice)
        .read(&message)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_non_recipient_gets_no_match() {
    let alice = common::unlocked("alice").await;
    let eve = common::unlocked("eve").await;
    let random = SecureRandom::new().unwrap();

    let recipients = [alice.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(b"not for eve")
        .unwrap();
    let err = MessageReader::new(alice.key_set(), &eve)
        .read(&message)
        .unwrap_err();
    match err {
        CryptoError::NoMatchingRecipient(id) => assert_eq!(id, eve.sub_key().key_id()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_integrity() {
    let alice = common::unlocked("alice").await;
    let random = SecureRandom::new().unwrap();
    let recipients = [alice.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(b"do not touch")
        .unwrap();

    let mut packets = read_packets(message).unwrap();
    let last = packets.len() - 1;
    assert_eq!(packets[last].tag, Tag::SymEncryptedIntegrityProtectedData);
    let mut body = packets[last].body.to_vec();
    body[40] ^= 0x80;
    packets[last] = Packet::new(Tag::SymEncryptedIntegrityProtectedData, body);

    let err = MessageReader::new(alice.key_set(), &alice)
        .read(&reencode(&packets))
        .unwrap_err();
    assert!(matches!(err, CryptoError::IntegrityCheckFailed));
    assert_eq!(err.class(), ErrorClass::DataIntegrity);
}

#[tokio::test]
async fn test_truncated_ciphertext_fails_integrity() {
    let alice = common::unlocked("alice").await;
    let random = SecureRandom::new().unwrap();
    let recipients = [alice.key_set()];
    let message = MessageWriter::new(&alice, &recipients, &random)
        .write(b"cut short")
        .unwrap();

    let mut packets = read_packets(message).unwrap();
    let last = packets.len() - 1;
    let body = packets[last].body.slice(..packets[last].body.len() - 16);
    packets[last] = Packet::new(Tag::SymEncryptedIntegrityProtectedData, body);

    assert!(matches!(
        MessageReader::new(alice.key_set(), &alice).read(&reencode(&packets)),
        Err(CryptoError::IntegrityCheckFailed)
    ));
}

#[tokio::test]
async fn test_wrong_sender_is_advisory() {
    let alice = common::unlocked("alice").await;
    let bob = common::unlocked("bob").await;
    let mallory = common::unlocked("mallory").await;
    let random = SecureRandom::new().unwrap();

    let recipients = [bob.key_set()];
    let message = MessageWriter::new(&mallory, &recipients, &random)
        .write(b"trust me, I'm alice")
        .unwrap();

    let read = MessageReader::new(alice.key_set(), &bob)
        .read_message(&message)
        .unwrap();
    assert_eq!(read.payload, b"trust me, I'm alice");
    assert_eq!(read.signature, SignatureStatus::Invalid);
    assert_eq!(read.signer, Some(mallory.key_id()));
    assert!(!read.is_verified());

    // plain reads still hand back the payload
    assert!(MessageReader::new(alice.key_set(), &bob)
        .read(&message)
        .is_ok());
}

#[tokio::test]
async fn test_messages_differ_each_time() {
    let alice = common::unlocked("alice").await;
    let random = SecureRandom::new().unwrap();
    let recipients = [alice.key_set()];
    let writer = MessageWriter::new(&alice, &recipients, &random);
    assert_ne!(writer.write(b"same").unwrap(), writer.write(b"same").unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (alice, bob) = runtime.block_on(async {
            (common::unlocked("alice").await, common::unlocked("bob").await)
        });
        let random = SecureRandom::new().unwrap();
        let recipients = [alice.key_set(), bob.key_set()];
        let message = MessageWriter::new(&alice, &recipients, &random)
            .write(&payload)
            .unwrap();
        for recipient in [&alice, &bob] {
            let read = MessageReader::new(alice.key_set(), recipient)
                .read_message(&message)
                .unwrap();
            prop_assert_eq!(&read.payload, &payload);
            prop_assert_eq!(read.signature, SignatureStatus::Verified);
        }
    }
}
