//! Multi-recipient encrypted messages
//!
//! A message is one session key packet per recipient followed by a single
//! encrypted data packet. Inside the encrypted data sits a binary signature
//! by the sender's master key and the ZLIB-compressed literal payload it
//! covers:
//!
//! ```text
//! [ PKESK: recipient 1 ] ... [ PKESK: recipient n ]
//! [ SEIPD v2: [ Signature ][ CompressedData: [ LiteralData ] ] ]
//! ```
//!
//! The signature is advisory. [`MessageReader::read`] returns the payload
//! even when it doesn't verify; [`MessageReader::read_message`] reports the
//! outcome for callers that care who wrote it.

mod literal;
mod seipd;
mod session;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::algorithms::{CompressionAlgorithm, HashAlgorithm, SignatureType, SymmetricAlgorithm};
use super::error::{CryptoError, CryptoResult};
use super::key::{Key, KeyId};
use super::key_set::{KeySet, UnlockedKeySet};
use super::packet::{read_packets, Packet, Tag};
use super::random::{random_array, RandomSource};
use super::signature::{SignatureBuilder, SignaturePacket};

use session::EncryptedSessionKey;

pub(crate) const SESSION_KEY_SIZE: usize = SymmetricAlgorithm::DEFAULT.key_size();

/// Outcome of checking a message's embedded signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    /// Signed by the expected sender's master key.
    Verified,
    /// Signed, but not verifiably by the expected sender.
    Invalid,
    /// No signature at all.
    Missing,
}

/// A decrypted payload and what we know about its author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub payload: Vec<u8>,
    pub signer: Option<KeyId>,
    pub signature: SignatureStatus,
}

impl DecryptedMessage {
    pub fn is_verified(&self) -> bool {
        self.signature == SignatureStatus::Verified
    }
}

/// Signs and encrypts payloads from one sender to a fixed set of recipients.
pub struct MessageWriter<'a> {
    sender: &'a UnlockedKeySet,
    recipients: &'a [&'a KeySet],
    random: &'a dyn RandomSource,
}

impl<'a> MessageWriter<'a> {
    pub fn new(
        sender: &'a UnlockedKeySet,
        recipients: &'a [&'a KeySet],
        random: &'a dyn RandomSource,
    ) -> Self {
        Self {
            sender,
            recipients,
            random,
        }
    }

    /// Encrypts `payload` so any of the recipients can read it.
    pub fn write(&self, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        if self.recipients.is_empty() {
            return Err(CryptoError::EncryptionFailed("no recipients".into()));
        }

        let now = Utc::now();
        let compressed = literal::compress(
            CompressionAlgorithm::DEFAULT,
            &literal::literal(payload, now),
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let master = self.sender.master_key();
        let signature = SignatureBuilder::new(SignatureType::Binary, HashAlgorithm::DEFAULT, now)
            .sign(
                self.sender.signing_key(),
                master.key_id(),
                &[&compressed.body[..]],
            )?;

        let mut inner = Vec::with_capacity(compressed.body.len() + 128);
        signature.to_packet().encode(&mut inner);
        compressed.encode(&mut inner);

        let session_key = random_array::<SESSION_KEY_SIZE>(self.random)?;
        let encrypted = seipd::encrypt(&session_key, &inner, self.random)?;

        let mut out = Vec::with_capacity(encrypted.body.len() + self.recipients.len() * 96 + 8);
        for recipient in self.recipients {
            EncryptedSessionKey::wrap(recipient.sub_key(), &session_key, self.random)?
                .encode(&mut out);
        }
        encrypted.encode(&mut out);

        tracing::debug!(
            sender = %master.key_id(),
            recipients = self.recipients.len(),
            payload_len = payload.len(),
            "wrote message"
        );
        Ok(out)
    }
}

/// Decrypts messages addressed to one recipient from one expected sender.
pub struct MessageReader<'a> {
    sender: &'a KeySet,
    recipient: &'a UnlockedKeySet,
}

impl<'a> MessageReader<'a> {
    pub fn new(sender: &'a KeySet, recipient: &'a UnlockedKeySet) -> Self {
        Self { sender, recipient }
    }

    /// Decrypts `message` and returns the payload.
    pub fn read(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.read_message(message)?.payload)
    }

    /// Decrypts `message`, reporting the signature outcome alongside the
    /// payload.
    pub fn read_message(&self, message: &[u8]) -> CryptoResult<DecryptedMessage> {
        let packets = read_packets(message.to_vec())?;
        let sub = self.recipient.sub_key();

        let mut session_keys = Vec::new();
        let mut encrypted = None;
        for packet in &packets {
            match packet.tag {
                Tag::PublicKeyEncryptedSessionKey => {
                    session_keys.push(EncryptedSessionKey::parse(packet)?)
                }
                Tag::SymEncryptedIntegrityProtectedData if encrypted.is_none() => {
                    encrypted = Some(packet)
                }
                tag => {
                    return Err(CryptoError::malformed_message(format!(
                        "unexpected {tag} packet"
                    )))
                }
            }
        }
        let encrypted = encrypted
            .ok_or_else(|| CryptoError::malformed_message("no encrypted data packet"))?;

        let session_key = session_keys
            .iter()
            .find(|k| k.key_id() == sub.key_id())
            .ok_or(CryptoError::NoMatchingRecipient(sub.key_id()))?
            .unwrap(sub, self.recipient.decryption_key())?;

        let inner = seipd::decrypt(encrypted, &session_key[..])?;
        let inner = read_packets(inner.to_vec())?;

        let mut signature = None;
        let mut compressed = None;
        for packet in inner {
            match packet.tag {
                Tag::Signature if signature.is_none() => signature = Some(packet),
                Tag::OnePassSignature => {}
                Tag::CompressedData | Tag::LiteralData if compressed.is_none() => {
                    compressed = Some(packet)
                }
                tag => {
                    return Err(CryptoError::malformed_message(format!(
                        "unexpected {tag} packet in encrypted data"
                    )))
                }
            }
        }
        let content =
            compressed.ok_or_else(|| CryptoError::malformed_message("no literal data"))?;

        let literal = match content.tag {
            Tag::CompressedData => literal::decompress(&content)?
                .into_iter()
                .find(|p| p.tag == Tag::LiteralData)
                .ok_or_else(|| CryptoError::malformed_message("no literal data"))?,
            _ => content.clone(),
        };
        let payload = literal::literal_payload(&literal)?.to_vec();

        let (signer, status) = match signature.as_ref().map(SignaturePacket::parse) {
            Some(Ok(signature)) => (signature.issuer(), self.check(&signature, &content)),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "unreadable message signature");
                (None, SignatureStatus::Invalid)
            }
            None => (None, SignatureStatus::Missing),
        };
        match status {
            SignatureStatus::Verified => tracing::debug!(
                recipient = %sub.key_id(),
                payload_len = payload.len(),
                "read verified message"
            ),
            _ => tracing::warn!(
                expected = %self.sender.master_key().key_id(),
                signer = ?signer.map(|id| id.to_string()),
                status = ?status,
                "message signature did not verify"
            ),
        }

        Ok(DecryptedMessage {
            payload,
            signer,
            signature: status,
        })
    }

    fn check(&self, signature: &SignaturePacket, signed: &Packet) -> SignatureStatus {
        let master = self.sender.master_key();
        if signature.signature_type() != SignatureType::Binary
            || signature.issuer() != Some(master.key_id())
        {
            return SignatureStatus::Invalid;
        }
        let Some(key) = master.public_key().verifying_key() else {
            return SignatureStatus::Invalid;
        };
        match signature.verify(key, &[&signed.body[..]]) {
            Ok(true) => SignatureStatus::Verified,
            Ok(false) => SignatureStatus::Invalid,
            Err(e) => {
                tracing::warn!(error = %e, "message signature could not be checked");
                SignatureStatus::Invalid
            }
        }
    }
}
