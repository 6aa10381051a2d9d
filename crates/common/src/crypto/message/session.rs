//! Per-recipient session key packets
//!
//! Each recipient gets a v3 public-key encrypted session key packet: an
//! ephemeral X25519 key agreement with the recipient's subkey, a SHA-256 KDF
//! over the shared point, and AES-256 key wrap of the session key.
//!
//! ```text
//! [ 3 ][ key ID: 8 ][ 18 ][ MPI: 0x40 || ephemeral ][ len ][ wrapped: 48 ]
//! wrapped = AES-KW(KEK, cipher || session key || u16 checksum || padding)
//! ```

use aes_kw::KekAes256 as Kek;
use bytes::{BufMut, Bytes};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::algorithms::{AsymmetricAlgorithm, SymmetricAlgorithm};
use crate::crypto::error::{CryptoError, CryptoResult};
use crate::crypto::key::{ecdh_kdf_params, Key, KeyId, SubKey, CV25519_OID};
use crate::crypto::packet::{mpi_to_array, write_mpi, Packet, PacketError, Tag};
use crate::crypto::random::{random_array, RandomSource};

use super::SESSION_KEY_SIZE;

const PKESK_VERSION: u8 = 3;
const ANONYMOUS_SENDER: &[u8; 20] = b"Anonymous Sender    ";

/// A parsed session key packet.
#[derive(Debug, Clone)]
pub(crate) struct EncryptedSessionKey {
    key_id: KeyId,
    ephemeral: X25519PublicKey,
    wrapped: Bytes,
}

impl EncryptedSessionKey {
    /// Wraps `session_key` for `recipient`'s subkey with a fresh ephemeral key.
    pub(crate) fn wrap(
        recipient: &SubKey,
        session_key: &[u8; SESSION_KEY_SIZE],
        random: &dyn RandomSource,
    ) -> CryptoResult<Packet> {
        let recipient_key = recipient.public_key().encryption_key().ok_or_else(|| {
            CryptoError::EncryptionFailed(format!("subkey {} cannot receive", recipient.key_id()))
        })?;

        let ephemeral_secret = StaticSecret::from(*random_array::<32>(random)?);
        let ephemeral = X25519PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(recipient_key);
        if !shared.was_contributory() {
            return Err(CryptoError::EncryptionFailed(
                "recipient key is a low-order point".into(),
            ));
        }

        let kek = key_encryption_key(shared.as_bytes(), recipient);
        let wrapped = kek
            .wrap_vec(&pad(session_key))
            .map_err(|e| CryptoError::EncryptionFailed(format!("AES-KW wrap error: {e}")))?;

        let mut body = Vec::with_capacity(wrapped.len() + 48);
        body.put_u8(PKESK_VERSION);
        body.put_slice(&recipient.key_id().to_bytes());
        body.put_u8(AsymmetricAlgorithm::Ecdh.code());
        let mut point = [0u8; 33];
        point[0] = 0x40;
        point[1..].copy_from_slice(ephemeral.as_bytes());
        write_mpi(&mut body, &point);
        body.put_u8(wrapped.len() as u8);
        body.put_slice(&wrapped);
        Ok(Packet::new(Tag::PublicKeyEncryptedSessionKey, body))
    }

    pub(crate) fn parse(packet: &Packet) -> Result<Self, PacketError> {
        let mut reader = packet.reader();
        let version = reader.u8()?;
        if version != PKESK_VERSION {
            return Err(PacketError::Unsupported(format!(
                "v{version} session key packets"
            )));
        }
        let key_id = KeyId::from(reader.array::<8>()?);
        let algorithm = reader.u8()?;
        if algorithm != AsymmetricAlgorithm::Ecdh.code() {
            return Err(PacketError::Unsupported(format!(
                "session keys encrypted with algorithm {algorithm}"
            )));
        }
        let point: [u8; 33] = mpi_to_array(&reader.mpi()?)?;
        if point[0] != 0x40 {
            return Err(PacketError::Invalid("ephemeral point prefix".into()));
        }
        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&point[1..]);
        let len = reader.u8()? as usize;
        let wrapped = reader.take(len)?;
        Ok(Self {
            key_id,
            ephemeral: X25519PublicKey::from(ephemeral),
            wrapped,
        })
    }

    pub(crate) fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Recovers the session key with the recipient's private subkey.
    pub(crate) fn unwrap(
        &self,
        recipient: &SubKey,
        secret: &StaticSecret,
    ) -> CryptoResult<Zeroizing<[u8; SESSION_KEY_SIZE]>> {
        let shared = secret.diffie_hellman(&self.ephemeral);
        if !shared.was_contributory() {
            return Err(CryptoError::IntegrityCheckFailed);
        }
        let kek = key_encryption_key(shared.as_bytes(), recipient);
        let padded = Zeroizing::new(
            kek.unwrap_vec(&self.wrapped)
                .map_err(|_| CryptoError::IntegrityCheckFailed)?,
        );
        unpad(&padded)
    }
}

/// The RFC 6637 KDF: SHA-256 over a counter, the shared point and the
/// recipient-specific parameters.
fn key_encryption_key(shared: &[u8; 32], recipient: &SubKey) -> Kek {
    let mut hasher = Sha256::new();
    hasher.update([0u8, 0, 0, 1]);
    hasher.update(shared);
    hasher.update([CV25519_OID.len() as u8]);
    hasher.update(CV25519_OID);
    hasher.update([AsymmetricAlgorithm::Ecdh.code()]);
    hasher.update(ecdh_kdf_params());
    hasher.update(ANONYMOUS_SENDER);
    hasher.update(recipient.fingerprint().bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&hasher.finalize());
    Kek::from(*key)
}

fn checksum(key: &[u8]) -> u16 {
    key.iter().fold(0u16, |sum, b| sum.wrapping_add(*b as u16))
}

/// `cipher || key || checksum`, PKCS#5 padded to a multiple of eight octets.
fn pad(session_key: &[u8; SESSION_KEY_SIZE]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(40));
    out.put_u8(SymmetricAlgorithm::DEFAULT.code());
    out.put_slice(session_key);
    out.put_u16(checksum(session_key));
    let padding = 8 - out.len() % 8;
    out.extend(std::iter::repeat(padding as u8).take(padding));
    out
}

fn unpad(padded: &[u8]) -> CryptoResult<Zeroizing<[u8; SESSION_KEY_SIZE]>> {
    let padding = padded.last().copied().unwrap_or_default() as usize;
    if padding == 0 || padding > 8 || padding > padded.len() {
        return Err(CryptoError::IntegrityCheckFailed);
    }
    let (message, tail) = padded.split_at(padded.len() - padding);
    if tail.iter().any(|b| *b as usize != padding) {
        return Err(CryptoError::IntegrityCheckFailed);
    }

    let Some((&cipher, rest)) = message.split_first() else {
        return Err(CryptoError::IntegrityCheckFailed);
    };
    if cipher != SymmetricAlgorithm::DEFAULT.code() {
        return Err(CryptoError::malformed_message(format!(
            "session key cipher {cipher}"
        )));
    }
    if rest.len() != SESSION_KEY_SIZE + 2 {
        return Err(CryptoError::IntegrityCheckFailed);
    }
    let (key, sum) = rest.split_at(SESSION_KEY_SIZE);
    if checksum(key).to_be_bytes() != sum {
        return Err(CryptoError::IntegrityCheckFailed);
    }
    let mut out = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    out.copy_from_slice(key);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pad_unpad() {
        let key = [0xABu8; SESSION_KEY_SIZE];
        let padded = pad(&key);
        assert_eq!(padded.len(), 40);
        assert_eq!(&padded[35..], &[5, 5, 5, 5, 5]);
        assert_eq!(*unpad(&padded).unwrap(), key);
    }

    #[test]
    fn test_unpad_rejects_bad_checksum() {
        let key = [0x01u8; SESSION_KEY_SIZE];
        let mut padded = pad(&key).to_vec();
        padded[33] ^= 0xFF;
        assert!(matches!(
            unpad(&padded),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_unpad_rejects_bad_padding() {
        let key = [0x01u8; SESSION_KEY_SIZE];
        let mut padded = pad(&key).to_vec();
        padded[36] = 4;
        assert!(unpad(&padded).is_err());
    }
}
