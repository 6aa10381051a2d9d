//! Symmetrically encrypted, integrity protected data (version 2)
//!
//! The session key never encrypts anything directly: HKDF-SHA256 over it,
//! salted per message, yields the AES-256-GCM key and the IV. The plaintext
//! is cut into fixed-size chunks, each sealed under `IV || chunk index`, and
//! a final empty chunk authenticates the total length so truncation at a
//! chunk boundary is caught.
//!
//! ```text
//! [ 2 ][ cipher ][ aead ][ chunk size ][ salt: 32 ][ chunk || tag ]*[ final tag ]
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::BufMut;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::algorithms::{AeadAlgorithm, SymmetricAlgorithm};
use crate::crypto::error::{CryptoError, CryptoResult};
use crate::crypto::packet::{Packet, Tag};
use crate::crypto::random::{random_array, RandomSource};

use super::SESSION_KEY_SIZE;

const SEIPD_VERSION: u8 = 2;
const SALT_SIZE: usize = 32;
const TAG_SIZE: usize = 16;
const NONCE_SIZE: usize = AeadAlgorithm::DEFAULT.nonce_size();
/// Nonce is `IV || u64 chunk index`
const IV_SIZE: usize = NONCE_SIZE - 8;
/// Chunks of 2^(12 + 6) = 256 KiB
pub(crate) const CHUNK_SIZE_OCTET: u8 = 12;
const MAX_CHUNK_SIZE_OCTET: u8 = 16;

struct MessageCipher {
    cipher: Aes256Gcm,
    iv: [u8; IV_SIZE],
    header: [u8; 5],
}

impl MessageCipher {
    fn new(session_key: &[u8], salt: &[u8; SALT_SIZE], chunk_size_octet: u8) -> CryptoResult<Self> {
        let header = [
            0xC0 | Tag::SymEncryptedIntegrityProtectedData.code(),
            SEIPD_VERSION,
            SymmetricAlgorithm::DEFAULT.code(),
            AeadAlgorithm::DEFAULT.code(),
            chunk_size_octet,
        ];
        let mut okm = Zeroizing::new([0u8; SESSION_KEY_SIZE + IV_SIZE]);
        Hkdf::<Sha256>::new(Some(&salt[..]), session_key)
            .expand(&header, &mut okm[..])
            .map_err(|e| CryptoError::EncryptionFailed(format!("hkdf: {e}")))?;

        let cipher = Aes256Gcm::new_from_slice(&okm[..SESSION_KEY_SIZE])
            .map_err(|e| CryptoError::EncryptionFailed(format!("aes-gcm key: {e}")))?;
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&okm[SESSION_KEY_SIZE..]);
        Ok(Self { cipher, iv, header })
    }

    fn nonce(&self, index: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..IV_SIZE].copy_from_slice(&self.iv);
        nonce[IV_SIZE..].copy_from_slice(&index.to_be_bytes());
        nonce
    }

    fn final_aad(&self, total: u64) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..5].copy_from_slice(&self.header);
        aad[5..].copy_from_slice(&total.to_be_bytes());
        aad
    }

    fn seal(&self, index: u64, msg: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        self.cipher
            .encrypt(Nonce::from_slice(&self.nonce(index)), Payload { msg, aad })
            .ok()
    }

    fn open(&self, index: u64, msg: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        self.cipher
            .decrypt(Nonce::from_slice(&self.nonce(index)), Payload { msg, aad })
            .ok()
    }
}

fn chunk_size(octet: u8) -> usize {
    1usize << (octet as usize + 6)
}

/// Encrypts `plaintext` under `session_key` into a complete packet.
pub(crate) fn encrypt(
    session_key: &[u8; SESSION_KEY_SIZE],
    plaintext: &[u8],
    random: &dyn RandomSource,
) -> CryptoResult<Packet> {
    let salt = *random_array::<SALT_SIZE>(random)?;
    let cipher = MessageCipher::new(session_key, &salt, CHUNK_SIZE_OCTET)?;
    let size = chunk_size(CHUNK_SIZE_OCTET);
    let chunks = plaintext.len().div_ceil(size);

    let mut body = Vec::with_capacity(plaintext.len() + (chunks + 1) * TAG_SIZE + 36);
    body.put_slice(&cipher.header[1..]);
    body.put_slice(&salt);

    let mut index = 0u64;
    for chunk in plaintext.chunks(size) {
        let sealed = cipher
            .seal(index, chunk, &cipher.header)
            .ok_or_else(|| CryptoError::EncryptionFailed("chunk encryption failed".into()))?;
        body.put_slice(&sealed);
        index += 1;
    }
    let sealed = cipher
        .seal(index, &[], &cipher.final_aad(plaintext.len() as u64))
        .ok_or_else(|| CryptoError::EncryptionFailed("final tag failed".into()))?;
    body.put_slice(&sealed);

    Ok(Packet::new(Tag::SymEncryptedIntegrityProtectedData, body))
}

/// Decrypts and authenticates a packet.
///
/// A body too short to hold the header is a malformed message. Once the
/// header is framed, every failure is an integrity failure: the header
/// octets feed the key derivation, so altering any of them is tampering.
pub(crate) fn decrypt(packet: &Packet, session_key: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut reader = packet.reader();
    let header = reader.array::<4>()?;
    let salt = reader.array::<SALT_SIZE>()?;
    let data = reader.rest();

    let [version, cipher_code, aead_code, chunk_size_octet] = header;
    if version != SEIPD_VERSION
        || cipher_code != SymmetricAlgorithm::DEFAULT.code()
        || aead_code != AeadAlgorithm::DEFAULT.code()
        || chunk_size_octet > MAX_CHUNK_SIZE_OCTET
    {
        tracing::debug!(
            version,
            cipher = cipher_code,
            aead = aead_code,
            chunk_size_octet,
            "rejecting encrypted data header"
        );
        return Err(CryptoError::IntegrityCheckFailed);
    }

    if data.len() < TAG_SIZE {
        return Err(CryptoError::IntegrityCheckFailed);
    }
    let cipher = MessageCipher::new(session_key, &salt, chunk_size_octet)?;
    let (chunks, final_tag) = data.split_at(data.len() - TAG_SIZE);

    let mut plaintext = Zeroizing::new(Vec::with_capacity(chunks.len()));
    let mut index = 0u64;
    for chunk in chunks.chunks(chunk_size(chunk_size_octet) + TAG_SIZE) {
        let opened = Zeroizing::new(
            cipher
                .open(index, chunk, &cipher.header)
                .ok_or(CryptoError::IntegrityCheckFailed)?,
        );
        plaintext.extend_from_slice(&opened);
        index += 1;
    }
    cipher
        .open(index, final_tag, &cipher.final_aad(plaintext.len() as u64))
        .ok_or(CryptoError::IntegrityCheckFailed)?;

    Ok(plaintext)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::random::SecureRandom;

    fn roundtrip(len: usize) {
        let random = SecureRandom::from_seed([4u8; 32]);
        let key = [9u8; SESSION_KEY_SIZE];
        let mut plaintext = vec![0u8; len];
        random.fill(&mut plaintext).unwrap();

        let packet = encrypt(&key, &plaintext, &random).unwrap();
        let chunks = len.div_ceil(chunk_size(CHUNK_SIZE_OCTET));
        assert_eq!(packet.body.len(), 4 + SALT_SIZE + len + (chunks + 1) * TAG_SIZE);
        assert_eq!(&decrypt(&packet, &key).unwrap()[..], &plaintext[..]);
    }

    #[test]
    fn test_roundtrip_sizes() {
        roundtrip(0);
        roundtrip(1);
        roundtrip(chunk_size(CHUNK_SIZE_OCTET));
        roundtrip(chunk_size(CHUNK_SIZE_OCTET) * 2 + 17);
    }

    #[test]
    fn test_wrong_key_fails() {
        let random = SecureRandom::from_seed([4u8; 32]);
        let packet = encrypt(&[1u8; SESSION_KEY_SIZE], b"secret", &random).unwrap();
        assert!(matches!(
            decrypt(&packet, &[2u8; SESSION_KEY_SIZE]),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_dropped_chunk_fails() {
        let random = SecureRandom::from_seed([4u8; 32]);
        let key = [1u8; SESSION_KEY_SIZE];
        let size = chunk_size(CHUNK_SIZE_OCTET);
        let packet = encrypt(&key, &vec![7u8; size * 2], &random).unwrap();

        // remove the second chunk, keep the final tag
        let header = 4 + SALT_SIZE;
        let sealed = size + TAG_SIZE;
        let mut body = packet.body[..header + sealed].to_vec();
        body.extend_from_slice(&packet.body[header + 2 * sealed..]);
        let truncated = Packet::new(Tag::SymEncryptedIntegrityProtectedData, body);
        assert!(matches!(
            decrypt(&truncated, &key),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_short_header_is_malformed() {
        let packet = Packet::new(Tag::SymEncryptedIntegrityProtectedData, vec![2u8, 9, 3, 12]);
        assert!(matches!(
            decrypt(&packet, &[0u8; SESSION_KEY_SIZE]),
            Err(CryptoError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_altered_header_fails_integrity() {
        let random = SecureRandom::from_seed([4u8; 32]);
        let key = [1u8; SESSION_KEY_SIZE];
        let packet = encrypt(&key, b"header bound", &random).unwrap();
        for at in 0..4 + SALT_SIZE {
            let mut body = packet.body.to_vec();
            body[at] ^= 0x80;
            let altered = Packet::new(Tag::SymEncryptedIntegrityProtectedData, body);
            assert!(
                matches!(
                    decrypt(&altered, &key),
                    Err(CryptoError::IntegrityCheckFailed)
                ),
                "octet {at}"
            );
        }
    }
}
