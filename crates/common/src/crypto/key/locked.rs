//! Passphrase-locked secret key material
//!
//! Secret fields are protected with S2K usage 253: an Argon2 S2K stretches
//! the passphrase, HKDF-SHA256 turns the result into an AES-256 key, and
//! AES-256-GCM seals the secret MPIs with the packet tag and public key body
//! as associated data. A wrong passphrase and a corrupted blob fail the same
//! way: the tag does not verify.
//!
//! ```text
//! [ 253 ][ cipher ][ aead ][ 4 ][ salt: 16 ][ t ][ p ][ m ][ nonce: 12 ][ ciphertext || tag ]
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, Version};
use bytes::{BufMut, Bytes};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::algorithms::{AeadAlgorithm, SymmetricAlgorithm};
use crate::crypto::error::{CryptoError, CryptoResult};
use crate::crypto::packet::{BodyReader, PacketError, Tag};
use crate::crypto::random::{random_array, RandomSource};

const S2K_USAGE_AEAD: u8 = 253;
const S2K_ARGON2: u8 = 4;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = AeadAlgorithm::DEFAULT.nonce_size();
const KEY_SIZE: usize = SymmetricAlgorithm::DEFAULT.key_size();

/// Argon2 cost parameters for locking secret keys.
///
/// Memory is `2^memory_exponent` KiB, as the S2K specifier stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct S2kParams {
    pub passes: u8,
    pub parallelism: u8,
    pub memory_exponent: u8,
}

impl S2kParams {
    /// 64 MiB, three passes, four lanes: a fraction of a second on a laptop.
    pub const INTERACTIVE: Self = Self::new(3, 4, 16);
    /// 1 GiB, for key sets that are rarely unlocked.
    pub const SENSITIVE: Self = Self::new(4, 4, 20);

    pub const fn new(passes: u8, parallelism: u8, memory_exponent: u8) -> Self {
        Self {
            passes,
            parallelism,
            memory_exponent,
        }
    }

    fn stretch(
        &self,
        passphrase: &[u8],
        salt: &[u8; SALT_SIZE],
    ) -> anyhow::Result<Zeroizing<[u8; KEY_SIZE]>> {
        if self.memory_exponent > 31 {
            return Err(anyhow!("argon2 memory exponent {}", self.memory_exponent));
        }
        let params = Params::new(
            1u32 << self.memory_exponent,
            self.passes as u32,
            self.parallelism as u32,
            Some(KEY_SIZE),
        )
        .map_err(|e| anyhow!("argon2 parameters: {e}"))?;

        let mut out = Zeroizing::new([0u8; KEY_SIZE]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase, salt, &mut out[..])
            .map_err(|e| anyhow!("argon2: {e}"))?;
        Ok(out)
    }
}

impl Default for S2kParams {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

/// The encrypted secret fields of a key packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LockedSecret {
    params: S2kParams,
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    ciphertext: Bytes,
}

impl LockedSecret {
    /// Seals `secret` under `passphrase` with a fresh salt and nonce.
    pub(crate) fn lock(
        tag: Tag,
        public_body: &[u8],
        secret: &[u8],
        passphrase: &[u8],
        params: S2kParams,
        random: &dyn RandomSource,
    ) -> anyhow::Result<Self> {
        let salt = *random_array::<SALT_SIZE>(random)?;
        let nonce = *random_array::<NONCE_SIZE>(random)?;

        let cipher = cipher(tag, passphrase, &params, &salt)?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: secret,
                    aad: &associated_data(tag, public_body),
                },
            )
            .map_err(|_| anyhow!("secret key encryption failed"))?;

        Ok(Self {
            params,
            salt,
            nonce,
            ciphertext: ciphertext.into(),
        })
    }

    /// Opens the secret fields. Any failure, from the KDF to the tag check,
    /// is an incorrect passphrase.
    pub(crate) fn unlock(
        &self,
        tag: Tag,
        public_body: &[u8],
        passphrase: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let cipher = cipher(tag, passphrase, &self.params, &self.salt).map_err(|e| {
            tracing::debug!("unable to derive key unlocking secret: {}", e);
            CryptoError::IncorrectPassphrase
        })?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: &associated_data(tag, public_body),
                },
            )
            .map_err(|_| CryptoError::IncorrectPassphrase)?;
        Ok(Zeroizing::new(plaintext))
    }

    pub(crate) fn params(&self) -> S2kParams {
        self.params
    }

    pub(crate) fn parse(reader: &mut BodyReader) -> Result<Self, PacketError> {
        let usage = reader.u8()?;
        match usage {
            S2K_USAGE_AEAD => {}
            0 => return Err(PacketError::Unsupported("unprotected secret keys".into())),
            other => return Err(PacketError::Unsupported(format!("S2K usage {other}"))),
        }
        let cipher = reader.u8()?;
        if cipher != SymmetricAlgorithm::DEFAULT.code() {
            return Err(PacketError::Unsupported(format!("secret key cipher {cipher}")));
        }
        let aead = reader.u8()?;
        if aead != AeadAlgorithm::DEFAULT.code() {
            return Err(PacketError::Unsupported(format!("secret key AEAD mode {aead}")));
        }
        let s2k = reader.u8()?;
        if s2k != S2K_ARGON2 {
            return Err(PacketError::Unsupported(format!("S2K type {s2k}")));
        }
        let salt = reader.array::<SALT_SIZE>()?;
        let params = S2kParams::new(reader.u8()?, reader.u8()?, reader.u8()?);
        let nonce = reader.array::<NONCE_SIZE>()?;
        let ciphertext = reader.rest();
        if ciphertext.is_empty() {
            return Err(PacketError::Invalid("empty secret key ciphertext".into()));
        }
        Ok(Self {
            params,
            salt,
            nonce,
            ciphertext,
        })
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(S2K_USAGE_AEAD);
        out.put_u8(SymmetricAlgorithm::DEFAULT.code());
        out.put_u8(AeadAlgorithm::DEFAULT.code());
        out.put_u8(S2K_ARGON2);
        out.put_slice(&self.salt);
        out.put_u8(self.params.passes);
        out.put_u8(self.params.parallelism);
        out.put_u8(self.params.memory_exponent);
        out.put_slice(&self.nonce);
        out.put_slice(&self.ciphertext);
    }
}

fn cipher(
    tag: Tag,
    passphrase: &[u8],
    params: &S2kParams,
    salt: &[u8; SALT_SIZE],
) -> anyhow::Result<Aes256Gcm> {
    let stretched = params.stretch(passphrase, salt)?;
    let info = [
        0xC0 | tag.code(),
        4,
        SymmetricAlgorithm::DEFAULT.code(),
        AeadAlgorithm::DEFAULT.code(),
    ];
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, &stretched[..])
        .expand(&info, &mut key[..])
        .map_err(|e| anyhow!("hkdf: {e}"))?;
    Aes256Gcm::new_from_slice(&key[..]).map_err(|e| anyhow!("aes-gcm key: {e}"))
}

fn associated_data(tag: Tag, public_body: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(public_body.len() + 1);
    aad.put_u8(0xC0 | tag.code());
    aad.put_slice(public_body);
    aad
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::random::SecureRandom;

    const CHEAP: S2kParams = S2kParams::new(1, 1, 8);

    fn sealed(random: &SecureRandom) -> LockedSecret {
        LockedSecret::lock(Tag::SecretKey, b"public", b"scalar", b"test", CHEAP, random)
            .unwrap()
    }

    #[test]
    fn test_lock_unlock() {
        let random = SecureRandom::from_seed([1u8; 32]);
        let locked = sealed(&random);
        let opened = locked.unlock(Tag::SecretKey, b"public", b"test").unwrap();
        assert_eq!(&opened[..], b"scalar");
    }

    #[test]
    fn test_wrong_passphrase() {
        let random = SecureRandom::from_seed([1u8; 32]);
        let locked = sealed(&random);
        assert!(matches!(
            locked.unlock(Tag::SecretKey, b"public", b"wonk"),
            Err(CryptoError::IncorrectPassphrase)
        ));
    }

    #[test]
    fn test_bound_to_public_key_and_tag() {
        let random = SecureRandom::from_seed([1u8; 32]);
        let locked = sealed(&random);
        assert!(locked.unlock(Tag::SecretKey, b"other", b"test").is_err());
        assert!(locked.unlock(Tag::SecretSubkey, b"public", b"test").is_err());
    }

    #[test]
    fn test_encode_parse() {
        let random = SecureRandom::from_seed([2u8; 32]);
        let locked = sealed(&random);
        let mut out = Vec::new();
        locked.encode(&mut out);
        assert_eq!(&out[..4], &[253, 9, 3, 4]);

        let mut reader = BodyReader::new(out.into());
        let parsed = LockedSecret::parse(&mut reader).unwrap();
        assert_eq!(parsed, locked);
        assert_eq!(parsed.params(), CHEAP);
    }

    #[test]
    fn test_fresh_salt_every_lock() {
        let random = SecureRandom::from_seed([3u8; 32]);
        let a = sealed(&random);
        let b = sealed(&random);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_rejects_unprotected_keys() {
        let mut reader = BodyReader::new(Bytes::from_static(&[0, 1, 2, 3]));
        assert!(matches!(
            LockedSecret::parse(&mut reader),
            Err(PacketError::Unsupported(_))
        ));
    }
}
