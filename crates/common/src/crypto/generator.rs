//! Key set generation
//!
//! The two key pairs are independent, so they're generated concurrently on
//! the blocking pool and joined. Certification and locking need both, and
//! locking runs Argon2 twice, so that happens in a second blocking task.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ed25519_dalek::SigningKey;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::key::{lock_master, lock_sub, MasterKey, PublicKey, S2kParams, SubKey};
use super::key_set::KeySet;
use super::random::{random_array, RandomSource};
use super::signature::KeySignature;

/// Builds fresh key sets.
#[derive(Clone)]
pub struct KeySetGenerator {
    random: Arc<dyn RandomSource>,
    s2k: S2kParams,
}

impl KeySetGenerator {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self {
            random,
            s2k: S2kParams::default(),
        }
    }

    /// Overrides the Argon2 cost used to lock generated keys.
    pub fn with_s2k_params(mut self, s2k: S2kParams) -> Self {
        self.s2k = s2k;
        self
    }

    /// Generates a key set for `user_id`, locked under `passphrase`.
    ///
    /// Fails with [`CryptoError::KeyGenerationFailed`] if either key pair
    /// can't be generated; nothing partial is returned.
    pub async fn generate(&self, user_id: &str, passphrase: &[u8]) -> CryptoResult<KeySet> {
        tracing::debug!(user_id, "generating master and subkey pairs");

        let random = Arc::clone(&self.random);
        let master = tokio::task::spawn_blocking(move || generate_signing_key(random.as_ref()));
        let random = Arc::clone(&self.random);
        let sub = tokio::task::spawn_blocking(move || generate_decryption_key(random.as_ref()));

        let (signing, decryption) = tokio::try_join!(master, sub)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        let signing = signing.map_err(generation_failed)?;
        let decryption = decryption.map_err(generation_failed)?;

        tracing::debug!(user_id, "certifying and locking key pairs");
        let random = Arc::clone(&self.random);
        let user_id = user_id.to_owned();
        let passphrase = Zeroizing::new(passphrase.to_vec());
        let s2k = self.s2k;
        let key_set = tokio::task::spawn_blocking(move || {
            assemble(
                &user_id,
                &signing,
                &decryption,
                &passphrase,
                s2k,
                random.as_ref(),
            )
        })
        .await
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))??;

        tracing::debug!(key_set = %key_set, "generated key set");
        Ok(key_set)
    }
}

fn generation_failed(e: CryptoError) -> CryptoError {
    match e {
        CryptoError::KeyGenerationFailed(_) => e,
        other => CryptoError::KeyGenerationFailed(other.to_string()),
    }
}

fn generate_signing_key(random: &dyn RandomSource) -> CryptoResult<SigningKey> {
    let seed = random_array::<32>(random)?;
    Ok(SigningKey::from_bytes(&seed))
}

fn generate_decryption_key(random: &dyn RandomSource) -> CryptoResult<StaticSecret> {
    let mut scalar = random_array::<32>(random)?;
    // clamp up front so the stored scalar is the one actually used
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    Ok(StaticSecret::from(*scalar))
}

/// Certifies and locks a pair of freshly generated keys. Nothing assembled
/// here is re-verified; the certifications are correct by construction.
fn assemble(
    user_id: &str,
    signing: &SigningKey,
    decryption: &StaticSecret,
    passphrase: &[u8],
    s2k: S2kParams,
    random: &dyn RandomSource,
) -> CryptoResult<KeySet> {
    let now = Utc::now();
    let created_at = Utc
        .timestamp_opt(now.timestamp(), 0)
        .single()
        .unwrap_or(now);

    let master_public = PublicKey::ed25519(created_at, &signing.verifying_key());
    let sub_public = PublicKey::x25519(created_at, &X25519PublicKey::from(decryption));

    let certification =
        KeySignature::certify_user_id(signing, &master_public, user_id, created_at)
            .map_err(generation_failed)?;
    let binding = KeySignature::bind_subkey(signing, &master_public, &sub_public, created_at)
        .map_err(generation_failed)?;

    let master_secret = lock_master(&master_public, signing, passphrase, s2k, random)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
    let sub_secret = lock_sub(&sub_public, decryption, passphrase, s2k, random)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

    let master = MasterKey::assemble(
        master_public,
        master_secret,
        user_id.to_owned(),
        certification,
    );
    let sub = SubKey::assemble(sub_public, sub_secret, &master, binding);
    Ok(KeySet::assemble(master, sub))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::key::Key;
    use crate::crypto::random::SecureRandom;

    const CHEAP: S2kParams = S2kParams::new(1, 1, 8);

    #[test]
    fn test_decryption_key_is_clamped() {
        let random = SecureRandom::from_seed([0xFF; 32]);
        let secret = generate_decryption_key(&random).unwrap();
        let bytes = secret.to_bytes();
        assert_eq!(bytes[0] & 7, 0);
        assert_eq!(bytes[31] & 0xC0, 0x40);
    }

    #[tokio::test]
    async fn test_generated_set_is_certified() {
        let random: Arc<dyn RandomSource> = Arc::new(SecureRandom::new().unwrap());
        let generator = KeySetGenerator::new(random).with_s2k_params(CHEAP);
        let key_set = generator.generate("u <u@example.com>", b"pw").await.unwrap();

        let master = key_set.master_key();
        let sub = key_set.sub_key();
        assert!(master.signature().verify_certification(master).unwrap());
        assert!(sub.signature().verify_binding(sub, master).unwrap());
        assert_eq!(sub.master_key_id(), master.key_id());
        assert_eq!(master.created_at(), sub.created_at());
        assert_eq!(master.s2k_params(), CHEAP);
    }
}
