//! Shared helpers for key set and message integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::{KeySet, KeySetGenerator, S2kParams, SecureRandom, UnlockedKeySet};

/// Argon2 cost low enough to keep the suite fast.
pub const CHEAP_S2K: S2kParams = S2kParams::new(1, 1, 8);

pub fn random() -> Arc<SecureRandom> {
    Arc::new(SecureRandom::new().unwrap())
}

pub fn generator(random: &Arc<SecureRandom>) -> KeySetGenerator {
    KeySetGenerator::new(random.clone()).with_s2k_params(CHEAP_S2K)
}

/// Generate a locked key set.
pub async fn key_set(user_id: &str, passphrase: &str) -> KeySet {
    generator(&random())
        .generate(user_id, passphrase.as_bytes())
        .await
        .unwrap()
}

/// Generate a key set and unlock it straight away.
pub async fn unlocked(user_id: &str) -> UnlockedKeySet {
    key_set(user_id, "passphrase")
        .await
        .unlock(b"passphrase")
        .unwrap()
}

/// The fixture key set the passphrase scenarios run against, round-tripped
/// through its encoded form.
pub async fn sample_key() -> KeySet {
    let encoded = key_set("Sample Key <sample@wesabe.com>", "test")
        .await
        .to_bytes();
    KeySet::load(encoded).unwrap()
}
