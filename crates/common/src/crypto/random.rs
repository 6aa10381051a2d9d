//! Randomness
//!
//! Everything that needs random bytes (key generation, salts, nonces,
//! session keys, ephemeral ECDH keys) takes a [`RandomSource`] instead of
//! reaching for a global generator, so callers decide how randomness is
//! provided and reseeded.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};

/// Size of fresh entropy mixed in on every reseed
pub const RESEED_SIZE: usize = 64;
/// How often [`SecureRandom::spawn_reseeder`] reseeds by default
pub const DEFAULT_RESEED_PERIOD: Duration = Duration::from_secs(60 * 60);

/// A cryptographically secure source of random bytes.
///
/// Implementations must be callable concurrently from any thread.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> CryptoResult<()>;
}

/// Fills a fixed-size buffer that is zeroed when dropped.
pub(crate) fn random_array<const N: usize>(
    random: &dyn RandomSource,
) -> CryptoResult<Zeroizing<[u8; N]>> {
    let mut out = Zeroizing::new([0u8; N]);
    random.fill(&mut out[..])?;
    Ok(out)
}

/// The default [`RandomSource`]: ChaCha20 seeded from the operating system.
///
/// The generator sits behind a mutex so a single instance can be shared
/// through an `Arc` by every task in the process.
pub struct SecureRandom {
    rng: Mutex<ChaCha20Rng>,
}

impl std::fmt::Debug for SecureRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureRandom").finish_non_exhaustive()
    }
}

impl SecureRandom {
    /// Seeds a new generator from the operating system.
    pub fn new() -> CryptoResult<Self> {
        let seed = os_entropy::<32>()?;
        Ok(Self::from_seed(*seed))
    }

    /// A deterministic generator, for tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }

    /// Mixes [`RESEED_SIZE`] bytes of fresh OS entropy into the generator.
    ///
    /// The new seed is SHA-256 over the generator's next output and the
    /// fresh entropy, so a weak OS pool can't make things worse.
    pub fn reseed(&self) -> CryptoResult<()> {
        let fresh = os_entropy::<RESEED_SIZE>()?;
        let mut rng = self.rng.lock();

        let mut current = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut current[..]);

        let mut hasher = Sha256::new();
        hasher.update(&current[..]);
        hasher.update(&fresh[..]);
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&hasher.finalize());

        *rng = ChaCha20Rng::from_seed(*seed);
        Ok(())
    }

    /// Reseeds every `period` on the current tokio runtime until the
    /// returned handle is aborted.
    pub fn spawn_reseeder(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let random = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::info!(bytes = RESEED_SIZE, "reseeding secure random");
                if let Err(e) = random.reseed() {
                    tracing::error!("failed to reseed secure random: {}", e);
                }
            }
        })
    }
}

impl RandomSource for SecureRandom {
    fn fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
        self.rng.lock().fill_bytes(dest);
        Ok(())
    }
}

fn os_entropy<const N: usize>() -> CryptoResult<Zeroizing<[u8; N]>> {
    let mut out = Zeroizing::new([0u8; N]);
    getrandom::getrandom(&mut out[..]).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(out)
}
