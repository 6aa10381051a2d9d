/**
 * Key sets, passphrase locking and
 *  multi-recipient encrypted messages.
 * Everything else in Grendel treats these
 *  as opaque blobs.
 */
pub mod crypto;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{
        CryptoError, DecryptedMessage, Key, KeyId, KeySet, KeySetGenerator, MessageReader,
        MessageWriter, RandomSource, S2kParams, SecureRandom, SignatureStatus, UnlockedKeySet,
    };
    pub use crate::version::BuildInfo;
}
