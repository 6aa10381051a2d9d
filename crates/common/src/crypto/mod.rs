//! Key sets and encrypted messages for Grendel
//!
//! Everything a vault stores is encrypted to its owner's key set, and a key
//! set is the only thing about a user that is persisted. This module covers
//! the whole lifecycle:
//!
//! - **Generation**: an Ed25519 master key certifying its user ID, and an
//!   X25519 subkey bound to the master (`KeySetGenerator`)
//! - **Locking**: both private keys sealed under the owner's passphrase with
//!   Argon2id and AES-256-GCM (`KeySet::unlock`, `UnlockedKeySet::relock`)
//! - **Messages**: a signed, compressed payload encrypted once under a fresh
//!   session key, with that key wrapped for each recipient's subkey
//!   (`MessageWriter`, `MessageReader`)
//!
//! # Wire format
//!
//! Key sets and messages are sequences of OpenPGP packets (RFC 4880 framing,
//! v4 keys and signatures). Locked secrets use the Argon2 S2K and AEAD
//! protection of RFC 9580; message bodies are v2 SEIPD packets.
//!
//! # Randomness
//!
//! Nothing here reaches for a global RNG. Every operation that needs
//! randomness takes a `RandomSource`; `SecureRandom` is the one to use.

pub mod algorithms;
mod error;
mod generator;
pub mod key;
mod key_set;
mod message;
pub mod packet;
mod random;
mod signature;

pub use error::{CryptoError, CryptoResult, ErrorClass};
pub use generator::KeySetGenerator;
pub use key::{Fingerprint, Key, KeyId, MasterKey, PublicKey, S2kParams, SubKey};
pub use key_set::{KeySet, UnlockedKeySet};
pub use message::{DecryptedMessage, MessageReader, MessageWriter, SignatureStatus};
pub use random::{RandomSource, SecureRandom, DEFAULT_RESEED_PERIOD};
pub use signature::KeySignature;
