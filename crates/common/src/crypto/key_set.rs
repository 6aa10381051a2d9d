//! Key sets
//!
//! A [`KeySet`] is the only persisted form of a user's keys: one master key
//! and one subkey, both locked under the same passphrase. Unlocking yields
//! an [`UnlockedKeySet`] holding the decrypted private keys; relocking that
//! produces a new, independent [`KeySet`].
//!
//! # Encoding
//!
//! ```text
//! [ SecretKey ][ UserId ][ Signature: positive certification ]   master group
//! [ SecretSubkey ][ Signature: subkey binding ]                  sub group
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::ops::Deref;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use x25519_dalek::StaticSecret;

use super::error::{CryptoError, CryptoResult};
use super::key::{Key, KeyId, MasterKey, SubKey};
use super::packet::{read_packets, read_packets_from, Packet, Tag};
use super::random::RandomSource;

/// A user's locked master key and subkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    master: MasterKey,
    sub: SubKey,
}

impl KeySet {
    /// Loads an encoded key set, verifying both certifications.
    ///
    /// Anything wrong with the blob, from framing to a signature that doesn't
    /// check out, is a [`CryptoError::MalformedKeySet`].
    pub fn load(encoded: impl Into<Bytes>) -> CryptoResult<Self> {
        let packets = read_packets(encoded).map_err(CryptoError::malformed_key_set)?;
        Self::from_packets(packets)
    }

    pub fn load_from_reader<R: Read>(reader: R) -> CryptoResult<Self> {
        let packets = read_packets_from(reader).map_err(CryptoError::malformed_key_set)?;
        Self::from_packets(packets)
    }

    /// Builds a key set from already framed packets.
    pub fn from_packets(packets: Vec<Packet>) -> CryptoResult<Self> {
        let masters = packets.iter().filter(|p| p.tag == Tag::SecretKey).count();
        let subs = packets.iter().filter(|p| p.tag == Tag::SecretSubkey).count();
        if masters != 1 || subs != 1 {
            return Err(CryptoError::MalformedKeySet(format!(
                "expected one master key and one subkey, found {masters} and {subs}"
            )));
        }
        if packets.first().map(|p| p.tag) != Some(Tag::SecretKey) {
            return Err(CryptoError::MalformedKeySet(
                "key set does not start with its master key".into(),
            ));
        }
        let split = packets
            .iter()
            .position(|p| p.tag == Tag::SecretSubkey)
            .ok_or_else(|| CryptoError::MalformedKeySet("missing subkey".into()))?;
        let (master_group, sub_group) = packets.split_at(split);

        let master = MasterKey::load(master_group).map_err(|e| match e {
            CryptoError::MalformedKeySet(_) => e,
            other => CryptoError::malformed_key_set(other),
        })?;
        let sub = SubKey::load(sub_group, &master).map_err(|e| match e {
            CryptoError::MalformedKeySet(_) => e,
            other => CryptoError::malformed_key_set(other),
        })?;

        tracing::debug!(
            master = %master,
            sub = %sub,
            "loaded key set"
        );
        Ok(Self { master, sub })
    }

    pub(crate) fn assemble(master: MasterKey, sub: SubKey) -> Self {
        Self { master, sub }
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.master
    }

    pub fn sub_key(&self) -> &SubKey {
        &self.sub
    }

    /// The identity of the key set: its master key's user ID.
    pub fn user_id(&self) -> &str {
        self.master.user_id()
    }

    pub fn to_packets(&self) -> Vec<Packet> {
        let mut packets = self.master.to_packets();
        packets.extend(self.sub.to_packets());
        packets
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for packet in self.to_packets() {
            packet.encode(&mut out);
        }
        out
    }

    pub fn encode<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Decrypts both private keys.
    ///
    /// Either both unlock or neither does; a wrong passphrase and a corrupt
    /// secret blob are indistinguishable and both report
    /// [`CryptoError::IncorrectPassphrase`].
    pub fn unlock(&self, passphrase: &[u8]) -> CryptoResult<UnlockedKeySet> {
        let signing = self.master.unlock(passphrase)?;
        let decryption = self.sub.unlock(passphrase)?;
        tracing::debug!(key_id = %self.master.key_id(), "unlocked key set");
        Ok(UnlockedKeySet {
            key_set: self.clone(),
            signing,
            decryption,
        })
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.master, self.sub)
    }
}

/// A key set together with its decrypted private keys.
///
/// Only obtainable from [`KeySet::unlock`]. Both private keys are zeroed
/// when this is dropped.
pub struct UnlockedKeySet {
    key_set: KeySet,
    signing: SigningKey,
    decryption: StaticSecret,
}

impl UnlockedKeySet {
    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub(crate) fn decryption_key(&self) -> &StaticSecret {
        &self.decryption
    }

    /// Re-encrypts both private keys under `new`, returning a new locked key
    /// set with the same keys and certifications.
    ///
    /// `old` must still unlock the current blobs. The Argon2 cost of the
    /// existing blobs is kept; salts and nonces are fresh.
    pub fn relock(
        &self,
        old: &[u8],
        new: &[u8],
        random: &dyn RandomSource,
    ) -> CryptoResult<KeySet> {
        self.key_set.unlock(old).map_err(|e| {
            CryptoError::RelockFailed(format!("old passphrase rejected: {e}"))
        })?;

        let master = self
            .key_set
            .master
            .relock(&self.signing, new, self.key_set.master.s2k_params(), random)
            .map_err(|e| CryptoError::RelockFailed(e.to_string()))?;
        let sub = self
            .key_set
            .sub
            .relock(&self.decryption, new, self.key_set.sub.s2k_params(), random)
            .map_err(|e| CryptoError::RelockFailed(e.to_string()))?;

        tracing::debug!(key_id = %master.key_id(), "relocked key set");
        Ok(KeySet::assemble(master, sub))
    }

    pub fn key_id(&self) -> KeyId {
        self.key_set.master.key_id()
    }
}

impl Deref for UnlockedKeySet {
    type Target = KeySet;

    fn deref(&self) -> &Self::Target {
        &self.key_set
    }
}

impl fmt::Debug for UnlockedKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKeySet")
            .field("key_set", &self.key_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::generator::KeySetGenerator;
    use crate::crypto::key::S2kParams;
    use crate::crypto::random::SecureRandom;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlock_needs_both_keys() {
        let random = Arc::new(SecureRandom::from_seed([9u8; 32]));
        let key_set = KeySetGenerator::new(random.clone())
            .with_s2k_params(S2kParams::new(1, 1, 8))
            .generate("split <split@example.com>", b"pw")
            .await
            .unwrap();
        let unlocked = key_set.unlock(b"pw").unwrap();

        // master still under "pw", subkey under "other"
        let sub = key_set
            .sub_key()
            .relock(
                unlocked.decryption_key(),
                b"other",
                key_set.sub_key().s2k_params(),
                random.as_ref(),
            )
            .unwrap();
        let mixed = KeySet::assemble(key_set.master_key().clone(), sub);

        assert!(mixed.master_key().unlock(b"pw").is_ok());
        assert!(matches!(
            mixed.unlock(b"pw"),
            Err(CryptoError::IncorrectPassphrase)
        ));
        assert!(matches!(
            mixed.unlock(b"other"),
            Err(CryptoError::IncorrectPassphrase)
        ));
    }
}
