//! Key material
//!
//! A key set holds two kinds of key: the Ed25519 [`MasterKey`] that owns the
//! user identity and certifies everything, and the X25519 [`SubKey`] that
//! receives encrypted session keys. Both are v4 secret key packets whose
//! private half is locked under the owner's passphrase; they share the
//! read-only [`Key`] surface.

mod locked;
mod master;
mod public;
mod sub;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::algorithms::{
    AsymmetricAlgorithm, CompressionAlgorithm, HashAlgorithm, KeyFlag, KeyFlags,
    SymmetricAlgorithm,
};
use super::signature::KeySignature;

pub use locked::S2kParams;
pub(crate) use locked::LockedSecret;
pub use master::MasterKey;
pub(crate) use master::lock as lock_master;
pub use public::PublicKey;
pub(crate) use public::{ecdh_kdf_params, CV25519_OID};
pub use sub::SubKey;
pub(crate) use sub::lock as lock_sub;

/// Size of a v4 fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 20;

/// A 64-bit OpenPGP key ID: the low eight octets of the v4 fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(u64);

impl KeyId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The short form people read off a screen: the low 32 bits as eight
    /// upper-case hex digits.
    pub fn human(&self) -> String {
        format!("{:08X}", self.0 as u32)
    }
}

impl From<u64> for KeyId {
    fn from(id: u64) -> Self {
        KeyId(id)
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(bytes: [u8; 8]) -> Self {
        KeyId(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// A v4 fingerprint: SHA-1 over `0x99 || u16 length || public key body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub(crate) fn of(public_body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(hashed_key_header(public_body.len()));
        hasher.update(public_body);
        let mut out = [0u8; FINGERPRINT_SIZE];
        out.copy_from_slice(&hasher.finalize());
        Fingerprint(out)
    }

    pub fn bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn key_id(&self) -> KeyId {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[FINGERPRINT_SIZE - 8..]);
        KeyId::from(low)
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The prefix hashed in front of a public key body, both for fingerprints and
/// for key signatures.
pub(crate) fn hashed_key_header(body_len: usize) -> [u8; 3] {
    let len = (body_len as u16).to_be_bytes();
    [0x99, len[0], len[1]]
}

/// Read-only view shared by master keys and subkeys.
///
/// Everything except the public packet, the certifying signature and the
/// user ID is derived, either from the public key or by decoding the
/// signature's subpackets.
pub trait Key {
    fn public_key(&self) -> &PublicKey;

    /// The self-certification of a master key, the binding of a subkey.
    fn signature(&self) -> &KeySignature;

    fn user_id(&self) -> &str;

    fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    fn human_key_id(&self) -> String {
        self.key_id().human()
    }

    fn fingerprint(&self) -> Fingerprint {
        *self.public_key().fingerprint()
    }

    fn algorithm(&self) -> AsymmetricAlgorithm {
        self.public_key().algorithm()
    }

    /// Key size in bits.
    fn size(&self) -> u32 {
        self.public_key().size()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.public_key().created_at()
    }

    fn key_flags(&self) -> KeyFlags {
        self.signature().key_flags()
    }

    fn can_sign(&self) -> bool {
        self.key_flags().contains(KeyFlag::Signing)
    }

    fn can_encrypt(&self) -> bool {
        self.key_flags().contains(KeyFlag::Encryption)
    }

    fn preferred_symmetric_algorithms(&self) -> Vec<SymmetricAlgorithm> {
        self.signature().preferred_symmetric_algorithms()
    }

    fn preferred_hash_algorithms(&self) -> Vec<HashAlgorithm> {
        self.signature().preferred_hash_algorithms()
    }

    fn preferred_compression_algorithms(&self) -> Vec<CompressionAlgorithm> {
        self.signature().preferred_compression_algorithms()
    }
}

/// `"<bits>-<ALGORITHM>/<HUMAN ID>"`, e.g. `256-EdDSA/8838238C`.
pub(crate) fn display_key(key: &impl Key, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}/{}", key.size(), key.algorithm(), key.human_key_id())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_id_formats() {
        let id = KeyId::from(0x8C70_35EF_8838_238Cu64);
        assert_eq!(id.to_string(), "8C7035EF8838238C");
        assert_eq!(id.human(), "8838238C");
        assert_eq!(KeyId::from(id.to_bytes()), id);
    }

    #[test]
    fn test_human_id_keeps_leading_zeros() {
        assert_eq!(KeyId::from(0x0000_00AB_0000_00CDu64).human(), "000000CD");
    }

    #[test]
    fn test_fingerprint_key_id_is_low_bits() {
        let fingerprint = Fingerprint::of(&[4, 0, 0, 0, 0, 22]);
        let bytes = fingerprint.bytes();
        let expected = u64::from_be_bytes(bytes[12..].try_into().unwrap());
        assert_eq!(fingerprint.key_id().as_u64(), expected);
        assert_eq!(fingerprint.to_hex().len(), 40);
    }
}
