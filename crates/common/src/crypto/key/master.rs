use std::fmt;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use super::{display_key, Key, LockedSecret, PublicKey, S2kParams};
use crate::crypto::algorithms::AsymmetricAlgorithm;
use crate::crypto::error::{CryptoError, CryptoResult};
use crate::crypto::packet::{mpi_from_slice, write_mpi, Packet, PacketError, Tag};
use crate::crypto::random::RandomSource;
use crate::crypto::signature::KeySignature;

/// The signing half of a key set: an Ed25519 key that owns the user ID,
/// certifies itself and binds the subkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKey {
    public: PublicKey,
    secret: LockedSecret,
    user_id: String,
    signature: KeySignature,
}

impl MasterKey {
    /// Loads a master key from its packet group: the secret key packet, its
    /// user ID and the self-certification.
    ///
    /// Fails with [`CryptoError::NotSelfCertified`] unless the first signature
    /// in the group is a valid certification of the user ID by this key.
    pub fn load(group: &[Packet]) -> CryptoResult<Self> {
        let (public, secret, user_id, signature) =
            parse_group(group).map_err(CryptoError::malformed_key_set)?;
        let key = Self::assemble(public, secret, user_id, signature);
        if !key.signature.verify_certification(&key)? {
            tracing::debug!(key_id = %key.key_id(), "master key self-certification failed");
            return Err(CryptoError::NotSelfCertified);
        }
        Ok(key)
    }

    pub(crate) fn assemble(
        public: PublicKey,
        secret: LockedSecret,
        user_id: String,
        signature: KeySignature,
    ) -> Self {
        Self {
            public,
            secret,
            user_id,
            signature,
        }
    }

    /// The packet group this key was loaded from.
    pub fn to_packets(&self) -> Vec<Packet> {
        let mut body = self.public.body().to_vec();
        self.secret.encode(&mut body);
        vec![
            Packet::new(Tag::SecretKey, body),
            Packet::new(Tag::UserId, Bytes::copy_from_slice(self.user_id.as_bytes())),
            self.signature.to_packet(),
        ]
    }

    /// The Argon2 cost the private key is currently locked with.
    pub fn s2k_params(&self) -> S2kParams {
        self.secret.params()
    }

    pub(crate) fn unlock(&self, passphrase: &[u8]) -> CryptoResult<SigningKey> {
        let plaintext = self
            .secret
            .unlock(Tag::SecretKey, self.public.body(), passphrase)?;
        let signing = decode_secret(&plaintext).ok_or(CryptoError::IncorrectPassphrase)?;
        // a blob that decrypts to someone else's key is as good as corrupt
        if Some(&signing.verifying_key()) != self.public.verifying_key() {
            return Err(CryptoError::IncorrectPassphrase);
        }
        Ok(signing)
    }

    /// Locks `signing` under `passphrase`, keeping everything public.
    pub(crate) fn relock(
        &self,
        signing: &SigningKey,
        passphrase: &[u8],
        params: S2kParams,
        random: &dyn RandomSource,
    ) -> anyhow::Result<Self> {
        let secret = lock(&self.public, signing, passphrase, params, random)?;
        Ok(Self {
            secret,
            ..self.clone()
        })
    }
}

impl Key for MasterKey {
    fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn signature(&self) -> &KeySignature {
        &self.signature
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_key(self, f)
    }
}

/// Locks an Ed25519 seed as a single MPI.
pub(crate) fn lock(
    public: &PublicKey,
    signing: &SigningKey,
    passphrase: &[u8],
    params: S2kParams,
    random: &dyn RandomSource,
) -> anyhow::Result<LockedSecret> {
    let mut plaintext = Zeroizing::new(Vec::with_capacity(34));
    write_mpi(&mut plaintext, signing.as_bytes());
    LockedSecret::lock(
        Tag::SecretKey,
        public.body(),
        &plaintext,
        passphrase,
        params,
        random,
    )
}

fn decode_secret(plaintext: &[u8]) -> Option<SigningKey> {
    let seed = mpi_from_slice::<32>(plaintext).ok()?;
    Some(SigningKey::from_bytes(&seed))
}

fn parse_group(
    group: &[Packet],
) -> Result<(PublicKey, LockedSecret, String, KeySignature), PacketError> {
    let mut packets = group.iter().filter(|p| p.tag != Tag::Trust);

    let key = packets
        .next()
        .ok_or_else(|| PacketError::Invalid("empty master key group".into()))?
        .clone()
        .expect(Tag::SecretKey)?;
    let mut reader = key.reader();
    let public = PublicKey::parse(&mut reader)?;
    if public.algorithm() != AsymmetricAlgorithm::SIGNING_DEFAULT {
        return Err(PacketError::Unsupported(format!(
            "{} master keys",
            public.algorithm()
        )));
    }
    let secret = LockedSecret::parse(&mut reader)?;

    let user_id = packets
        .next()
        .ok_or_else(|| PacketError::Invalid("master key has no user ID".into()))?
        .clone()
        .expect(Tag::UserId)?;
    let user_id = String::from_utf8(user_id.body.to_vec())
        .map_err(|_| PacketError::Invalid("user ID is not UTF-8".into()))?;

    let signature = packets
        .find(|p| p.tag == Tag::Signature)
        .ok_or_else(|| PacketError::Invalid("master key has no self-certification".into()))?;
    let signature = KeySignature::parse(signature)?;

    Ok((public, secret, user_id, signature))
}
