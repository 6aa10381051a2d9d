use std::fmt;

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::{display_key, Key, KeyId, LockedSecret, MasterKey, PublicKey, S2kParams};
use crate::crypto::algorithms::AsymmetricAlgorithm;
use crate::crypto::error::{CryptoError, CryptoResult};
use crate::crypto::packet::{mpi_from_slice, write_mpi, Packet, PacketError, Tag};
use crate::crypto::random::RandomSource;
use crate::crypto::signature::KeySignature;

/// The encryption half of a key set: an X25519 key bound to its master.
///
/// Holds the master's key ID and a copy of its user ID rather than the
/// master itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubKey {
    public: PublicKey,
    secret: LockedSecret,
    master_key_id: KeyId,
    user_id: String,
    signature: KeySignature,
}

impl SubKey {
    /// Loads a subkey from its packet group: the secret subkey packet and its
    /// binding signature.
    ///
    /// Fails with [`CryptoError::NotBoundToMaster`] unless the binding was
    /// issued by `master` over this key.
    pub fn load(group: &[Packet], master: &MasterKey) -> CryptoResult<Self> {
        let (public, secret, signature) = parse_group(group).map_err(CryptoError::malformed_key_set)?;
        let key = Self::assemble(public, secret, master, signature);
        if !key.signature.verify_binding(&key, master)? {
            tracing::debug!(
                key_id = %key.key_id(),
                master_key_id = %master.key_id(),
                "subkey binding failed"
            );
            return Err(CryptoError::NotBoundToMaster);
        }
        Ok(key)
    }

    pub(crate) fn assemble(
        public: PublicKey,
        secret: LockedSecret,
        master: &MasterKey,
        signature: KeySignature,
    ) -> Self {
        Self {
            public,
            secret,
            master_key_id: master.key_id(),
            user_id: master.user_id().to_owned(),
            signature,
        }
    }

    /// The key ID of the master key that bound this subkey.
    pub fn master_key_id(&self) -> KeyId {
        self.master_key_id
    }

    pub fn to_packets(&self) -> Vec<Packet> {
        let mut body = self.public.body().to_vec();
        self.secret.encode(&mut body);
        vec![
            Packet::new(Tag::SecretSubkey, body),
            self.signature.to_packet(),
        ]
    }

    pub fn s2k_params(&self) -> S2kParams {
        self.secret.params()
    }

    pub(crate) fn unlock(&self, passphrase: &[u8]) -> CryptoResult<StaticSecret> {
        let plaintext = self
            .secret
            .unlock(Tag::SecretSubkey, self.public.body(), passphrase)?;
        let secret = decode_secret(&plaintext).ok_or(CryptoError::IncorrectPassphrase)?;
        if Some(&X25519PublicKey::from(&secret)) != self.public.encryption_key() {
            return Err(CryptoError::IncorrectPassphrase);
        }
        Ok(secret)
    }

    pub(crate) fn relock(
        &self,
        secret: &StaticSecret,
        passphrase: &[u8],
        params: S2kParams,
        random: &dyn RandomSource,
    ) -> anyhow::Result<Self> {
        let secret = lock(&self.public, secret, passphrase, params, random)?;
        Ok(Self {
            secret,
            ..self.clone()
        })
    }
}

impl Key for SubKey {
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

impl fmt::Display for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_key(self, f)
    }
}

/// Locks an X25519 scalar as a single big-endian MPI, the reverse of its
/// native little-endian form.
pub(crate) fn lock(
    public: &PublicKey,
    secret: &StaticSecret,
    passphrase: &[u8],
    params: S2kParams,
    random: &dyn RandomSource,
) -> anyhow::Result<LockedSecret> {
    let mut scalar = Zeroizing::new(secret.to_bytes());
    scalar.reverse();
    let mut plaintext = Zeroizing::new(Vec::with_capacity(34));
    write_mpi(&mut plaintext, &scalar[..]);
    LockedSecret::lock(
        Tag::SecretSubkey,
        public.body(),
        &plaintext,
        passphrase,
        params,
        random,
    )
}

fn decode_secret(plaintext: &[u8]) -> Option<StaticSecret> {
    let mut scalar = mpi_from_slice::<32>(plaintext).ok()?;
    scalar.reverse();
    Some(StaticSecret::from(*scalar))
}

fn parse_group(group: &[Packet]) -> Result<(PublicKey, LockedSecret, KeySignature), PacketError> {
    let mut packets = group.iter().filter(|p| p.tag != Tag::Trust);

    let key = packets
        .next()
        .ok_or_else(|| PacketError::Invalid("empty subkey group".into()))?
        .clone()
        .expect(Tag::SecretSubkey)?;
    let mut reader = key.reader();
    let public = PublicKey::parse(&mut reader)?;
    if public.algorithm() != AsymmetricAlgorithm::ENCRYPTION_DEFAULT {
        return Err(PacketError::Unsupported(format!(
            "{} subkeys",
            public.algorithm()
        )));
    }
    let secret = LockedSecret::parse(&mut reader)?;

    let signature = packets
        .find(|p| p.tag == Tag::Signature)
        .ok_or_else(|| PacketError::Invalid("subkey has no binding signature".into()))?;
    let signature = KeySignature::parse(signature)?;

    Ok((public, secret, signature))
}
