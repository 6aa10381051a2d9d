//! v4 signatures
//!
//! [`SignaturePacket`] is the codec and the EdDSA sign/verify primitive,
//! shared by key certifications and message signatures. [`KeySignature`] is
//! the read-only view a key exposes over its certification, with the two
//! checks a key set relies on:
//!
//! - a master key's positive certification over its user ID
//! - a subkey binding issued by the master key
//!
//! What gets hashed:
//!
//! ```text
//! certification: 0x99 || len || master body || 0xB4 || u32 len || user ID || trailer
//! binding:       0x99 || len || master body || 0x99 || len || sub body    || trailer
//! binary:        data                                                     || trailer
//! trailer:       4 || type || alg || hash || u16 len || hashed area || 0x04 0xFF || u32 len
//! ```

use bytes::{BufMut, Bytes};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::Digest;

use super::algorithms::{
    AsymmetricAlgorithm, CompressionAlgorithm, HashAlgorithm, KeyFlags, SignatureType,
    SymmetricAlgorithm,
};
use super::error::{CryptoError, CryptoResult};
use super::key::{Key, KeyId, MasterKey, PublicKey, SubKey};
use super::packet::{
    mpi_to_array, write_mpi, Packet, PacketError, Subpacket, SubpacketType,
    Subpackets, Tag,
};

const SIGNATURE_VERSION: u8 = 4;

/// Hashes `parts` in order with `algorithm`, or `None` for digests we can't
/// compute.
pub(crate) fn digest(algorithm: HashAlgorithm, parts: &[&[u8]]) -> Option<Vec<u8>> {
    fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = D::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().to_vec()
    }

    Some(match algorithm {
        HashAlgorithm::Sha1 => run::<sha1::Sha1>(parts),
        HashAlgorithm::Sha224 => run::<sha2::Sha224>(parts),
        HashAlgorithm::Sha256 => run::<sha2::Sha256>(parts),
        HashAlgorithm::Sha384 => run::<sha2::Sha384>(parts),
        HashAlgorithm::Sha512 => run::<sha2::Sha512>(parts),
        HashAlgorithm::Md5 | HashAlgorithm::Ripemd160 => return None,
    })
}

/// A parsed v4 signature packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignaturePacket {
    signature_type: SignatureType,
    key_algorithm: AsymmetricAlgorithm,
    hash_algorithm: HashAlgorithm,
    hashed_area: Bytes,
    unhashed_area: Bytes,
    hashed: Subpackets,
    unhashed: Subpackets,
    digest_prefix: [u8; 2],
    mpis: Vec<Bytes>,
}

impl SignaturePacket {
    pub(crate) fn parse(packet: &Packet) -> Result<Self, PacketError> {
        if packet.tag != Tag::Signature {
            return Err(PacketError::UnexpectedTag {
                expected: Tag::Signature,
                found: packet.tag,
            });
        }
        let mut reader = packet.reader();

        let version = reader.u8()?;
        if version != SIGNATURE_VERSION {
            return Err(PacketError::Unsupported(format!("v{version} signatures")));
        }
        let code = reader.u8()?;
        let signature_type = SignatureType::from_code(code)
            .ok_or_else(|| PacketError::Invalid(format!("signature type {code:#04x}")))?;
        let code = reader.u8()?;
        let key_algorithm = AsymmetricAlgorithm::from_code(code)
            .ok_or_else(|| PacketError::Unsupported(format!("public key algorithm {code}")))?;
        let code = reader.u8()?;
        let hash_algorithm = HashAlgorithm::from_code(code)
            .ok_or_else(|| PacketError::Unsupported(format!("hash algorithm {code}")))?;

        let len = reader.u16()? as usize;
        let hashed_area = reader.take(len)?;
        let len = reader.u16()? as usize;
        let unhashed_area = reader.take(len)?;
        let digest_prefix = reader.array::<2>()?;

        let mut mpis = Vec::new();
        while !reader.is_empty() {
            mpis.push(reader.mpi()?);
        }

        Ok(Self {
            signature_type,
            key_algorithm,
            hash_algorithm,
            hashed: Subpackets::parse(hashed_area.clone())?,
            unhashed: Subpackets::parse(unhashed_area.clone())?,
            hashed_area,
            unhashed_area,
            digest_prefix,
            mpis,
        })
    }

    pub(crate) fn to_packet(&self) -> Packet {
        let mut body = Vec::with_capacity(
            self.hashed_area.len() + self.unhashed_area.len() + 80,
        );
        body.put_u8(SIGNATURE_VERSION);
        body.put_u8(self.signature_type.code());
        body.put_u8(self.key_algorithm.code());
        body.put_u8(self.hash_algorithm.code());
        body.put_u16(self.hashed_area.len() as u16);
        body.put_slice(&self.hashed_area);
        body.put_u16(self.unhashed_area.len() as u16);
        body.put_slice(&self.unhashed_area);
        body.put_slice(&self.digest_prefix);
        for mpi in &self.mpis {
            write_mpi(&mut body, mpi);
        }
        Packet::new(Tag::Signature, body)
    }

    pub(crate) fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    /// The issuer key ID, from either subpacket area.
    pub(crate) fn issuer(&self) -> Option<KeyId> {
        self.hashed
            .issuer()
            .or_else(|| self.unhashed.issuer())
            .map(KeyId::from)
    }

    /// Checks the signature over `content` against `key`.
    ///
    /// `Ok(false)` covers every way the check can fail on a well-formed
    /// packet, including algorithms we don't verify.
    pub(crate) fn verify(&self, key: &VerifyingKey, content: &[&[u8]]) -> Result<bool, PacketError> {
        if self.key_algorithm != AsymmetricAlgorithm::EdDsa {
            return Ok(false);
        }
        let trailer = trailer(
            self.signature_type,
            self.key_algorithm,
            self.hash_algorithm,
            &self.hashed_area,
        );
        let mut parts = content.to_vec();
        parts.push(&trailer);
        let Some(digest) = digest(self.hash_algorithm, &parts) else {
            return Ok(false);
        };
        if digest[..2] != self.digest_prefix {
            return Ok(false);
        }

        let [r, s] = self.mpis.as_slice() else {
            return Err(PacketError::Invalid(format!(
                "EdDSA signature with {} integers",
                self.mpis.len()
            )));
        };
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&mpi_to_array::<32>(r)?);
        raw[32..].copy_from_slice(&mpi_to_array::<32>(s)?);
        let signature = Ed25519Signature::from_bytes(&raw);
        Ok(key.verify(&digest, &signature).is_ok())
    }
}

fn trailer(
    signature_type: SignatureType,
    key_algorithm: AsymmetricAlgorithm,
    hash_algorithm: HashAlgorithm,
    hashed_area: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(hashed_area.len() + 12);
    out.put_u8(SIGNATURE_VERSION);
    out.put_u8(signature_type.code());
    out.put_u8(key_algorithm.code());
    out.put_u8(hash_algorithm.code());
    out.put_u16(hashed_area.len() as u16);
    out.put_slice(hashed_area);
    let hashed_len = out.len() as u32;
    out.put_u8(SIGNATURE_VERSION);
    out.put_u8(0xFF);
    out.put_u32(hashed_len);
    out
}

/// Assembles and signs a v4 EdDSA signature.
pub(crate) struct SignatureBuilder {
    signature_type: SignatureType,
    hash_algorithm: HashAlgorithm,
    hashed: Vec<Subpacket>,
    unhashed: Vec<Subpacket>,
}

impl SignatureBuilder {
    pub(crate) fn new(
        signature_type: SignatureType,
        hash_algorithm: HashAlgorithm,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signature_type,
            hash_algorithm,
            hashed: vec![Subpacket::creation_time(created_at)],
            unhashed: Vec::new(),
        }
    }

    pub(crate) fn hashed(mut self, subpacket: Subpacket) -> Self {
        self.hashed.push(subpacket);
        self
    }

    pub(crate) fn sign(
        mut self,
        key: &SigningKey,
        issuer: KeyId,
        content: &[&[u8]],
    ) -> CryptoResult<SignaturePacket> {
        self.unhashed.push(Subpacket::issuer(issuer.as_u64()));
        let hashed = Subpackets::new(self.hashed);
        let unhashed = Subpackets::new(self.unhashed);
        let hashed_area: Bytes = hashed.to_bytes().into();
        let unhashed_area: Bytes = unhashed.to_bytes().into();

        let trailer = trailer(
            self.signature_type,
            AsymmetricAlgorithm::EdDsa,
            self.hash_algorithm,
            &hashed_area,
        );
        let mut parts = content.to_vec();
        parts.push(&trailer);
        let digest = digest(self.hash_algorithm, &parts).ok_or_else(|| {
            CryptoError::EncryptionFailed(format!("cannot sign with {}", self.hash_algorithm))
        })?;

        let raw = key.sign(&digest).to_bytes();
        Ok(SignaturePacket {
            signature_type: self.signature_type,
            key_algorithm: AsymmetricAlgorithm::EdDsa,
            hash_algorithm: self.hash_algorithm,
            hashed_area,
            unhashed_area,
            hashed,
            unhashed,
            digest_prefix: [digest[0], digest[1]],
            mpis: vec![
                Bytes::copy_from_slice(&raw[..32]),
                Bytes::copy_from_slice(&raw[32..]),
            ],
        })
    }
}

/// A key certification or subkey binding.
///
/// Accessors decode the hashed subpacket area; nothing here is trusted until
/// one of the `verify_*` checks has passed, which key loading does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySignature(SignaturePacket);

impl KeySignature {
    /// The positive certification a master key makes over its user ID.
    pub(crate) fn certify_user_id(
        key: &SigningKey,
        master: &PublicKey,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> CryptoResult<Self> {
        let signed = SignatureBuilder::new(
            SignatureType::PositiveCertification,
            HashAlgorithm::CERTIFICATION,
            created_at,
        )
        .hashed(Subpacket::new(
            SubpacketType::KeyFlags,
            vec![KeyFlags::MASTER_KEY_DEFAULTS.bits()],
        ))
        .hashed(Subpacket::new(
            SubpacketType::PreferredSymmetricAlgorithms,
            SymmetricAlgorithm::to_codes(SymmetricAlgorithm::ACCEPTABLE),
        ))
        .hashed(Subpacket::new(
            SubpacketType::PreferredHashAlgorithms,
            HashAlgorithm::to_codes(HashAlgorithm::ACCEPTABLE),
        ))
        .hashed(Subpacket::new(
            SubpacketType::PreferredCompressionAlgorithms,
            CompressionAlgorithm::to_codes(CompressionAlgorithm::PREFERRED),
        ))
        .sign(
            key,
            master.key_id(),
            &[&master.hashed_form(), &user_id_form(user_id)],
        )?;
        Ok(Self(signed))
    }

    /// The binding a master key issues over its subkey.
    pub(crate) fn bind_subkey(
        key: &SigningKey,
        master: &PublicKey,
        sub: &PublicKey,
        created_at: DateTime<Utc>,
    ) -> CryptoResult<Self> {
        let signed = SignatureBuilder::new(
            SignatureType::SubkeyBinding,
            HashAlgorithm::CERTIFICATION,
            created_at,
        )
        .hashed(Subpacket::new(
            SubpacketType::KeyFlags,
            vec![KeyFlags::SUB_KEY_DEFAULTS.bits()],
        ))
        .sign(
            key,
            master.key_id(),
            &[&master.hashed_form(), &sub.hashed_form()],
        )?;
        Ok(Self(signed))
    }

    pub(crate) fn parse(packet: &Packet) -> Result<Self, PacketError> {
        SignaturePacket::parse(packet).map(Self)
    }

    pub fn to_packet(&self) -> Packet {
        self.0.to_packet()
    }

    pub fn signature_type(&self) -> SignatureType {
        self.0.signature_type
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.0.hash_algorithm
    }

    pub fn key_algorithm(&self) -> AsymmetricAlgorithm {
        self.0.key_algorithm
    }

    /// The ID of the key that issued the signature.
    pub fn key_id(&self) -> Option<KeyId> {
        self.0.issuer()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.0.hashed.creation_time()
    }

    pub fn key_flags(&self) -> KeyFlags {
        let octets = self.0.hashed.octets(SubpacketType::KeyFlags);
        KeyFlags::from_bits(octets.first().copied().unwrap_or_default())
    }

    pub fn preferred_symmetric_algorithms(&self) -> Vec<SymmetricAlgorithm> {
        SymmetricAlgorithm::from_codes(
            self.0
                .hashed
                .octets(SubpacketType::PreferredSymmetricAlgorithms),
        )
    }

    pub fn preferred_hash_algorithms(&self) -> Vec<HashAlgorithm> {
        HashAlgorithm::from_codes(self.0.hashed.octets(SubpacketType::PreferredHashAlgorithms))
    }

    pub fn preferred_compression_algorithms(&self) -> Vec<CompressionAlgorithm> {
        CompressionAlgorithm::from_codes(
            self.0
                .hashed
                .octets(SubpacketType::PreferredCompressionAlgorithms),
        )
    }

    /// Whether this is a valid certification of `master`'s user ID by
    /// `master` itself.
    pub fn verify_certification(&self, master: &MasterKey) -> CryptoResult<bool> {
        self.certifies(master.public_key(), master.user_id())
    }

    /// Whether this is a valid binding of `sub` issued by `master`.
    pub fn verify_binding(&self, sub: &SubKey, master: &MasterKey) -> CryptoResult<bool> {
        self.binds(master.public_key(), sub.public_key())
    }

    pub(crate) fn certifies(&self, master: &PublicKey, user_id: &str) -> CryptoResult<bool> {
        if !matches!(
            self.signature_type(),
            SignatureType::GenericCertification
                | SignatureType::PersonaCertification
                | SignatureType::CasualCertification
                | SignatureType::PositiveCertification
        ) {
            return Ok(false);
        }
        self.issued_by(master, &[&master.hashed_form(), &user_id_form(user_id)])
    }

    pub(crate) fn binds(&self, master: &PublicKey, sub: &PublicKey) -> CryptoResult<bool> {
        if self.signature_type() != SignatureType::SubkeyBinding {
            return Ok(false);
        }
        self.issued_by(master, &[&master.hashed_form(), &sub.hashed_form()])
    }

    fn issued_by(&self, signer: &PublicKey, content: &[&[u8]]) -> CryptoResult<bool> {
        if self.key_id().is_some_and(|id| id != signer.key_id()) {
            return Ok(false);
        }
        let Some(key) = signer.verifying_key() else {
            return Ok(false);
        };
        self.0
            .verify(key, content)
            .map_err(CryptoError::malformed_key_set)
    }
}

fn user_id_form(user_id: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_id.len() + 5);
    out.put_u8(0xB4);
    out.put_u32(user_id.len() as u32);
    out.put_slice(user_id.as_bytes());
    out
}
