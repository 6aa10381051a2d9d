use bytes::{BufMut, Bytes};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::VerifyingKey;
use x25519_dalek::PublicKey as X25519PublicKey;

use super::{hashed_key_header, Fingerprint, KeyId};
use crate::crypto::algorithms::{AsymmetricAlgorithm, HashAlgorithm, SymmetricAlgorithm};
use crate::crypto::packet::{mpi_to_array, write_mpi, BodyReader, PacketError};

/// Ed25519 in the legacy EdDSA encoding
pub(crate) const ED25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
/// Curve25519 for ECDH
pub(crate) const CV25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

/// Prefix marking a native (not SEC1) curve point inside an MPI
const NATIVE_POINT: u8 = 0x40;
const KEY_VERSION: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PublicMaterial {
    Ed25519(VerifyingKey),
    /// Only SHA-256 / AES-256 KDF parameters are accepted.
    X25519(X25519PublicKey),
}

/// The public half of a v4 key packet.
///
/// Holds the exact body octets it was parsed from, since fingerprints and
/// signatures are computed over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    body: Bytes,
    created_at: DateTime<Utc>,
    algorithm: AsymmetricAlgorithm,
    material: PublicMaterial,
    fingerprint: Fingerprint,
}

impl PublicKey {
    pub(crate) fn ed25519(created_at: DateTime<Utc>, key: &VerifyingKey) -> Self {
        let mut body = header(created_at, AsymmetricAlgorithm::EdDsa);
        write_curve(&mut body, ED25519_OID, key.as_bytes());
        Self::from_parts(
            body,
            created_at,
            AsymmetricAlgorithm::EdDsa,
            PublicMaterial::Ed25519(*key),
        )
    }

    pub(crate) fn x25519(created_at: DateTime<Utc>, key: &X25519PublicKey) -> Self {
        let mut body = header(created_at, AsymmetricAlgorithm::Ecdh);
        write_curve(&mut body, CV25519_OID, key.as_bytes());
        body.put_slice(&ecdh_kdf_params());
        Self::from_parts(
            body,
            created_at,
            AsymmetricAlgorithm::Ecdh,
            PublicMaterial::X25519(*key),
        )
    }

    fn from_parts(
        body: Vec<u8>,
        created_at: DateTime<Utc>,
        algorithm: AsymmetricAlgorithm,
        material: PublicMaterial,
    ) -> Self {
        let fingerprint = Fingerprint::of(&body);
        Self {
            body: body.into(),
            created_at,
            algorithm,
            material,
            fingerprint,
        }
    }

    /// Parses the public fields at the front of a key packet body, leaving
    /// `reader` on the first octet after them.
    pub(crate) fn parse(reader: &mut BodyReader) -> Result<Self, PacketError> {
        let mut whole = reader.clone();
        let start = reader.remaining();

        let version = reader.u8()?;
        if version != KEY_VERSION {
            return Err(PacketError::Unsupported(format!("v{version} keys")));
        }
        let created = reader.u32()?;
        let created_at = Utc
            .timestamp_opt(created as i64, 0)
            .single()
            .ok_or_else(|| PacketError::Invalid(format!("creation time {created}")))?;

        let code = reader.u8()?;
        let algorithm = AsymmetricAlgorithm::from_code(code)
            .ok_or_else(|| PacketError::Unsupported(format!("public key algorithm {code}")))?;

        let material = match algorithm {
            AsymmetricAlgorithm::EdDsa => {
                let point = read_curve(reader, ED25519_OID)?;
                let key = VerifyingKey::from_bytes(&point)
                    .map_err(|e| PacketError::Invalid(format!("Ed25519 point: {e}")))?;
                PublicMaterial::Ed25519(key)
            }
            AsymmetricAlgorithm::Ecdh => {
                let point = read_curve(reader, CV25519_OID)?;
                let params = reader.u8()?;
                let kdf = reader.take(params as usize)?;
                if kdf[..] != ecdh_kdf_params()[1..] {
                    return Err(PacketError::Unsupported(format!(
                        "ECDH KDF parameters {}",
                        hex::encode(&kdf)
                    )));
                }
                PublicMaterial::X25519(X25519PublicKey::from(point))
            }
            other => return Err(PacketError::Unsupported(format!("{other} keys"))),
        };

        let body = whole.take(start - reader.remaining())?;
        let fingerprint = Fingerprint::of(&body);
        Ok(Self {
            body,
            created_at,
            algorithm,
            material,
            fingerprint,
        })
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn algorithm(&self) -> AsymmetricAlgorithm {
        self.algorithm
    }

    pub fn size(&self) -> u32 {
        self.algorithm.key_size().unwrap_or_default()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The raw public key packet body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `0x99 || u16 length || body`, as hashed by key signatures.
    pub(crate) fn hashed_form(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 3);
        out.put_slice(&hashed_key_header(self.body.len()));
        out.put_slice(&self.body);
        out
    }

    pub(crate) fn verifying_key(&self) -> Option<&VerifyingKey> {
        match &self.material {
            PublicMaterial::Ed25519(key) => Some(key),
            PublicMaterial::X25519(_) => None,
        }
    }

    pub(crate) fn encryption_key(&self) -> Option<&X25519PublicKey> {
        match &self.material {
            PublicMaterial::X25519(key) => Some(key),
            PublicMaterial::Ed25519(_) => None,
        }
    }
}

fn header(created_at: DateTime<Utc>, algorithm: AsymmetricAlgorithm) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    body.put_u8(KEY_VERSION);
    body.put_u32(created_at.timestamp() as u32);
    body.put_u8(algorithm.code());
    body
}

fn write_curve(body: &mut Vec<u8>, oid: &[u8], point: &[u8; 32]) {
    body.put_u8(oid.len() as u8);
    body.put_slice(oid);
    let mut prefixed = [0u8; 33];
    prefixed[0] = NATIVE_POINT;
    prefixed[1..].copy_from_slice(point);
    write_mpi(body, &prefixed);
}

fn read_curve(reader: &mut BodyReader, oid: &[u8]) -> Result<[u8; 32], PacketError> {
    let len = reader.u8()?;
    let found = reader.take(len as usize)?;
    if found[..] != *oid {
        return Err(PacketError::Unsupported(format!(
            "curve OID {}",
            hex::encode(&found)
        )));
    }
    let point: [u8; 33] = mpi_to_array(&reader.mpi()?)?;
    if point[0] != NATIVE_POINT {
        return Err(PacketError::Invalid(format!(
            "curve point prefix {:#04x}",
            point[0]
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&point[1..]);
    Ok(out)
}

/// ECDH KDF parameters: length, reserved octet, hash, key wrap cipher. The
/// same block is mixed into the session key derivation.
pub(crate) fn ecdh_kdf_params() -> [u8; 4] {
    [
        3,
        1,
        HashAlgorithm::Sha256.code(),
        SymmetricAlgorithm::Aes256.code(),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use ed25519_dalek::SigningKey;
    use x25519_dalek::StaticSecret;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_247_156_523, 0).unwrap()
    }

    #[test]
    fn test_ed25519_body_roundtrip() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let public = PublicKey::ed25519(at(), &signing.verifying_key());
        assert_eq!(public.body()[0], 4);
        assert_eq!(public.body()[5], 22);

        let mut reader = BodyReader::new(Bytes::copy_from_slice(public.body()));
        let parsed = PublicKey::parse(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(parsed, public);
        assert_eq!(parsed.created_at(), at());
        assert_eq!(parsed.size(), 256);
    }

    #[test]
    fn test_x25519_body_roundtrip() {
        let secret = StaticSecret::from([9u8; 32]);
        let public = PublicKey::x25519(at(), &X25519PublicKey::from(&secret));
        assert!(public.body().ends_with(&[3, 1, 8, 9]));

        let mut reader = BodyReader::new(Bytes::copy_from_slice(public.body()));
        let parsed = PublicKey::parse(&mut reader).unwrap();
        assert_eq!(parsed.key_id(), public.key_id());
        assert_eq!(parsed.algorithm(), AsymmetricAlgorithm::Ecdh);
        assert!(parsed.encryption_key().is_some());
        assert!(parsed.verifying_key().is_none());
    }

    #[test]
    fn test_parse_leaves_trailing_octets() {
        let signing = SigningKey::from_bytes(&[1u8; 32]);
        let public = PublicKey::ed25519(at(), &signing.verifying_key());
        let mut body = public.body().to_vec();
        body.extend_from_slice(&[0xFE, 0xED]);

        let mut reader = BodyReader::new(body.into());
        PublicKey::parse(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_rejects_other_algorithms() {
        // v4 RSA key header
        let body = vec![4, 0, 0, 0, 0, 1, 0, 8, 0xFF, 0, 8, 0x01];
        let mut reader = BodyReader::new(body.into());
        assert!(matches!(
            PublicKey::parse(&mut reader),
            Err(PacketError::Unsupported(_))
        ));
    }
}
