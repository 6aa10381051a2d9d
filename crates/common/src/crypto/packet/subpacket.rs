//! Signature subpackets
//!
//! Only the subpackets Grendel's certification policy asserts are
//! interpreted. Anything else is kept verbatim so a signature re-encodes
//! byte for byte.

use bytes::{BufMut, Bytes};
use chrono::{DateTime, TimeZone, Utc};

use super::{write_length, BodyReader, PacketError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpacketType {
    SignatureCreationTime,
    PreferredSymmetricAlgorithms,
    Issuer,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    KeyFlags,
    IssuerFingerprint,
    Other(u8),
}

impl SubpacketType {
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Self::SignatureCreationTime,
            11 => Self::PreferredSymmetricAlgorithms,
            16 => Self::Issuer,
            21 => Self::PreferredHashAlgorithms,
            22 => Self::PreferredCompressionAlgorithms,
            27 => Self::KeyFlags,
            33 => Self::IssuerFingerprint,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::SignatureCreationTime => 2,
            Self::PreferredSymmetricAlgorithms => 11,
            Self::Issuer => 16,
            Self::PreferredHashAlgorithms => 21,
            Self::PreferredCompressionAlgorithms => 22,
            Self::KeyFlags => 27,
            Self::IssuerFingerprint => 33,
            Self::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    pub kind: SubpacketType,
    pub critical: bool,
    pub data: Bytes,
}

impl Subpacket {
    pub fn new(kind: SubpacketType, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            critical: false,
            data: data.into(),
        }
    }

    pub fn creation_time(at: DateTime<Utc>) -> Self {
        Self::new(
            SubpacketType::SignatureCreationTime,
            (at.timestamp() as u32).to_be_bytes().to_vec(),
        )
    }

    pub fn issuer(key_id: u64) -> Self {
        Self::new(SubpacketType::Issuer, key_id.to_be_bytes().to_vec())
    }

    pub fn issuer_fingerprint(fingerprint: &[u8; 20]) -> Self {
        let mut data = Vec::with_capacity(21);
        data.put_u8(4);
        data.put_slice(fingerprint);
        Self::new(SubpacketType::IssuerFingerprint, data)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_length(out, self.data.len() + 1);
        let code = self.kind.code() | if self.critical { 0x80 } else { 0 };
        out.put_u8(code);
        out.put_slice(&self.data);
    }
}

/// An ordered subpacket area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subpackets(Vec<Subpacket>);

impl Subpackets {
    pub fn new(subpackets: Vec<Subpacket>) -> Self {
        Self(subpackets)
    }

    pub fn parse(area: Bytes) -> Result<Self, PacketError> {
        let mut r = BodyReader::new(area);
        let mut out = Vec::new();
        while !r.is_empty() {
            let first = r.u8()?;
            let len = match first {
                0..=191 => first as usize,
                192..=254 => {
                    let second = r.u8()? as usize;
                    (((first as usize) - 192) << 8) + second + 192
                }
                255 => r.u32()? as usize,
            };
            if len == 0 {
                return Err(PacketError::Invalid("empty subpacket".to_string()));
            }
            let code = r.u8()?;
            let data = r.take(len - 1)?;
            out.push(Subpacket {
                kind: SubpacketType::from_code(code & 0x7F),
                critical: code & 0x80 != 0,
                data,
            });
        }
        Ok(Self(out))
    }

    /// The encoded area, without its two-octet length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for subpacket in &self.0 {
            subpacket.encode(&mut out);
        }
        out
    }

    pub fn find(&self, kind: SubpacketType) -> Option<&Subpacket> {
        self.0.iter().find(|s| s.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subpacket> {
        self.0.iter()
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        let data = &self.find(SubpacketType::SignatureCreationTime)?.data;
        let secs: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Utc.timestamp_opt(u32::from_be_bytes(secs) as i64, 0).single()
    }

    pub fn issuer(&self) -> Option<u64> {
        if let Some(subpacket) = self.find(SubpacketType::Issuer) {
            let id: [u8; 8] = subpacket.data.get(..8)?.try_into().ok()?;
            return Some(u64::from_be_bytes(id));
        }
        // v4 fingerprints end with the key ID
        let data = &self.find(SubpacketType::IssuerFingerprint)?.data;
        if data.len() != 21 {
            return None;
        }
        let id: [u8; 8] = data[13..].try_into().ok()?;
        Some(u64::from_be_bytes(id))
    }

    /// The raw octets of a flag or preference subpacket.
    pub fn octets(&self, kind: SubpacketType) -> &[u8] {
        self.find(kind).map(|s| &s.data[..]).unwrap_or(&[])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_area_roundtrip() {
        let at = Utc.with_ymd_and_hms(2009, 7, 9, 16, 22, 3).unwrap();
        let area = Subpackets::new(vec![
            Subpacket::creation_time(at),
            Subpacket::new(SubpacketType::KeyFlags, vec![0x32]),
            Subpacket::new(SubpacketType::PreferredCompressionAlgorithms, vec![3, 2, 1]),
            Subpacket::issuer(0x8C70_35EF_8838_238C),
        ]);
        let parsed = Subpackets::parse(area.to_bytes().into()).unwrap();
        assert_eq!(parsed, area);
        assert_eq!(parsed.creation_time(), Some(at));
        assert_eq!(parsed.issuer(), Some(0x8C70_35EF_8838_238C));
        assert_eq!(parsed.octets(SubpacketType::KeyFlags), &[0x32]);
        assert!(parsed.octets(SubpacketType::PreferredHashAlgorithms).is_empty());
    }

    #[test]
    fn test_issuer_from_fingerprint() {
        let mut fingerprint = [0u8; 20];
        fingerprint[12..].copy_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        let area = Subpackets::new(vec![Subpacket::issuer_fingerprint(&fingerprint)]);
        assert_eq!(area.issuer(), Some(0x0102_0304_0506_0708));
    }

    #[test]
    fn test_critical_bit_preserved() {
        let mut flags = Subpacket::new(SubpacketType::KeyFlags, vec![0x03]);
        flags.critical = true;
        let bytes = Subpackets::new(vec![flags.clone()]).to_bytes();
        assert_eq!(bytes, vec![0x02, 0x80 | 27, 0x03]);
        let parsed = Subpackets::parse(bytes.into()).unwrap();
        assert_eq!(parsed.iter().next(), Some(&flags));
    }
}
