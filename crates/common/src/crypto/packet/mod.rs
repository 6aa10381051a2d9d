//! OpenPGP packet framing
//!
//! Packets are written with new-format headers and the shortest definite
//! length encoding. On read we also accept old-format headers and new-format
//! partial body lengths, since both show up in packets produced elsewhere.
//!
//! ```text
//! new format:  [ 0b11 tag(6) ][ len: 1, 2 or 5 octets ][ body ]
//! old format:  [ 0b10 tag(4) ltype(2) ][ len: 1, 2, 4 or rest ][ body ]
//! ```

mod body;
mod mpi;
mod subpacket;

use bytes::{BufMut, Bytes};

pub use body::BodyReader;
pub use mpi::{mpi_from_slice, mpi_to_array, write_mpi};
pub use subpacket::{Subpacket, SubpacketType, Subpackets};

/// Errors raised while framing or parsing packets
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("unexpected end of data: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    #[error("invalid packet header byte {0:#04x}")]
    InvalidHeader(u8),
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),
    #[error("expected {expected} packet, found {found}")]
    UnexpectedTag { expected: Tag, found: Tag },
    #[error("unsupported {0}")]
    Unsupported(String),
    #[error("invalid packet: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packet tags Grendel reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    PublicKeyEncryptedSessionKey = 1,
    Signature = 2,
    OnePassSignature = 4,
    SecretKey = 5,
    PublicKey = 6,
    SecretSubkey = 7,
    CompressedData = 8,
    Marker = 10,
    LiteralData = 11,
    Trust = 12,
    UserId = 13,
    PublicSubkey = 14,
    SymEncryptedIntegrityProtectedData = 18,
}

impl Tag {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Tag::PublicKeyEncryptedSessionKey,
            2 => Tag::Signature,
            4 => Tag::OnePassSignature,
            5 => Tag::SecretKey,
            6 => Tag::PublicKey,
            7 => Tag::SecretSubkey,
            8 => Tag::CompressedData,
            10 => Tag::Marker,
            11 => Tag::LiteralData,
            12 => Tag::Trust,
            13 => Tag::UserId,
            14 => Tag::PublicSubkey,
            18 => Tag::SymEncryptedIntegrityProtectedData,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tag::PublicKeyEncryptedSessionKey => "public-key encrypted session key",
            Tag::Signature => "signature",
            Tag::OnePassSignature => "one-pass signature",
            Tag::SecretKey => "secret key",
            Tag::PublicKey => "public key",
            Tag::SecretSubkey => "secret subkey",
            Tag::CompressedData => "compressed data",
            Tag::Marker => "marker",
            Tag::LiteralData => "literal data",
            Tag::Trust => "trust",
            Tag::UserId => "user ID",
            Tag::PublicSubkey => "public subkey",
            Tag::SymEncryptedIntegrityProtectedData => "encrypted integrity protected data",
        };
        f.write_str(name)
    }
}

/// A framed packet: its tag and raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub tag: Tag,
    pub body: Bytes,
}

impl Packet {
    pub fn new(tag: Tag, body: impl Into<Bytes>) -> Self {
        Self {
            tag,
            body: body.into(),
        }
    }

    /// Appends the framed packet to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_packet(out, self.tag, &self.body);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 6);
        self.encode(&mut out);
        out
    }

    /// A reader positioned at the start of the body.
    pub fn reader(&self) -> BodyReader {
        BodyReader::new(self.body.clone())
    }

    pub fn expect(self, tag: Tag) -> Result<Self, PacketError> {
        if self.tag == tag {
            Ok(self)
        } else {
            Err(PacketError::UnexpectedTag {
                expected: tag,
                found: self.tag,
            })
        }
    }
}

/// Appends a new-format packet to `out`.
pub fn write_packet(out: &mut Vec<u8>, tag: Tag, body: &[u8]) {
    out.put_u8(0xC0 | tag.code());
    write_length(out, body.len());
    out.put_slice(body);
}

/// Writes a new-format definite length. Subpacket lengths use the same scheme.
pub(crate) fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 192 {
        out.put_u8(len as u8);
    } else if len < 8384 {
        let adjusted = len - 192;
        out.put_u8(((adjusted >> 8) + 192) as u8);
        out.put_u8((adjusted & 0xFF) as u8);
    } else {
        out.put_u8(0xFF);
        out.put_u32(len as u32);
    }
}

/// Splits `data` into packets.
///
/// Marker packets are dropped, everything else is returned in order.
pub fn read_packets(data: impl Into<Bytes>) -> Result<Vec<Packet>, PacketError> {
    let mut reader = BodyReader::new(data.into());
    let mut packets = Vec::new();
    while !reader.is_empty() {
        let packet = read_packet(&mut reader)?;
        if packet.tag != Tag::Marker {
            packets.push(packet);
        }
    }
    Ok(packets)
}

/// Reads every packet from `input`.
pub fn read_packets_from<R: std::io::Read>(mut input: R) -> Result<Vec<Packet>, PacketError> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    read_packets(data)
}

fn read_packet(reader: &mut BodyReader) -> Result<Packet, PacketError> {
    let header = reader.u8()?;
    if header & 0x80 == 0 {
        return Err(PacketError::InvalidHeader(header));
    }

    if header & 0x40 != 0 {
        let code = header & 0x3F;
        let tag = Tag::from_code(code).ok_or(PacketError::UnknownTag(code))?;
        let body = read_new_format_body(reader)?;
        return Ok(Packet { tag, body });
    }

    let code = (header >> 2) & 0x0F;
    let tag = Tag::from_code(code).ok_or(PacketError::UnknownTag(code))?;
    let body = match header & 0x03 {
        0 => {
            let len = reader.u8()? as usize;
            reader.take(len)?
        }
        1 => {
            let len = reader.u16()? as usize;
            reader.take(len)?
        }
        2 => {
            let len = reader.u32()? as usize;
            reader.take(len)?
        }
        _ => reader.rest(),
    };
    Ok(Packet { tag, body })
}

fn read_new_format_body(reader: &mut BodyReader) -> Result<Bytes, PacketError> {
    let mut partial: Option<Vec<u8>> = None;
    loop {
        let first = reader.u8()?;
        let (len, is_partial) = match first {
            0..=191 => (first as usize, false),
            192..=223 => {
                let second = reader.u8()? as usize;
                ((((first as usize) - 192) << 8) + second + 192, false)
            }
            224..=254 => (1usize << (first & 0x1F), true),
            255 => (reader.u32()? as usize, false),
        };
        let chunk = reader.take(len)?;

        if !is_partial {
            return Ok(match partial.take() {
                None => chunk,
                Some(mut buf) => {
                    buf.extend_from_slice(&chunk);
                    Bytes::from(buf)
                }
            });
        }
        partial.get_or_insert_with(Vec::new).extend_from_slice(&chunk);
    }
}
