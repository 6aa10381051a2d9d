//! Literal and compressed data packets

use std::io::{Read, Write};

use bytes::{BufMut, Bytes};
use chrono::{DateTime, Utc};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;

use crate::crypto::algorithms::CompressionAlgorithm;
use crate::crypto::packet::{read_packets, Packet, PacketError, Tag};

/// Literal data is always written as binary with no file name.
const BINARY: u8 = b'b';
/// Ceiling on a decompressed payload: 1 GiB
const MAX_INFLATED_SIZE: u64 = 1 << 30;

pub(crate) fn literal(payload: &[u8], at: DateTime<Utc>) -> Packet {
    let mut body = Vec::with_capacity(payload.len() + 6);
    body.put_u8(BINARY);
    body.put_u8(0);
    body.put_u32(at.timestamp() as u32);
    body.put_slice(payload);
    Packet::new(Tag::LiteralData, body)
}

/// The payload of a literal data packet, whatever its format octet says.
pub(crate) fn literal_payload(packet: &Packet) -> Result<Bytes, PacketError> {
    let mut reader = packet.reader();
    let _format = reader.u8()?;
    let name_len = reader.u8()? as usize;
    reader.take(name_len)?;
    let _date = reader.u32()?;
    Ok(reader.rest())
}

/// Wraps `inner` in a compressed data packet.
pub(crate) fn compress(
    algorithm: CompressionAlgorithm,
    inner: &Packet,
) -> Result<Packet, PacketError> {
    let mut body = vec![algorithm.code()];
    let data = inner.to_bytes();
    match algorithm {
        CompressionAlgorithm::Uncompressed => body.extend_from_slice(&data),
        CompressionAlgorithm::Zip => {
            let mut encoder = DeflateEncoder::new(body, Compression::default());
            encoder.write_all(&data)?;
            body = encoder.finish()?;
        }
        CompressionAlgorithm::Zlib => {
            let mut encoder = ZlibEncoder::new(body, Compression::default());
            encoder.write_all(&data)?;
            body = encoder.finish()?;
        }
        CompressionAlgorithm::Bzip2 => {
            return Err(PacketError::Unsupported("BZIP2 compression".into()));
        }
    }
    Ok(Packet::new(Tag::CompressedData, body))
}

/// Reads at most `limit` decompressed bytes, failing rather than truncating.
fn inflate<R: Read>(decoder: R, limit: u64) -> Result<Vec<u8>, PacketError> {
    let mut out = Vec::new();
    decoder.take(limit + 1).read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(PacketError::Invalid(format!(
            "compressed data inflates past {limit} bytes"
        )));
    }
    Ok(out)
}

/// Unpacks a compressed data packet into the packets it contains.
pub(crate) fn decompress(packet: &Packet) -> Result<Vec<Packet>, PacketError> {
    let mut reader = packet.reader();
    let code = reader.u8()?;
    let algorithm = CompressionAlgorithm::from_code(code)
        .ok_or_else(|| PacketError::Unsupported(format!("compression algorithm {code}")))?;
    let data = reader.rest();

    let inflated = match algorithm {
        CompressionAlgorithm::Uncompressed => data,
        CompressionAlgorithm::Zip => {
            inflate(DeflateDecoder::new(&data[..]), MAX_INFLATED_SIZE)?.into()
        }
        CompressionAlgorithm::Zlib => {
            inflate(ZlibDecoder::new(&data[..]), MAX_INFLATED_SIZE)?.into()
        }
        CompressionAlgorithm::Bzip2 => {
            return Err(PacketError::Unsupported("BZIP2 compression".into()));
        }
    };
    read_packets(inflated)
}
