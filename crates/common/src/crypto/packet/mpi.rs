use bytes::{BufMut, Bytes};
use zeroize::Zeroizing;

use super::{BodyReader, PacketError};

/// Writes `value` as a multiprecision integer: a two-octet bit count followed
/// by the big-endian magnitude without leading zero octets.
pub fn write_mpi(out: &mut Vec<u8>, value: &[u8]) {
    let start = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let value = &value[start..];
    let bits = match value.first() {
        Some(first) => (value.len() * 8 - first.leading_zeros() as usize) as u16,
        None => 0,
    };
    out.put_u16(bits);
    out.put_slice(value);
}

impl BodyReader {
    /// Reads a multiprecision integer, returning its magnitude octets.
    pub fn mpi(&mut self) -> Result<Bytes, PacketError> {
        let bits = self.u16()? as usize;
        self.take(bits.div_ceil(8))
    }
}

/// Left-pads an MPI magnitude back to a fixed-width field.
pub fn mpi_to_array<const N: usize>(value: &[u8]) -> Result<[u8; N], PacketError> {
    if value.len() > N {
        return Err(PacketError::Invalid(format!(
            "integer of {} octets exceeds {} octet field",
            value.len(),
            N
        )));
    }
    let mut out = [0u8; N];
    out[N - value.len()..].copy_from_slice(value);
    Ok(out)
}

/// Decodes `input` as exactly one MPI, left-padded into a wiped-on-drop
/// fixed-width field. Used for secret scalars, so nothing is copied into an
/// intermediate buffer.
pub fn mpi_from_slice<const N: usize>(input: &[u8]) -> Result<Zeroizing<[u8; N]>, PacketError> {
    let (bits, rest) = match input {
        [hi, lo, rest @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, rest),
        _ => {
            return Err(PacketError::UnexpectedEof {
                needed: 2 - input.len(),
            })
        }
    };
    let len = bits.div_ceil(8);
    if rest.len() < len {
        return Err(PacketError::UnexpectedEof {
            needed: len - rest.len(),
        });
    }
    if rest.len() > len {
        return Err(PacketError::Invalid("trailing data after integer".into()));
    }
    if len > N {
        return Err(PacketError::Invalid(format!(
            "integer of {} octets exceeds {} octet field",
            len, N
        )));
    }
    let mut out = Zeroizing::new([0u8; N]);
    out[N - len..].copy_from_slice(rest);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bit_count_ignores_leading_zeros() {
        let mut out = Vec::new();
        write_mpi(&mut out, &[0x00, 0x01, 0xFF]);
        assert_eq!(out, vec![0x00, 0x09, 0x01, 0xFF]);
    }

    #[test]
    fn test_prefixed_point() {
        // native curve points carry a 0x40 prefix: 263 bits
        let mut point = vec![0x40];
        point.extend_from_slice(&[0xAA; 32]);
        let mut out = Vec::new();
        write_mpi(&mut out, &point);
        assert_eq!(&out[..2], &[0x01, 0x07]);

        let mut r = BodyReader::new(out.into());
        assert_eq!(&r.mpi().unwrap()[..], &point[..]);
    }

    #[test]
    fn test_zero() {
        let mut out = Vec::new();
        write_mpi(&mut out, &[0, 0]);
        assert_eq!(out, vec![0, 0]);
        let mut r = BodyReader::new(out.into());
        assert!(r.mpi().unwrap().is_empty());
    }

    #[test]
    fn test_pad_to_array() {
        let padded: [u8; 4] = mpi_to_array(&[0x01, 0x02]).unwrap();
        assert_eq!(padded, [0, 0, 1, 2]);
        assert!(mpi_to_array::<1>(&[1, 2]).is_err());
    }

    #[test]
    fn test_from_slice_requires_exact_length() {
        let mut out = Vec::new();
        write_mpi(&mut out, &[0x01, 0x02]);
        assert_eq!(*mpi_from_slice::<4>(&out).unwrap(), [0, 0, 1, 2]);

        assert!(matches!(
            mpi_from_slice::<4>(&out[..2]),
            Err(PacketError::UnexpectedEof { needed: 2 })
        ));
        out.push(0);
        assert!(mpi_from_slice::<4>(&out).is_err());
        assert!(mpi_from_slice::<1>(&out[..4]).is_err());
        assert!(mpi_from_slice::<4>(&[0x00]).is_err());
    }
}
