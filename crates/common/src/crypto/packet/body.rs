use bytes::{Buf, Bytes};

use super::PacketError;

/// Bounds-checked cursor over a packet body
///
/// `bytes::Buf` panics when asked for more than it holds; every read here
/// checks first and reports [`PacketError::UnexpectedEof`] instead.
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn ensure(&self, n: usize) -> Result<(), PacketError> {
        if self.buf.remaining() < n {
            return Err(PacketError::UnexpectedEof {
                needed: n - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, PacketError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, PacketError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32, PacketError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn take(&mut self, n: usize) -> Result<Bytes, PacketError> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Everything left in the body.
    pub fn rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut r = BodyReader::new(Bytes::from_static(&[1, 0, 2, 0, 0, 0, 3, 9]));
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.u32().unwrap(), 3);
        assert_eq!(r.remaining(), 1);
        assert_eq!(&r.rest()[..], &[9]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_short_read_reports_missing_bytes() {
        let mut r = BodyReader::new(Bytes::from_static(&[1, 2]));
        match r.u32() {
            Err(PacketError::UnexpectedEof { needed }) => assert_eq!(needed, 2),
            other => panic!("unexpected result: {other:?}"),
        }
        // a failed read consumes nothing
        assert_eq!(r.remaining(), 2);
    }
}
