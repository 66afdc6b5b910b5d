//! A read-only view over the immutable file buffer with an independent
//! position. Cloning a cursor is cheap: the backing bytes are shared, only
//! the position is per-cursor, so substructures at arbitrary offsets can be
//! decoded without disturbing the caller's position.

use std::sync::Arc;

use crate::dex::error::{DexError, ErrorKind};

#[derive(Debug, Clone)]
pub struct Cursor {
    data: Arc<[u8]>,
    pos: usize,
}

impl Cursor {
    pub fn new(data: Arc<[u8]>) -> Cursor {
        Cursor { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute seek. Positioning exactly at the end is allowed; past it is not.
    pub fn seek(&mut self, offset: usize) -> Result<(), DexError> {
        if offset > self.data.len() {
            fail!(TruncatedRead, "seek to {} beyond end ({})", offset, self.data.len());
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DexError> {
        self.seek(self.pos + n)
    }

    /// An independent cursor over the same bytes, positioned at `offset`.
    pub fn clone_at(&self, offset: usize) -> Result<Cursor, DexError> {
        let mut c = self.clone();
        c.seek(offset)?;
        Ok(c)
    }

    /// Bounds a preallocation for a table of `count` records of at least
    /// `record_size` bytes each, starting at the current position. A count
    /// the remaining bytes cannot hold must never reach the allocator, so
    /// it is rejected here before anything is read.
    pub fn table_capacity(&self, count: usize, record_size: usize, what: &str) -> Result<usize, DexError> {
        let fit = (self.data.len() - self.pos) / record_size;
        if count > fit {
            fail!(TruncatedRead, "{} count {} exceeds the {} records left in the file", what, count, fit);
        }
        Ok(count)
    }

    fn take(&mut self, n: usize) -> Result<&[u8], DexError> {
        if self.data.len() < self.pos + n {
            fail!(TruncatedRead, "wanted {} bytes at {}, file is {}", n, self.pos, self.data.len());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DexError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DexError> {
        let b = self.take(2)?;
        Ok(((b[1] as u16) << 8) | (b[0] as u16))
    }

    pub fn read_u32(&mut self) -> Result<u32, DexError> {
        let b = self.take(4)?;
        Ok(((b[3] as u32) << 24) | ((b[2] as u32) << 16) | ((b[1] as u32) << 8) | (b[0] as u32))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DexError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Unsigned LE base-128 varint. DEX uleb128 values are 32-bit, so a
    /// valid encoding is at most 5 bytes; a continuation bit on the fifth
    /// byte is an error.
    pub fn read_uleb128(&mut self) -> Result<u32, DexError> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        fail!(MalformedUleb128, "no terminating byte within 5 at {}", self.pos)
    }

    /// `n` LE bytes accumulated into the low end of a u64, unextended.
    fn read_raw(&mut self, n: usize) -> Result<u64, DexError> {
        let b = self.take(n)?;
        let mut raw: u64 = 0;
        for (i, byte) in b.iter().enumerate() {
            raw |= (*byte as u64) << (8 * i);
        }
        Ok(raw)
    }

    fn read_extended(&mut self, n: usize) -> Result<i64, DexError> {
        let raw = self.read_raw(n)?;
        let shift = 64 - 8 * n as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// 1..=4 bytes, sign-extended.
    pub fn read_int(&mut self, n: usize) -> Result<i32, DexError> {
        Ok(self.read_extended(n)? as i32)
    }

    /// 1..=2 bytes, sign-extended.
    pub fn read_short(&mut self, n: usize) -> Result<i16, DexError> {
        Ok(self.read_extended(n)? as i16)
    }

    /// 1..=2 bytes, zero-extended.
    pub fn read_char(&mut self, n: usize) -> Result<u16, DexError> {
        Ok(self.read_raw(n)? as u16)
    }

    /// 1..=8 bytes, sign-extended.
    pub fn read_long(&mut self, n: usize) -> Result<i64, DexError> {
        self.read_extended(n)
    }

    /// `n` low bytes of an IEEE-754 binary32 pattern: the stored bytes are
    /// the most significant ones, so the pattern is left-shifted to full
    /// width before reinterpreting.
    pub fn read_float(&mut self, n: usize) -> Result<f32, DexError> {
        let raw = self.read_raw(n)? as u32;
        Ok(f32::from_bits(raw << (8 * (4 - n))))
    }

    /// Same as `read_float` for a binary64 pattern.
    pub fn read_double(&mut self, n: usize) -> Result<f64, DexError> {
        let raw = self.read_raw(n)?;
        Ok(f64::from_bits(raw << (8 * (8 - n))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::error::ErrorKind;

    fn cursor(bytes: &[u8]) -> Cursor {
        Cursor::new(bytes.to_vec().into())
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut c = cursor(&[0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(c.read_u8().unwrap(), 0x01);
        assert_eq!(c.read_u16().unwrap(), 0x1234);
        assert_eq!(c.read_u32().unwrap(), 0x12345678);
        assert_eq!(c.position(), 7);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut c = cursor(&[0x01, 0x02]);
        assert_eq!(c.read_u32().unwrap_err().kind(), ErrorKind::TruncatedRead);
        // The failed read must not consume anything.
        assert_eq!(c.position(), 0);
        assert_eq!(c.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_seek_and_skip() {
        let mut c = cursor(&[0; 8]);
        c.seek(8).unwrap();
        assert_eq!(c.position(), 8);
        assert_eq!(c.seek(9).unwrap_err().kind(), ErrorKind::TruncatedRead);
        c.seek(2).unwrap();
        c.skip(4).unwrap();
        assert_eq!(c.position(), 6);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a = cursor(&[0x11, 0x22, 0x33]);
        let mut b = a.clone_at(2).unwrap();
        assert_eq!(a.read_u8().unwrap(), 0x11);
        assert_eq!(b.read_u8().unwrap(), 0x33);
        assert_eq!(a.position(), 1);
        assert_eq!(b.position(), 3);
    }

    #[test]
    fn test_table_capacity_bound() {
        let c = cursor(&[0; 16]);
        assert_eq!(c.table_capacity(4, 4, "test").unwrap(), 4);
        assert_eq!(c.table_capacity(0, 4, "test").unwrap(), 0);
        let e = c.table_capacity(5, 4, "test").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::TruncatedRead);
        // The bound follows the position, not the full buffer.
        let mut c = cursor(&[0; 16]);
        c.seek(8).unwrap();
        assert_eq!(c.table_capacity(3, 4, "test").unwrap_err().kind(), ErrorKind::TruncatedRead);
    }

    #[test]
    fn test_uleb128_cap() {
        let mut c = cursor(&[0xE5, 0x8E, 0x26]);
        assert_eq!(c.read_uleb128().unwrap(), 624485);

        let mut c = cursor(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(c.read_uleb128().unwrap(), u32::MAX);

        let mut c = cursor(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(c.read_uleb128().unwrap_err().kind(), ErrorKind::MalformedUleb128);
    }

    #[test]
    fn test_sign_extension() {
        let mut c = cursor(&[0xFF]);
        assert_eq!(c.read_int(1).unwrap(), -1);
        let mut c = cursor(&[0x80]);
        assert_eq!(c.read_short(1).unwrap(), -128);
        let mut c = cursor(&[0x80]);
        assert_eq!(c.read_char(1).unwrap(), 0x0080);
        let mut c = cursor(&[0xFE, 0xFF]);
        assert_eq!(c.read_long(2).unwrap(), -2);
        let mut c = cursor(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(c.read_int(4).unwrap(), 0x12345678);
    }

    #[test]
    fn test_truncated_float_patterns() {
        // 1.0f32 is 0x3F800000: only the two high bytes are stored.
        let mut c = cursor(&[0x80, 0x3F]);
        assert_eq!(c.read_float(2).unwrap(), 1.0);
        // 2.0f64 is 0x4000000000000000: one stored byte.
        let mut c = cursor(&[0x40]);
        assert_eq!(c.read_double(1).unwrap(), 2.0);
        // Full-width patterns pass through untouched.
        let mut c = cursor(&1.5f32.to_bits().to_le_bytes());
        assert_eq!(c.read_float(4).unwrap(), 1.5);
    }
}
