use anyhow::{Ok, Result};
use bytebuffer::ByteBuffer;
use std::mem;

/// A fixed-size byte buffer with typed absolute accessors. Two
/// construction modes: a fresh zero-filled buffer the size of a block
/// (buffer pool use), or wrapping an existing byte array (log record
/// use). Bounds are checked on writes; reads trust the offset.
#[derive(Debug)]
pub struct Page {
    buf: ByteBuffer,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: ByteBuffer::from_vec(vec![0; block_size]),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Page {
        Self {
            buf: ByteBuffer::from_vec(bytes),
        }
    }

    pub fn get_int(&mut self, offset: usize) -> Result<i32> {
        self.buf.set_rpos(offset);
        Ok(self.buf.read_i32()?)
    }

    pub fn set_int(&mut self, offset: usize, n: i32) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_i32(n);
        Ok(())
    }

    pub fn get_i64(&mut self, offset: usize) -> Result<i64> {
        self.buf.set_rpos(offset);
        Ok(self.buf.read_i64()?)
    }

    pub fn set_i64(&mut self, offset: usize, n: i64) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_i64(n);
        Ok(())
    }

    pub fn get_bytes(&mut self, offset: usize) -> Result<Vec<u8>> {
        self.buf.set_rpos(offset);
        let len = self.buf.read_i32()? as usize;
        Ok(self.buf.read_bytes(len)?)
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_i32(bytes.len() as i32);
        self.buf.write_bytes(bytes);
        Ok(())
    }

    pub fn get_string(&mut self, offset: usize) -> Result<String> {
        self.buf.set_rpos(offset);
        Ok(self.buf.read_string()?)
    }

    pub fn set_string(&mut self, offset: usize, s: &str) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_string(s);
        Ok(())
    }

    pub fn get_bool(&mut self, offset: usize) -> Result<bool> {
        self.buf.set_rpos(offset);
        Ok(self.buf.read_u8().map(|n| n != 0)?)
    }

    pub fn set_bool(&mut self, offset: usize, b: bool) -> Result<()> {
        let n = if b { 1 } else { 0 };

        self.buf.set_wpos(offset);
        self.buf.write_u8(n);

        Ok(())
    }

    /// Maximum byte length needed to store a string of `strlen`
    /// characters under the active charset: a 4-byte length prefix
    /// plus `strlen` worst-case-width characters.
    pub fn max_length(strlen: usize) -> usize {
        mem::size_of::<i32>() + (strlen * mem::size_of::<char>())
    }

    /// Package-private: gives `FileMgr` the whole buffer, rewound to
    /// the start, for a full-block read or write.
    pub(crate) fn contents(&mut self) -> &mut ByteBuffer {
        self.buf.set_rpos(0);
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        let mut p = Page::new(64);
        p.set_int(4, -42).unwrap();
        assert_eq!(p.get_int(4).unwrap(), -42);
    }

    #[test]
    fn string_roundtrip_and_max_length() {
        let mut p = Page::new(64);
        p.set_string(0, "hello").unwrap();
        assert_eq!(p.get_string(0).unwrap(), "hello");
        assert!(Page::max_length("hello".len()) >= 5 + 4);
    }

    #[test]
    fn bytes_roundtrip() {
        let mut p = Page::new(64);
        p.set_bytes(8, &[1, 2, 3, 4]).unwrap();
        assert_eq!(p.get_bytes(8).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn bool_roundtrip() {
        let mut p = Page::new(16);
        p.set_bool(0, true).unwrap();
        p.set_bool(1, false).unwrap();
        assert!(p.get_bool(0).unwrap());
        assert!(!p.get_bool(1).unwrap());
    }

    #[test]
    fn i64_roundtrip() {
        let mut p = Page::new(16);
        p.set_i64(0, 1_700_000_000_123).unwrap();
        assert_eq!(p.get_i64(0).unwrap(), 1_700_000_000_123);
    }
}
