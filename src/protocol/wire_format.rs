//! Wire format primitives.
//!
//! Implements the frame layout:
//! ```text
//! ┌───────────┬─────────────┬─────────────┬───────────┬──────────────────────────────────┐
//! │ Object ID │ Behaviour ID│ Method name │ Param cnt │ Slots (repeated)                  │
//! │ u64 LE    │ u16 LE      │ u32 LE len  │ i32 LE    │ bool is_null [i32 LE len, bytes] │
//! │           │             │ + UTF-8     │           │                                  │
//! └───────────┴─────────────┴─────────────┴───────────┴──────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are Little Endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{RpcError, Result};

/// Default channel name prefix. Channels are named `"<prefix>.<TypeName>"`.
pub const CHANNEL_PREFIX: &str = "Net";

/// Default size of the fixed scratch buffer used by self-describing parameters.
pub const DEFAULT_SCRATCH_BUFFER_SIZE: usize = 1024;

/// Default bytes reserved per parameter when sizing an outbound frame.
pub const DEFAULT_FRAME_BYTES_PER_PARAMETER: usize = 128;

/// Size of the fixed frame prefix before the method name (object id + behaviour id).
pub const TARGET_PREFIX_SIZE: usize = 10;

/// Upper bound on the capacity a writer reserves up front. Writers still grow
/// past it on demand.
pub const MAX_PREALLOCATED_BYTES: usize = 64 * 1024;

/// Growable (or fixed-capacity) little-endian writer.
///
/// A writer created with [`BufferWriter::with_limit`] refuses to grow past its
/// limit and reports [`RpcError::BufferOverflow`] instead.
#[derive(Debug, Default)]
pub struct BufferWriter {
    buf: BytesMut,
    limit: Option<usize>,
}

impl BufferWriter {
    /// Create an empty growable writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a growable writer with an initial capacity hint, capped at
    /// [`MAX_PREALLOCATED_BYTES`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.min(MAX_PREALLOCATED_BYTES)),
            limit: None,
        }
    }

    /// Create a fixed-size writer that fails once `limit` bytes are written.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(MAX_PREALLOCATED_BYTES)),
            limit: Some(limit),
        }
    }

    #[inline]
    fn reserve(&mut self, additional: usize) -> Result<()> {
        if let Some(capacity) = self.limit {
            let needed = self.buf.len().saturating_add(additional);
            if needed > capacity {
                return Err(RpcError::BufferOverflow { needed, capacity });
            }
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.put_u16_le(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_i32_le(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.reserve(8)?;
        self.buf.put_i64_le(value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.reserve(8)?;
        self.buf.put_u64_le(value);
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_f32_le(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.reserve(8)?;
        self.buf.put_f64_le(value);
        Ok(())
    }

    /// Write a string as `u32` byte length followed by UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| RpcError::Protocol(format!("String of {} bytes is too long", value.len())))?;
        self.reserve(4 + value.len())?;
        self.buf.put_u32_le(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write raw bytes without a length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.reserve(value.len())?;
        self.buf.put_slice(value);
        Ok(())
    }

    /// Write `(length: i32, bytes)`.
    pub fn write_len_prefixed(&mut self, value: &[u8]) -> Result<()> {
        let len = i32::try_from(value.len())
            .map_err(|_| RpcError::Protocol(format!("Payload of {} bytes is too long", value.len())))?;
        self.reserve(4 + value.len())?;
        self.buf.put_i32_le(len);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fixed capacity, if any.
    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Freeze into immutable `Bytes` (zero-copy).
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Little-endian reader over a borrowed byte slice.
///
/// Keeps an explicit cursor so callers can read a prefix, inspect it, and
/// resume from the same position.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(RpcError::Truncated {
                needed: pos - self.buf.len(),
                offset: self.buf.len(),
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Bytes left after the cursor.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(RpcError::Truncated {
                needed: n,
                offset: self.pos,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Read a `u32`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| RpcError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read `(length: i32, bytes)`.
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(RpcError::Protocol(format!("Negative payload length {}", len)));
        }
        self.take(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut w = BufferWriter::new();
        w.write_u64(0x0102030405060708).unwrap();
        w.write_u16(0x0A0B).unwrap();
        w.write_i32(-2).unwrap();

        let bytes = w.as_slice();
        assert_eq!(&bytes[..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..10], &[0x0B, 0x0A]);
        assert_eq!(&bytes[10..14], &[0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_read_back_all_primitives() {
        let mut w = BufferWriter::new();
        w.write_u8(7).unwrap();
        w.write_bool(true).unwrap();
        w.write_u16(65000).unwrap();
        w.write_i32(-123456).unwrap();
        w.write_u32(4_000_000_000).unwrap();
        w.write_i64(-9_000_000_000).unwrap();
        w.write_u64(u64::MAX).unwrap();
        w.write_f32(1.5).unwrap();
        w.write_f64(-2.25).unwrap();
        w.write_str("PingServerRpc").unwrap();

        let frozen = w.freeze();
        let mut r = BufferReader::new(&frozen);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u16().unwrap(), 65000);
        assert_eq!(r.read_i32().unwrap(), -123456);
        assert_eq!(r.read_u32().unwrap(), 4_000_000_000);
        assert_eq!(r.read_i64().unwrap(), -9_000_000_000);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -2.25);
        assert_eq!(r.read_string().unwrap(), "PingServerRpc");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_string_layout() {
        let mut w = BufferWriter::new();
        w.write_str("ab").unwrap();
        assert_eq!(w.as_slice(), &[2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_limit_rejects_overflow() {
        let mut w = BufferWriter::with_limit(4);
        w.write_u32(1).unwrap();
        let err = w.write_u8(1).unwrap_err();
        assert!(matches!(
            err,
            RpcError::BufferOverflow {
                needed: 5,
                capacity: 4
            }
        ));
        // Nothing was written by the failed call
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_large_limit_is_not_preallocated() {
        let mut w = BufferWriter::with_limit(usize::MAX);
        w.write_u64(u64::MAX).unwrap();
        assert_eq!(w.limit(), Some(usize::MAX));
        assert_eq!(w.len(), 8);

        let mut w = BufferWriter::with_capacity(usize::MAX);
        w.write_str("grows").unwrap();
        assert_eq!(w.len(), 9);
    }

    #[test]
    fn test_truncated_read() {
        let mut r = BufferReader::new(&[1, 2, 3]);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            RpcError::Truncated {
                needed: 4,
                offset: 0,
                available: 3
            }
        ));
        // Cursor unchanged after failure
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_seek_back_and_reread() {
        let mut w = BufferWriter::new();
        w.write_str("first").unwrap();
        w.write_u8(9).unwrap();
        let bytes = w.into_vec();

        let mut r = BufferReader::new(&bytes);
        let mark = r.position();
        assert_eq!(r.read_string().unwrap(), "first");
        r.seek(mark).unwrap();
        assert_eq!(r.read_string().unwrap(), "first");
        assert_eq!(r.read_u8().unwrap(), 9);
        assert!(r.seek(bytes.len() + 1).is_err());
    }

    #[test]
    fn test_len_prefixed() {
        let mut w = BufferWriter::new();
        w.write_len_prefixed(b"xyz").unwrap();
        assert_eq!(w.as_slice(), &[3, 0, 0, 0, b'x', b'y', b'z']);

        let bytes = w.into_vec();
        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_len_prefixed().unwrap(), b"xyz");
    }

    #[test]
    fn test_negative_length_rejected() {
        let bytes = (-1i32).to_le_bytes();
        let mut r = BufferReader::new(&bytes);
        assert!(matches!(
            r.read_len_prefixed().unwrap_err(),
            RpcError::Protocol(_)
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes = [2, 0, 0, 0, 0xFF, 0xFE];
        let mut r = BufferReader::new(&bytes);
        assert!(r.read_string().is_err());
    }

    #[test]
    fn test_nonzero_bool_is_true() {
        let mut r = BufferReader::new(&[0, 2]);
        assert!(!r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
    }
}
