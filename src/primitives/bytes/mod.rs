#![forbid(unsafe_code)]
//! Varint and cursor utilities shared by the page codec.

pub mod var {
    //! Unsigned LEB128-style varints.

    use crate::types::{IndexError, Result};

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Number of bytes [`encode_u64`] emits for `v`.
    pub fn encoded_len(v: u64) -> usize {
        let bits = 64 - v.leading_zeros() as usize;
        bits.max(1).div_ceil(7)
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let byte = *src
                .get(*off)
                .ok_or(IndexError::Corruption("varint truncated"))?;
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if i == 9 && payload > 1 {
                return Err(IndexError::Corruption("varint overflows 64 bits"));
            }
            result |= payload << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(IndexError::Corruption("varint longer than 10 bytes"))
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing page payloads.

    use core::fmt;

    use super::var;
    use crate::types::{IndexError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or(IndexError::Corruption("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(IndexError::Corruption("length prefix beyond payload"));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads an unsigned varint.
        pub fn varint(&mut self) -> Result<u64> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Reads a varint that must fit in a `usize` bounded by the bytes left.
        ///
        /// Every counted item occupies at least one byte, so a count larger
        /// than the remaining payload is corrupt.
        pub fn count(&mut self) -> Result<usize> {
            let raw = self.varint()?;
            let n = usize::try_from(raw).map_err(|_| IndexError::Corruption("count overflow"))?;
            if n > self.remaining() {
                return Err(IndexError::Corruption("count exceeds payload"));
            }
            Ok(n)
        }

        /// Reads a varint length prefix followed by that many bytes.
        pub fn len_prefixed(&mut self) -> Result<&'a [u8]> {
            let raw = self.varint()?;
            let len = usize::try_from(raw).map_err(|_| IndexError::Corruption("length overflow"))?;
            self.take(len)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Returns true when every byte has been consumed.
        pub fn is_exhausted(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
