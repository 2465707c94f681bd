//! Binary reading utilities for demo files.
//!
//! [`ByteReader`] is a forward-only cursor over an immutable byte slice.
//! Every read advances the cursor by exactly the bytes consumed and fails
//! with [`ParserError::UnexpectedEof`] when fewer bytes remain than
//! requested; nothing is ever zero-filled.
//!
//! # Endianness
//!
//! The demo container is little-endian throughout. Big-endian reads are
//! available for legacy host-order fields via [`ByteOrder::Big`].
//!
//! # Example
//!
//! ```
//! use sdfz_parser::binary::ByteReader;
//!
//! let data = [0x26, 0x89, 0x01, 0x00, b'H', b'i', 0x00];
//! let mut reader = ByteReader::new(&data);
//!
//! assert_eq!(reader.read_u32().unwrap(), 0x0001_8926);
//! assert_eq!(reader.read_string(3, true).unwrap(), "Hi");
//! assert_eq!(reader.remaining(), 0);
//! ```

use crate::error::{ParserError, Result};

/// Byte order used for multi-byte integer and float reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first (the container default).
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// A forward-only cursor over a byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
    order: ByteOrder,
}

impl<'a> ByteReader<'a> {
    /// Creates a little-endian reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_order(data, ByteOrder::Little)
    }

    /// Creates a reader with an explicit byte order.
    #[must_use]
    pub fn with_order(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            offset: 0,
            order,
        }
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns the current read offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Returns whether every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the byte order used by this reader.
    #[must_use]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Reads exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ParserError::unexpected_eof(
                self.offset.saturating_add(len),
                self.data.len(),
            ));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Reads at most `len` bytes, stopping early at the end of the buffer.
    ///
    /// Used for string fields whose size prefix counts the whole message
    /// rather than the string itself.
    pub fn read_bytes_up_to(&mut self, len: usize) -> &'a [u8] {
        let len = len.min(self.remaining());
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        slice
    }

    /// Reads every remaining byte.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.offset..];
        self.offset = self.data.len();
        slice
    }

    /// Advances the cursor by `len` bytes without inspecting them.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than `len` bytes remain.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_bytes(N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        if self.order == ByteOrder::Big {
            buf.reverse();
        }
        Ok(buf)
    }

    /// Reads an unsigned integer of `width` bytes (1 to 4).
    ///
    /// # Errors
    ///
    /// Returns `ParserError::InvalidHeader` for an unsupported width and
    /// `ParserError::UnexpectedEof` if the buffer is too short.
    pub fn read_uint(&mut self, width: usize) -> Result<u32> {
        if !(1..=4).contains(&width) {
            return Err(ParserError::InvalidHeader {
                reason: format!("Unsupported integer width {width}"),
            });
        }
        let bytes = self.read_bytes(width)?;
        let value = match self.order {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
            ByteOrder::Big => bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
        };
        Ok(value)
    }

    /// Reads a two's-complement signed integer of `width` bytes (1 to 4).
    ///
    /// # Errors
    ///
    /// Same as [`ByteReader::read_uint`].
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_int(&mut self, width: usize) -> Result<i32> {
        let raw = self.read_uint(width)?;
        let shift = 32 - (width as u32) * 8;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Reads `count` unsigned integers of `width` bytes each.
    ///
    /// # Errors
    ///
    /// Same as [`ByteReader::read_uint`].
    pub fn read_uints(&mut self, count: usize, width: usize) -> Result<Vec<u32>> {
        (0..count).map(|_| self.read_uint(width)).collect()
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` at the end of the buffer.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a signed byte.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` at the end of the buffer.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.read_array::<1>()?))
    }

    /// Reads a 16-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    /// Reads a 16-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 2 bytes remain.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array::<2>()?))
    }

    /// Reads a 32-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Reads a 32-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 4 bytes remain.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Reads a 64-bit signed integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 8 bytes remain.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Reads a 64-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Reads a 32-bit IEEE-754 float.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than 4 bytes remain.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Reads `count` consecutive floats.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if the buffer runs out.
    pub fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        if count.saturating_mul(4) > self.remaining() {
            return Err(ParserError::unexpected_eof(
                self.offset.saturating_add(count.saturating_mul(4)),
                self.data.len(),
            ));
        }
        (0..count).map(|_| self.read_f32()).collect()
    }

    /// Reads a one-byte boolean (any non-zero value is `true`).
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` at the end of the buffer.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a fixed-length string of `len` bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; demo strings are
    /// written by the engine without any encoding guarantee. When
    /// `trim_nulls` is set every NUL byte is removed from the result.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than `len` bytes remain.
    pub fn read_string(&mut self, len: usize, trim_nulls: bool) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        Ok(decode_string(bytes, trim_nulls))
    }

    /// Reads the rest of the buffer as a string, with NULs removed.
    pub fn read_string_rest(&mut self) -> String {
        decode_string(self.read_rest(), true)
    }

    /// Reads a string of at most `len` bytes, with NULs removed.
    pub fn read_string_up_to(&mut self, len: usize) -> String {
        decode_string(self.read_bytes_up_to(len), true)
    }

    /// Reads bytes up to the next NUL, consuming the terminator.
    ///
    /// Without a terminator the rest of the buffer is returned.
    pub fn read_until_null(&mut self) -> &'a [u8] {
        let rest = &self.data[self.offset..];
        match rest.iter().position(|&b| b == 0) {
            Some(pos) => {
                self.offset += pos + 1;
                &rest[..pos]
            }
            None => {
                self.offset = self.data.len();
                rest
            }
        }
    }

    /// Reads a NUL-terminated string, consuming the terminator.
    pub fn read_cstring(&mut self) -> String {
        String::from_utf8_lossy(self.read_until_null()).into_owned()
    }

    /// Reads `len` bytes rendered as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if fewer than `len` bytes remain.
    pub fn read_hex(&mut self, len: usize) -> Result<String> {
        Ok(to_hex(self.read_bytes(len)?))
    }
}

fn decode_string(bytes: &[u8], trim_nulls: bool) -> String {
    let text = String::from_utf8_lossy(bytes);
    if trim_nulls {
        text.replace('\0', "")
    } else {
        text.into_owned()
    }
}

/// Renders bytes as a contiguous lowercase hex string.
///
/// ```
/// assert_eq!(sdfz_parser::binary::to_hex(&[0xde, 0xad, 0x01]), "dead01");
/// ```
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
