//! Container format detection for demo files.
//!
//! Demo files come in two shapes:
//!
//! - **Compressed** (`.sdfz`): a gzip stream, identified by `1F 8B`
//! - **Uncompressed** (`.sdf`): the raw demo, starting with `spring demofile`
//!
//! # Example
//!
//! ```
//! use sdfz_parser::format::{detect_format, DemoFormat};
//!
//! assert!(matches!(detect_format(b"\x1f\x8b\x08\x00"), Ok(DemoFormat::Compressed)));
//! assert!(matches!(detect_format(b"spring demofile\0"), Ok(DemoFormat::Uncompressed)));
//! ```

use crate::error::{ParserError, Result};

/// The gzip magic bytes.
pub const GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";

/// The magic string at the start of every decompressed demo.
pub const DEMO_MAGIC: &[u8; 15] = b"spring demofile";

/// The on-disk representation of a demo file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoFormat {
    /// Gzip-compressed demo (`.sdfz`).
    Compressed,
    /// Raw, already decompressed demo (`.sdf`).
    Uncompressed,
}

impl DemoFormat {
    /// Returns the conventional file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            DemoFormat::Compressed => "sdfz",
            DemoFormat::Uncompressed => "sdf",
        }
    }
}

/// Detects the demo container format from its leading bytes.
///
/// # Errors
///
/// - `ParserError::UnexpectedEof` if fewer than 2 bytes are available
/// - `ParserError::InvalidMagic` if neither magic matches
pub fn detect_format(data: &[u8]) -> Result<DemoFormat> {
    if data.len() < GZIP_MAGIC.len() {
        return Err(ParserError::unexpected_eof(GZIP_MAGIC.len(), data.len()));
    }

    if data.starts_with(GZIP_MAGIC) {
        return Ok(DemoFormat::Compressed);
    }

    if data.starts_with(DEMO_MAGIC) {
        return Ok(DemoFormat::Uncompressed);
    }

    let found_len = data.len().min(DEMO_MAGIC.len());
    Err(ParserError::invalid_magic(GZIP_MAGIC, &data[..found_len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_compressed() {
        assert_eq!(
            detect_format(&[0x1f, 0x8b, 0x08]).unwrap(),
            DemoFormat::Compressed
        );
    }

    #[test]
    fn test_detect_uncompressed() {
        let mut data = DEMO_MAGIC.to_vec();
        data.push(0);
        assert_eq!(detect_format(&data).unwrap(), DemoFormat::Uncompressed);
    }

    #[test]
    fn test_detect_unknown() {
        let result = detect_format(b"PK\x03\x04");
        assert!(matches!(result, Err(ParserError::InvalidMagic { .. })));
    }

    #[test]
    fn test_detect_too_short() {
        let result = detect_format(&[0x1f]);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEof {
                expected: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn test_extension() {
        assert_eq!(DemoFormat::Compressed.extension(), "sdfz");
        assert_eq!(DemoFormat::Uncompressed.extension(), "sdf");
    }
}
