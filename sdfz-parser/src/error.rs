//! Error types for the demo parser.
//!
//! This module defines the error hierarchy for every failure that can
//! surface from a decode: truncated sections, bad magic, corrupt compressed
//! blocks, malformed setup scripts and I/O problems on the streaming path.
//!
//! Recoverable conditions (unknown packet types, unmatched or broken Lua
//! messages) never produce a `ParserError` that reaches the caller; they
//! degrade to a raw representation inside their decoder.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The section of a demo file being decoded when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DemoSection {
    /// The fixed-size file header.
    Header,
    /// The setup script block.
    Script,
    /// The packet stream.
    Packets,
    /// The trailing per-player / per-team statistics.
    Statistics,
}

impl fmt::Display for DemoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DemoSection::Header => "header",
            DemoSection::Script => "script",
            DemoSection::Packets => "packet stream",
            DemoSection::Statistics => "statistics",
        };
        f.write_str(name)
    }
}

/// The main error type for demo parsing operations.
///
/// # Example
///
/// ```
/// use sdfz_parser::error::{ParserError, Result};
///
/// fn example_operation() -> Result<()> {
///     Err(ParserError::InvalidHeader {
///         reason: "header size too small".to_string(),
///     })
/// }
/// ```
#[derive(Error, Debug)]
pub enum ParserError {
    /// An I/O error occurred while reading the demo file or stream.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The input does not start with a known container magic.
    ///
    /// Demo files are either gzip streams (`1F 8B`) or raw demo files
    /// starting with `spring demofile`.
    #[error("Invalid magic bytes: expected {expected}, found {found}")]
    InvalidMagic {
        /// The expected magic bytes (as hex string for display).
        expected: String,
        /// The actual bytes found (as hex string).
        found: String,
    },

    /// The demo header is malformed or contains inconsistent sizes.
    #[error("Invalid header: {reason}")]
    InvalidHeader {
        /// A description of what makes the header invalid.
        reason: String,
    },

    /// The setup script references entities that do not exist.
    #[error("Invalid script: {reason}")]
    InvalidScript {
        /// A description of the broken reference.
        reason: String,
    },

    /// Inflating a gzip or zlib block failed.
    #[error("Decompression failed: {reason}")]
    DecompressionError {
        /// A description of the decompression failure.
        reason: String,
    },

    /// A read needed more bytes than remain in the current section.
    #[error("Unexpected end of data: expected {expected} bytes, but only {available} available")]
    UnexpectedEof {
        /// The number of bytes that were expected to be available.
        expected: usize,
        /// The actual number of bytes available.
        available: usize,
    },

    /// The compressed stream ended before the header and script were complete.
    #[error("Stream ended after {received} bytes, {needed} bytes are required for header and script")]
    UnexpectedEndOfStream {
        /// Bytes required to decode the header and script.
        needed: usize,
        /// Decompressed bytes actually received.
        received: usize,
    },

    /// A configuration file could not be parsed.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A Lua message handler accepted a payload but could not decode it.
    #[error("Lua handler {handler} failed: {reason}")]
    LuaDecode {
        /// Name of the failing handler.
        handler: String,
        /// Why decoding failed.
        reason: String,
    },

    /// A fatal error inside one section of the demo.
    #[error("Failed to decode {section}: {source}")]
    Section {
        /// The section being decoded.
        section: DemoSection,
        /// The underlying error.
        #[source]
        source: Box<ParserError>,
    },
}

impl ParserError {
    /// Creates an `InvalidMagic` error with the given byte slices.
    ///
    /// The bytes are converted to hex strings for human-readable display.
    ///
    /// ```
    /// use sdfz_parser::error::ParserError;
    ///
    /// let err = ParserError::invalid_magic(b"\x1f\x8b", b"\x00\x00");
    /// assert!(err.to_string().contains("Invalid magic bytes"));
    /// ```
    #[must_use]
    pub fn invalid_magic(expected: &[u8], found: &[u8]) -> Self {
        ParserError::InvalidMagic {
            expected: bytes_to_hex(expected),
            found: bytes_to_hex(found),
        }
    }

    /// Creates an `UnexpectedEof` error with the given sizes.
    #[must_use]
    pub fn unexpected_eof(expected: usize, available: usize) -> Self {
        ParserError::UnexpectedEof { expected, available }
    }

    /// Wraps this error with the section in which it occurred.
    ///
    /// Errors that already carry a section are returned unchanged.
    #[must_use]
    pub fn in_section(self, section: DemoSection) -> Self {
        match self {
            ParserError::Section { .. } => self,
            other => ParserError::Section {
                section,
                source: Box::new(other),
            },
        }
    }

    /// Returns the section this error was raised in, if known.
    #[must_use]
    pub fn section(&self) -> Option<DemoSection> {
        match self {
            ParserError::Section { section, .. } => Some(*section),
            _ => None,
        }
    }
}

/// Converts a byte slice to a hexadecimal string representation.
///
/// If the slice is 8 bytes or less, formats as space-separated hex values.
/// If longer, shows the first 8 bytes followed by "...".
fn bytes_to_hex(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        let prefix: String = bytes[..8]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{prefix}... ({} bytes total)", bytes.len())
    }
}

/// A specialized Result type for demo parsing operations.
pub type Result<T> = std::result::Result<T, ParserError>;
