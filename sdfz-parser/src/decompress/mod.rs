//! Decompression utilities for demo files.
//!
//! A `.sdfz` file is a single gzip stream wrapping the raw demo. Some
//! packets (GAMEDATA, CLIENTDATA) and Lua messages embed their own
//! compressed blocks, which may be gzip, zlib or raw deflate.
//!
//! # Usage
//!
//! Use [`decompress_demo`] to get the raw demo bytes from either container
//! format:
//!
//! ```no_run
//! use sdfz_parser::decompress::decompress_demo;
//!
//! let data = std::fs::read("replay.sdfz").unwrap();
//! let raw = decompress_demo(&data).unwrap();
//! println!("Decompressed {} bytes", raw.len());
//! ```
//!
//! # Incremental setup read
//!
//! [`read_header_and_script`] decodes only the header and setup script from
//! a stream. It stops pulling from the decoder as soon as enough bytes are
//! available and never inflates the packet stream. The decoder and the
//! source are owned by the call and dropped on every return path.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use tracing::trace;

use crate::error::{DemoSection, ParserError, Result};
use crate::format::{detect_format, DemoFormat, GZIP_MAGIC};
use crate::header::{DemoHeader, DEMO_HEADER_SIZE};

/// Size of each chunk pulled from the decoder on the incremental path.
pub const STREAM_CHUNK_SIZE: usize = 16 * 1024;

/// Inflates a complete gzip stream.
///
/// # Errors
///
/// Returns `ParserError::DecompressionError` if the gzip data is invalid.
pub fn inflate_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut result)
        .map_err(|e| ParserError::DecompressionError {
            reason: format!("gzip stream of {} bytes: {e}", data.len()),
        })?;
    Ok(result)
}

/// Inflates a zlib stream.
///
/// # Errors
///
/// Returns `ParserError::DecompressionError` if the zlib data is invalid.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut result)
        .map_err(|e| ParserError::DecompressionError {
            reason: format!("zlib block of {} bytes: {e}", data.len()),
        })?;
    Ok(result)
}

/// Inflates an embedded block, detecting gzip, zlib or raw deflate.
///
/// Gzip is recognized by its magic, zlib by a valid CMF/FLG header pair.
/// Anything else is treated as a raw deflate stream.
///
/// # Errors
///
/// Returns `ParserError::DecompressionError` if the block cannot be inflated.
pub fn inflate_auto(data: &[u8]) -> Result<Vec<u8>> {
    if data.starts_with(GZIP_MAGIC) {
        return inflate_gzip(data);
    }

    if has_zlib_header(data) {
        return inflate_zlib(data);
    }

    let mut result = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut result)
        .map_err(|e| ParserError::DecompressionError {
            reason: format!("deflate block of {} bytes: {e}", data.len()),
        })?;
    Ok(result)
}

/// Returns true if the first two bytes form a valid zlib header.
fn has_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0F == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}

/// Returns the raw demo bytes for either container format.
///
/// Uncompressed input is borrowed as-is.
///
/// # Errors
///
/// - `ParserError::InvalidMagic` if the input is neither gzip nor a raw demo
/// - `ParserError::DecompressionError` if the gzip stream is corrupt
pub fn decompress_demo(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    match detect_format(data)? {
        DemoFormat::Compressed => inflate_gzip(data).map(Cow::Owned),
        DemoFormat::Uncompressed => Ok(Cow::Borrowed(data)),
    }
}

/// The header and raw setup script read by the incremental path.
#[derive(Debug, Clone)]
pub struct SetupBlock {
    /// The decoded demo header.
    pub header: DemoHeader,
    /// The raw script block, exactly `header.script_size` bytes.
    pub script: Vec<u8>,
    /// How many decompressed bytes were pulled before stopping.
    pub bytes_read: usize,
}

/// Reads only the header and setup script from a demo stream.
///
/// The stream may be gzip-compressed or raw. Decompressed bytes are
/// accumulated in bounded chunks until the fixed header is available, then
/// until `header_size + script_size` bytes are available. The remainder of
/// the stream is never read.
///
/// # Errors
///
/// - `ParserError::UnexpectedEndOfStream` if the stream ends early
/// - `ParserError::DecompressionError` if the gzip data is corrupt
/// - `ParserError::IoError` if the underlying reader fails
/// - `ParserError::Section` wrapping a header decode error
pub fn read_header_and_script<R: Read>(reader: R) -> Result<SetupBlock> {
    let mut source = BufReader::new(reader);
    let is_gzip = source.fill_buf()?.starts_with(GZIP_MAGIC);

    if is_gzip {
        let mut decoder = GzDecoder::new(source);
        accumulate_setup(&mut decoder)
    } else {
        accumulate_setup(&mut source)
    }
}

/// Opens a demo file and reads only its header and setup script.
///
/// # Errors
///
/// See [`read_header_and_script`]; additionally `ParserError::IoError` if
/// the file cannot be opened.
pub fn read_header_and_script_file<P: AsRef<Path>>(path: P) -> Result<SetupBlock> {
    let file = File::open(path)?;
    read_header_and_script(file)
}

fn accumulate_setup<S: Read>(source: &mut S) -> Result<SetupBlock> {
    let mut buffer = Vec::with_capacity(STREAM_CHUNK_SIZE);

    fill_until(source, &mut buffer, DEMO_HEADER_SIZE)?;
    let header =
        DemoHeader::parse(&buffer).map_err(|e| e.in_section(DemoSection::Header))?;

    let needed = header.setup_len();
    fill_until(source, &mut buffer, needed)?;
    trace!(needed, received = buffer.len(), "setup block available");

    let script = buffer[header.script_offset()..needed].to_vec();
    Ok(SetupBlock {
        header,
        script,
        bytes_read: buffer.len(),
    })
}

/// Pulls chunks from `source` until `buffer` holds at least `needed` bytes.
fn fill_until<S: Read>(source: &mut S, buffer: &mut Vec<u8>, needed: usize) -> Result<()> {
    let mut chunk = [0u8; STREAM_CHUNK_SIZE];

    while buffer.len() < needed {
        let read = match source.read(&mut chunk) {
            Ok(0) => {
                return Err(ParserError::UnexpectedEndOfStream {
                    needed,
                    received: buffer.len(),
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(stream_error(e)),
        };
        buffer.extend_from_slice(&chunk[..read]);
    }

    Ok(())
}

/// Separates corrupt compressed data from failures of the underlying source.
fn stream_error(error: io::Error) -> ParserError {
    match error.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            ParserError::DecompressionError {
                reason: error.to_string(),
            }
        }
        _ => ParserError::IoError(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn raw_demo(script: &[u8], stream_len: usize) -> Vec<u8> {
        let mut data = vec![0u8; DEMO_HEADER_SIZE];
        data[..15].copy_from_slice(crate::format::DEMO_MAGIC);
        data[0x014..0x018].copy_from_slice(&352u32.to_le_bytes());
        data[0x130..0x134].copy_from_slice(&(script.len() as u32).to_le_bytes());
        data[0x134..0x138].copy_from_slice(&(stream_len as u32).to_le_bytes());
        data.extend_from_slice(script);
        data.extend(std::iter::repeat(0xEE).take(stream_len));
        data
    }

    /// A reader that serves at most `limit` bytes and fails on any read
    /// after that.
    struct Tripwire<'a> {
        data: &'a [u8],
        limit: usize,
        pos: usize,
    }

    impl Read for Tripwire<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "read past limit"));
            }
            let end = (self.pos + buf.len()).min(self.limit).min(self.data.len());
            let n = end - self.pos;
            buf[..n].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(n)
        }
    }

    #[test]
    fn test_inflate_gzip() {
        let compressed = gzip(b"hello demo");
        assert_eq!(inflate_gzip(&compressed).unwrap(), b"hello demo");
    }

    #[test]
    fn test_inflate_gzip_invalid() {
        let result = inflate_gzip(&[0x1f, 0x8b, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ParserError::DecompressionError { .. })));
    }

    #[test]
    fn test_inflate_auto_detects_zlib_and_gzip() {
        assert_eq!(inflate_auto(&zlib(b"[game]{}")).unwrap(), b"[game]{}");
        assert_eq!(inflate_auto(&gzip(b"[game]{}")).unwrap(), b"[game]{}");
    }

    #[test]
    fn test_inflate_auto_raw_deflate() {
        use flate2::write::DeflateEncoder;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw deflate").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(inflate_auto(&compressed).unwrap(), b"raw deflate");
    }

    #[test]
    fn test_decompress_demo_borrows_raw() {
        let raw = raw_demo(b"[game]{}", 0);
        let result = decompress_demo(&raw).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result.len(), raw.len());
    }

    #[test]
    fn test_read_header_and_script() {
        let raw = raw_demo(b"[game]{mapname=Test;}", 100);
        let setup = read_header_and_script(&gzip(&raw)[..]).unwrap();
        assert_eq!(setup.header.script_size, 21);
        assert_eq!(setup.script, b"[game]{mapname=Test;}");
    }

    #[test]
    fn test_read_header_and_script_uncompressed() {
        let raw = raw_demo(b"[game]{}", 10);
        let setup = read_header_and_script(&raw[..]).unwrap();
        assert_eq!(setup.script, b"[game]{}");
    }

    #[test]
    fn test_read_header_and_script_stops_early() {
        let script = b"[game]{}";
        let raw = raw_demo(script, STREAM_CHUNK_SIZE * 8);
        let limit = DEMO_HEADER_SIZE + script.len();
        let reader = Tripwire {
            data: &raw,
            limit,
            pos: 0,
        };
        let setup = read_header_and_script(reader).unwrap();
        assert_eq!(setup.script, script);
        assert_eq!(setup.bytes_read, limit);
    }

    #[test]
    fn test_tripwire_rejects_reads_past_limit() {
        let raw = raw_demo(b"[game]{}", 64);
        let limit = DEMO_HEADER_SIZE + 4;
        let reader = Tripwire {
            data: &raw,
            limit,
            pos: 0,
        };
        // The script needs four more bytes than the reader will serve.
        let result = read_header_and_script(reader);
        assert!(matches!(result, Err(ParserError::IoError(_))));
    }

    #[test]
    fn test_read_header_and_script_truncated() {
        let raw = raw_demo(b"[game]{mapname=Test;}", 0);
        let truncated = gzip(&raw[..DEMO_HEADER_SIZE + 5]);
        let result = read_header_and_script(&truncated[..]);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEndOfStream {
                needed: 373,
                received: 357
            })
        ));
    }

    #[test]
    fn test_read_header_and_script_short_header() {
        let truncated = gzip(&raw_demo(b"", 0)[..100]);
        let result = read_header_and_script(&truncated[..]);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEndOfStream {
                needed: DEMO_HEADER_SIZE,
                received: 100
            })
        ));
    }
}
