//! Integration tests for the header-and-script fast path.

mod common;

use std::fs;
use std::io::{self, Read};

use common::{gzip, script, DemoBuilder};
use sdfz_parser::decompress::{read_header_and_script, STREAM_CHUNK_SIZE};
use sdfz_parser::{DemoParser, DemoParserConfig, DemoSection, ParserError};

/// Counts how many bytes were pulled from the inner reader.
struct CountingReader<R> {
    inner: R,
    consumed: usize,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n;
        Ok(n)
    }
}

/// Fails every read after the first `budget` bytes.
struct FailingReader<'a> {
    data: &'a [u8],
    budget: usize,
}

impl Read for FailingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
        }
        let n = buf.len().min(self.budget).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        self.budget -= n;
        Ok(n)
    }
}

fn big_demo() -> DemoBuilder {
    let mut builder = DemoBuilder::new(script(16, &["Caster"]));
    for i in 0..20_000u32 {
        let message = format!("message number {i} with some padding to grow the stream");
        builder = builder.chat(i as f32, (i % 16) as u8, 254, &message);
    }
    builder
}

fn skip_packets_parser() -> DemoParser {
    DemoParser::new(DemoParserConfig {
        skip_packets: true,
        ..DemoParserConfig::default()
    })
}

#[test]
fn test_fast_path_matches_skip_packets() {
    let data = big_demo().build();
    let parser = skip_packets_parser();

    let full = parser.parse_demo(&data).unwrap();
    let fast = parser.read_setup(data.as_slice()).unwrap();

    assert_eq!(fast.header, full.header);
    assert_eq!(fast.script_text, full.script_text);
    assert_eq!(fast.info, full.info);
    assert_eq!(fast, full);
    assert!(fast.chatlog.is_none());
    assert!(fast.statistics.is_none());
}

#[test]
fn test_fast_path_stops_after_script() {
    let raw = big_demo().raw();
    let mut reader = CountingReader {
        inner: raw.as_slice(),
        consumed: 0,
    };

    let setup = read_header_and_script(&mut reader).unwrap();
    let setup_len = setup.header.setup_len();

    assert_eq!(setup.script.len(), setup.header.script_size as usize);
    assert!(setup.bytes_read >= setup_len);
    assert!(reader.consumed < raw.len() / 4, "read {} of {}", reader.consumed, raw.len());
    assert!(reader.consumed <= setup_len + 2 * STREAM_CHUNK_SIZE);
}

#[test]
fn test_fast_path_on_compressed_stream_reads_prefix() {
    let data = big_demo().build();
    let mut reader = CountingReader {
        inner: data.as_slice(),
        consumed: 0,
    };

    let setup = read_header_and_script(&mut reader).unwrap();
    assert_eq!(setup.script.len(), setup.header.script_size as usize);
    assert!(reader.consumed < data.len(), "read {} of {}", reader.consumed, data.len());
}

#[test]
fn test_fast_path_from_file() {
    let data = DemoBuilder::new(script(4, &["Observer", "[Fx]Jazcash"])).build();
    let path = std::env::temp_dir().join(format!("sdfz-setup-{}.sdfz", std::process::id()));
    fs::write(&path, &data).unwrap();

    let fast = skip_packets_parser().read_setup_file(&path);
    let full = skip_packets_parser().parse_demo_file(&path);
    fs::remove_file(&path).unwrap();

    let fast = fast.unwrap();
    assert_eq!(fast.info.spectators[1].name, "[Fx]Jazcash");
    assert_eq!(fast, full.unwrap());
}

#[test]
fn test_stream_ending_inside_script() {
    let raw = DemoBuilder::new(script(4, &[])).raw();
    let cut = gzip(&raw[..400]);

    let result = DemoParser::default().read_setup(cut.as_slice());
    match result {
        Err(ParserError::UnexpectedEndOfStream { needed, received }) => {
            assert_eq!(received, 400);
            assert!(needed > received);
        }
        other => panic!("expected UnexpectedEndOfStream, got {other:?}"),
    }
}

#[test]
fn test_stream_ending_inside_header() {
    let raw = DemoBuilder::new(script(4, &[])).raw();
    let result = DemoParser::default().read_setup(&raw[..100]);
    assert!(matches!(
        result,
        Err(ParserError::UnexpectedEndOfStream {
            needed: 352,
            received: 100
        })
    ));
}

#[test]
fn test_source_error_is_propagated() {
    let raw = DemoBuilder::new(script(4, &[])).raw();
    let reader = FailingReader {
        data: &raw,
        budget: 200,
    };

    let result = DemoParser::default().read_setup(reader);
    assert!(matches!(result, Err(ParserError::IoError(_))));
}

#[test]
fn test_corrupt_compressed_setup() {
    let mut data = DemoBuilder::new(script(4, &[])).build();
    // First deflate block after the 10-byte gzip header: final, reserved type.
    data[10] = 0xFF;

    let result = DemoParser::default().read_setup(data.as_slice());
    assert!(matches!(result, Err(ParserError::DecompressionError { .. })));
}

#[test]
fn test_bad_magic_reported_as_header_error() {
    let mut raw = DemoBuilder::new(script(2, &[])).raw();
    raw[..6].copy_from_slice(b"xxxxxx");

    let err = DemoParser::default().read_setup(gzip(&raw).as_slice()).unwrap_err();
    assert_eq!(err.section(), Some(DemoSection::Header));
}

#[test]
fn test_broken_script_reported_as_script_error() {
    let data = DemoBuilder::new("[game]{[player0]{name=Ghost;team=9;}}").build();
    let err = DemoParser::default().read_setup(data.as_slice()).unwrap_err();
    assert_eq!(err.section(), Some(DemoSection::Script));
}
