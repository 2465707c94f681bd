//! Framing of the packet stream.
//!
//! The packet stream is a sequence of records:
//!
//! | Size | Field | Description |
//! |------|-------|-------------|
//! | 4 | `game_time` | f32 seconds since game start |
//! | 4 | `length` | u32 body length |
//! | n | `body` | tag byte followed by the packet fields |

use crate::binary::ByteReader;
use crate::error::Result;

/// One framed record of the packet stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord<'a> {
    /// In-match time in seconds.
    pub game_time: f32,

    /// Packet body, starting with the type tag.
    pub body: &'a [u8],
}

/// Iterator over the framed records of a packet stream.
///
/// Records are yielded in stream order. A truncated record ends the
/// iteration with an error.
#[derive(Debug, Clone)]
pub struct PacketRecordIterator<'a> {
    reader: ByteReader<'a>,
    record_count: usize,
    finished: bool,
}

impl<'a> PacketRecordIterator<'a> {
    /// Creates an iterator over a packet stream section.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
            record_count: 0,
            finished: false,
        }
    }

    /// Returns the number of records yielded so far.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Returns the current offset in the stream.
    #[must_use]
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    fn parse_record(&mut self) -> Result<PacketRecord<'a>> {
        let game_time = self.reader.read_f32()?;
        let length = self.reader.read_u32()? as usize;
        let body = self.reader.read_bytes(length)?;
        Ok(PacketRecord { game_time, body })
    }
}

impl<'a> Iterator for PacketRecordIterator<'a> {
    type Item = Result<PacketRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.reader.is_empty() {
            return None;
        }

        match self.parse_record() {
            Ok(record) => {
                self.record_count += 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
