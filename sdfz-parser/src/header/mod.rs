//! Header parsing for demo files.
//!
//! Every decompressed demo starts with a fixed 352-byte header. The
//! `header_size` field may announce a larger header written by a newer
//! engine; the extra bytes are skipped.
//!
//! # Header Layout (352 bytes)
//!
//! | Offset | Size | Field | Description |
//! |--------|------|-------|-------------|
//! | 0x000 | 16 | `magic` | "spring demofile\0" |
//! | 0x010 | 4 | `version` | Demo format version |
//! | 0x014 | 4 | `header_size` | Bytes preceding the script block |
//! | 0x018 | 256 | `version_string` | Engine version, NUL padded |
//! | 0x118 | 16 | `game_id` | Opaque game identifier |
//! | 0x128 | 8 | `start_time` | Unix timestamp (seconds) |
//! | 0x130 | 4 | `script_size` | Script block size |
//! | 0x134 | 4 | `demo_stream_size` | Packet stream size |
//! | 0x138 | 4 | `game_time` | Game duration (seconds) |
//! | 0x13C | 4 | `wallclock_time` | Real-time duration (seconds) |
//! | 0x140 | 4 | `num_players` | Player stat record count |
//! | 0x144 | 4 | `player_stat_size` | Player stats section size |
//! | 0x148 | 4 | `player_stat_elem_size` | Size of one player record |
//! | 0x14C | 4 | `num_teams` | Team count in team stats |
//! | 0x150 | 4 | `team_stat_size` | Team stats section size |
//! | 0x154 | 4 | `team_stat_elem_size` | Size of one team sample |
//! | 0x158 | 4 | `team_stat_period` | Seconds between team samples |
//! | 0x15C | 4 | `winning_ally_teams_size` | Winner list length |
//!
//! # Example
//!
//! ```no_run
//! use sdfz_parser::header::DemoHeader;
//!
//! let data = std::fs::read("replay.sdf").unwrap();
//! let header = DemoHeader::parse(&data).unwrap();
//! println!("Engine: {}", header.version_string);
//! println!("Duration: {}", header.duration_string());
//! ```

use serde::Serialize;

use crate::binary::ByteReader;
use crate::error::{ParserError, Result};
use crate::format::DEMO_MAGIC;

/// The size of the fixed header layout in bytes.
pub const DEMO_HEADER_SIZE: usize = 352;

/// Length of the NUL-padded magic field.
pub const MAGIC_FIELD_SIZE: usize = 16;

/// Length of the NUL-padded engine version field.
pub const VERSION_STRING_SIZE: usize = 256;

/// Length of the game identifier.
pub const GAME_ID_SIZE: usize = 16;

/// Parsed demo file header.
///
/// All size fields are authoritative: the orchestrator slices the
/// decompressed buffer with them and no section decoder reads past its
/// declared size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoHeader {
    /// Magic string, always "spring demofile".
    pub magic: String,

    /// Demo format version.
    pub version: i32,

    /// Number of bytes before the script block.
    pub header_size: u32,

    /// Engine version that recorded the demo.
    pub version_string: String,

    /// 16-byte game identifier as lowercase hex.
    pub game_id: String,

    /// Game start time in seconds since the Unix epoch.
    pub start_time: i64,

    /// Size of the setup script block.
    pub script_size: u32,

    /// Size of the packet stream.
    pub demo_stream_size: u32,

    /// Nominal game duration in seconds.
    pub game_time: u32,

    /// Wall-clock duration in seconds.
    pub wallclock_time: u32,

    /// Number of per-player statistics records.
    pub num_players: u32,

    /// Size of the per-player statistics section.
    pub player_stat_size: u32,

    /// Size of one per-player statistics record.
    pub player_stat_elem_size: u32,

    /// Number of teams in the per-team statistics section.
    pub num_teams: u32,

    /// Size of the per-team statistics section.
    pub team_stat_size: u32,

    /// Size of one per-team statistics sample.
    pub team_stat_elem_size: u32,

    /// Seconds between two team statistics samples.
    pub team_stat_period: u32,

    /// Number of winning ally team ids trailing the statistics.
    pub winning_ally_teams_size: u32,
}

impl DemoHeader {
    /// Parses a header from the start of a decompressed demo.
    ///
    /// # Errors
    ///
    /// - `ParserError::UnexpectedEof` if fewer than 352 bytes are available
    /// - `ParserError::InvalidMagic` if the magic field is wrong
    /// - `ParserError::InvalidHeader` if `header_size` is below 352
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DEMO_HEADER_SIZE {
            return Err(ParserError::unexpected_eof(DEMO_HEADER_SIZE, data.len()));
        }

        let mut reader = ByteReader::new(data);

        let magic_bytes = reader.read_bytes(MAGIC_FIELD_SIZE)?;
        if !magic_bytes.starts_with(DEMO_MAGIC) {
            return Err(ParserError::invalid_magic(DEMO_MAGIC, magic_bytes));
        }
        let magic = String::from_utf8_lossy(&magic_bytes[..DEMO_MAGIC.len()]).into_owned();

        let version = reader.read_i32()?;
        let header_size = reader.read_u32()?;
        if (header_size as usize) < DEMO_HEADER_SIZE {
            return Err(ParserError::InvalidHeader {
                reason: format!(
                    "Header size {header_size} is smaller than the fixed layout ({DEMO_HEADER_SIZE} bytes)"
                ),
            });
        }

        let version_string = reader.read_string(VERSION_STRING_SIZE, true)?;
        let game_id = reader.read_hex(GAME_ID_SIZE)?;
        let start_time = reader.read_i64()?;

        Ok(DemoHeader {
            magic,
            version,
            header_size,
            version_string,
            game_id,
            start_time,
            script_size: reader.read_u32()?,
            demo_stream_size: reader.read_u32()?,
            game_time: reader.read_u32()?,
            wallclock_time: reader.read_u32()?,
            num_players: reader.read_u32()?,
            player_stat_size: reader.read_u32()?,
            player_stat_elem_size: reader.read_u32()?,
            num_teams: reader.read_u32()?,
            team_stat_size: reader.read_u32()?,
            team_stat_elem_size: reader.read_u32()?,
            team_stat_period: reader.read_u32()?,
            winning_ally_teams_size: reader.read_u32()?,
        })
    }

    /// Returns the offset of the script block.
    #[must_use]
    pub fn script_offset(&self) -> usize {
        self.header_size as usize
    }

    /// Returns the offset of the packet stream.
    #[must_use]
    pub fn packet_offset(&self) -> usize {
        self.script_offset() + self.script_size as usize
    }

    /// Returns the offset of the per-player statistics.
    #[must_use]
    pub fn statistics_offset(&self) -> usize {
        self.packet_offset() + self.demo_stream_size as usize
    }

    /// Returns how many decompressed bytes the header and script occupy.
    #[must_use]
    pub fn setup_len(&self) -> usize {
        self.packet_offset()
    }

    /// Returns the decompressed length implied by the section sizes.
    ///
    /// A well-formed demo is exactly this long.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.statistics_offset()
            + self.player_stat_size as usize
            + self.team_stat_size as usize
            + self.winning_ally_teams_size as usize
    }

    /// Converts the game duration into (hours, minutes, seconds).
    #[must_use]
    pub fn duration_parts(&self) -> (u32, u32, u32) {
        let seconds = self.game_time % 60;
        let total_minutes = self.game_time / 60;
        (total_minutes / 60, total_minutes % 60, seconds)
    }

    /// Returns the game duration formatted as "HH:MM:SS".
    #[must_use]
    pub fn duration_string(&self) -> String {
        let (hours, minutes, seconds) = self.duration_parts();
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
