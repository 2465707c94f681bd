//! # SDFZ Parser
//!
//! A decoder for Spring RTS demo replays (`.sdfz`, and uncompressed `.sdf`).
//!
//! A demo is a gzip container holding, in order:
//! - a fixed 352-byte **header**
//! - the **setup script** describing ally teams, teams, players, AIs and spectators
//! - the **packet stream**: every network message recorded during the match
//! - end-of-game **statistics** and the winning ally teams
//!
//! ## Quick Start
//!
//! ```no_run
//! use sdfz_parser::{DemoParser, DemoParserConfig, Result};
//!
//! fn summarize(data: &[u8]) -> Result<()> {
//!     let demo = DemoParser::new(DemoParserConfig::default()).parse_demo(data)?;
//!
//!     println!("Engine: {}", demo.header.version_string);
//!     println!("Duration: {}", demo.duration_string());
//!     for player in &demo.info.players {
//!         println!("{} (team {})", player.name, player.team_id);
//!     }
//!     println!("Winners: {:?}", demo.winning_ally_team_ids);
//!     Ok(())
//! }
//! ```
//!
//! For metadata only, [`DemoParser::read_setup`] stops reading the stream
//! once the header and script are decoded.
//!
//! ## Module Overview
//!
//! - [`error`] - Error types and result alias for parser operations
//! - [`binary`] - Bounded byte cursor used by every decoder
//! - [`format`] - Container format detection
//! - [`header`] - Demo header parsing and section offsets
//! - [`decompress`] - Inflation and the incremental header/script reader
//! - [`script`] - Setup script language and match hierarchy
//! - [`packets`] - Packet framing, per-type decoders, commands and Lua messages
//! - [`stats`] - End-of-game statistics
//! - [`demo`] - Whole-demo orchestration, chat log and enrichment
//! - [`config`] - Parser configuration
//!
//! All multi-byte values are little-endian.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod binary;
pub mod config;
pub mod decompress;
pub mod demo;
pub mod error;
pub mod format;
pub mod header;
pub mod packets;
pub mod script;
pub mod stats;

// Re-export commonly used types at the crate root
pub use config::DemoParserConfig;
pub use decompress::{decompress_demo, read_header_and_script};
pub use demo::{ChatMessage, ChatRecipient, Demo, DemoParser};
pub use error::{DemoSection, ParserError, Result};
pub use format::{detect_format, DemoFormat};
pub use header::DemoHeader;
pub use packets::{
    Command, CommandOptions, LuaData, LuaHandler, LuaMessage, Packet, PacketData, PacketDecoder,
    PacketId,
};
pub use script::{parse_script, Ai, AllyTeam, Player, Script, Spectator, Team};
pub use stats::{PlayerStatistics, Statistics, TeamStatistics};
