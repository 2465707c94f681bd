//! Packet stream decoding.
//!
//! The demo stream is a sequence of framed network messages. Each body
//! starts with a one-byte type tag followed by the fields of that type.
//!
//! - [`stream`]: record framing (`time`, `length`, `body`)
//! - [`types`]: `PacketId`, `Packet` and the `PacketData` payloads
//! - [`decoder`]: per-type field decoders and filtering
//! - [`command`]: unit command sub-decoder
//! - [`lua`]: Lua message sub-decoder
//!
//! # Example
//!
//! ```ignore
//! use sdfz_parser::config::DemoParserConfig;
//! use sdfz_parser::packets::{PacketDecoder, PacketRecordIterator};
//!
//! let mut decoder = PacketDecoder::new(&DemoParserConfig::default());
//! for record in PacketRecordIterator::new(stream_bytes) {
//!     let record = record?;
//!     if let Some(packet) = decoder.decode(record.body, record.game_time)? {
//!         println!("{packet}");
//!     }
//! }
//! ```

pub mod command;
pub mod decoder;
pub mod lua;
pub mod stream;
pub mod types;

pub use command::{command_name, Command, CommandOptions, UnitDefTable};
pub use decoder::PacketDecoder;
pub use lua::{standard_lua_handlers, LuaData, LuaHandler, LuaMessage, LuaParser};
pub use stream::{PacketRecord, PacketRecordIterator};
pub use types::{
    LeaveReason, MapDrawShape, Packet, PacketData, PacketId, ReadyState, TeamAction,
};

use std::collections::HashSet;

use crate::config::DemoParserConfig;

/// Include/exclude rules applied to packets.
///
/// A packet type is kept if the include set is empty or contains it, and
/// the exclude set does not contain it. The check happens on the raw tag,
/// before any field is decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketFilter {
    include: HashSet<u8>,
    exclude: HashSet<u8>,
    include_players: HashSet<u32>,
}

impl PacketFilter {
    /// Creates a filter from the configuration.
    #[must_use]
    pub fn new(config: &DemoParserConfig) -> Self {
        Self {
            include: config.include_packets.iter().map(|id| id.tag()).collect(),
            exclude: config.exclude_packets.iter().map(|id| id.tag()).collect(),
            include_players: config.include_player_ids.iter().copied().collect(),
        }
    }

    /// Returns `true` if packets with this tag should be decoded.
    #[must_use]
    pub fn accepts_tag(&self, tag: u8) -> bool {
        (self.include.is_empty() || self.include.contains(&tag)) && !self.exclude.contains(&tag)
    }

    /// Returns `true` if a packet sent by `player` should be kept.
    ///
    /// Packets without a sender are always kept.
    #[must_use]
    pub fn accepts_player(&self, player: Option<u32>) -> bool {
        match player {
            Some(id) if !self.include_players.is_empty() => self.include_players.contains(&id),
            _ => true,
        }
    }

    /// Returns `true` if a decoded packet passes every rule.
    #[must_use]
    pub fn accepts(&self, packet: &Packet) -> bool {
        self.accepts_tag(packet.tag) && self.accepts_player(packet.player_num())
    }
}
