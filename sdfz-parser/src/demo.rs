//! Whole-demo decoding.
//!
//! [`DemoParser`] sequences the section decoders over one demo:
//!
//! 1. header
//! 2. setup script
//! 3. packet stream, with each retained packet passed to an optional callback
//! 4. statistics
//! 5. enrichment of the setup hierarchy with facts seen in the stream
//!
//! With `skip_packets` set, steps 3 and 4 are skipped. [`DemoParser::read_setup`]
//! produces the same result from a stream without decompressing past the
//! script.
//!
//! # Example
//!
//! ```no_run
//! use sdfz_parser::config::DemoParserConfig;
//! use sdfz_parser::demo::DemoParser;
//!
//! let parser = DemoParser::new(DemoParserConfig::default());
//! let demo = parser.parse_demo_file("match.sdfz")?;
//!
//! println!("Map: {}", demo.info.map_name().unwrap_or("?"));
//! for line in demo.chatlog.iter().flatten() {
//!     println!("{line}");
//! }
//! # Ok::<(), sdfz_parser::error::ParserError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::binary::ByteReader;
use crate::config::DemoParserConfig;
use crate::decompress::{decompress_demo, read_header_and_script};
use crate::error::{DemoSection, Result};
use crate::header::DemoHeader;
use crate::packets::{LuaData, Packet, PacketData, PacketDecoder, PacketRecordIterator};
use crate::script::{parse_script, Script, StartPosition};
use crate::stats::Statistics;

/// Records between progress log lines of the packet loop.
const PROGRESS_INTERVAL: usize = 10_000;

const FACTION_PICKER_HANDLER: &str = "FACTION_PICKER";

/// Who a chat line was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "playerId")]
pub enum ChatRecipient {
    /// The sender's allies.
    Allies,
    /// Spectators only.
    Spectators,
    /// Everyone in the game.
    Everyone,
    /// A single player.
    Direct(u8),
}

impl ChatRecipient {
    /// Recipient id addressing the sender's allies.
    pub const ALLIES_ID: u8 = 252;
    /// Recipient id addressing spectators.
    pub const SPECTATORS_ID: u8 = 253;
    /// Recipient id addressing everyone.
    pub const EVERYONE_ID: u8 = 254;

    /// Classifies a CHAT recipient id.
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            Self::ALLIES_ID => ChatRecipient::Allies,
            Self::SPECTATORS_ID => ChatRecipient::Spectators,
            Self::EVERYONE_ID => ChatRecipient::Everyone,
            other => ChatRecipient::Direct(other),
        }
    }
}

impl fmt::Display for ChatRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRecipient::Allies => f.write_str("Allies"),
            ChatRecipient::Spectators => f.write_str("Spectators"),
            ChatRecipient::Everyone => f.write_str("All"),
            ChatRecipient::Direct(id) => write!(f, "P{id}"),
        }
    }
}

/// A chat line derived from a CHAT packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// In-match time in seconds.
    pub game_time: f32,

    /// Player number of the sender.
    pub from_id: u8,

    /// Display name of the sender, when the setup script knows it.
    pub from_name: Option<String>,

    /// Raw recipient id.
    pub to_id: u8,

    /// Recipient decoded from `to_id`.
    pub recipient: ChatRecipient,

    /// Message text with surrounding whitespace removed.
    pub message: String,
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = (self.game_time / 60.0) as u32;
        let seconds = (self.game_time % 60.0) as u32;
        write!(f, "[{minutes:02}:{seconds:02}] [{}] ", self.recipient)?;
        match &self.from_name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => write!(f, "P{}: {}", self.from_id, self.message),
        }
    }
}

/// A decoded demo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Demo {
    /// The file header.
    pub header: DemoHeader,

    /// The setup script as recorded.
    pub script_text: String,

    /// The setup hierarchy, enriched with start positions and faction picks
    /// when the packet stream was decoded.
    pub info: Script,

    /// End-of-game statistics. `None` when packets were skipped.
    pub statistics: Option<Statistics>,

    /// Chat lines in stream order. `None` when packets were skipped.
    pub chatlog: Option<Vec<ChatMessage>>,

    /// Retained packets, empty unless `collect_packets` is set.
    pub packets: Vec<Packet>,

    /// Winning ally teams from GAMEOVER, or from the statistics trailer.
    pub winning_ally_team_ids: Vec<u8>,
}

impl Demo {
    /// Builds the packet-free result from the header and script bytes.
    fn from_setup(header: DemoHeader, script: &[u8]) -> Result<Self> {
        let info = parse_script(script).map_err(|e| e.in_section(DemoSection::Script))?;
        Ok(Self {
            header,
            script_text: String::from_utf8_lossy(script).into_owned(),
            info,
            statistics: None,
            chatlog: None,
            packets: Vec::new(),
            winning_ally_team_ids: Vec::new(),
        })
    }

    /// Returns the match duration formatted as "HH:MM:SS".
    #[must_use]
    pub fn duration_string(&self) -> String {
        self.header.duration_string()
    }
}

/// Facts gathered from the packet stream for the enrichment pass.
#[derive(Debug, Default)]
struct StreamFacts {
    /// Start positions by team.
    start_positions: HashMap<u32, StartPosition>,
    /// Faction picks by player; later picks replace earlier ones.
    factions: HashMap<u32, String>,
    chatlog: Vec<ChatMessage>,
    game_over: Option<Vec<u8>>,
}

impl StreamFacts {
    fn observe(&mut self, packet: &Packet, info: &Script) {
        match &packet.data {
            PacketData::StartPos { team, x, y, z, .. } => {
                self.start_positions.insert(
                    u32::from(*team),
                    StartPosition {
                        x: *x,
                        y: *y,
                        z: *z,
                    },
                );
            }
            PacketData::Chat {
                from_id,
                to_id,
                message,
            } => self.chatlog.push(ChatMessage {
                game_time: packet.game_time,
                from_id: *from_id,
                from_name: info.participant_name(u32::from(*from_id)).map(str::to_string),
                to_id: *to_id,
                recipient: ChatRecipient::from_id(*to_id),
                message: message.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string(),
            }),
            PacketData::LuaMsg {
                player_num, data, ..
            } if data.name.as_deref() == Some(FACTION_PICKER_HANDLER) => {
                if let LuaData::Faction(faction) = &data.data {
                    self.factions.insert(u32::from(*player_num), faction.clone());
                }
            }
            PacketData::GameOver {
                winning_ally_teams, ..
            } => self.game_over = Some(winning_ally_teams.clone()),
            _ => {}
        }
    }

    /// Applies start positions by team and faction picks by player.
    fn enrich(&self, info: &mut Script) {
        for player in &mut info.players {
            if let Some(pos) = self.start_positions.get(&player.team_id) {
                player.start_pos = Some(*pos);
            }
            if let Some(faction) = self.factions.get(&player.id) {
                player.faction = Some(faction.clone());
            }
        }
        for ai in &mut info.ais {
            if let Some(pos) = self.start_positions.get(&ai.team_id) {
                ai.start_pos = Some(*pos);
            }
        }
    }
}

/// Decodes demos with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DemoParser {
    config: DemoParserConfig,
}

impl DemoParser {
    /// Creates a parser.
    #[must_use]
    pub fn new(config: DemoParserConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DemoParserConfig {
        &self.config
    }

    /// Decodes a complete demo, compressed or not.
    ///
    /// # Errors
    ///
    /// - `ParserError::InvalidMagic` if the input is not a demo
    /// - `ParserError::DecompressionError` if the gzip container is corrupt
    /// - `ParserError::Section` for any fatal error inside a section
    pub fn parse_demo(&self, data: &[u8]) -> Result<Demo> {
        self.parse_demo_with(data, |_| {})
    }

    /// Reads and decodes a demo file.
    ///
    /// # Errors
    ///
    /// See [`DemoParser::parse_demo`]; additionally `ParserError::IoError`.
    pub fn parse_demo_file<P: AsRef<Path>>(&self, path: P) -> Result<Demo> {
        let data = fs::read(path)?;
        self.parse_demo(&data)
    }

    /// Decodes a demo, calling `on_packet` once per retained packet.
    ///
    /// The callback runs after filtering and before the next record is read.
    ///
    /// # Errors
    ///
    /// See [`DemoParser::parse_demo`].
    pub fn parse_demo_with<F>(&self, data: &[u8], mut on_packet: F) -> Result<Demo>
    where
        F: FnMut(&Packet),
    {
        let started = Instant::now();
        let data = decompress_demo(data)?;

        let header = DemoHeader::parse(&data).map_err(|e| e.in_section(DemoSection::Header))?;

        let mut reader = ByteReader::new(&data);
        reader
            .skip(header.script_offset())
            .map_err(|e| e.in_section(DemoSection::Header))?;
        let script = reader
            .read_bytes(header.script_size as usize)
            .map_err(|e| e.in_section(DemoSection::Script))?;

        let mut demo = Demo::from_setup(header, script)?;
        if self.config.skip_packets {
            return Ok(demo);
        }

        let stream = reader
            .read_bytes(demo.header.demo_stream_size as usize)
            .map_err(|e| e.in_section(DemoSection::Packets))?;
        let facts = self
            .parse_packets(stream, &mut demo, &mut on_packet)
            .map_err(|e| e.in_section(DemoSection::Packets))?;

        let statistics = Statistics::parse(reader.read_rest(), &demo.header)
            .map_err(|e| e.in_section(DemoSection::Statistics))?;

        if data.len() != demo.header.expected_len() {
            warn!(
                actual = data.len(),
                expected = demo.header.expected_len(),
                "demo length does not match header section sizes"
            );
        }

        facts.enrich(&mut demo.info);
        demo.winning_ally_team_ids = facts
            .game_over
            .unwrap_or_else(|| statistics.winning_ally_team_ids.clone());
        demo.chatlog = Some(facts.chatlog);
        demo.statistics = Some(statistics);

        if self.config.verbose {
            debug!(
                game_id = %demo.header.game_id,
                packets = demo.packets.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "demo processed"
            );
        }

        Ok(demo)
    }

    fn parse_packets<F>(&self, stream: &[u8], demo: &mut Demo, on_packet: &mut F) -> Result<StreamFacts>
    where
        F: FnMut(&Packet),
    {
        let mut decoder = PacketDecoder::new(&self.config);
        let mut facts = StreamFacts::default();
        let mut records = PacketRecordIterator::new(stream);

        while let Some(record) = records.next() {
            let record = record?;
            if records.record_count() % PROGRESS_INTERVAL == 0 {
                trace!(
                    records = records.record_count(),
                    offset = records.position(),
                    "packet stream progress"
                );
            }

            let Some(packet) = decoder.decode(record.body, record.game_time)? else {
                continue;
            };
            if !decoder.filter().accepts_player(packet.player_num()) {
                continue;
            }

            facts.observe(&packet, &demo.info);
            on_packet(&packet);
            if self.config.collect_packets {
                demo.packets.push(packet);
            }
        }

        Ok(facts)
    }

    /// Reads only the header and setup script from a stream.
    ///
    /// The stream is consumed only as far as the end of the script. The
    /// result matches [`DemoParser::parse_demo`] with `skip_packets` set.
    ///
    /// # Errors
    ///
    /// - `ParserError::UnexpectedEndOfStream` if the stream ends early
    /// - `ParserError::DecompressionError` if the gzip data is corrupt
    /// - `ParserError::IoError` if the reader fails
    /// - `ParserError::Section` for header or script decode errors
    pub fn read_setup<R: Read>(&self, reader: R) -> Result<Demo> {
        let setup = read_header_and_script(reader)?;
        if self.config.verbose {
            debug!(bytes_read = setup.bytes_read, "setup read from stream");
        }
        Demo::from_setup(setup.header, &setup.script)
    }

    /// Opens a demo file and reads only its header and setup script.
    ///
    /// # Errors
    ///
    /// See [`DemoParser::read_setup`].
    pub fn read_setup_file<P: AsRef<Path>>(&self, path: P) -> Result<Demo> {
        let file = fs::File::open(path)?;
        self.read_setup(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParserError;
    use crate::packets::{LuaMessage, PacketId};

    const SCRIPT: &str = "[game]{[allyteam0]{}[allyteam1]{}\
        [team0]{allyteam=0;teamleader=0;side=Armada;rgbcolor=1 0 0;}\
        [team1]{allyteam=1;teamleader=1;side=Armada;rgbcolor=0 0 1;}\
        [player0]{team=0;name=Alice;}[player1]{team=1;name=Bob;}\
        [player2]{spectator=1;name=Watcher;}mapname=Isthmus;}";

    fn record(time: f32, body: &[u8]) -> Vec<u8> {
        let mut data = time.to_le_bytes().to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(body);
        data
    }

    fn chat(from: u8, to: u8, text: &str) -> Vec<u8> {
        let mut body = vec![PacketId::Chat.tag(), 0, from, to];
        body.extend_from_slice(text.as_bytes());
        body
    }

    fn raw_demo(script: &str, stream: &[u8], stats: &[u8], winners: &[u8]) -> Vec<u8> {
        let mut data = b"spring demofile\0".to_vec();
        data.extend_from_slice(&5i32.to_le_bytes());
        data.extend_from_slice(&352u32.to_le_bytes());
        data.extend_from_slice(&[0; 256]);
        data.extend_from_slice(&[0xAB; 16]);
        data.extend_from_slice(&0i64.to_le_bytes());
        for value in [
            script.len() as u32,
            stream.len() as u32,
            600,
            620,
            0,
            stats.len() as u32,
            20,
            0,
            0,
            80,
            15,
            winners.len() as u32,
        ] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(script.as_bytes());
        data.extend_from_slice(stream);
        data.extend_from_slice(stats);
        data.extend_from_slice(winners);
        data
    }

    #[test]
    fn test_chat_recipient_classification() {
        assert_eq!(ChatRecipient::from_id(252), ChatRecipient::Allies);
        assert_eq!(ChatRecipient::from_id(253), ChatRecipient::Spectators);
        assert_eq!(ChatRecipient::from_id(254), ChatRecipient::Everyone);
        assert_eq!(ChatRecipient::from_id(3), ChatRecipient::Direct(3));
        assert_eq!(ChatRecipient::from_id(255), ChatRecipient::Direct(255));
    }

    #[test]
    fn test_parse_raw_demo() {
        let mut stream = record(1.0, &chat(0, 254, "  gl hf \0"));
        stream.extend(record(2.0, &chat(1, 252, "ty")));
        stream.extend(record(2.5, &[PacketId::NewFrame.tag()]));
        let data = raw_demo(SCRIPT, &stream, &[], &[1]);

        let demo = DemoParser::default().parse_demo(&data).unwrap();
        assert_eq!(demo.info.players.len(), 2);
        assert_eq!(demo.info.spectators[0].name, "Watcher");
        assert_eq!(demo.packets.len(), 2);
        assert_eq!(demo.winning_ally_team_ids, vec![1]);
        assert_eq!(demo.duration_string(), "00:10:00");

        let chatlog = demo.chatlog.unwrap();
        assert_eq!(chatlog[0].message, "gl hf");
        assert_eq!(chatlog[0].from_name.as_deref(), Some("Alice"));
        assert_eq!(chatlog[0].recipient, ChatRecipient::Everyone);
        assert_eq!(chatlog[1].recipient, ChatRecipient::Allies);
        assert_eq!(chatlog[1].to_string(), "[00:02] [Allies] Bob: ty");
    }

    #[test]
    fn test_callback_sees_every_retained_packet() {
        let mut stream = record(1.0, &chat(0, 254, "a"));
        stream.extend(record(2.0, &chat(1, 254, "b")));
        let data = raw_demo(SCRIPT, &stream, &[], &[]);

        let parser = DemoParser::new(DemoParserConfig {
            include_player_ids: vec![1],
            collect_packets: false,
            ..DemoParserConfig::default()
        });
        let mut seen = Vec::new();
        let demo = parser
            .parse_demo_with(&data, |p| seen.push(p.player_num()))
            .unwrap();

        assert_eq!(seen, vec![Some(1)]);
        assert!(demo.packets.is_empty());
        assert_eq!(demo.chatlog.unwrap().len(), 1);
    }

    #[test]
    fn test_enrichment() {
        let mut start_pos = vec![PacketId::StartPos.tag(), 1, 1, 1];
        for v in [100.0f32, 0.0, 200.0] {
            start_pos.extend_from_slice(&v.to_le_bytes());
        }
        let mut game_over = vec![PacketId::GameOver.tag(), 4, 0];
        game_over.push(0);

        let mut stream = record(0.0, &start_pos);
        stream.extend(record(900.0, &game_over));
        let data = raw_demo(SCRIPT, &stream, &[], &[1]);

        let demo = DemoParser::default().parse_demo(&data).unwrap();
        let bob = demo.info.player(1).unwrap();
        assert_eq!(bob.start_pos.map(|p| p.z), Some(200.0));
        assert!(demo.info.player(0).unwrap().start_pos.is_none());
        // GAMEOVER wins over the statistics trailer.
        assert_eq!(demo.winning_ally_team_ids, vec![0]);
    }

    #[test]
    fn test_faction_pick_overrides_team_side() {
        let mut facts = StreamFacts::default();
        let mut info = crate::script::parse_script_str(SCRIPT).unwrap();
        for faction in ["Cortex", "Armada", "Cortex"] {
            let packet = Packet::new(
                PacketId::LuaMsg.tag(),
                0.0,
                PacketData::LuaMsg {
                    player_num: 1,
                    script: 0,
                    mode: 0,
                    data: LuaMessage {
                        name: Some(FACTION_PICKER_HANDLER.to_string()),
                        data: LuaData::Faction(faction.to_string()),
                    },
                },
            );
            facts.observe(&packet, &info);
        }
        facts.enrich(&mut info);

        assert_eq!(info.player(1).unwrap().faction.as_deref(), Some("Cortex"));
        assert_eq!(info.player(0).unwrap().faction.as_deref(), Some("Armada"));
    }

    #[test]
    fn test_skip_packets() {
        let stream = record(1.0, &chat(0, 254, "hidden"));
        let data = raw_demo(SCRIPT, &stream, &[], &[]);
        let parser = DemoParser::new(DemoParserConfig {
            skip_packets: true,
            ..DemoParserConfig::default()
        });

        let demo = parser.parse_demo(&data).unwrap();
        assert!(demo.chatlog.is_none());
        assert!(demo.statistics.is_none());
        assert!(demo.packets.is_empty());
        assert_eq!(demo.info.map_name(), Some("Isthmus"));
    }

    #[test]
    fn test_read_setup_matches_skip_packets() {
        let stream = record(1.0, &chat(0, 254, "x"));
        let data = raw_demo(SCRIPT, &stream, &[], &[]);
        let parser = DemoParser::new(DemoParserConfig {
            skip_packets: true,
            ..DemoParserConfig::default()
        });

        let full = parser.parse_demo(&data).unwrap();
        let fast = parser.read_setup(data.as_slice()).unwrap();
        assert_eq!(full, fast);
    }

    #[test]
    fn test_truncated_stream_reports_section() {
        let stream = record(1.0, &chat(0, 254, "cut"));
        let mut data = raw_demo(SCRIPT, &stream, &[], &[]);
        data.truncate(data.len() - 2);

        let err = DemoParser::default().parse_demo(&data).unwrap_err();
        assert_eq!(err.section(), Some(DemoSection::Packets));
    }

    #[test]
    fn test_broken_script_reports_section() {
        let data = raw_demo("[game]{[team0]{allyteam=4;}}", &[], &[], &[]);
        let err = DemoParser::default().parse_demo(&data).unwrap_err();
        assert_eq!(err.section(), Some(DemoSection::Script));
        assert!(matches!(
            err,
            ParserError::Section { source, .. } if matches!(*source, ParserError::InvalidScript { .. })
        ));
    }
}
