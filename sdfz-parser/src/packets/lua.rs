//! Decoding of Lua messages carried by LUAMSG packets.
//!
//! Game scripts talk to each other through free-form Lua messages. Each
//! known message shape is described by a [`LuaHandler`]: a validator that
//! recognizes the payload and a parser that decodes it. Handlers are tried
//! in order and the first accepting handler wins.
//!
//! A payload nobody recognizes, or one whose parser fails, comes back as
//! raw text. A bad message never stops the packet stream.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::binary::ByteReader;
use crate::config::DemoParserConfig;
use crate::decompress::inflate_auto;
use crate::error::ParserError;

/// Recognizes a payload from its full bytes and their lossy text.
pub type LuaValidator = dyn Fn(&[u8], &str) -> bool + Send + Sync;

/// Decodes the payload bytes after the handler's start index.
pub type LuaDecodeFn = dyn Fn(&[u8], &str) -> Result<LuaData, String> + Send + Sync;

/// A named (validator, parser) pair for one Lua message shape.
#[derive(Clone)]
pub struct LuaHandler {
    /// Handler name, used in `LuaMessage::name` and exclusion lists.
    pub name: String,
    /// Number of leading payload bytes the parser does not see.
    pub parse_start_index: usize,
    /// Returns `true` for payloads this handler decodes.
    pub validator: Arc<LuaValidator>,
    /// Decodes the payload after `parse_start_index`.
    pub parser: Arc<LuaDecodeFn>,
}

impl LuaHandler {
    /// Creates a handler from closures.
    pub fn new<V, P>(name: impl Into<String>, parse_start_index: usize, validator: V, parser: P) -> Self
    where
        V: Fn(&[u8], &str) -> bool + Send + Sync + 'static,
        P: Fn(&[u8], &str) -> Result<LuaData, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parse_start_index,
            validator: Arc::new(validator),
            parser: Arc::new(parser),
        }
    }
}

impl fmt::Debug for LuaHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaHandler")
            .field("name", &self.name)
            .field("parse_start_index", &self.parse_start_index)
            .finish_non_exhaustive()
    }
}

/// A decoded Lua message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuaMessage {
    /// Name of the handler that decoded the message, `None` for raw text.
    pub name: Option<String>,
    /// The decoded payload.
    pub data: LuaData,
}

impl LuaMessage {
    fn raw(text: String) -> Self {
        Self {
            name: None,
            data: LuaData::Raw(text),
        }
    }
}

/// Typed payload of a Lua message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LuaData {
    /// Mouse positions broadcast by a player.
    MousePositions {
        /// Whether the pointer was clicked.
        click: bool,
        /// Positions in broadcast order.
        positions: Vec<MousePosition>,
    },
    /// A numeric reading such as a frame rate.
    Number(f64),
    /// Text payload of a recognized message.
    Text(String),
    /// End-of-game award table.
    Awards(Awards),
    /// A faction picked before the game starts.
    Faction(String),
    /// Periodic unit position dump.
    UnitPositions(UnitPositionLog),
    /// Unit definition names, index `i` naming unit def id `i + 1`.
    UnitDefs(Vec<String>),
    /// Arbitrary structured data from a caller-supplied handler.
    Json(serde_json::Value),
    /// Unrecognized payload as lossy UTF-8.
    Raw(String),
}

/// One pointer position in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MousePosition {
    /// Map x.
    pub x: u16,
    /// Map z.
    pub z: u16,
}

/// One award: the winning team and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardEntry {
    /// Winning team.
    pub team_id: i32,
    /// Award score.
    pub value: f64,
}

/// Award table sent when the game ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Awards {
    /// Most enemy economy destroyed, best first.
    pub econ_destroyed: Vec<AwardEntry>,
    /// Most enemy fighting units destroyed, best first.
    pub fighting_units_destroyed: Vec<AwardEntry>,
    /// Best resource efficiency, best first.
    pub resource_efficiency: Vec<AwardEntry>,
    /// Overall top performer.
    pub cow: Option<AwardEntry>,
    /// Most resources produced.
    pub most_resources_produced: Option<AwardEntry>,
    /// Most damage taken.
    pub most_damage_taken: Option<AwardEntry>,
    /// Least active player.
    pub sleep: Option<AwardEntry>,
}

/// One batch of the periodic unit position dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPositionLog {
    /// Game frame of the sample.
    pub frame: i64,
    /// Index of this part of a split dump.
    pub part_id: i64,
    /// Number of participating players.
    pub participants: i64,
    /// Send attempts for this part.
    pub attempts: i64,
    /// Unit positions in this part.
    pub positions: Vec<UnitPosition>,
}

/// Position of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPosition {
    /// Unit id.
    pub unit_id: i64,
    /// Unit definition id.
    pub unit_def_id: i64,
    /// World x.
    pub x: f64,
    /// World z.
    pub y: f64,
}

/// Runs the handler chain over LUAMSG payloads.
#[derive(Debug, Clone)]
pub struct LuaParser {
    handlers: Vec<LuaHandler>,
    verbose: bool,
}

impl LuaParser {
    /// Builds the handler chain from the configuration.
    ///
    /// Standard handlers (if enabled) come first, then custom handlers;
    /// handlers named in `exclude_lua_handlers` are dropped.
    #[must_use]
    pub fn new(config: &DemoParserConfig) -> Self {
        let mut handlers = if config.include_standard_lua_handlers {
            standard_lua_handlers()
        } else {
            Vec::new()
        };
        handlers.extend(config.custom_lua_handlers.iter().cloned());
        handlers.retain(|h| !config.exclude_lua_handlers.contains(&h.name));

        Self::with_handlers(handlers, config.verbose)
    }

    /// Builds a parser over an explicit handler list.
    #[must_use]
    pub fn with_handlers(handlers: Vec<LuaHandler>, verbose: bool) -> Self {
        Self { handlers, verbose }
    }

    /// Returns the handler chain in evaluation order.
    #[must_use]
    pub fn handlers(&self) -> &[LuaHandler] {
        &self.handlers
    }

    /// Decodes one payload. Never fails.
    #[must_use]
    pub fn parse(&self, payload: &[u8]) -> LuaMessage {
        let text = String::from_utf8_lossy(payload);

        let Some(handler) = self.handlers.iter().find(|h| (h.validator)(payload, &text)) else {
            if self.verbose {
                debug!(len = payload.len(), "no Lua handler matched");
            }
            return LuaMessage::raw(text.into_owned());
        };

        let body = payload.get(handler.parse_start_index..).unwrap_or_default();
        let body_text = String::from_utf8_lossy(body);

        match (handler.parser)(body, &body_text) {
            Ok(data) => LuaMessage {
                name: Some(handler.name.clone()),
                data,
            },
            Err(reason) => {
                if self.verbose {
                    let error = ParserError::LuaDecode {
                        handler: handler.name.clone(),
                        reason,
                    };
                    warn!(%error, "falling back to raw Lua text");
                }
                LuaMessage::raw(text.into_owned())
            }
        }
    }
}

/// Returns the built-in handlers in evaluation order.
#[must_use]
pub fn standard_lua_handlers() -> Vec<LuaHandler> {
    vec![
        LuaHandler::new(
            "MOUSE_POS_BROADCAST",
            0,
            |_, text| text.starts_with('£'),
            parse_mouse_positions,
        ),
        LuaHandler::new(
            "FPS_BROADCAST",
            0,
            |_, text| text.starts_with('@'),
            parse_fps,
        ),
        LuaHandler::new("AWARDS", 0, |bytes, _| bytes.first() == Some(&0xa1), parse_awards),
        LuaHandler::new(
            "FACTION_PICKER",
            1,
            |bytes, _| bytes.first() == Some(&0x8a),
            |_, text| Ok(LuaData::Faction(picked_faction(text).to_string())),
        ),
        LuaHandler::new(
            "UNIT_POSITION_LOGGER",
            6,
            |_, text| text.starts_with("log"),
            parse_unit_positions,
        ),
        LuaHandler::new(
            UNIT_DEFS_HANDLER,
            UNIT_DEFS_PREFIX.len(),
            |bytes, _| bytes.starts_with(UNIT_DEFS_PREFIX.as_bytes()),
            parse_unit_defs,
        ),
    ]
}

/// Name of the handler whose output feeds the unit definition table.
pub const UNIT_DEFS_HANDLER: &str = "UNIT_DEFS";

const UNIT_DEFS_PREFIX: &str = "unitdefs:";

/// Maps a faction pick to its side name.
///
/// The picker sends either the starting commander's unit def id (`542` is
/// the Cortex commander) or the commander's unit name.
fn picked_faction(text: &str) -> &'static str {
    let pick = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match pick.to_ascii_lowercase().as_str() {
        "542" => "Cortex",
        p if p.starts_with("leg") => "Legion",
        p if p.starts_with("cor") => "Cortex",
        _ => "Armada",
    }
}

/// `£` (2 bytes), 2 bytes of padding, click flag, then `(u16 x, u16 z)` pairs.
fn parse_mouse_positions(bytes: &[u8], _: &str) -> Result<LuaData, String> {
    let click = bytes.get(4) == Some(&b'1');
    let mut reader = ByteReader::new(bytes.get(5..).unwrap_or_default());

    let mut positions = Vec::with_capacity(reader.remaining() / 4);
    while reader.remaining() >= 4 {
        let x = reader.read_u16().map_err(|e| e.to_string())?;
        let z = reader.read_u16().map_err(|e| e.to_string())?;
        positions.push(MousePosition { x, z });
    }

    Ok(LuaData::MousePositions { click, positions })
}

fn parse_fps(bytes: &[u8], _: &str) -> Result<LuaData, String> {
    let text = String::from_utf8_lossy(bytes.get(3..).unwrap_or_default());
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    Ok(match text.parse::<f64>() {
        Ok(fps) => LuaData::Number(fps),
        Err(_) => LuaData::Text(text.to_string()),
    })
}

/// Awards are `team:value` pairs separated by non-ASCII marker bytes.
fn parse_awards(bytes: &[u8], _: &str) -> Result<LuaData, String> {
    let mut entries = bytes
        .split(|b| !b.is_ascii())
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<AwardEntry, String> {
            let text = String::from_utf8_lossy(part);
            let (team, value) = text
                .split_once(':')
                .ok_or_else(|| format!("award entry {text:?} has no separator"))?;
            let team: i32 = team
                .trim()
                .parse()
                .map_err(|_| format!("award team {team:?} is not a number"))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("award value {value:?} is not a number"))?;
            Ok(AwardEntry {
                team_id: team - 1,
                value,
            })
        })
        .collect::<Result<Vec<_>, String>>()?
        .into_iter();

    let mut take_three = || entries.by_ref().take(3).collect::<Vec<_>>();
    let econ_destroyed = take_three();
    let fighting_units_destroyed = take_three();
    let resource_efficiency = take_three();

    Ok(LuaData::Awards(Awards {
        econ_destroyed,
        fighting_units_destroyed,
        resource_efficiency,
        cow: entries.next(),
        most_resources_produced: entries.next(),
        most_damage_taken: entries.next(),
        sleep: entries.next(),
    }))
}

/// `frame;partId;participants;attempts;` followed by compressed JSON.
fn parse_unit_positions(bytes: &[u8], text: &str) -> Result<LuaData, String> {
    let mut header = text.splitn(5, ';');
    let mut next_int = |label: &str| -> Result<i64, String> {
        header
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| format!("missing {label}"))
    };
    let frame = next_int("frame")?;
    let part_id = next_int("partId")?;
    let participants = next_int("participants")?;
    let attempts = next_int("attempts")?;

    let compressed_start = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b';')
        .nth(3)
        .map(|(i, _)| i + 1)
        .ok_or("missing compressed payload")?;
    let json = inflate_auto(&bytes[compressed_start..]).map_err(|e| e.to_string())?;
    let datasets: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&json).map_err(|e| e.to_string())?;

    let positions = datasets
        .values()
        .filter_map(|dataset| dataset.as_array()?.first()?.as_array().cloned())
        .map(|vals| {
            let num = |i: usize| vals.get(i).and_then(serde_json::Value::as_f64).unwrap_or_default();
            UnitPosition {
                unit_id: num(0) as i64,
                unit_def_id: num(1) as i64,
                x: num(2),
                y: num(3),
            }
        })
        .collect();

    Ok(LuaData::UnitPositions(UnitPositionLog {
        frame,
        part_id,
        participants,
        attempts,
        positions,
    }))
}

fn parse_unit_defs(bytes: &[u8], _: &str) -> Result<LuaData, String> {
    let json = inflate_auto(bytes).map_err(|e| e.to_string())?;
    let names: Vec<String> = serde_json::from_slice(&json).map_err(|e| e.to_string())?;
    Ok(LuaData::UnitDefs(names))
}
