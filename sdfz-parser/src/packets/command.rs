//! Unit command decoding.
//!
//! COMMAND, AICOMMAND and AICOMMANDS packets carry unit orders as a
//! command id, an option bitmask and a float parameter list. Negative ids
//! are build orders for the unit definition `-id`.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Maps unit definition ids to unit names.
pub type UnitDefTable = HashMap<u32, String>;

/// Option flags of a command, expanded from the wire bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOptions {
    /// Meta key modifier.
    pub meta: bool,
    /// Issued by the engine rather than the player.
    pub internal_order: bool,
    /// Issued with the right mouse button.
    pub right_mouse: bool,
    /// Shift held: queue after existing orders.
    pub shift: bool,
    /// Ctrl held.
    pub ctrl: bool,
    /// Alt held.
    pub alt: bool,
}

impl CommandOptions {
    /// Bit of the meta flag.
    pub const META: u8 = 1 << 2;
    /// Bit of the internal-order flag.
    pub const INTERNAL_ORDER: u8 = 1 << 3;
    /// Bit of the right-mouse flag.
    pub const RIGHT_MOUSE: u8 = 1 << 4;
    /// Bit of the shift flag.
    pub const SHIFT: u8 = 1 << 5;
    /// Bit of the ctrl flag.
    pub const CTRL: u8 = 1 << 6;
    /// Bit of the alt flag.
    pub const ALT: u8 = 1 << 7;

    /// Expands a wire bitmask. Bits are independent.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            meta: bits & Self::META != 0,
            internal_order: bits & Self::INTERNAL_ORDER != 0,
            right_mouse: bits & Self::RIGHT_MOUSE != 0,
            shift: bits & Self::SHIFT != 0,
            ctrl: bits & Self::CTRL != 0,
            alt: bits & Self::ALT != 0,
        }
    }

    /// Packs the flags back into a bitmask.
    #[must_use]
    pub fn bits(&self) -> u8 {
        [
            (self.meta, Self::META),
            (self.internal_order, Self::INTERNAL_ORDER),
            (self.right_mouse, Self::RIGHT_MOUSE),
            (self.shift, Self::SHIFT),
            (self.ctrl, Self::CTRL),
            (self.alt, Self::ALT),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}

/// A decoded unit command.
///
/// `params` are kept as recorded; their meaning depends on the command id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Absolute command id. For build orders this is the unit definition id.
    pub id: u32,

    /// Engine command name, or the unit name of a build order if known.
    pub name: Option<String>,

    /// Whether this is a build order (negative wire id).
    pub is_build: bool,

    /// Expanded option flags.
    pub options: CommandOptions,

    /// Raw float parameters.
    pub params: Vec<f32>,
}

impl Command {
    /// Builds a command from its wire triple.
    ///
    /// Build orders are named through `unit_defs` when the table knows the
    /// unit definition.
    #[must_use]
    pub fn decode(raw_id: i32, option_bits: u8, params: Vec<f32>, unit_defs: &UnitDefTable) -> Self {
        let id = raw_id.unsigned_abs();
        let is_build = raw_id < 0;
        let name = if is_build {
            unit_defs.get(&id).cloned()
        } else {
            command_name(id).map(str::to_string)
        };

        Self {
            id,
            name,
            is_build,
            options: CommandOptions::from_bits(option_bits),
            params,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.is_build) {
            (Some(name), true) => write!(f, "BUILD {name}")?,
            (None, true) => write!(f, "BUILD #{}", self.id)?,
            (Some(name), false) => write!(f, "{name}")?,
            (None, false) => write!(f, "CMD #{}", self.id)?,
        }
        if !self.params.is_empty() {
            write!(f, " {:?}", self.params)?;
        }
        Ok(())
    }
}

/// Returns the engine name of a built-in command id.
#[must_use]
pub fn command_name(id: u32) -> Option<&'static str> {
    let name = match id {
        0 => "STOP",
        1 => "INSERT",
        2 => "REMOVE",
        5 => "WAIT",
        6 => "TIMEWAIT",
        7 => "DEATHWAIT",
        8 => "SQUADWAIT",
        9 => "GATHERWAIT",
        10 => "MOVE",
        15 => "PATROL",
        16 => "FIGHT",
        20 => "ATTACK",
        21 => "AREA_ATTACK",
        25 => "GUARD",
        30 => "AISELECT",
        35 => "GROUPSELECT",
        36 => "GROUPADD",
        37 => "GROUPCLEAR",
        40 => "REPAIR",
        45 => "FIRE_STATE",
        50 => "MOVE_STATE",
        55 => "SETBASE",
        60 => "INTERNAL",
        65 => "SELFD",
        75 => "LOAD_UNITS",
        76 => "LOAD_ONTO",
        80 => "UNLOAD_UNITS",
        81 => "UNLOAD_UNIT",
        85 => "ONOFF",
        90 => "RECLAIM",
        95 => "CLOAK",
        100 => "STOCKPILE",
        105 => "MANUALFIRE",
        110 => "RESTORE",
        115 => "REPEAT",
        120 => "TRAJECTORY",
        125 => "RESURRECT",
        130 => "CAPTURE",
        135 => "AUTOREPAIRLEVEL",
        145 => "IDLEMODE",
        150 => "FAILED",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_bits() {
        let options = CommandOptions::from_bits(0b1010_0100);
        assert!(options.meta);
        assert!(options.shift);
        assert!(options.alt);
        assert!(!options.internal_order);
        assert!(!options.right_mouse);
        assert!(!options.ctrl);
    }

    #[test]
    fn test_options_low_bits_ignored() {
        assert_eq!(CommandOptions::from_bits(0b0000_0011), CommandOptions::default());
    }

    #[test]
    fn test_options_bits_roundtrip() {
        for bits in [0u8, 4, 8, 16, 32, 64, 128, 0xFC] {
            assert_eq!(CommandOptions::from_bits(bits).bits(), bits);
        }
    }

    #[test]
    fn test_decode_named_command() {
        let command = Command::decode(10, 16, vec![100.0, 0.0, 200.0], &UnitDefTable::new());
        assert_eq!(command.id, 10);
        assert_eq!(command.name.as_deref(), Some("MOVE"));
        assert!(!command.is_build);
        assert!(command.options.right_mouse);
        assert_eq!(command.params.len(), 3);
    }

    #[test]
    fn test_decode_build_order() {
        let mut unit_defs = UnitDefTable::new();
        unit_defs.insert(42, "armsolar".to_string());

        let command = Command::decode(-42, 0, vec![], &unit_defs);
        assert_eq!(command.id, 42);
        assert!(command.is_build);
        assert_eq!(command.name.as_deref(), Some("armsolar"));
        assert_eq!(command.to_string(), "BUILD armsolar");

        let unknown = Command::decode(-7, 0, vec![], &unit_defs);
        assert_eq!(unknown.name, None);
        assert_eq!(unknown.to_string(), "BUILD #7");
    }

    #[test]
    fn test_unknown_command_id() {
        let command = Command::decode(31_000, 0, vec![1.0], &UnitDefTable::new());
        assert_eq!(command.name, None);
        assert_eq!(command.to_string(), "CMD #31000 [1.0]");
    }
}
