//! Setup script decoding.
//!
//! The script block describes the match setup: ally teams, teams, players,
//! AIs, spectators and the game/map options. The same language is embedded
//! in GAMEDATA and CLIENTDATA packets.
//!
//! # Example
//!
//! ```
//! use sdfz_parser::script::parse_script_str;
//!
//! let script = parse_script_str(
//!     "[game]{[allyteam0]{}[team0]{allyteam=0;rgbcolor=1 0 0;}\
//!      [player0]{name=Alice;team=0;}mapname=Tundra;}",
//! )
//! .unwrap();
//! assert_eq!(script.players[0].color, [255, 0, 0]);
//! assert_eq!(script.map_name(), Some("Tundra"));
//! ```

pub mod model;
pub mod parser;

pub use model::{
    Ai, AllyTeam, Player, Script, Settings, Spectator, StartBox, StartPosition, Team,
};
pub use parser::{parse_script, parse_script_str};
