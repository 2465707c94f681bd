//! Match setup hierarchy decoded from the script block.

use std::collections::BTreeMap;

use serde::Serialize;

/// Key/value pairs of one script section, keys lowercased.
pub type Settings = BTreeMap<String, String>;

/// The decoded setup of a match.
///
/// Entities are flat lists linked by id. `ally_teams` and `teams` are
/// sorted by id; `players`, `ais` and `spectators` keep script order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Top-level `[game]` keys (map name, host info, start position type).
    pub host_settings: Settings,
    /// The `[modoptions]` section.
    pub game_settings: Settings,
    /// The `[mapoptions]` section.
    pub map_settings: Settings,
    /// The `[restrict]` section.
    pub restrictions: Settings,
    /// Ally teams, by id.
    pub ally_teams: Vec<AllyTeam>,
    /// Teams, by id.
    pub teams: Vec<Team>,
    /// Human players in script order.
    pub players: Vec<Player>,
    /// Skirmish AIs in script order.
    pub ais: Vec<Ai>,
    /// Spectators in script order.
    pub spectators: Vec<Spectator>,
    /// Sections that are not part of the hierarchy, keyed by name.
    pub other_sections: BTreeMap<String, Settings>,
}

impl Script {
    /// Returns the ally team with the given id.
    pub fn ally_team(&self, id: u32) -> Option<&AllyTeam> {
        self.ally_teams.iter().find(|a| a.id == id)
    }

    /// Returns the team with the given id.
    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    /// Returns the player with the given id.
    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Returns the spectator with the given id.
    pub fn spectator(&self, id: u32) -> Option<&Spectator> {
        self.spectators.iter().find(|s| s.id == id)
    }

    /// Returns the display name of a player or spectator.
    pub fn participant_name(&self, id: u32) -> Option<&str> {
        self.player(id)
            .map(|p| p.name.as_str())
            .or_else(|| self.spectator(id).map(|s| s.name.as_str()))
    }

    /// Returns the map name from the host settings.
    pub fn map_name(&self) -> Option<&str> {
        self.host_settings.get("mapname").map(String::as_str)
    }

    /// Returns the game (mod) name from the host settings.
    pub fn game_type(&self) -> Option<&str> {
        self.host_settings.get("gametype").map(String::as_str)
    }
}

/// A rectangular start area in normalized map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StartBox {
    /// Top edge.
    pub top: f32,
    /// Bottom edge.
    pub bottom: f32,
    /// Left edge.
    pub left: f32,
    /// Right edge.
    pub right: f32,
}

/// A world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StartPosition {
    /// World x.
    pub x: f32,
    /// World height.
    pub y: f32,
    /// World z.
    pub z: f32,
}

/// A group of teams sharing victory conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllyTeam {
    /// Ally team id.
    pub id: u32,
    /// `numallies` as written, if present.
    pub num_allies: Option<u32>,
    /// Start area, if the script defines one.
    pub start_box: Option<StartBox>,
    /// Ids of the member teams, ascending.
    pub team_ids: Vec<u32>,
}

/// One controllable slot, led by a player or an AI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Team id.
    pub id: u32,
    /// Id of the ally team.
    pub ally_team_id: u32,
    /// Id of the player leading the team.
    pub team_leader_id: Option<u32>,
    /// Color channels in `0.0..=1.0`.
    pub rgb_color: [f32; 3],
    /// Team resource handicap in percent.
    pub handicap: i32,
    /// The faction the team starts as.
    pub side: Option<String>,
    /// Ids of the team's players, ascending.
    pub player_ids: Vec<u32>,
    /// Ids of the team's AIs, ascending.
    pub ai_ids: Vec<u32>,
}

impl Team {
    /// Returns the team color scaled to 8-bit channels.
    #[must_use]
    pub fn color(&self) -> [u8; 3] {
        self.rgb_color.map(scale_channel)
    }
}

fn scale_channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// A human participant controlling a team.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Player number.
    pub id: u32,
    /// Id of the team the player controls.
    pub team_id: u32,
    /// Id of the ally team.
    pub ally_team_id: u32,
    /// Display name.
    pub name: String,
    /// Lobby account id.
    pub user_id: Option<u64>,
    /// Two-letter country code.
    pub country_code: Option<String>,
    /// Lobby rank.
    pub rank: Option<i32>,
    /// Skill rating as written, e.g. `[25.5]`.
    pub skill: Option<String>,
    /// Uncertainty of the skill rating.
    pub skill_uncertainty: Option<f32>,
    /// Skill class.
    pub skill_class: Option<i32>,
    /// Team color scaled to 8-bit channels.
    pub color: [u8; 3],
    /// Team side, or the faction picked in game.
    pub faction: Option<String>,
    /// Team resource handicap in percent.
    pub handicap: i32,
    /// Start position chosen during placement.
    pub start_pos: Option<StartPosition>,
}

/// A skirmish AI controlling a team.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ai {
    /// AI number.
    pub id: u32,
    /// Id of the team the AI controls.
    pub team_id: u32,
    /// Id of the ally team.
    pub ally_team_id: u32,
    /// Display name.
    pub name: String,
    /// AI library short name.
    pub short_name: Option<String>,
    /// AI library version.
    pub version: Option<String>,
    /// Id of the player hosting the AI.
    pub host_id: Option<u32>,
    /// Team color scaled to 8-bit channels.
    pub color: [u8; 3],
    /// Team side.
    pub faction: Option<String>,
    /// Team resource handicap in percent.
    pub handicap: i32,
    /// Start position chosen during placement.
    pub start_pos: Option<StartPosition>,
}

/// A participant watching the match without a team.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectator {
    /// Player number.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Lobby account id.
    pub user_id: Option<u64>,
    /// Two-letter country code.
    pub country_code: Option<String>,
    /// Lobby rank.
    pub rank: Option<i32>,
    /// Skill rating as written, e.g. `[25.5]`.
    pub skill: Option<String>,
    /// Uncertainty of the skill rating.
    pub skill_uncertainty: Option<f32>,
    /// Skill class.
    pub skill_class: Option<i32>,
}
