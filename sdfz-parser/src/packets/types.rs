//! Packet identifiers and decoded packet payloads.
//!
//! This module defines the `Packet` envelope and the `PacketData` enum
//! holding the type-specific fields of each network message recorded in
//! the demo stream.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::command::Command;
use super::lua::LuaMessage;
use crate::script::Script;

macro_rules! packet_ids {
    ($($variant:ident = $tag:literal => $name:literal,)+) => {
        /// Known packet type tags.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
        #[serde(try_from = "PacketIdRepr")]
        #[repr(u8)]
        pub enum PacketId {
            $(
                #[doc = concat!("`", $name, "` (tag ", stringify!($tag), ").")]
                $variant = $tag,
            )+
        }

        impl PacketId {
            /// Every known packet id, ascending by tag.
            pub const ALL: &'static [PacketId] = &[$(PacketId::$variant,)+];

            /// Looks up a packet id by its wire tag.
            #[must_use]
            pub fn from_u8(tag: u8) -> Option<Self> {
                match tag {
                    $($tag => Some(PacketId::$variant),)+
                    _ => None,
                }
            }

            /// Returns the protocol name of this packet type.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(PacketId::$variant => $name,)+
                }
            }
        }
    };
}

packet_ids! {
    KeyFrame = 1 => "KEYFRAME",
    NewFrame = 2 => "NEWFRAME",
    Quit = 3 => "QUIT",
    StartPlaying = 4 => "STARTPLAYING",
    SetPlayerNum = 5 => "SETPLAYERNUM",
    PlayerName = 6 => "PLAYERNAME",
    Chat = 7 => "CHAT",
    RandSeed = 8 => "RANDSEED",
    GameId = 9 => "GAMEID",
    PathChecksum = 10 => "PATH_CHECKSUM",
    Command = 11 => "COMMAND",
    Select = 12 => "SELECT",
    Pause = 13 => "PAUSE",
    AiCommand = 14 => "AICOMMAND",
    AiCommands = 15 => "AICOMMANDS",
    AiShare = 16 => "AISHARE",
    UserSpeed = 19 => "USER_SPEED",
    InternalSpeed = 20 => "INTERNAL_SPEED",
    CpuUsage = 21 => "CPU_USAGE",
    DirectControl = 22 => "DIRECT_CONTROL",
    DcUpdate = 23 => "DC_UPDATE",
    Share = 26 => "SHARE",
    SetShare = 27 => "SETSHARE",
    PlayerStat = 29 => "PLAYERSTAT",
    GameOver = 30 => "GAMEOVER",
    MapDraw = 31 => "MAPDRAW",
    SyncResponse = 33 => "SYNCRESPONSE",
    SystemMsg = 35 => "SYSTEMMSG",
    StartPos = 36 => "STARTPOS",
    PlayerInfo = 38 => "PLAYERINFO",
    PlayerLeft = 39 => "PLAYERLEFT",
    SdChkRequest = 41 => "SD_CHKREQUEST",
    SdChkResponse = 42 => "SD_CHKRESPONSE",
    SdBlkRequest = 43 => "SD_BLKREQUEST",
    SdBlkResponse = 44 => "SD_BLKRESPONSE",
    SdReset = 45 => "SD_RESET",
    LogMsg = 49 => "LOGMSG",
    LuaMsg = 50 => "LUAMSG",
    Team = 51 => "TEAM",
    GameData = 52 => "GAMEDATA",
    Alliance = 53 => "ALLIANCE",
    CCommand = 54 => "CCOMMAND",
    TeamStat = 60 => "TEAMSTAT",
    ClientData = 61 => "CLIENTDATA",
    AttemptConnect = 65 => "ATTEMPTCONNECT",
    RejectConnect = 66 => "REJECT_CONNECT",
    AiCreated = 70 => "AI_CREATED",
    AiStateChanged = 71 => "AI_STATE_CHANGED",
    RequestTeamStat = 72 => "REQUEST_TEAMSTAT",
    CreateNewPlayer = 75 => "CREATE_NEWPLAYER",
    AiCommandTracked = 76 => "AICOMMAND_TRACKED",
    GameFrameProgress = 77 => "GAME_FRAME_PROGRESS",
    Ping = 78 => "PING",
}

impl PacketId {
    /// Returns the wire tag.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up a packet id by protocol name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PacketId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Packet ids in configuration files may be names or numeric tags.
#[derive(Deserialize)]
#[serde(untagged)]
enum PacketIdRepr {
    Tag(u8),
    Name(String),
}

impl TryFrom<PacketIdRepr> for PacketId {
    type Error = String;

    fn try_from(repr: PacketIdRepr) -> Result<Self, Self::Error> {
        match repr {
            PacketIdRepr::Tag(tag) => {
                PacketId::from_u8(tag).ok_or_else(|| format!("unknown packet tag {tag}"))
            }
            PacketIdRepr::Name(name) => {
                PacketId::from_name(&name).ok_or_else(|| format!("unknown packet name {name:?}"))
            }
        }
    }
}

/// A decoded packet from the demo stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// Raw type tag.
    pub tag: u8,

    /// Protocol name of the tag, `"UNKNOWN"` for unregistered tags.
    pub name: &'static str,

    /// In-match time in seconds at which the packet was recorded.
    pub game_time: f32,

    /// Type-specific fields.
    pub data: PacketData,
}

impl Packet {
    /// Creates a packet envelope for a raw tag.
    #[must_use]
    pub fn new(tag: u8, game_time: f32, data: PacketData) -> Self {
        Self {
            tag,
            name: PacketId::from_u8(tag).map_or("UNKNOWN", PacketId::name),
            game_time,
            data,
        }
    }

    /// Returns the packet id if the tag is known.
    #[must_use]
    pub fn id(&self) -> Option<PacketId> {
        PacketId::from_u8(self.tag)
    }

    /// Returns the id of the player that sent this packet, if it has one.
    #[must_use]
    pub fn player_num(&self) -> Option<u32> {
        self.data.player_num()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>9.2}s] {}", self.game_time, self.name)?;
        if let Some(player) = self.player_num() {
            write!(f, " P{player}")?;
        }
        match &self.data {
            PacketData::Chat { from_id, to_id, message } => {
                write!(f, " {from_id}->{to_id}: {message}")
            }
            PacketData::Command { command, .. } | PacketData::AiCommand { command, .. } => {
                write!(f, " {command}")
            }
            PacketData::LuaMsg { data, .. } => match &data.name {
                Some(name) => write!(f, " {name}"),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Shape-specific part of a MAPDRAW packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MapDrawShape {
    /// A marker with a label (action 0).
    Point {
        /// Marker label.
        label: String,
    },
    /// Erase around the position (action 1).
    Erase,
    /// A line to a second point (action 2).
    Line {
        /// Line end x.
        x2: i16,
        /// Line end z.
        z2: i16,
    },
    /// An action code this decoder does not know.
    Unknown {
        /// Raw action code.
        code: u8,
    },
}

impl MapDrawShape {
    /// Wire code of a labelled marker.
    pub const POINT: u8 = 0;
    /// Wire code of an erase.
    pub const ERASE: u8 = 1;
    /// Wire code of a line.
    pub const LINE: u8 = 2;
}

/// Readiness of a player placing a start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadyState {
    /// Position placed, not ready.
    NotReady,
    /// Position placed and ready.
    Ready,
    /// Readiness unchanged.
    NoUpdate,
    /// A code this decoder does not know.
    Unknown(u8),
}

impl From<u8> for ReadyState {
    fn from(value: u8) -> Self {
        match value {
            0 => ReadyState::NotReady,
            1 => ReadyState::Ready,
            2 => ReadyState::NoUpdate,
            other => ReadyState::Unknown(other),
        }
    }
}

/// Why a player left the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeaveReason {
    /// Connection dropped.
    LostConnection,
    /// Player quit.
    Intentional,
    /// Kicked by the host.
    Kicked,
    /// A code this decoder does not know.
    Unknown(u8),
}

impl From<u8> for LeaveReason {
    fn from(value: u8) -> Self {
        match value {
            0 => LeaveReason::LostConnection,
            1 => LeaveReason::Intentional,
            2 => LeaveReason::Kicked,
            other => LeaveReason::Unknown(other),
        }
    }
}

/// Team-level action carried by a TEAM packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TeamAction {
    /// Units and resources given to another team.
    Giveaway,
    /// Team resigned.
    Resign,
    /// Player joined another team.
    JoinTeam,
    /// Team was eliminated.
    TeamDied,
    /// AI took over the team.
    AiCreated,
    /// AI controlling the team was removed.
    AiDestroyed,
    /// A code this decoder does not know.
    Unknown(u8),
}

impl From<u8> for TeamAction {
    fn from(value: u8) -> Self {
        match value {
            1 => TeamAction::Giveaway,
            2 => TeamAction::Resign,
            3 => TeamAction::JoinTeam,
            4 => TeamAction::TeamDied,
            5 => TeamAction::AiCreated,
            6 => TeamAction::AiDestroyed,
            other => TeamAction::Unknown(other),
        }
    }
}

/// Type-specific fields of a packet.
///
/// Packet types without fields, and tags this decoder does not know,
/// decode to `Empty`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum PacketData {
    /// No fields.
    Empty,

    /// Keyframe marker (1).
    KeyFrame {
        /// Game frame.
        frame_num: i32,
    },

    /// Server shutdown (3).
    Quit {
        /// Reason given.
        reason: String,
    },

    /// Countdown before the game starts (4).
    StartPlaying {
        /// Seconds until start.
        countdown: i32,
    },

    /// Local player number assignment (5).
    SetPlayerNum {
        /// Player number of the sender.
        player_num: u8,
    },

    /// Player name announcement (6).
    PlayerName {
        /// Player number of the sender.
        player_num: u8,
        /// Player display name.
        player_name: String,
    },

    /// Chat line (7). `to_id` 252/253/254 address allies/spectators/everyone.
    Chat {
        /// Player number of the sender.
        from_id: u8,
        /// Raw recipient id.
        to_id: u8,
        /// Message text.
        message: String,
    },

    /// Random seed (8).
    RandSeed {
        /// Random seed.
        rand_seed: u32,
    },

    /// Game identifier as hex (9).
    GameId {
        /// Game id as hex.
        game_id: String,
    },

    /// Path cache checksum (10).
    PathChecksum {
        /// Player number of the sender.
        player_num: u8,
        /// Checksum as hex.
        checksum: String,
    },

    /// Unit command from a player (11).
    Command {
        /// Player number of the sender.
        player_num: u8,
        /// Frame after which the command expires.
        timeout: i32,
        /// The decoded command.
        command: Command,
    },

    /// Unit selection (12).
    Select {
        /// Player number of the sender.
        player_num: u8,
        /// Selected unit ids.
        selected_unit_ids: Vec<u16>,
    },

    /// Pause toggle (13).
    Pause {
        /// Player number of the sender.
        player_num: u8,
        /// Whether the game is now paused.
        paused: bool,
    },

    /// Unit command from an AI (14).
    AiCommand {
        /// Player number of the sender.
        player_num: u8,
        /// Index of the AI on its host.
        ai_id: u8,
        /// Team controlled by the AI.
        ai_team_id: u8,
        /// Unit id.
        unit_id: i16,
        /// Frame after which the command expires.
        timeout: i32,
        /// The decoded command.
        command: Command,
    },

    /// Batched AI commands for several units (15).
    ///
    /// `ref_cmd_id`, `ref_cmd_opts` and `ref_cmd_size` are shared by every
    /// command unless they hold 0, 0xFF and 0xFFFF respectively.
    AiCommands {
        /// Player number of the sender.
        player_num: u8,
        /// Index of the AI on its host.
        ai_id: u8,
        /// Pairing mode of units and commands, as recorded.
        pairwise: u8,
        /// Shared command id, 0 when read per command.
        ref_cmd_id: u32,
        /// Shared option bits, 0xFF when read per command.
        ref_cmd_opts: u8,
        /// Shared parameter count, 0xFFFF when read per command.
        ref_cmd_size: u16,
        /// Unit ids.
        unit_ids: Vec<i16>,
        /// Commands in order.
        commands: Vec<Command>,
    },

    /// AI resource and unit transfer (16).
    AiShare {
        /// Player number of the sender.
        player_num: u8,
        /// Index of the AI on its host.
        ai_id: u8,
        /// Giving team.
        source_team: u8,
        /// Receiving team.
        dest_team: u8,
        /// Metal transferred.
        metal: f32,
        /// Energy transferred.
        energy: f32,
        /// Unit ids.
        unit_ids: Vec<i16>,
    },

    /// Requested game speed (19).
    UserSpeed {
        /// Player number of the sender.
        player_num: u8,
        /// Requested speed factor.
        user_speed: f32,
    },

    /// Effective game speed (20).
    InternalSpeed {
        /// Effective speed factor.
        internal_speed: f32,
    },

    /// Server CPU usage (21).
    CpuUsage {
        /// CPU usage fraction.
        cpu_usage: f32,
    },

    /// Direct unit control toggle (22).
    DirectControl {
        /// Player number of the sender.
        player_num: u8,
    },

    /// Direct control input update (23).
    DcUpdate {
        /// Player number of the sender.
        player_num: u8,
        /// Input bit flags.
        status: u8,
        /// View heading.
        heading: i16,
        /// View pitch.
        pitch: i16,
    },

    /// Resource and unit share (26).
    Share {
        /// Player number of the sender.
        player_num: u8,
        /// Receiving team.
        share_team: u8,
        /// Whether the selected units are shared.
        share_units: bool,
        /// Metal shared.
        share_metal: f32,
        /// Energy shared.
        share_energy: f32,
    },

    /// Automatic share levels (27).
    SetShare {
        /// Player number of the sender.
        player_num: u8,
        /// Team setting its share levels.
        my_team: u8,
        /// Metal share level.
        metal_share_fraction: f32,
        /// Energy share level.
        energy_share_fraction: f32,
    },

    /// Player input statistics (29).
    PlayerStat {
        /// Player number of the sender.
        player_num: u8,
        /// Commands issued.
        num_commands: i32,
        /// Commands multiplied by units receiving them.
        unit_commands: i32,
        /// Distance the mouse moved, in pixels.
        mouse_pixels: i32,
        /// Mouse clicks.
        mouse_clicks: i32,
        /// Key presses.
        key_presses: i32,
    },

    /// Game end with the winning ally teams (30).
    GameOver {
        /// Player number of the sender.
        player_num: u8,
        /// Ids of the winning ally teams.
        winning_ally_teams: Vec<u8>,
    },

    /// Map marker, erase or line (31).
    MapDraw {
        /// Player number of the sender.
        player_num: u8,
        /// Map x.
        x: i16,
        /// Map z.
        z: i16,
        /// Shape-specific fields.
        shape: MapDrawShape,
    },

    /// Sync checksum (33).
    SyncResponse {
        /// Player number of the sender.
        player_num: u8,
        /// Game frame.
        frame_num: i32,
        /// Checksum as hex.
        checksum: String,
    },

    /// Server message (35).
    SystemMsg {
        /// Player number of the sender.
        player_num: u8,
        /// Message text.
        message: String,
    },

    /// Start position placement (36).
    StartPos {
        /// Player number of the sender.
        player_num: u8,
        /// Team id.
        team: u8,
        /// Readiness of the player.
        ready_state: ReadyState,
        /// World x.
        x: f32,
        /// World height.
        y: f32,
        /// World z.
        z: f32,
    },

    /// Player CPU and ping report (38).
    PlayerInfo {
        /// Player number of the sender.
        player_num: u8,
        /// CPU usage fraction.
        cpu_usage: f32,
        /// Ping in milliseconds.
        ping: i32,
    },

    /// Player left the game (39).
    PlayerLeft {
        /// Player number of the sender.
        player_num: u8,
        /// Why the player left.
        reason: LeaveReason,
    },

    /// Engine log line (49).
    LogMsg {
        /// Player number of the sender.
        player_num: u8,
        /// Log level.
        level: u8,
        /// Message text.
        message: String,
    },

    /// Lua message (50).
    LuaMsg {
        /// Player number of the sender.
        player_num: u8,
        /// Id of the sending script.
        script: u16,
        /// Delivery mode.
        mode: u8,
        /// The decoded payload.
        data: LuaMessage,
    },

    /// Team action (51).
    Team {
        /// Player number of the sender.
        player_num: u8,
        /// Team action.
        action: TeamAction,
        /// Action parameter.
        param: u8,
    },

    /// Embedded setup script and content checksums (52).
    ///
    /// `setup` is `None` when the text does not parse as a script.
    GameData {
        /// Inflated setup text.
        setup_text: String,
        /// Parsed setup, when the text is a valid script.
        setup: Option<Box<Script>>,
        /// Map checksum as hex.
        map_checksum: String,
        /// Game archive checksum as hex.
        mod_checksum: String,
        /// Random seed of the match.
        random_seed: u32,
    },

    /// Alliance change (53).
    Alliance {
        /// Player number of the sender.
        player_num: u8,
        /// Ally team the alliance is with.
        other_ally_team: u8,
        /// Whether the alliance is formed.
        allied: bool,
    },

    /// Console command (54).
    CCommand {
        /// Player number of the sender.
        player_num: u32,
        /// Command line.
        command: String,
        /// Extra command data.
        extra: String,
    },

    /// Client setup text (61), parsed when it is a script.
    ClientData {
        /// Inflated setup text.
        setup_text: String,
        /// Parsed setup, when the text is a valid script.
        setup: Option<Box<Script>>,
    },

    /// Skirmish AI creation (70).
    AiCreated {
        /// Player number of the sender.
        player_num: u8,
        /// Skirmish AI id.
        which_skirmish_ai: u32,
        /// Team id.
        team: u8,
        /// AI display name.
        name: String,
    },

    /// Skirmish AI state change (71).
    AiStateChanged {
        /// Player number of the sender.
        player_num: u8,
        /// Skirmish AI id.
        which_skirmish_ai: u8,
        /// New AI state code.
        new_state: u8,
    },

    /// Team statistics request (72).
    RequestTeamStat {
        /// Team whose statistics are requested.
        team: u8,
        /// First frame requested.
        start_frame: u16,
    },

    /// Player joining mid-game (75).
    CreateNewPlayer {
        /// Player number of the sender.
        player_num: u8,
        /// Whether the player joins as a spectator.
        spectator: bool,
        /// Team the player joins.
        team: u8,
        /// Player display name.
        player_name: String,
    },

    /// Simulation progress (77).
    GameFrameProgress {
        /// Game frame.
        frame_num: i32,
    },

    /// Latency probe (78).
    Ping {
        /// Player number of the sender.
        player_num: u8,
        /// Probe tag.
        ping_tag: u8,
        /// Sender time when the probe was sent.
        local_time: f32,
    },
}

impl PacketData {
    /// Returns the sending player of packets that carry one.
    #[must_use]
    pub fn player_num(&self) -> Option<u32> {
        let player = match self {
            PacketData::SetPlayerNum { player_num }
            | PacketData::PlayerName { player_num, .. }
            | PacketData::PathChecksum { player_num, .. }
            | PacketData::Command { player_num, .. }
            | PacketData::Select { player_num, .. }
            | PacketData::Pause { player_num, .. }
            | PacketData::AiCommand { player_num, .. }
            | PacketData::AiCommands { player_num, .. }
            | PacketData::AiShare { player_num, .. }
            | PacketData::UserSpeed { player_num, .. }
            | PacketData::DirectControl { player_num }
            | PacketData::DcUpdate { player_num, .. }
            | PacketData::Share { player_num, .. }
            | PacketData::SetShare { player_num, .. }
            | PacketData::PlayerStat { player_num, .. }
            | PacketData::GameOver { player_num, .. }
            | PacketData::MapDraw { player_num, .. }
            | PacketData::SyncResponse { player_num, .. }
            | PacketData::SystemMsg { player_num, .. }
            | PacketData::StartPos { player_num, .. }
            | PacketData::PlayerInfo { player_num, .. }
            | PacketData::PlayerLeft { player_num, .. }
            | PacketData::LogMsg { player_num, .. }
            | PacketData::LuaMsg { player_num, .. }
            | PacketData::Team { player_num, .. }
            | PacketData::Alliance { player_num, .. }
            | PacketData::AiCreated { player_num, .. }
            | PacketData::AiStateChanged { player_num, .. }
            | PacketData::CreateNewPlayer { player_num, .. }
            | PacketData::Ping { player_num, .. } => u32::from(*player_num),
            PacketData::Chat { from_id, .. } => u32::from(*from_id),
            PacketData::CCommand { player_num, .. } => *player_num,
            _ => return None,
        };
        Some(player)
    }

    /// Returns `true` for packets without fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, PacketData::Empty)
    }
}
