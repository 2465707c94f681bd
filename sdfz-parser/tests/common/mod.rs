//! Synthetic demo fixtures for integration tests.
//!
//! [`DemoBuilder`] assembles a demo byte by byte (header, script, packet
//! records, statistics and winner list) and gzips it like the engine does.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::io::Write;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

pub const CHAT: u8 = 7;
pub const COMMAND: u8 = 11;
pub const GAMEOVER: u8 = 30;
pub const STARTPOS: u8 = 36;
pub const LUAMSG: u8 = 50;
pub const NEWFRAME: u8 = 2;
pub const KEYFRAME: u8 = 1;

/// Builder for a complete demo file.
pub struct DemoBuilder {
    script: String,
    stream: Vec<u8>,
    num_players: u32,
    player_stats: Vec<u8>,
    num_teams: u32,
    team_stats: Vec<u8>,
    winners: Vec<u8>,
    game_time: u32,
    trailing: Vec<u8>,
}

impl DemoBuilder {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            stream: Vec::new(),
            num_players: 0,
            player_stats: Vec::new(),
            num_teams: 0,
            team_stats: Vec::new(),
            winners: Vec::new(),
            game_time: 1200,
            trailing: Vec::new(),
        }
    }

    /// Appends one framed packet record.
    pub fn packet(mut self, time: f32, body: &[u8]) -> Self {
        self.stream.extend_from_slice(&time.to_le_bytes());
        self.stream.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.stream.extend_from_slice(body);
        self
    }

    pub fn chat(self, time: f32, from: u8, to: u8, message: &str) -> Self {
        self.packet(time, &chat_body(from, to, message))
    }

    /// Adds one player statistics record.
    pub fn player_stat(mut self, values: [i32; 5]) -> Self {
        self.num_players += 1;
        for value in values {
            self.player_stats.extend_from_slice(&value.to_le_bytes());
        }
        self
    }

    /// Sets the team statistics: one list of `(frame, metal_produced)` samples per team.
    pub fn team_samples(mut self, teams: &[&[(i32, f32)]]) -> Self {
        self.num_teams = teams.len() as u32;
        self.team_stats.clear();
        for samples in teams {
            self.team_stats
                .extend_from_slice(&(samples.len() as i32).to_le_bytes());
        }
        for samples in teams {
            for &(frame, metal_produced) in *samples {
                self.team_stats.extend_from_slice(&frame.to_le_bytes());
                for i in 0..12 {
                    let value = if i == 2 { metal_produced } else { 0.0 };
                    self.team_stats.extend_from_slice(&value.to_le_bytes());
                }
                self.team_stats.extend_from_slice(&[0; 28]);
            }
        }
        self
    }

    pub fn winners(mut self, winners: &[u8]) -> Self {
        self.winners = winners.to_vec();
        self
    }

    pub fn game_time(mut self, seconds: u32) -> Self {
        self.game_time = seconds;
        self
    }

    /// Appends bytes not accounted for by any header size.
    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    /// Returns the uncompressed demo bytes.
    pub fn raw(&self) -> Vec<u8> {
        let mut data = b"spring demofile\0".to_vec();
        data.extend_from_slice(&5i32.to_le_bytes());
        data.extend_from_slice(&352u32.to_le_bytes());

        let mut version = b"105.1.1-2511-g747f18b BAR105".to_vec();
        version.resize(256, 0);
        data.extend_from_slice(&version);

        data.extend_from_slice(&(0u8..16).collect::<Vec<_>>());
        data.extend_from_slice(&1_700_000_000i64.to_le_bytes());

        for value in [
            self.script.len() as u32,
            self.stream.len() as u32,
            self.game_time,
            self.game_time + 30,
            self.num_players,
            self.player_stats.len() as u32,
            20,
            self.num_teams,
            self.team_stats.len() as u32,
            80,
            16,
            self.winners.len() as u32,
        ] {
            data.extend_from_slice(&value.to_le_bytes());
        }

        data.extend_from_slice(self.script.as_bytes());
        data.extend_from_slice(&self.stream);
        data.extend_from_slice(&self.player_stats);
        data.extend_from_slice(&self.team_stats);
        data.extend_from_slice(&self.winners);
        data.extend_from_slice(&self.trailing);
        data
    }

    /// Returns the gzip-compressed demo bytes.
    pub fn build(&self) -> Vec<u8> {
        gzip(&self.raw())
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn chat_body(from: u8, to: u8, message: &str) -> Vec<u8> {
    let mut body = vec![CHAT, (message.len() + 4) as u8, from, to];
    body.extend_from_slice(message.as_bytes());
    body.push(0);
    body
}

pub fn start_pos_body(player: u8, team: u8, x: f32, z: f32) -> Vec<u8> {
    let mut body = vec![STARTPOS, player, team, 1];
    for value in [x, 100.0, z] {
        body.extend_from_slice(&value.to_le_bytes());
    }
    body
}

pub fn lua_body(player: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![LUAMSG];
    body.extend_from_slice(&((payload.len() + 7) as u16).to_le_bytes());
    body.push(player);
    body.extend_from_slice(&0u16.to_le_bytes());
    body.push(0);
    body.extend_from_slice(payload);
    body
}

pub fn command_body(player: u8, command_id: i32, options: u8, params: &[f32]) -> Vec<u8> {
    let mut body = vec![COMMAND];
    body.extend_from_slice(&0i16.to_le_bytes());
    body.push(player);
    body.extend_from_slice(&command_id.to_le_bytes());
    body.extend_from_slice(&0i32.to_le_bytes());
    body.push(options);
    body.extend_from_slice(&(params.len() as u32).to_le_bytes());
    for param in params {
        body.extend_from_slice(&param.to_le_bytes());
    }
    body
}

pub fn game_over_body(player: u8, winners: &[u8]) -> Vec<u8> {
    let mut body = vec![GAMEOVER, (winners.len() + 3) as u8, player];
    body.extend_from_slice(winners);
    body
}

/// A setup script with `teams` one-player teams split over two ally
/// teams, followed by the named spectators.
pub fn script(teams: u32, spectators: &[&str]) -> String {
    let mut text = String::from("[game]\n{\n");
    text.push_str("\tmapname=Supreme Isthmus v2;\n\tgametype=Beyond All Reason test-27474;\n");
    text.push_str("\tstartpostype=2;\n\t[modoptions]\n\t{\n\t\tdeathmode=com;\n\t}\n");

    for ally in 0..2 {
        let _ = write!(
            text,
            "\t[allyteam{ally}]\n\t{{\n\t\tnumallies=0;\n\t\tstartrecttop=0;\n\t\tstartrectbottom=1;\n\t\tstartrectleft={};\n\t\tstartrectright={};\n\t}}\n",
            f32::from(ally as u8) * 0.5,
            f32::from(ally as u8) * 0.5 + 0.5,
        );
    }

    for team in 0..teams {
        let side = if team % 2 == 0 { "Armada" } else { "Cortex" };
        let _ = write!(
            text,
            "\t[team{team}]\n\t{{\n\t\tallyteam={};\n\t\tteamleader={team};\n\t\trgbcolor=0.5 0 1;\n\t\tside={side};\n\t\thandicap=0;\n\t}}\n",
            team % 2,
        );
    }

    for player in 0..teams {
        let _ = write!(
            text,
            "\t[player{player}]\n\t{{\n\t\tname=Player{player};\n\t\tteam={player};\n\t\taccountid={};\n\t\tcountrycode=DE;\n\t\tskill=[{}.5];\n\t\trank=3;\n\t}}\n",
            1000 + player,
            20 + player,
        );
    }

    for (index, name) in spectators.iter().enumerate() {
        let id = teams as usize + index;
        let _ = write!(
            text,
            "\t[player{id}]\n\t{{\n\t\tname={name};\n\t\tspectator=1;\n\t\tteam=0;\n\t\tcountrycode=GB;\n\t}}\n"
        );
    }

    text.push_str("}\n");
    text
}
