//! End-of-game statistics.
//!
//! The statistics block follows the packet stream:
//!
//! | Size | Content |
//! |------|---------|
//! | `playerStatSize` | `numPlayers` records of `playerStatElemSize` bytes |
//! | `teamStatSize` | `numTeams` i32 sample counts, then the samples of each team |
//! | `winningAllyTeamsSize` | one u8 per winning ally team |
//!
//! Record counts come from the header, never from the byte sizes. Bytes of a
//! record beyond the fields decoded here are skipped.

use serde::Serialize;
use tracing::debug;

use crate::binary::ByteReader;
use crate::error::Result;
use crate::header::DemoHeader;

/// Bytes of a player record decoded here.
pub const PLAYER_STAT_FIELDS_SIZE: usize = 20;

/// Bytes of a team sample decoded here.
pub const TEAM_STAT_FIELDS_SIZE: usize = 80;

/// Input counters of one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatistics {
    /// Commands issued.
    pub num_commands: i32,
    /// Commands multiplied by units receiving them.
    pub unit_commands: i32,
    /// Distance the mouse moved, in pixels.
    pub mouse_pixels: i32,
    /// Mouse clicks.
    pub mouse_clicks: i32,
    /// Key presses.
    pub key_presses: i32,
}

impl PlayerStatistics {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            num_commands: reader.read_i32()?,
            unit_commands: reader.read_i32()?,
            mouse_pixels: reader.read_i32()?,
            mouse_clicks: reader.read_i32()?,
            key_presses: reader.read_i32()?,
        })
    }
}

/// One economy/combat sample of a team, taken every `teamStatPeriod` seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatistics {
    /// Game frame of the sample.
    pub frame: i32,
    /// Metal spent.
    pub metal_used: f32,
    /// Energy spent.
    pub energy_used: f32,
    /// Metal produced.
    pub metal_produced: f32,
    /// Energy produced.
    pub energy_produced: f32,
    /// Metal wasted at full storage.
    pub metal_excess: f32,
    /// Energy wasted at full storage.
    pub energy_excess: f32,
    /// Metal received from allies.
    pub metal_received: f32,
    /// Energy received from allies.
    pub energy_received: f32,
    /// Metal sent to allies.
    pub metal_sent: f32,
    /// Energy sent to allies.
    pub energy_sent: f32,
    /// Damage dealt.
    pub damage_dealt: f32,
    /// Damage received.
    pub damage_received: f32,
    /// Units built.
    pub units_produced: i32,
    /// Units lost.
    pub units_died: i32,
    /// Units received from allies.
    pub units_received: i32,
    /// Units given to allies.
    pub units_sent: i32,
    /// Enemy units captured.
    pub units_captured: i32,
    /// Own units captured by enemies.
    pub units_out_captured: i32,
    /// Enemy units killed.
    pub units_killed: i32,
}

impl TeamStatistics {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            frame: reader.read_i32()?,
            metal_used: reader.read_f32()?,
            energy_used: reader.read_f32()?,
            metal_produced: reader.read_f32()?,
            energy_produced: reader.read_f32()?,
            metal_excess: reader.read_f32()?,
            energy_excess: reader.read_f32()?,
            metal_received: reader.read_f32()?,
            energy_received: reader.read_f32()?,
            metal_sent: reader.read_f32()?,
            energy_sent: reader.read_f32()?,
            damage_dealt: reader.read_f32()?,
            damage_received: reader.read_f32()?,
            units_produced: reader.read_i32()?,
            units_died: reader.read_i32()?,
            units_received: reader.read_i32()?,
            units_sent: reader.read_i32()?,
            units_captured: reader.read_i32()?,
            units_out_captured: reader.read_i32()?,
            units_killed: reader.read_i32()?,
        })
    }
}

/// Decoded statistics block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// One entry per player, in player number order.
    pub players: Vec<PlayerStatistics>,

    /// Sample series of each team, in team index order.
    pub teams: Vec<Vec<TeamStatistics>>,

    /// Ally teams listed as winners in the trailer.
    pub winning_ally_team_ids: Vec<u8>,
}

impl Statistics {
    /// Decodes the statistics block.
    ///
    /// `data` starts at the statistics offset of the header. Each part is
    /// read only within its declared size.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::UnexpectedEof` if a part is shorter than the
    /// header declares.
    pub fn parse(data: &[u8], header: &DemoHeader) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let player_section = reader.read_bytes(header.player_stat_size as usize)?;
        let team_section = reader.read_bytes(header.team_stat_size as usize)?;
        let winners = reader.read_bytes(header.winning_ally_teams_size as usize)?;

        Ok(Self {
            players: parse_players(player_section, header)?,
            teams: parse_teams(team_section, header)?,
            winning_ally_team_ids: winners.to_vec(),
        })
    }

    /// Returns the sample series of a team.
    #[must_use]
    pub fn team(&self, index: usize) -> Option<&[TeamStatistics]> {
        self.teams.get(index).map(Vec::as_slice)
    }

    /// Returns the last sample of each team.
    pub fn final_samples(&self) -> impl Iterator<Item = Option<&TeamStatistics>> {
        self.teams.iter().map(|samples| samples.last())
    }
}

fn parse_players(data: &[u8], header: &DemoHeader) -> Result<Vec<PlayerStatistics>> {
    let stride = header.player_stat_elem_size as usize;
    if stride < PLAYER_STAT_FIELDS_SIZE {
        if header.num_players > 0 {
            debug!(stride, "player statistics records too small, skipped");
        }
        return Ok(Vec::new());
    }

    let mut reader = ByteReader::new(data);
    (0..header.num_players)
        .map(|_| {
            let mut record = ByteReader::new(reader.read_bytes(stride)?);
            PlayerStatistics::read(&mut record)
        })
        .collect()
}

fn parse_teams(data: &[u8], header: &DemoHeader) -> Result<Vec<Vec<TeamStatistics>>> {
    let mut reader = ByteReader::new(data);
    let counts = (0..header.num_teams)
        .map(|_| reader.read_i32().map(|n| n.max(0) as usize))
        .collect::<Result<Vec<_>>>()?;

    let stride = header.team_stat_elem_size as usize;
    if stride < TEAM_STAT_FIELDS_SIZE {
        if counts.iter().any(|&n| n > 0) {
            debug!(stride, "team statistics samples too small, skipped");
        }
        return Ok(vec![Vec::new(); counts.len()]);
    }

    counts
        .into_iter()
        .map(|count| {
            (0..count)
                .map(|_| {
                    let mut sample = ByteReader::new(reader.read_bytes(stride)?);
                    TeamStatistics::read(&mut sample)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParserError;

    fn header(num_players: u32, num_teams: u32, samples: &[i32], winners: u32) -> DemoHeader {
        let total_samples: i32 = samples.iter().sum();
        DemoHeader {
            magic: "spring demofile".to_string(),
            version: 5,
            header_size: 352,
            version_string: "105.0".to_string(),
            game_id: "00".repeat(16),
            start_time: 0,
            script_size: 0,
            demo_stream_size: 0,
            game_time: 0,
            wallclock_time: 0,
            num_players,
            player_stat_size: num_players * 20,
            player_stat_elem_size: 20,
            num_teams,
            team_stat_size: num_teams * 4 + total_samples as u32 * 80,
            team_stat_elem_size: 80,
            team_stat_period: 15,
            winning_ally_teams_size: winners,
        }
    }

    fn sample_bytes(frame: i32, metal_produced: f32, units_killed: i32) -> Vec<u8> {
        let mut data = frame.to_le_bytes().to_vec();
        for i in 0..12 {
            let value = if i == 2 { metal_produced } else { 0.0 };
            data.extend_from_slice(&value.to_le_bytes());
        }
        for i in 0..7 {
            let value = if i == 6 { units_killed } else { 0 };
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_parse_statistics() {
        let header = header(2, 2, &[2, 1], 1);
        let mut data = Vec::new();
        for player in 0..2i32 {
            for field in 0..5i32 {
                data.extend_from_slice(&(player * 10 + field).to_le_bytes());
            }
        }
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&1i32.to_le_bytes());
        data.extend(sample_bytes(450, 10.0, 0));
        data.extend(sample_bytes(900, 25.5, 3));
        data.extend(sample_bytes(450, 8.0, 1));
        data.push(1);

        let stats = Statistics::parse(&data, &header).unwrap();
        assert_eq!(stats.players.len(), 2);
        assert_eq!(stats.players[1].num_commands, 10);
        assert_eq!(stats.players[1].key_presses, 14);
        assert_eq!(stats.teams[0].len(), 2);
        assert_eq!(stats.teams[0][1].frame, 900);
        assert_eq!(stats.teams[0][1].metal_produced, 25.5);
        assert_eq!(stats.teams[0][1].units_killed, 3);
        assert_eq!(stats.team(1).unwrap()[0].units_killed, 1);
        assert_eq!(stats.winning_ally_team_ids, vec![1]);

        let finals: Vec<i32> = stats.final_samples().map(|s| s.unwrap().frame).collect();
        assert_eq!(finals, vec![900, 450]);
    }

    #[test]
    fn test_player_count_governs_loop() {
        let mut header = header(1, 0, &[], 0);
        // Byte size larger than one record: only one record is read.
        header.player_stat_size = 40;
        let data = vec![0u8; 40];

        let stats = Statistics::parse(&data, &header).unwrap();
        assert_eq!(stats.players.len(), 1);
    }

    #[test]
    fn test_wider_records_are_skipped_past() {
        let mut header = header(2, 0, &[], 0);
        header.player_stat_elem_size = 24;
        header.player_stat_size = 48;
        let mut data = Vec::new();
        for player in 1..=2i32 {
            data.extend_from_slice(&player.to_le_bytes());
            data.extend_from_slice(&[0; 20]);
        }

        let stats = Statistics::parse(&data, &header).unwrap();
        assert_eq!(stats.players[0].num_commands, 1);
        assert_eq!(stats.players[1].num_commands, 2);
    }

    #[test]
    fn test_small_team_samples_skipped() {
        let mut header = header(0, 1, &[], 0);
        header.team_stat_elem_size = 40;
        header.team_stat_size = 4 + 40;
        let mut data = 1i32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 40]);

        let stats = Statistics::parse(&data, &header).unwrap();
        assert_eq!(stats.teams, vec![Vec::new()]);
    }

    #[test]
    fn test_no_winner_list() {
        let header = header(0, 0, &[], 0);
        let stats = Statistics::parse(&[], &header).unwrap();
        assert!(stats.winning_ally_team_ids.is_empty());
        assert!(stats.players.is_empty());
    }

    #[test]
    fn test_truncated_statistics() {
        let header = header(2, 0, &[], 0);
        let result = Statistics::parse(&[0; 30], &header);
        assert!(matches!(result, Err(ParserError::UnexpectedEof { .. })));
    }
}
