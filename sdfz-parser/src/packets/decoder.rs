//! Per-type packet field decoders.
//!
//! [`PacketDecoder::decode`] reads the type tag, applies the tag filter
//! and dispatches to the decoder for that type. Every decoder reads only
//! from the packet body, so a malformed packet cannot consume bytes of the
//! next record.
//!
//! Size prefixes count the whole message including the tag. Strings bounded
//! by such a prefix are read "up to" the remaining bytes.

use tracing::debug;

use super::command::{Command, UnitDefTable};
use super::lua::{LuaData, LuaParser, UNIT_DEFS_HANDLER};
use super::types::{MapDrawShape, Packet, PacketData, PacketId};
use super::PacketFilter;
use crate::binary::ByteReader;
use crate::config::DemoParserConfig;
use crate::decompress::inflate_auto;
use crate::error::Result;
use crate::script::{parse_script, parse_script_str};

/// Size of the map and mod checksums in GAMEDATA.
const CHECKSUM_SIZE: usize = 64;

/// Decodes packet bodies into [`Packet`] values.
///
/// The decoder owns the unit definition table, which is filled in when a
/// `UNIT_DEFS` Lua message is decoded and used to name build orders.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    filter: PacketFilter,
    lua: LuaParser,
    unit_defs: UnitDefTable,
    verbose: bool,
}

impl PacketDecoder {
    /// Creates a decoder from the configuration.
    #[must_use]
    pub fn new(config: &DemoParserConfig) -> Self {
        Self {
            filter: PacketFilter::new(config),
            lua: LuaParser::new(config),
            unit_defs: UnitDefTable::new(),
            verbose: config.verbose,
        }
    }

    /// Returns the filter applied to packet tags.
    #[must_use]
    pub fn filter(&self) -> &PacketFilter {
        &self.filter
    }

    /// Returns the unit definition names learned so far.
    #[must_use]
    pub fn unit_defs(&self) -> &UnitDefTable {
        &self.unit_defs
    }

    /// Returns the unit definition table for pre-seeding.
    pub fn unit_defs_mut(&mut self) -> &mut UnitDefTable {
        &mut self.unit_defs
    }

    /// Decodes one packet body recorded at `game_time`.
    ///
    /// Returns `Ok(None)` when the tag is filtered out; no field is read in
    /// that case. Unknown tags decode to `PacketData::Empty`.
    ///
    /// # Errors
    ///
    /// - `ParserError::UnexpectedEof` if the body is shorter than its layout
    /// - `ParserError::DecompressionError` if an embedded block is corrupt
    /// - `ParserError::InvalidScript` if a GAMEDATA script has broken links
    pub fn decode(&mut self, body: &[u8], game_time: f32) -> Result<Option<Packet>> {
        let mut reader = ByteReader::new(body);
        let tag = reader.read_u8()?;

        if !self.filter.accepts_tag(tag) {
            return Ok(None);
        }

        let data = match PacketId::from_u8(tag) {
            Some(id) => self.decode_data(id, &mut reader)?,
            None => {
                if self.verbose {
                    debug!(tag, len = body.len(), "no decoder for packet type");
                }
                PacketData::Empty
            }
        };

        if let PacketData::LuaMsg { data: message, .. } = &data {
            if message.name.as_deref() == Some(UNIT_DEFS_HANDLER) {
                if let LuaData::UnitDefs(names) = &message.data {
                    self.learn_unit_defs(names);
                }
            }
        }

        Ok(Some(Packet::new(tag, game_time, data)))
    }

    fn learn_unit_defs(&mut self, names: &[String]) {
        self.unit_defs.extend(
            names
                .iter()
                .enumerate()
                .map(|(index, name)| (index as u32 + 1, name.clone())),
        );
        debug!(count = names.len(), "unit definitions loaded");
    }

    fn decode_data(&self, id: PacketId, r: &mut ByteReader<'_>) -> Result<PacketData> {
        let data = match id {
            PacketId::KeyFrame => PacketData::KeyFrame {
                frame_num: r.read_i32()?,
            },
            PacketId::Quit => {
                let size = r.read_u16()? as usize;
                PacketData::Quit {
                    reason: r.read_string_up_to(size),
                }
            }
            PacketId::StartPlaying => PacketData::StartPlaying {
                countdown: r.read_i32()?,
            },
            PacketId::SetPlayerNum => PacketData::SetPlayerNum {
                player_num: r.read_u8()?,
            },
            PacketId::PlayerName => {
                let size = r.read_u8()? as usize;
                PacketData::PlayerName {
                    player_num: r.read_u8()?,
                    player_name: r.read_string_up_to(size),
                }
            }
            PacketId::Chat => {
                let _size = r.read_u8()?;
                PacketData::Chat {
                    from_id: r.read_u8()?,
                    to_id: r.read_u8()?,
                    message: r.read_string_rest(),
                }
            }
            PacketId::RandSeed => PacketData::RandSeed {
                rand_seed: r.read_u32()?,
            },
            PacketId::GameId => PacketData::GameId {
                game_id: r.read_hex(16)?,
            },
            PacketId::PathChecksum => PacketData::PathChecksum {
                player_num: r.read_u8()?,
                checksum: r.read_hex(4)?,
            },
            PacketId::Command => self.command(r)?,
            PacketId::Select => {
                let _size = r.read_i16()?;
                let player_num = r.read_u8()?;
                let count = r.remaining() / 2;
                let selected_unit_ids = (0..count)
                    .map(|_| r.read_u16())
                    .collect::<Result<_>>()?;
                PacketData::Select {
                    player_num,
                    selected_unit_ids,
                }
            }
            PacketId::Pause => PacketData::Pause {
                player_num: r.read_u8()?,
                paused: r.read_bool()?,
            },
            PacketId::AiCommand => self.ai_command(r)?,
            PacketId::AiCommands => self.ai_commands(r)?,
            PacketId::AiShare => {
                let _size = r.read_i16()?;
                let player_num = r.read_u8()?;
                let ai_id = r.read_u8()?;
                let source_team = r.read_u8()?;
                let dest_team = r.read_u8()?;
                let metal = r.read_f32()?;
                let energy = r.read_f32()?;
                let count = r.remaining() / 2;
                PacketData::AiShare {
                    player_num,
                    ai_id,
                    source_team,
                    dest_team,
                    metal,
                    energy,
                    unit_ids: read_i16s(r, count)?,
                }
            }
            PacketId::UserSpeed => PacketData::UserSpeed {
                player_num: r.read_u8()?,
                user_speed: r.read_f32()?,
            },
            PacketId::InternalSpeed => PacketData::InternalSpeed {
                internal_speed: r.read_f32()?,
            },
            PacketId::CpuUsage => PacketData::CpuUsage {
                cpu_usage: r.read_f32()?,
            },
            PacketId::DirectControl => PacketData::DirectControl {
                player_num: r.read_u8()?,
            },
            PacketId::DcUpdate => PacketData::DcUpdate {
                player_num: r.read_u8()?,
                status: r.read_u8()?,
                heading: r.read_i16()?,
                pitch: r.read_i16()?,
            },
            PacketId::Share => PacketData::Share {
                player_num: r.read_u8()?,
                share_team: r.read_u8()?,
                share_units: r.read_bool()?,
                share_metal: r.read_f32()?,
                share_energy: r.read_f32()?,
            },
            PacketId::SetShare => PacketData::SetShare {
                player_num: r.read_u8()?,
                my_team: r.read_u8()?,
                metal_share_fraction: r.read_f32()?,
                energy_share_fraction: r.read_f32()?,
            },
            PacketId::PlayerStat => PacketData::PlayerStat {
                player_num: r.read_u8()?,
                num_commands: r.read_i32()?,
                unit_commands: r.read_i32()?,
                mouse_pixels: r.read_i32()?,
                mouse_clicks: r.read_i32()?,
                key_presses: r.read_i32()?,
            },
            PacketId::GameOver => {
                // Size counts the whole packet: tag, size and player bytes.
                let size = r.read_u8()? as usize;
                PacketData::GameOver {
                    player_num: r.read_u8()?,
                    winning_ally_teams: r.read_bytes_up_to(size.saturating_sub(3)).to_vec(),
                }
            }
            PacketId::MapDraw => map_draw(r)?,
            PacketId::SyncResponse => PacketData::SyncResponse {
                player_num: r.read_u8()?,
                frame_num: r.read_i32()?,
                checksum: r.read_hex(4)?,
            },
            PacketId::SystemMsg => {
                let size = r.read_u16()? as usize;
                PacketData::SystemMsg {
                    player_num: r.read_u8()?,
                    message: r.read_string_up_to(size.saturating_sub(1)),
                }
            }
            PacketId::StartPos => PacketData::StartPos {
                player_num: r.read_u8()?,
                team: r.read_u8()?,
                ready_state: r.read_u8()?.into(),
                x: r.read_f32()?,
                y: r.read_f32()?,
                z: r.read_f32()?,
            },
            PacketId::PlayerInfo => PacketData::PlayerInfo {
                player_num: r.read_u8()?,
                cpu_usage: r.read_f32()?,
                ping: r.read_i32()?,
            },
            PacketId::PlayerLeft => PacketData::PlayerLeft {
                player_num: r.read_u8()?,
                reason: r.read_u8()?.into(),
            },
            PacketId::LogMsg => {
                let _size = r.read_u16()?;
                PacketData::LogMsg {
                    player_num: r.read_u8()?,
                    level: r.read_u8()?,
                    message: r.read_string_rest(),
                }
            }
            PacketId::LuaMsg => {
                let _size = r.read_u16()?;
                PacketData::LuaMsg {
                    player_num: r.read_u8()?,
                    script: r.read_u16()?,
                    mode: r.read_u8()?,
                    data: self.lua.parse(r.read_rest()),
                }
            }
            PacketId::Team => PacketData::Team {
                player_num: r.read_u8()?,
                action: r.read_u8()?.into(),
                param: r.read_u8()?,
            },
            PacketId::GameData => self.game_data(r)?,
            PacketId::Alliance => PacketData::Alliance {
                player_num: r.read_u8()?,
                other_ally_team: r.read_u8()?,
                allied: r.read_bool()?,
            },
            PacketId::CCommand => {
                let _size = r.read_u16()?;
                PacketData::CCommand {
                    player_num: r.read_u32()?,
                    command: r.read_cstring(),
                    extra: r.read_cstring(),
                }
            }
            PacketId::ClientData => self.client_data(r)?,
            PacketId::AiCreated => {
                let size = r.read_u8()? as usize;
                PacketData::AiCreated {
                    player_num: r.read_u8()?,
                    which_skirmish_ai: r.read_u32()?,
                    team: r.read_u8()?,
                    name: r.read_string_up_to(size),
                }
            }
            PacketId::AiStateChanged => PacketData::AiStateChanged {
                player_num: r.read_u8()?,
                which_skirmish_ai: r.read_u8()?,
                new_state: r.read_u8()?,
            },
            PacketId::RequestTeamStat => PacketData::RequestTeamStat {
                team: r.read_u8()?,
                start_frame: r.read_u16()?,
            },
            PacketId::CreateNewPlayer => {
                let _size = r.read_i16()?;
                PacketData::CreateNewPlayer {
                    player_num: r.read_u8()?,
                    spectator: r.read_bool()?,
                    team: r.read_u8()?,
                    player_name: r.read_string_rest(),
                }
            }
            PacketId::GameFrameProgress => PacketData::GameFrameProgress {
                frame_num: r.read_i32()?,
            },
            PacketId::Ping => PacketData::Ping {
                player_num: r.read_u8()?,
                ping_tag: r.read_u8()?,
                local_time: r.read_f32()?,
            },
            PacketId::NewFrame
            | PacketId::SdChkRequest
            | PacketId::SdChkResponse
            | PacketId::SdBlkRequest
            | PacketId::SdBlkResponse
            | PacketId::SdReset
            | PacketId::TeamStat
            | PacketId::AttemptConnect
            | PacketId::RejectConnect
            | PacketId::AiCommandTracked => PacketData::Empty,
        };
        Ok(data)
    }

    fn command(&self, r: &mut ByteReader<'_>) -> Result<PacketData> {
        let _size = r.read_i16()?;
        let player_num = r.read_u8()?;
        let command_id = r.read_i32()?;
        let timeout = r.read_i32()?;
        let options = r.read_u8()?;
        let param_count = r.read_u32()? as usize;
        let params = r.read_f32s(param_count)?;

        Ok(PacketData::Command {
            player_num,
            timeout,
            command: Command::decode(command_id, options, params, &self.unit_defs),
        })
    }

    fn ai_command(&self, r: &mut ByteReader<'_>) -> Result<PacketData> {
        let _size = r.read_i16()?;
        let player_num = r.read_u8()?;
        let ai_id = r.read_u8()?;
        let ai_team_id = r.read_u8()?;
        let unit_id = r.read_i16()?;
        let command_id = r.read_i32()?;
        let timeout = r.read_i32()?;
        let options = r.read_u8()?;
        let param_count = r.read_u32()? as usize;
        let params = r.read_f32s(param_count)?;

        Ok(PacketData::AiCommand {
            player_num,
            ai_id,
            ai_team_id,
            unit_id,
            timeout,
            command: Command::decode(command_id, options, params, &self.unit_defs),
        })
    }

    /// Reference fields equal to their sentinel are read per command.
    fn ai_commands(&self, r: &mut ByteReader<'_>) -> Result<PacketData> {
        const PER_COMMAND_ID: u32 = 0;
        const PER_COMMAND_OPTS: u8 = 0xFF;
        const PER_COMMAND_SIZE: u16 = 0xFFFF;

        let _size = r.read_i16()?;
        let player_num = r.read_u8()?;
        let ai_id = r.read_u8()?;
        let pairwise = r.read_u8()?;
        let ref_cmd_id = r.read_u32()?;
        let ref_cmd_opts = r.read_u8()?;
        let ref_cmd_size = r.read_u16()?;
        let unit_count = r.read_i16()?.max(0) as usize;
        let unit_ids = read_i16s(r, unit_count)?;
        let command_count = r.read_u16()? as usize;

        let mut commands = Vec::with_capacity(command_count.min(r.remaining()));
        for _ in 0..command_count {
            let id = if ref_cmd_id == PER_COMMAND_ID {
                r.read_u32()?
            } else {
                ref_cmd_id
            };
            let options = if ref_cmd_opts == PER_COMMAND_OPTS {
                r.read_u8()?
            } else {
                ref_cmd_opts
            };
            let param_count = if ref_cmd_size == PER_COMMAND_SIZE {
                r.read_u16()?
            } else {
                ref_cmd_size
            };
            let params = r.read_f32s(param_count as usize)?;
            commands.push(Command::decode(id as i32, options, params, &self.unit_defs));
        }

        Ok(PacketData::AiCommands {
            player_num,
            ai_id,
            pairwise,
            ref_cmd_id,
            ref_cmd_opts,
            ref_cmd_size,
            unit_ids,
            commands,
        })
    }

    fn game_data(&self, r: &mut ByteReader<'_>) -> Result<PacketData> {
        let _size = r.read_i16()?;
        let compressed_size = r.read_u16()? as usize;
        let inflated = inflate_auto(r.read_bytes(compressed_size)?)?;
        let setup_text = String::from_utf8_lossy(&inflated).into_owned();

        let setup = match parse_script(&inflated) {
            Ok(script) => Some(Box::new(script)),
            Err(e) => {
                if self.verbose {
                    debug!(error = %e, "GAMEDATA setup text is not a valid script");
                }
                None
            }
        };

        Ok(PacketData::GameData {
            setup_text,
            setup,
            map_checksum: r.read_hex(CHECKSUM_SIZE)?,
            mod_checksum: r.read_hex(CHECKSUM_SIZE)?,
            random_seed: r.read_u32()?,
        })
    }

    fn client_data(&self, r: &mut ByteReader<'_>) -> Result<PacketData> {
        let size = r.read_uint(3)? as usize;
        let inflated = inflate_auto(r.read_bytes_up_to(size))?;
        let setup_text = String::from_utf8_lossy(&inflated).into_owned();

        let setup = if setup_text.trim_start().starts_with("[game]") {
            match parse_script_str(&setup_text) {
                Ok(script) => Some(Box::new(script)),
                Err(e) => {
                    if self.verbose {
                        debug!(error = %e, "CLIENTDATA setup text is not a valid script");
                    }
                    None
                }
            }
        } else {
            None
        };

        Ok(PacketData::ClientData { setup_text, setup })
    }
}

fn read_i16s(r: &mut ByteReader<'_>, count: usize) -> Result<Vec<i16>> {
    (0..count).map(|_| r.read_i16()).collect()
}

/// POINT carries a label, LINE a second point, ERASE nothing.
fn map_draw(r: &mut ByteReader<'_>) -> Result<PacketData> {
    let _size = r.read_u8()?;
    let player_num = r.read_u8()?;
    let action = r.read_u8()?;
    let x = r.read_i16()?;
    let z = r.read_i16()?;

    let shape = match action {
        MapDrawShape::POINT => MapDrawShape::Point {
            label: r.read_string_rest(),
        },
        MapDrawShape::ERASE => MapDrawShape::Erase,
        MapDrawShape::LINE => MapDrawShape::Line {
            x2: r.read_i16()?,
            z2: r.read_i16()?,
        },
        code => MapDrawShape::Unknown { code },
    };

    Ok(PacketData::MapDraw {
        player_num,
        x,
        z,
        shape,
    })
}
