//! Parser for the bracketed key=value setup language.
//!
//! A script looks like:
//!
//! ```text
//! [game]
//! {
//!     [allyteam0] { numallies=0; startrectleft=0; ... }
//!     [team0] { allyteam=0; teamleader=0; rgbcolor=0.1 0.2 0.9; side=Armada; }
//!     [player0] { name=Jazcash; team=0; skill=[25.5]; }
//!     [modoptions] { ... }
//!     mapname=Comet Catcher Remake 1.8;
//!     ishost=1;
//! }
//! ```
//!
//! Sections are collected in a first pass, then linked by id in a second
//! pass, so the order of sections in the text does not matter.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use super::model::{Ai, AllyTeam, Player, Script, Settings, Spectator, StartBox, Team};
use crate::error::{ParserError, Result};

/// Name of the wrapper section around the whole script.
const ROOT_SECTION: &str = "game";

/// Parses a raw script block.
///
/// Invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
///
/// Returns `ParserError::InvalidScript` if an entity section has no numeric
/// id, lacks a mandatory link field, or references a team or ally team that
/// does not exist.
pub fn parse_script(data: &[u8]) -> Result<Script> {
    parse_script_str(&String::from_utf8_lossy(data))
}

/// Parses script text. See [`parse_script`].
pub fn parse_script_str(text: &str) -> Result<Script> {
    let raw = RawScript::scan(text);
    let mut script = Script {
        host_settings: raw.host,
        ..Script::default()
    };

    for (name, settings) in raw.sections {
        match name.as_str() {
            "modoptions" => script.game_settings = settings,
            "mapoptions" => script.map_settings = settings,
            "restrict" => script.restrictions = settings,
            n if n.contains("ally") => script.ally_teams.push(parse_ally_team(n, &settings)?),
            n if n.contains("team") => script.teams.push(parse_team(n, &settings)?),
            n if n.contains("player") => {
                if settings.get("spectator").map(|s| s.trim()) == Some("1") {
                    script.spectators.push(parse_spectator(n, &settings)?);
                } else {
                    script.players.push(parse_player(n, &settings)?);
                }
            }
            n if n.contains("ai") => script.ais.push(parse_ai(n, &settings)?),
            _ => {
                debug!(section = %name, "unclassified script section");
                script.other_sections.insert(name, settings);
            }
        }
    }

    link(&mut script)?;
    Ok(script)
}

/// Sections in first-seen order plus the top-level pairs.
#[derive(Default)]
struct RawScript {
    host: Settings,
    sections: Vec<(String, Settings)>,
    index: HashMap<String, usize>,
}

impl RawScript {
    fn scan(text: &str) -> Self {
        let mut raw = RawScript::default();
        let mut stack: Vec<String> = Vec::new();
        let mut pending: Option<String> = None;
        let mut header: Option<String> = None;
        let mut fragment = String::new();

        for ch in text.chars() {
            if let Some(mut name) = header.take() {
                match ch {
                    ']' => pending = Some(name.trim().to_ascii_lowercase()),
                    '\n' | '\r' => header = Some(name),
                    _ => {
                        name.push(ch);
                        header = Some(name);
                    }
                }
                continue;
            }

            match ch {
                '\n' | '\r' => {}
                // Brackets inside a value (`skill=[25.5]`) are not headers.
                '[' if at_statement_start(&fragment) => {
                    raw.flush(&stack, &mut fragment);
                    header = Some(String::new());
                }
                '{' => {
                    raw.flush(&stack, &mut fragment);
                    stack.push(pending.take().unwrap_or_default());
                    raw.open(&stack);
                }
                '}' => {
                    raw.flush(&stack, &mut fragment);
                    stack.pop();
                }
                _ => fragment.push(ch),
            }
        }

        raw.flush(&stack, &mut fragment);
        raw
    }

    /// Returns the entity-level path below the optional `[game]` wrapper.
    fn entity_path(stack: &[String]) -> &[String] {
        match stack.first() {
            Some(root) if root == ROOT_SECTION => &stack[1..],
            _ => stack,
        }
    }

    fn open(&mut self, stack: &[String]) {
        if let [name] = Self::entity_path(stack) {
            self.section_mut(name);
        }
    }

    fn section_mut(&mut self, name: &str) -> &mut Settings {
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => {
                self.sections.push((name.to_string(), Settings::new()));
                self.index.insert(name.to_string(), self.sections.len() - 1);
                self.sections.len() - 1
            }
        };
        &mut self.sections[position].1
    }

    /// Stores the pairs of `fragment` in the section at the top of `stack`.
    ///
    /// Pairs inside nested sections are stored in their entity section
    /// with a dotted key prefix.
    fn flush(&mut self, stack: &[String], fragment: &mut String) {
        let text = std::mem::take(fragment);
        if text.trim().is_empty() {
            return;
        }

        let (target, prefix) = match Self::entity_path(stack).split_first() {
            None => (&mut self.host, String::new()),
            Some((name, nested)) => {
                let prefix = nested.join(".");
                (self.section_mut(name), prefix)
            }
        };

        for pair in text.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            let key = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };
            target.insert(key, value.trim().to_string());
        }
    }
}

fn at_statement_start(fragment: &str) -> bool {
    fragment
        .rsplit(';')
        .next()
        .map_or(true, |tail| tail.trim().is_empty())
}

fn parse_ally_team(name: &str, settings: &Settings) -> Result<AllyTeam> {
    let start_box = match (
        field(settings, "startrecttop"),
        field(settings, "startrectbottom"),
        field(settings, "startrectleft"),
        field(settings, "startrectright"),
    ) {
        (Some(top), Some(bottom), Some(left), Some(right)) => Some(StartBox {
            top,
            bottom,
            left,
            right,
        }),
        _ => None,
    };

    Ok(AllyTeam {
        id: section_id(name)?,
        num_allies: field(settings, "numallies"),
        start_box,
        team_ids: Vec::new(),
    })
}

fn parse_team(name: &str, settings: &Settings) -> Result<Team> {
    let rgb: Vec<f32> = settings
        .get("rgbcolor")
        .map(|s| s.split_whitespace().filter_map(|c| c.parse().ok()).collect())
        .unwrap_or_default();
    let rgb_color = match rgb.as_slice() {
        [r, g, b, ..] => [*r, *g, *b],
        _ => [0.0; 3],
    };

    Ok(Team {
        id: section_id(name)?,
        ally_team_id: required(settings, "allyteam", name)?,
        team_leader_id: field(settings, "teamleader"),
        rgb_color,
        handicap: handicap(settings),
        side: text(settings, "side"),
        player_ids: Vec::new(),
        ai_ids: Vec::new(),
    })
}

fn parse_player(name: &str, settings: &Settings) -> Result<Player> {
    Ok(Player {
        id: section_id(name)?,
        team_id: required(settings, "team", name)?,
        ally_team_id: 0,
        name: text(settings, "name").unwrap_or_default(),
        user_id: field(settings, "accountid"),
        country_code: text(settings, "countrycode"),
        rank: field(settings, "rank"),
        skill: text(settings, "skill"),
        skill_uncertainty: field(settings, "skilluncertainty"),
        skill_class: field(settings, "skillclass"),
        color: [0; 3],
        faction: None,
        handicap: 0,
        start_pos: None,
    })
}

fn parse_spectator(name: &str, settings: &Settings) -> Result<Spectator> {
    Ok(Spectator {
        id: section_id(name)?,
        name: text(settings, "name").unwrap_or_default(),
        user_id: field(settings, "accountid"),
        country_code: text(settings, "countrycode"),
        rank: field(settings, "rank"),
        skill: text(settings, "skill"),
        skill_uncertainty: field(settings, "skilluncertainty"),
        skill_class: field(settings, "skillclass"),
    })
}

fn parse_ai(name: &str, settings: &Settings) -> Result<Ai> {
    Ok(Ai {
        id: section_id(name)?,
        team_id: required(settings, "team", name)?,
        ally_team_id: 0,
        name: text(settings, "name").unwrap_or_default(),
        short_name: text(settings, "shortname"),
        version: text(settings, "version"),
        host_id: field(settings, "host"),
        color: [0; 3],
        faction: None,
        handicap: 0,
        start_pos: None,
    })
}

/// Resolves ally team, team and participant links.
fn link(script: &mut Script) -> Result<()> {
    script.ally_teams.sort_by_key(|a| a.id);
    script.teams.sort_by_key(|t| t.id);

    for team in &script.teams {
        let ally_team = script
            .ally_teams
            .iter_mut()
            .find(|a| a.id == team.ally_team_id)
            .ok_or_else(|| ParserError::InvalidScript {
                reason: format!(
                    "team{} references missing allyteam{}",
                    team.id, team.ally_team_id
                ),
            })?;
        ally_team.team_ids.push(team.id);
    }

    for player in &mut script.players {
        let team = find_team(&mut script.teams, player.team_id, "player", player.id)?;
        team.player_ids.push(player.id);
        player.ally_team_id = team.ally_team_id;
        player.color = team.color();
        player.faction = team.side.clone();
        player.handicap = team.handicap;
    }

    for ai in &mut script.ais {
        let team = find_team(&mut script.teams, ai.team_id, "ai", ai.id)?;
        team.ai_ids.push(ai.id);
        ai.ally_team_id = team.ally_team_id;
        ai.color = team.color();
        ai.faction = team.side.clone();
        ai.handicap = team.handicap;
    }

    Ok(())
}

fn find_team<'a>(teams: &'a mut [Team], team_id: u32, kind: &str, id: u32) -> Result<&'a mut Team> {
    teams
        .iter_mut()
        .find(|t| t.id == team_id)
        .ok_or_else(|| ParserError::InvalidScript {
            reason: format!("{kind}{id} references missing team{team_id}"),
        })
}

/// Extracts the numeric suffix of a section name (`team3` -> 3).
fn section_id(name: &str) -> Result<u32> {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    name[prefix.len()..]
        .parse()
        .map_err(|_| ParserError::InvalidScript {
            reason: format!("section [{name}] has no numeric id"),
        })
}

fn field<T: FromStr>(settings: &Settings, key: &str) -> Option<T> {
    settings.get(key)?.trim().parse().ok()
}

fn required<T: FromStr>(settings: &Settings, key: &str, section: &str) -> Result<T> {
    field(settings, key).ok_or_else(|| ParserError::InvalidScript {
        reason: format!("section [{section}] has no valid {key}"),
    })
}

fn text(settings: &Settings, key: &str) -> Option<String> {
    settings.get(key).filter(|v| !v.is_empty()).cloned()
}

fn handicap(settings: &Settings) -> i32 {
    field::<f32>(settings, "handicap")
        .or_else(|| field(settings, "advantage"))
        .map_or(0, |h| h as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[game]\n{\n\
        [allyteam1]\n{\nnumallies=0;\nstartrectleft=0.8;\nstartrecttop=0;\nstartrectright=1;\nstartrectbottom=1;\n}\n\
        [allyteam0]\n{\nnumallies=0;\nstartrectleft=0;\nstartrecttop=0;\nstartrectright=0.2;\nstartrectbottom=1;\n}\n\
        [player1]\n{\nname=[Fx]Jazcash;\nteam=1;\naccountid=1234;\nskill=[30.11];\nrank=5;\ncountrycode=GB;\n}\n\
        [team0]\n{\nallyteam=0;\nteamleader=0;\nrgbcolor=1 0 0;\nside=Armada;\nhandicap=0;\n}\n\
        [team1]\n{\nallyteam=1;\nteamleader=1;\nrgbcolor=0 0 1;\nside=Cortex;\nhandicap=0;\n}\n\
        [player0]\n{\nname=Alice;\nteam=0;\nskilluncertainty=2.5;\n}\n\
        [player2]\n{\nname=Watcher;\nspectator=1;\nteam=0;\n}\n\
        [modoptions]\n{\nstartmetal=1000;\ndeathmode=com;\n}\n\
        [mapoptions]\n{\n}\n\
        mapname=Comet Catcher Remake 1.8;\n\
        GameType=Beyond All Reason test;\n\
        ishost=1;\n}";

    #[test]
    fn test_parse_host_settings() {
        let script = parse_script_str(SAMPLE).unwrap();
        assert_eq!(script.map_name(), Some("Comet Catcher Remake 1.8"));
        assert_eq!(script.game_type(), Some("Beyond All Reason test"));
        assert_eq!(script.host_settings.get("ishost").map(String::as_str), Some("1"));
        assert_eq!(
            script.game_settings.get("startmetal").map(String::as_str),
            Some("1000")
        );
        assert!(script.map_settings.is_empty());
    }

    #[test]
    fn test_parse_hierarchy_links() {
        let script = parse_script_str(SAMPLE).unwrap();

        assert_eq!(script.ally_teams.len(), 2);
        assert_eq!(script.ally_teams[0].id, 0);
        assert_eq!(script.ally_teams[0].team_ids, vec![0]);
        assert_eq!(script.ally_teams[1].team_ids, vec![1]);
        let start_box = script.ally_teams[1].start_box.unwrap();
        assert_eq!(start_box.left, 0.8);

        assert_eq!(script.teams.len(), 2);
        assert_eq!(script.teams[1].player_ids, vec![1]);
        assert_eq!(script.teams[1].side.as_deref(), Some("Cortex"));
    }

    #[test]
    fn test_players_inherit_team_properties() {
        let script = parse_script_str(SAMPLE).unwrap();

        assert_eq!(script.players.len(), 2);
        let jaz = &script.players[0];
        assert_eq!(jaz.name, "[Fx]Jazcash");
        assert_eq!(jaz.user_id, Some(1234));
        assert_eq!(jaz.rank, Some(5));
        assert_eq!(jaz.skill.as_deref(), Some("[30.11]"));
        assert_eq!(jaz.color, [0, 0, 255]);
        assert_eq!(jaz.faction.as_deref(), Some("Cortex"));
        assert_eq!(jaz.ally_team_id, 1);

        let alice = &script.players[1];
        assert_eq!(alice.color, [255, 0, 0]);
        assert_eq!(alice.skill_uncertainty, Some(2.5));
    }

    #[test]
    fn test_spectators_have_no_team() {
        let script = parse_script_str(SAMPLE).unwrap();
        assert_eq!(script.spectators.len(), 1);
        assert_eq!(script.spectators[0].name, "Watcher");
        assert_eq!(script.participant_name(2), Some("Watcher"));
        assert!(script.teams[0].player_ids.iter().all(|&id| id != 2));
    }

    #[test]
    fn test_parse_ai() {
        let text = "[game]{[allyteam0]{}[team0]{allyteam=0;rgbcolor=0 1 0;side=Armada;}\
            [ai0]{name=BARbarianAI(1);shortname=BARb;version=stable;host=0;team=0;}}";
        let script = parse_script_str(text).unwrap();
        assert_eq!(script.ais.len(), 1);
        let ai = &script.ais[0];
        assert_eq!(ai.short_name.as_deref(), Some("BARb"));
        assert_eq!(ai.host_id, Some(0));
        assert_eq!(ai.color, [0, 255, 0]);
        assert_eq!(script.teams[0].ai_ids, vec![0]);
        assert!(script.players.is_empty());
    }

    #[test]
    fn test_nested_sections_are_prefixed() {
        let text = "[game]{[allyteam0]{}[team0]{allyteam=0;}\
            [ai0]{team=0;[options]{aggression=high;}name=Bot;}}";
        let script = parse_script_str(text).unwrap();
        assert_eq!(script.ais[0].name, "Bot");
        assert!(script.other_sections.is_empty());
    }

    #[test]
    fn test_values_keep_equals_signs() {
        let script = parse_script_str("[game]{motd=a=b;}").unwrap();
        assert_eq!(script.host_settings.get("motd").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_missing_team_is_error() {
        let text = "[game]{[allyteam0]{}[player0]{name=Ghost;team=4;}}";
        let result = parse_script_str(text);
        assert!(matches!(result, Err(ParserError::InvalidScript { .. })));
    }

    #[test]
    fn test_missing_ally_team_is_error() {
        let text = "[game]{[team0]{allyteam=2;}}";
        let result = parse_script_str(text);
        assert!(matches!(result, Err(ParserError::InvalidScript { .. })));
    }

    #[test]
    fn test_section_id() {
        assert_eq!(section_id("team12").unwrap(), 12);
        assert_eq!(section_id("allyteam0").unwrap(), 0);
        assert!(section_id("team").is_err());
    }

    #[test]
    fn test_unwrapped_script() {
        let script = parse_script_str("[allyteam0]{}[team0]{allyteam=0;}hostip=1.2.3.4;").unwrap();
        assert_eq!(script.teams.len(), 1);
        assert_eq!(
            script.host_settings.get("hostip").map(String::as_str),
            Some("1.2.3.4")
        );
    }
}
