use std::fmt;

use serde::{Deserialize, Serialize};

use crate::level::Checkpoint;
use crate::player::Player;
use crate::roster::Roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GameModeKind {
    Single = 0,
    Coop = 1,
    Battle = 2,
    TeamBattle = 3,
    Race = 4,
}

impl GameModeKind {
    pub fn is_networked(self) -> bool {
        self != GameModeKind::Single
    }
}

impl TryFrom<u8> for GameModeKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameModeKind::Single),
            1 => Ok(GameModeKind::Coop),
            2 => Ok(GameModeKind::Battle),
            3 => Ok(GameModeKind::TeamBattle),
            4 => Ok(GameModeKind::Race),
            other => Err(other),
        }
    }
}

impl fmt::Display for GameModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameModeKind::Single => "single player",
            GameModeKind::Coop => "cooperative",
            GameModeKind::Battle => "battle",
            GameModeKind::TeamBattle => "team battle",
            GameModeKind::Race => "race",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillOutcome {
    /// False keeps the victim alive.
    pub finalize: bool,
    /// Team to credit with a point.
    pub award_team: Option<u8>,
}

/// What reaching a level exit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelExit {
    pub despawn_sign: bool,
    pub checkpoint: Option<Checkpoint>,
    pub end_level: bool,
    pub score_team: Option<u8>,
    pub reset_player: bool,
}

/// Per-mode scoring and authority rules. Immutable once created.
pub trait ModePolicy: fmt::Debug + Send {
    fn kind(&self) -> GameModeKind;

    /// Team for a player about to join.
    fn choose_team(&self, roster: &Roster) -> u8;

    /// Whether `source` may damage `victim`.
    fn hit(&self, _source: Option<&Player>, _victim: &Player) -> bool {
        true
    }

    fn kill(&self, source: Option<&Player>, _victim: &Player, victim_is_local: bool) -> KillOutcome {
        KillOutcome {
            finalize: true,
            award_team: source.filter(|_| victim_is_local).map(|p| p.team),
        }
    }

    fn end_of_level(&self, _player: &Player, _is_local: bool, x: u16, y: u16) -> LevelExit {
        LevelExit {
            despawn_sign: true,
            checkpoint: Some(Checkpoint { x, y }),
            end_level: true,
            score_team: None,
            reset_player: false,
        }
    }

    fn out_of_time(&self) {}
}

fn free_for_all_team(roster: &Roster) -> u8 {
    roster
        .iter()
        .map(|player| player.team.saturating_add(1))
        .max()
        .unwrap_or(1)
        .max(1)
}

fn balanced_team(roster: &Roster) -> u8 {
    let difference: i32 = roster
        .iter()
        .map(|player| if player.team != 0 { 1 } else { -1 })
        .sum();
    if difference >= 0 { 0 } else { 1 }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SingleMode;

impl ModePolicy for SingleMode {
    fn kind(&self) -> GameModeKind {
        GameModeKind::Single
    }

    fn choose_team(&self, _roster: &Roster) -> u8 {
        0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoopMode;

impl ModePolicy for CoopMode {
    fn kind(&self) -> GameModeKind {
        GameModeKind::Coop
    }

    fn choose_team(&self, _roster: &Roster) -> u8 {
        0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BattleMode;

impl ModePolicy for BattleMode {
    fn kind(&self) -> GameModeKind {
        GameModeKind::Battle
    }

    fn choose_team(&self, roster: &Roster) -> u8 {
        free_for_all_team(roster)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamBattleMode;

impl ModePolicy for TeamBattleMode {
    fn kind(&self) -> GameModeKind {
        GameModeKind::TeamBattle
    }

    fn choose_team(&self, roster: &Roster) -> u8 {
        balanced_team(roster)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RaceMode;

impl ModePolicy for RaceMode {
    fn kind(&self) -> GameModeKind {
        GameModeKind::Race
    }

    fn choose_team(&self, roster: &Roster) -> u8 {
        free_for_all_team(roster)
    }

    fn hit(&self, _source: Option<&Player>, _victim: &Player) -> bool {
        false
    }

    /// Crossing the finish scores a lap and restarts the player.
    fn end_of_level(&self, player: &Player, is_local: bool, _x: u16, _y: u16) -> LevelExit {
        LevelExit {
            despawn_sign: false,
            checkpoint: None,
            end_level: false,
            score_team: is_local.then_some(player.team),
            reset_player: true,
        }
    }
}

pub fn create_mode(kind: GameModeKind) -> Box<dyn ModePolicy> {
    match kind {
        GameModeKind::Single => Box::new(SingleMode),
        GameModeKind::Coop => Box::new(CoopMode),
        GameModeKind::Battle => Box::new(BattleMode),
        GameModeKind::TeamBattle => Box::new(TeamBattleMode),
        GameModeKind::Race => Box::new(RaceMode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with_teams(teams: &[u8]) -> Roster {
        let mut roster = Roster::new(8);
        for (i, &team) in teams.iter().enumerate() {
            roster.push(Player::new(format!("p{}", i), [0; 4], team));
        }
        roster
    }

    #[test]
    fn test_kind_byte_conversion() {
        for kind in [
            GameModeKind::Single,
            GameModeKind::Coop,
            GameModeKind::Battle,
            GameModeKind::TeamBattle,
            GameModeKind::Race,
        ] {
            assert_eq!(GameModeKind::try_from(kind as u8), Ok(kind));
            assert_eq!(create_mode(kind).kind(), kind);
        }
        assert_eq!(GameModeKind::try_from(5), Err(5));
    }

    #[test]
    fn test_coop_always_team_zero() {
        let roster = roster_with_teams(&[0, 0, 0]);
        assert_eq!(CoopMode.choose_team(&roster), 0);
    }

    #[test]
    fn test_free_for_all_picks_fresh_team() {
        assert_eq!(BattleMode.choose_team(&roster_with_teams(&[])), 1);
        assert_eq!(BattleMode.choose_team(&roster_with_teams(&[0])), 1);
        assert_eq!(BattleMode.choose_team(&roster_with_teams(&[1, 4, 2])), 5);
        assert_eq!(RaceMode.choose_team(&roster_with_teams(&[3])), 4);
    }

    #[test]
    fn test_team_battle_balances() {
        assert_eq!(TeamBattleMode.choose_team(&roster_with_teams(&[])), 0);
        assert_eq!(TeamBattleMode.choose_team(&roster_with_teams(&[0])), 1);
        assert_eq!(TeamBattleMode.choose_team(&roster_with_teams(&[0, 1])), 0);
        assert_eq!(TeamBattleMode.choose_team(&roster_with_teams(&[1, 1, 0])), 0);
    }

    #[test]
    fn test_race_disables_hits() {
        let a = Player::new("a", [0; 4], 1);
        let b = Player::new("b", [0; 4], 2);
        assert!(!RaceMode.hit(Some(&a), &b));
        assert!(BattleMode.hit(Some(&a), &b));
    }

    #[test]
    fn test_kill_awards_only_when_local_victim() {
        let source = Player::new("a", [0; 4], 3);
        let victim = Player::new("b", [0; 4], 1);

        let outcome = BattleMode.kill(Some(&source), &victim, true);
        assert!(outcome.finalize);
        assert_eq!(outcome.award_team, Some(3));

        assert_eq!(BattleMode.kill(Some(&source), &victim, false).award_team, None);
        assert_eq!(BattleMode.kill(None, &victim, true).award_team, None);
    }

    #[test]
    fn test_default_end_of_level() {
        let player = Player::new("a", [0; 4], 0);
        let exit = CoopMode.end_of_level(&player, true, 40, 12);
        assert!(exit.end_level);
        assert!(exit.despawn_sign);
        assert_eq!(exit.checkpoint, Some(Checkpoint { x: 40, y: 12 }));
        assert_eq!(exit.score_team, None);
    }

    #[test]
    fn test_race_end_of_level_scores_lap() {
        let player = Player::new("a", [0; 4], 2);

        let exit = RaceMode.end_of_level(&player, true, 40, 12);
        assert!(!exit.end_level);
        assert!(exit.reset_player);
        assert_eq!(exit.score_team, Some(2));

        assert_eq!(RaceMode.end_of_level(&player, false, 40, 12).score_team, None);
    }
}
