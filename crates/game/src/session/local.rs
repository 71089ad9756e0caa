use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::level::{Checkpoint, LevelStatus, LevelType};
use crate::mode::GameModeKind;

use super::SessionCore;

/// Single-player game; nothing leaves the process.
#[derive(Debug)]
pub struct LocalSession {
    pub(super) core: SessionCore,
    level_file: Option<String>,
}

impl LocalSession {
    pub fn new(config: SessionConfig, first_level: &str) -> Self {
        let difficulty = config.difficulty;
        let mut core = SessionCore::new(config, GameModeKind::Single, difficulty, 1);
        core.level_type = LevelType::from_file_name(first_level);
        if core.add_local_player().is_none() {
            log::warn!("Local game started without a player profile");
        }

        Self {
            core,
            level_file: Some(first_level.to_string()),
        }
    }

    pub fn level_file(&self) -> Option<&str> {
        self.level_file.as_deref()
    }

    pub fn set_level(&mut self, file: Option<&str>) -> LevelStatus {
        self.level_file = file.map(str::to_string);
        match file {
            Some(name) => {
                self.core.level_type = LevelType::from_file_name(name);
                LevelStatus::Ready {
                    path: PathBuf::from(name),
                    level_type: self.core.level_type,
                }
            }
            None => LevelStatus::Ended,
        }
    }

    pub fn set_checkpoint(&mut self, x: u16, y: u16) {
        self.core.checkpoint = Checkpoint { x, y };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_level_tracks_type() {
        let mut session = LocalSession::new(SessionConfig::default(), "LEVEL0.000");
        assert_eq!(session.level_file(), Some("LEVEL0.000"));

        let status = session.set_level(Some("BONUSMAP.001"));
        assert_eq!(
            status,
            LevelStatus::Ready {
                path: PathBuf::from("BONUSMAP.001"),
                level_type: LevelType::Bonus,
            }
        );

        assert_eq!(session.set_level(None), LevelStatus::Ended);
        assert_eq!(session.level_file(), None);
    }

    #[test]
    fn test_dedicated_profile_leaves_roster_empty() {
        let config = SessionConfig {
            player: None,
            ..SessionConfig::default()
        };
        let session = LocalSession::new(config, "LEVEL0.000");
        assert!(session.core.roster.is_empty());
        assert!(session.core.local_player.is_none());
    }
}
