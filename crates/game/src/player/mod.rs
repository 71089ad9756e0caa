mod config;
mod state;

pub use config::PlayerProfile;
pub use state::{Controls, DEFAULT_ENERGY, DEFAULT_LIVES, PlayerTemp, TILE_SHIFT, tile_to_fixed};

use crate::level::Checkpoint;
use crate::net::{Message, PLAYER_ANIMS, PlayerJoin, PlayerMessage};

/// One roster entry as seen by the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub colors: [u8; 4],
    pub team: u8,
    pub team_score: u32,
    pub anims: Vec<u8>,
    pub temp: PlayerTemp,
}

impl Player {
    pub fn new(name: impl Into<String>, colors: [u8; 4], team: u8) -> Self {
        Self {
            name: name.into(),
            colors,
            team,
            team_score: 0,
            anims: vec![0; PLAYER_ANIMS],
            temp: PlayerTemp::default(),
        }
    }

    pub fn from_profile(profile: &PlayerProfile, team: u8) -> Self {
        Self::new(profile.name.clone(), profile.colors, team)
    }

    pub fn from_join(join: &PlayerJoin) -> Self {
        Self::new(join.name.clone(), join.colors, join.team)
    }

    pub fn join_message(&self, client_id: u8, index: u8) -> Message {
        Message::PlayerJoin(PlayerJoin {
            client_id,
            player: index,
            team: self.team,
            colors: self.colors,
            name: self.name.clone(),
        })
    }

    pub fn temp_message(&self, index: u8) -> Message {
        Message::Player {
            player: index,
            message: PlayerMessage::Temp(self.temp.clone()),
        }
    }

    pub fn anims_message(&self, index: u8) -> Message {
        Message::Player {
            player: index,
            message: PlayerMessage::Anims(self.anims.clone()),
        }
    }

    /// Applies replicated state sent by the peer owning this player.
    pub fn receive(&mut self, message: &PlayerMessage) {
        match message {
            PlayerMessage::Anims(anims) => {
                let n = anims.len().min(PLAYER_ANIMS);
                if n < anims.len() {
                    log::warn!("Ignoring {} extra animation entries", anims.len() - n);
                }
                self.anims.clear();
                self.anims.extend_from_slice(&anims[..n]);
                self.anims.resize(PLAYER_ANIMS, 0);
            }
            PlayerMessage::Temp(temp) => self.temp = temp.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.temp.reset();
    }

    /// Resets and places the player at a tile position.
    pub fn reset_to(&mut self, checkpoint: Checkpoint) {
        self.reset();
        self.temp.x = tile_to_fixed(checkpoint.x);
        self.temp.y = tile_to_fixed(checkpoint.y);
    }
}
