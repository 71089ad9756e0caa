use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mode::GameModeKind;
use crate::net::{MAX_CLIENTS, MAX_PLAYERS, NET_PORT};
use crate::player::PlayerProfile;

/// Tick intervals, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub frame: u32,
    pub server_send: u32,
    pub server_check: u32,
    pub client_send: u32,
    pub client_check: u32,
    pub timeout: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            frame: 20,
            server_send: 20,
            server_check: 1000,
            client_send: 10,
            client_check: 1000,
            timeout: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub port: u16,
    pub max_clients: usize,
    pub max_players: usize,
    pub mode: GameModeKind,
    pub difficulty: u8,
    /// `None` hosts without a local player.
    pub player: Option<PlayerProfile>,
    pub staging_path: PathBuf,
    pub timings: Timings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: NET_PORT,
            max_clients: MAX_CLIENTS,
            max_players: MAX_PLAYERS,
            mode: GameModeKind::Coop,
            difficulty: 1,
            player: Some(PlayerProfile::default()),
            staging_path: std::env::temp_dir().join("tilenet-level.tmp"),
            timings: Timings::default(),
        }
    }
}

impl SessionConfig {
    /// Client slots actually allocated by a host.
    pub fn client_slots(&self) -> usize {
        self.max_clients.min(MAX_CLIENTS)
    }

    /// Roster size, clamped to `1..=MAX_PLAYERS`.
    pub fn roster_capacity(&self) -> usize {
        self.max_players.clamp(1, MAX_PLAYERS)
    }
}
