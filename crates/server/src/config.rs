use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use tilenet::{GameModeKind, PlayerProfile, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Coop,
    Battle,
    TeamBattle,
    Race,
}

impl From<ModeArg> for GameModeKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Coop => GameModeKind::Coop,
            ModeArg::Battle => GameModeKind::Battle,
            ModeArg::TeamBattle => GameModeKind::TeamBattle,
            ModeArg::Race => GameModeKind::Race,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct PlayerArgs {
    #[arg(long, help = "Local player name")]
    pub name: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Four colour indices, e.g. 16,24,32,40")]
    pub colors: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Args)]
pub struct HostArgs {
    /// Level file to serve first
    pub level: Option<PathBuf>,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(short, long)]
    pub mode: Option<ModeArg>,

    #[arg(long)]
    pub difficulty: Option<u8>,

    #[arg(long)]
    pub max_clients: Option<usize>,

    #[arg(long)]
    pub max_players: Option<usize>,

    #[arg(long, help = "Host without a local player")]
    pub dedicated: bool,

    #[command(flatten)]
    pub player: PlayerArgs,
}

#[derive(Debug, Clone, Args)]
pub struct JoinArgs {
    /// Host IPv4 or IPv6 address
    pub address: String,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long, help = "Where the downloaded level is written")]
    pub staging: Option<PathBuf>,

    #[command(flatten)]
    pub player: PlayerArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LocalArgs {
    /// Level file to play
    pub level: String,

    #[command(flatten)]
    pub player: PlayerArgs,
}

/// Reads a JSON session config, or returns the defaults without a path.
pub fn load(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

impl PlayerArgs {
    pub fn apply(&self, config: &mut SessionConfig) -> Result<()> {
        if self.name.is_none() && self.colors.is_none() {
            return Ok(());
        }

        let mut profile = config.player.clone().unwrap_or_default();
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(colors) = &self.colors {
            let Ok(colors) = <[u8; 4]>::try_from(colors.as_slice()) else {
                bail!("expected four colours, got {}", colors.len());
            };
            profile.colors = colors;
        }
        config.player = Some(profile);
        Ok(())
    }
}

impl HostArgs {
    pub fn apply(&self, config: &mut SessionConfig) -> Result<()> {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(max_players) = self.max_players {
            config.max_players = max_players;
        }

        if self.dedicated {
            config.player = None;
            Ok(())
        } else {
            if config.player.is_none() {
                config.player = Some(PlayerProfile::default());
            }
            self.player.apply(config)
        }
    }
}

impl JoinArgs {
    pub fn apply(&self, config: &mut SessionConfig) -> Result<()> {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(staging) = &self.staging {
            config.staging_path = staging.clone();
        }
        self.player.apply(config)
    }
}
