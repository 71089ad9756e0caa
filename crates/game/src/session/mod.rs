mod client;
mod event;
mod host;
mod local;
mod slot;

pub use client::ClientSession;
pub use event::{DisconnectReason, HostEvent};
pub use host::HostSession;
pub use local::LocalSession;
pub use slot::{SlotInfo, SlotStatus};

use crate::config::SessionConfig;
use crate::error::NetResult;
use crate::level::{Checkpoint, LevelHandler, LevelStatus, LevelType};
use crate::mode::{GameModeKind, KillOutcome, LevelExit, ModePolicy, create_mode};
use crate::net::{FrameDriver, Message};
use crate::player::Player;
use crate::roster::{PlayerId, Roster};

/// Upper bound on messages taken from one stream per `step`.
pub const MAX_MESSAGES_PER_STEP: usize = 64;

/// State every role keeps: who is playing, how, and where.
pub(crate) struct SessionCore {
    config: SessionConfig,
    mode: Box<dyn ModePolicy>,
    difficulty: u8,
    roster: Roster,
    local_player: Option<PlayerId>,
    checkpoint: Checkpoint,
    level: Option<Box<dyn LevelHandler>>,
    level_type: LevelType,
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("mode", &self.mode)
            .field("difficulty", &self.difficulty)
            .field("players", &self.roster.len())
            .field("local_player", &self.local_player)
            .field("checkpoint", &self.checkpoint)
            .field("level_attached", &self.level.is_some())
            .field("level_type", &self.level_type)
            .finish()
    }
}

impl SessionCore {
    fn new(config: SessionConfig, mode: GameModeKind, difficulty: u8, capacity: usize) -> Self {
        Self {
            config,
            mode: create_mode(mode),
            difficulty,
            roster: Roster::new(capacity),
            local_player: None,
            checkpoint: Checkpoint::default(),
            level: None,
            level_type: LevelType::default(),
        }
    }

    /// Adds the configured local player, if there is one.
    fn add_local_player(&mut self) -> Option<usize> {
        let profile = self.config.player.clone()?;
        let team = self.mode.choose_team(&self.roster);
        let (id, index) = self.roster.push(Player::from_profile(&profile, team))?;
        self.local_player = Some(id);
        Some(index)
    }

    fn local_index(&self) -> Option<usize> {
        self.local_player.and_then(|id| self.roster.index_of(id))
    }

    fn deliver_level(&mut self, message: &crate::net::LevelMessage) {
        match self.level.as_mut() {
            Some(level) => level.receive(message),
            None => log::debug!("No level attached, dropping {:?}", message),
        }
    }
}

/// A running game, in whichever role this process plays.
#[derive(Debug)]
pub enum Session {
    Local(LocalSession),
    Host(HostSession),
    Client(ClientSession),
}

impl Session {
    pub fn local(config: SessionConfig, first_level: &str) -> Self {
        Session::Local(LocalSession::new(config, first_level))
    }

    pub fn host(config: SessionConfig, first_level: Option<&str>) -> NetResult<Self> {
        HostSession::start(config, first_level).map(Session::Host)
    }

    pub fn join<D: FrameDriver + ?Sized>(
        config: SessionConfig,
        address: &str,
        driver: &mut D,
    ) -> NetResult<Self> {
        ClientSession::join(config, address, driver).map(Session::Client)
    }

    fn core(&self) -> &SessionCore {
        match self {
            Session::Local(s) => &s.core,
            Session::Host(s) => &s.core,
            Session::Client(s) => &s.core,
        }
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        match self {
            Session::Local(s) => &mut s.core,
            Session::Host(s) => &mut s.core,
            Session::Client(s) => &mut s.core,
        }
    }

    pub fn send(&mut self, message: &Message) {
        match self {
            Session::Local(_) => {}
            Session::Host(s) => s.send(message),
            Session::Client(s) => s.send(message),
        }
    }

    pub fn step(&mut self, ticks: u32) -> NetResult<()> {
        match self {
            Session::Local(_) => Ok(()),
            Session::Host(s) => s.step(ticks),
            Session::Client(s) => s.step(ticks),
        }
    }

    /// Moves to the next level.
    ///
    /// A host loads `file` (or `None` to end the run) and streams it to
    /// every client. A client cannot choose: `file` is ignored and the
    /// status of whatever the host is sending is returned instead.
    pub fn set_level(&mut self, file: Option<&str>) -> NetResult<LevelStatus> {
        match self {
            Session::Local(s) => Ok(s.set_level(file)),
            Session::Host(s) => s.set_level(file),
            Session::Client(s) => Ok(s.set_level()),
        }
    }

    pub fn score(&mut self, team: u8) {
        match self {
            Session::Local(_) => {}
            Session::Host(s) => s.score(team),
            Session::Client(s) => s.score(team),
        }
    }

    pub fn set_checkpoint(&mut self, x: u16, y: u16) {
        match self {
            Session::Local(s) => s.set_checkpoint(x, y),
            Session::Host(s) => s.set_checkpoint(x, y),
            Session::Client(s) => s.set_checkpoint(x, y),
        }
    }

    pub fn mode(&self) -> &dyn ModePolicy {
        self.core().mode.as_ref()
    }

    pub fn difficulty(&self) -> u8 {
        self.core().difficulty
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.core().checkpoint
    }

    pub fn level_type(&self) -> LevelType {
        self.core().level_type
    }

    pub fn roster(&self) -> &Roster {
        &self.core().roster
    }

    pub fn local_player(&self) -> Option<&Player> {
        let core = self.core();
        core.local_player.and_then(|id| core.roster.by_id(id))
    }

    pub fn local_player_mut(&mut self) -> Option<&mut Player> {
        let core = self.core_mut();
        let id = core.local_player?;
        core.roster.by_id_mut(id)
    }

    pub fn local_index(&self) -> Option<usize> {
        self.core().local_index()
    }

    pub fn attach_level(&mut self, level: Box<dyn LevelHandler>) {
        self.core_mut().level = Some(level);
    }

    pub fn detach_level(&mut self) -> Option<Box<dyn LevelHandler>> {
        self.core_mut().level.take()
    }

    pub fn hit(&self, source: Option<usize>, victim: usize) -> bool {
        let roster = self.roster();
        let Some(victim) = roster.get(victim) else {
            return false;
        };
        let source = source.and_then(|i| roster.get(i));
        self.mode().hit(source, victim)
    }

    /// Applies the mode's kill rule, scoring for the killer's team when
    /// the local player was the victim.
    pub fn kill(&mut self, source: Option<usize>, victim: usize) -> KillOutcome {
        let core = self.core();
        let Some(victim_player) = core.roster.get(victim) else {
            return KillOutcome {
                finalize: true,
                award_team: None,
            };
        };
        let victim_is_local = core.local_index() == Some(victim);
        let source = source.and_then(|i| core.roster.get(i));
        let outcome = core.mode.kill(source, victim_player, victim_is_local);

        if let Some(team) = outcome.award_team {
            self.score(team);
        }
        outcome
    }

    /// Applies the mode's level-exit rule for the player at `index`.
    ///
    /// Checkpoint, scoring and player reset are done here; ending the
    /// level and removing the exit sign are left to the caller.
    pub fn end_of_level(&mut self, index: usize, x: u16, y: u16) -> Option<LevelExit> {
        let core = self.core();
        let player = core.roster.get(index)?;
        let is_local = core.local_index() == Some(index);
        let exit = core.mode.end_of_level(player, is_local, x, y);

        if let Some(checkpoint) = exit.checkpoint {
            self.set_checkpoint(checkpoint.x, checkpoint.y);
        }
        if let Some(team) = exit.score_team {
            self.score(team);
        }
        if exit.reset_player {
            self.reset_player(index);
        }
        Some(exit)
    }

    pub fn reset_player(&mut self, index: usize) {
        let checkpoint = self.checkpoint();
        if let Some(player) = self.core_mut().roster.get_mut(index) {
            player.reset_to(checkpoint);
        }
    }

    pub fn out_of_time(&self) {
        self.mode().out_of_time();
    }

    pub fn close(&mut self) {
        match self {
            Session::Local(_) => {}
            Session::Host(s) => s.shutdown(),
            Session::Client(s) => s.close(),
        }
    }
}
