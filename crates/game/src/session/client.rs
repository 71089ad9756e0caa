use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::level::{Checkpoint, LevelDownload, LevelStatus};
use crate::mode::GameModeKind;
use crate::net::{
    self, Connection, FrameDriver, FrameReader, GameProps, Message, PROTOCOL_VERSION, PlayerJoin,
    WaitStage, next_tick,
};
use crate::player::Player;

use super::{MAX_MESSAGES_PER_STEP, SessionCore};

/// Session mirroring a remote host.
#[derive(Debug)]
pub struct ClientSession {
    pub(super) core: SessionCore,
    connection: Option<Connection>,
    reader: FrameReader,
    client_id: u8,
    download: Option<LevelDownload>,
    level_status: LevelStatus,
    level_fresh: bool,
    send_time: u32,
    check_time: u32,
}

impl ClientSession {
    /// Connects, downloads the current level and joins the game.
    ///
    /// `driver` is called once per wait iteration and may cancel.
    pub fn join<D: FrameDriver + ?Sized>(
        config: SessionConfig,
        address: &str,
        driver: &mut D,
    ) -> NetResult<Self> {
        let mut connection = net::join(address, config.port, config.timings.timeout, driver)?;
        let mut reader = FrameReader::new();

        let props = match await_props(&mut connection, &mut reader, &config, driver) {
            Ok(props) => props,
            Err(e) => {
                connection.close();
                return Err(e);
            }
        };
        log::info!(
            "Connected to host (version {}): {} game, difficulty {}, {} of {} players",
            props.version,
            props.mode,
            props.difficulty,
            props.player_count,
            props.max_players
        );

        let core = SessionCore::new(config, props.mode, props.difficulty, props.max_players.into());
        let mut session = Self {
            core,
            connection: Some(connection),
            reader,
            client_id: props.client_id,
            download: None,
            level_status: LevelStatus::Waiting,
            level_fresh: false,
            send_time: 0,
            check_time: 0,
        };

        session.wait_for_level(driver)?;
        session.send_join();
        session.wait_for_join(driver)?;

        Ok(session)
    }

    pub fn client_id(&self) -> u8 {
        self.client_id
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    pub fn level_status(&self) -> &LevelStatus {
        &self.level_status
    }

    /// Blocks, frame by frame, until the next level has fully arrived.
    pub fn wait_for_level<D: FrameDriver + ?Sized>(&mut self, driver: &mut D) -> NetResult<LevelStatus> {
        let timeout = self.core.config.timings.timeout;
        let mut progress = self.download_progress();
        let mut deadline = next_tick(driver, self.wait_stage())?.saturating_add(timeout);

        loop {
            if self.level_fresh {
                return Ok(self.level_status.clone());
            }

            let ticks = next_tick(driver, self.wait_stage())?;
            self.step(ticks)?;

            let now = self.download_progress();
            if now != progress {
                progress = now;
                deadline = ticks.saturating_add(timeout);
            } else if ticks >= deadline {
                log::warn!("Timed out waiting for level data");
                self.close();
                return Err(NetError::Timeout);
            }
        }
    }

    fn wait_for_join<D: FrameDriver + ?Sized>(&mut self, driver: &mut D) -> NetResult<()> {
        let timeout = self.core.config.timings.timeout;
        let deadline = next_tick(driver, WaitStage::Joining)?.saturating_add(timeout);

        while self.core.local_player.is_none() {
            let ticks = next_tick(driver, WaitStage::Joining)?;
            self.step(ticks)?;
            if ticks >= deadline {
                log::warn!("Timed out waiting for join acknowledgement");
                self.close();
                return Err(NetError::Timeout);
            }
        }
        Ok(())
    }

    fn wait_stage(&self) -> WaitStage {
        match &self.download {
            Some(download) => WaitStage::Downloading {
                bytes: download.bytes_written(),
            },
            None => WaitStage::AwaitingLevel,
        }
    }

    fn download_progress(&self) -> Option<usize> {
        self.download.as_ref().map(LevelDownload::bytes_written)
    }

    fn send_join(&mut self) {
        let profile = self.core.config.player.clone().unwrap_or_default();
        self.send(&Message::PlayerJoin(PlayerJoin {
            client_id: self.client_id,
            player: 0,
            team: 0,
            colors: profile.colors,
            name: profile.name,
        }));
    }

    /// Reports the level the host is serving; a finished download is
    /// reported once, after which the client waits for the next one.
    pub fn set_level(&mut self) -> LevelStatus {
        if self.level_fresh {
            self.level_fresh = false;
            return self.level_status.clone();
        }
        if self.level_status == LevelStatus::Ended {
            return LevelStatus::Ended;
        }
        match &self.download {
            Some(download) => LevelStatus::Downloading {
                bytes: download.bytes_written(),
            },
            None => LevelStatus::Waiting,
        }
    }

    pub fn send(&mut self, message: &Message) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(e) = connection.send(&message.encode()) {
            log::debug!("Send to host failed: {}", e);
        }
    }

    pub fn score(&mut self, team: u8) {
        self.send(&Message::Score { team });
        self.core.roster.add_team_score(team);
    }

    pub fn set_checkpoint(&mut self, x: u16, y: u16) {
        let checkpoint = Checkpoint { x, y };
        if self.core.checkpoint == checkpoint {
            return;
        }
        self.core.checkpoint = checkpoint;
        self.send(&Message::Checkpoint { x, y });
    }

    pub fn step(&mut self, ticks: u32) -> NetResult<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        // Send errors surface through the connection check
        let _ = connection.flush();

        let mut frames = Vec::new();
        let mut malformed = None;
        for _ in 0..MAX_MESSAGES_PER_STEP {
            match self.reader.poll(connection) {
                Ok(Some(frame)) => {
                    connection.record_received(frame.len());
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    malformed = Some(e);
                    break;
                }
            }
        }

        for frame in frames {
            match Message::decode(&frame) {
                Ok(message) => {
                    if let Err(e) = self.handle(message) {
                        self.close();
                        return Err(e);
                    }
                }
                Err(e) => log::warn!("Ignoring message from host: {}", e),
            }
        }

        if let Some(e) = malformed {
            log::warn!("Host sent a malformed message: {}", e);
            self.close();
            return Err(e);
        }

        if ticks >= self.check_time {
            let alive = self
                .connection
                .as_mut()
                .is_some_and(|connection| connection.is_connected());
            if !alive {
                log::warn!("Lost connection to host");
                self.close();
                return Err(NetError::Disconnected);
            }
            self.check_time = ticks.saturating_add(self.core.config.timings.client_check);
        }

        if ticks >= self.send_time {
            if let Some(index) = self.core.local_index() {
                if let Some(player) = self.core.roster.get(index) {
                    let message = player.temp_message(index as u8);
                    self.send(&message);
                }
            }
            self.send_time = ticks.saturating_add(self.core.config.timings.client_send);
        }

        Ok(())
    }

    fn handle(&mut self, message: Message) -> NetResult<()> {
        match message {
            Message::LevelChunk { offset, data } => self.receive_chunk(offset, &data)?,
            Message::PlayerJoin(join) => self.player_joined(join),
            Message::PlayerQuit { player } => {
                let index = usize::from(player);
                if let Some((id, removed)) = self.core.roster.remove(index) {
                    log::info!("Player {} ({}) left the game", index, removed.name);
                    if self.core.local_player == Some(id) {
                        log::warn!("Host removed the local player");
                        self.core.local_player = None;
                    }
                }
            }
            Message::Checkpoint { x, y } => self.core.checkpoint = Checkpoint { x, y },
            Message::Score { team } => self.core.roster.add_team_score(team),
            Message::LevelType(level_type) => self.core.level_type = level_type,
            Message::Level(level_message) => self.core.deliver_level(&level_message),
            Message::Player { player, message } => {
                match self.core.roster.get_mut(usize::from(player)) {
                    Some(target) => target.receive(&message),
                    None => log::debug!("State for unknown player {}", player),
                }
            }
            Message::Props(_) => log::debug!("Ignoring repeated game properties"),
        }
        Ok(())
    }

    fn receive_chunk(&mut self, offset: u16, data: &[u8]) -> NetResult<()> {
        // Offset 0 always starts a new transfer; the host restarts on a level switch
        if offset == 0 && self.download.take().is_some() {
            log::info!("Host switched level, restarting download");
        }
        let first = self.download.is_none();
        if first {
            self.download = Some(LevelDownload::create(self.core.config.staging_path.clone())?);
            self.level_status = LevelStatus::Downloading { bytes: 0 };
        }
        let Some(download) = self.download.as_mut() else {
            return Ok(());
        };

        download.write_chunk(offset, data)?;
        if !data.is_empty() {
            self.level_status = LevelStatus::Downloading {
                bytes: download.bytes_written(),
            };
            return Ok(());
        }

        let Some(download) = self.download.take() else {
            return Ok(());
        };
        let bytes = download.bytes_written();
        let path = download.finish()?;
        self.level_status = if first {
            log::info!("Host has no further level");
            LevelStatus::Ended
        } else {
            log::info!("Level download complete ({} bytes)", bytes);
            LevelStatus::Ready {
                path,
                level_type: self.core.level_type,
            }
        };
        self.level_fresh = true;
        Ok(())
    }

    fn player_joined(&mut self, join: PlayerJoin) {
        let index = usize::from(join.player);
        let mut player = Player::from_join(&join);
        player.reset();

        let Some(id) = self.core.roster.fill_to(index, player) else {
            log::warn!("Join for player {} beyond roster of {}", index, self.core.roster.capacity());
            return;
        };
        log::info!("Player {} ({}) joined team {}", index, join.name, join.team);

        if join.client_id == self.client_id {
            self.core.local_player = Some(id);
        }
    }

    /// Closes the socket and abandons any partial download.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.download = None;
        self.reader.reset();
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn await_props<D: FrameDriver + ?Sized>(
    connection: &mut Connection,
    reader: &mut FrameReader,
    config: &SessionConfig,
    driver: &mut D,
) -> NetResult<GameProps> {
    let timeout = config
        .timings
        .server_check
        .saturating_add(config.timings.timeout);
    let deadline = next_tick(driver, WaitStage::AwaitingReply)?.saturating_add(timeout);

    loop {
        if let Some(frame) = reader.poll(connection)? {
            return validate_props(&frame);
        }

        let ticks = next_tick(driver, WaitStage::AwaitingReply)?;
        if ticks >= deadline {
            log::warn!("Timed out waiting for game properties");
            return Err(NetError::Timeout);
        }
    }
}

fn validate_props(frame: &[u8]) -> NetResult<GameProps> {
    let props = match Message::decode(frame)? {
        Message::Props(props) => props,
        other => {
            return Err(NetError::Data(format!(
                "expected game properties, got {:?}",
                other.message_type()
            )));
        }
    };

    if props.version != PROTOCOL_VERSION {
        return Err(NetError::Version {
            expected: PROTOCOL_VERSION,
            found: props.version,
        });
    }
    if props.player_count > props.max_players {
        return Err(NetError::Data(format!(
            "{} players exceed the maximum of {}",
            props.player_count, props.max_players
        )));
    }
    if props.mode == GameModeKind::Single {
        return Err(NetError::Data("host is running a single player game".into()));
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props_frame(version: u8, mode: u8, max: u8, count: u8) -> Vec<u8> {
        vec![8, 0x00, version, mode, 1, max, count, 3]
    }

    #[test]
    fn test_valid_props() {
        let props = validate_props(&props_frame(1, 2, 32, 4)).unwrap();
        assert_eq!(props.mode, GameModeKind::Battle);
        assert_eq!(props.client_id, 3);
    }

    #[test]
    fn test_version_mismatch() {
        assert!(matches!(
            validate_props(&props_frame(2, 1, 32, 0)),
            Err(NetError::Version {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn test_invalid_props() {
        assert!(matches!(
            validate_props(&props_frame(1, 1, 2, 3)),
            Err(NetError::Data(_))
        ));
        assert!(matches!(
            validate_props(&props_frame(1, 0, 32, 0)),
            Err(NetError::Data(_))
        ));
        assert!(matches!(
            validate_props(&props_frame(1, 7, 32, 0)),
            Err(NetError::Data(_))
        ));
        assert!(matches!(
            validate_props(&[3, 0x05, 0]),
            Err(NetError::Data(_))
        ));
    }
}
