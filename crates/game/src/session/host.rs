use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::level::{Checkpoint, LevelBlob, LevelStatus};
use crate::net::{
    Category, GameProps, Listener, Message, NO_CLIENT, NetworkStats, PROTOCOL_VERSION, PlayerJoin,
    PlayerMessage,
};
use crate::player::Player;

use super::event::{DisconnectReason, HostEvent};
use super::slot::{Slot, SlotInfo, SlotStatus};
use super::{MAX_MESSAGES_PER_STEP, SessionCore};

/// Authoritative session that accepts clients and streams them the level.
#[derive(Debug)]
pub struct HostSession {
    pub(super) core: SessionCore,
    listener: Listener,
    slots: Vec<Slot>,
    level_data: Option<LevelBlob>,
    send_time: u32,
    check_time: u32,
    pending_events: VecDeque<HostEvent>,
}

impl HostSession {
    /// Opens the listener and loads the first level, if any.
    pub fn start(config: SessionConfig, first_level: Option<&str>) -> NetResult<Self> {
        let level = first_level.map(LevelBlob::load).transpose()?;
        Self::with_level(config, level)
    }

    pub fn with_level(config: SessionConfig, level: Option<LevelBlob>) -> NetResult<Self> {
        if !config.mode.is_networked() {
            return Err(NetError::Other(format!("{} mode cannot be hosted", config.mode)));
        }

        let listener = Listener::host(config.port)?;

        let slots = (0..config.client_slots()).map(|id| Slot::new(id as u8)).collect();
        let mode = config.mode;
        let difficulty = config.difficulty;
        let capacity = config.roster_capacity();
        let mut core = SessionCore::new(config, mode, difficulty, capacity);
        if let Some(level) = &level {
            core.level_type = level.level_type();
        }
        match core.add_local_player() {
            Some(index) => log::info!("Local player is player {}", index),
            None => log::info!("Running as a dedicated host"),
        }

        log::info!("Hosting {} game on {}", mode, listener.local_addr()?);

        Ok(Self {
            core,
            listener,
            slots,
            level_data: level,
            send_time: 0,
            check_time: 0,
            pending_events: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = HostEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn level(&self) -> Option<&LevelBlob> {
        self.level_data.as_ref()
    }

    /// Switches level and restarts streaming to every connected client.
    pub fn set_level(&mut self, file: Option<&str>) -> NetResult<LevelStatus> {
        let level = file.map(LevelBlob::load).transpose()?;
        Ok(self.set_level_data(level))
    }

    pub fn set_level_data(&mut self, level: Option<LevelBlob>) -> LevelStatus {
        for slot in &mut self.slots {
            slot.restart_stream();
        }

        self.level_data = level;
        match &self.level_data {
            Some(level) => {
                log::info!("Level set to {} ({} bytes)", level.name(), level.len());
                self.core.level_type = level.level_type();
                LevelStatus::Ready {
                    path: PathBuf::from(level.name()),
                    level_type: level.level_type(),
                }
            }
            None => {
                log::info!("No further level");
                LevelStatus::Ended
            }
        }
    }

    pub fn send(&mut self, message: &Message) {
        self.broadcast(message, None);
    }

    pub fn score(&mut self, team: u8) {
        self.broadcast(&Message::Score { team }, None);
        self.core.roster.add_team_score(team);
    }

    pub fn set_checkpoint(&mut self, x: u16, y: u16) {
        let checkpoint = Checkpoint { x, y };
        if self.core.checkpoint == checkpoint {
            return;
        }
        self.core.checkpoint = checkpoint;
        self.broadcast(&Message::Checkpoint { x, y }, None);
    }

    pub fn step(&mut self, ticks: u32) -> NetResult<()> {
        let check = ticks >= self.check_time;

        for index in 0..self.slots.len() {
            if let Some(connection) = self.slots[index].connection.as_mut() {
                // Send errors surface through the next connection check
                let _ = connection.flush();
            }

            self.stream_level(index);
            self.receive(index);

            if check {
                self.check_slot(index);
            }
        }

        if check {
            self.check_time = ticks.saturating_add(self.core.config.timings.server_check);
        }

        if ticks >= self.send_time {
            for index in 0..self.core.roster.len() {
                if let Some(player) = self.core.roster.get(index) {
                    let message = player.temp_message(index as u8);
                    self.broadcast(&message, None);
                }
            }
            self.send_time = ticks.saturating_add(self.core.config.timings.server_send);
        }

        Ok(())
    }

    fn stream_level(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let SlotStatus::Streaming { offset, announced } = slot.status else {
            return;
        };
        let Some(connection) = slot.connection.as_mut() else {
            return;
        };
        if connection.pending_bytes() > 0 {
            return;
        }

        if !announced {
            if let Some(level) = &self.level_data {
                let _ = connection.send(&Message::LevelType(level.level_type()).encode());
            }
        }

        let chunk = match &self.level_data {
            Some(level) => level.chunk(offset),
            None => &[],
        };
        let message = Message::LevelChunk {
            offset: offset as u16,
            data: chunk.to_vec(),
        };
        if let Err(e) = connection.send(&message.encode()) {
            log::debug!("Level chunk to client {} failed: {}", slot.id, e);
            return;
        }

        if chunk.is_empty() {
            slot.status = SlotStatus::Operational;
            log::info!("Client {} received the level ({} bytes)", slot.id, offset);
            self.pending_events.push_back(HostEvent::LevelSent {
                slot: slot.id,
                bytes: offset,
            });
        } else {
            slot.status = SlotStatus::Streaming {
                offset: offset + chunk.len(),
                announced: true,
            };
        }
    }

    fn receive(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if !slot.accepts_input() {
            return;
        }
        let Some(connection) = slot.connection.as_mut() else {
            return;
        };

        let mut frames = Vec::new();
        let mut malformed = false;
        for _ in 0..MAX_MESSAGES_PER_STEP {
            match slot.reader.poll(connection) {
                Ok(Some(frame)) => {
                    connection.record_received(frame.len());
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Client {} sent a malformed message: {}", slot.id, e);
                    malformed = true;
                    break;
                }
            }
        }

        for frame in frames {
            match Message::decode(&frame) {
                Ok(message) => self.handle(index, message),
                Err(e) => log::warn!("Ignoring message from client {}: {}", index, e),
            }
            if !self.slots[index].is_connected() {
                return;
            }
        }

        if malformed {
            self.drop_slot(index, DisconnectReason::Malformed);
        }
    }

    fn handle(&mut self, index: usize, message: Message) {
        match message {
            Message::PlayerJoin(join) => self.admit_player(index, join),
            Message::Checkpoint { x, y } => {
                self.core.checkpoint = Checkpoint { x, y };
                self.broadcast(&message, Some(index));
            }
            Message::Score { team } => {
                self.core.roster.add_team_score(team);
                self.broadcast(&message, Some(index));
            }
            Message::Level(level_message) => {
                self.core.deliver_level(&level_message);
                self.broadcast(&Message::Level(level_message), Some(index));
            }
            Message::Player { message, .. } => self.relay_player(index, message),
            other => log::debug!("Ignoring {:?} from client {}", other.message_type(), index),
        }
    }

    fn admit_player(&mut self, index: usize, join: PlayerJoin) {
        if self.slots[index].player.is_some() {
            log::debug!("Client {} sent a second join", index);
            return;
        }
        if self.core.roster.is_full() {
            log::warn!("Roster full, rejecting client {}", index);
            self.drop_slot(index, DisconnectReason::RosterFull);
            return;
        }

        let team = self.core.mode.choose_team(&self.core.roster);
        let mut player = Player::new(join.name, join.colors, team);
        player.reset();
        let Some((id, player_index)) = self.core.roster.push(player) else {
            return;
        };
        self.slots[index].player = Some(id);

        let Some(player) = self.core.roster.get(player_index) else {
            return;
        };
        log::info!(
            "Player {} ({}) joined team {} from client {}",
            player_index,
            player.name,
            team,
            index
        );
        self.pending_events.push_back(HostEvent::PlayerJoined {
            slot: index as u8,
            player: player_index,
            team,
            name: player.name.clone(),
        });

        let ack = player.join_message(index as u8, player_index as u8);
        self.broadcast(&ack, None);
    }

    fn relay_player(&mut self, index: usize, message: PlayerMessage) {
        let Some(player_index) = self.slot_player_index(index) else {
            log::debug!("Client {} sent player state before joining", index);
            return;
        };
        if let Some(player) = self.core.roster.get_mut(player_index) {
            player.receive(&message);
        }
        let relayed = Message::Player {
            player: player_index as u8,
            message,
        };
        self.broadcast(&relayed, Some(index));
    }

    fn check_slot(&mut self, index: usize) {
        if self.slots[index].is_connected() {
            let alive = self.slots[index]
                .connection
                .as_mut()
                .is_some_and(|connection| connection.is_connected());
            if !alive {
                self.drop_slot(index, DisconnectReason::Lost);
            }
            return;
        }

        if self.level_data.is_none() {
            return;
        }
        if let Some(connection) = self.listener.accept() {
            self.admit_client(index, connection);
        }
    }

    fn admit_client(&mut self, index: usize, mut connection: crate::net::Connection) {
        let addr = connection.peer_addr();
        log::info!("Client {} connected from {}", index, addr);

        let props = Message::Props(GameProps {
            version: PROTOCOL_VERSION,
            mode: self.core.mode.kind(),
            difficulty: self.core.difficulty,
            max_players: self.core.roster.capacity() as u8,
            player_count: self.core.roster.len() as u8,
            client_id: index as u8,
        });
        let checkpoint = Message::Checkpoint {
            x: self.core.checkpoint.x,
            y: self.core.checkpoint.y,
        };

        let mut greeting = vec![props, checkpoint];
        for (player_index, (id, player)) in self.core.roster.iter_with_ids().enumerate() {
            let owner = self
                .slots
                .iter()
                .find(|slot| slot.player == Some(id))
                .map_or(NO_CLIENT, |slot| slot.id);
            greeting.push(player.join_message(owner, player_index as u8));
        }

        for message in &greeting {
            if let Err(e) = connection.send(&message.encode()) {
                log::warn!("Could not greet client {}: {}", index, e);
                connection.close();
                return;
            }
        }

        self.slots[index].attach(connection);
        self.pending_events.push_back(HostEvent::ClientConnected {
            slot: index as u8,
            addr,
        });
    }

    fn drop_slot(&mut self, index: usize, reason: DisconnectReason) {
        let slot = &mut self.slots[index];
        if !slot.is_connected() {
            return;
        }
        let player_index = slot
            .player
            .and_then(|id| self.core.roster.index_of(id));
        slot.disconnect();
        log::info!("Client {} {}", index, reason.as_str());
        self.pending_events.push_back(HostEvent::ClientDisconnected {
            slot: index as u8,
            reason,
        });

        if let Some(player_index) = player_index {
            self.core.roster.remove(player_index);
            log::info!("Player {} (client {}) left the game", player_index, index);
            self.pending_events.push_back(HostEvent::PlayerLeft {
                slot: index as u8,
                player: player_index,
            });
            self.broadcast(
                &Message::PlayerQuit {
                    player: player_index as u8,
                },
                None,
            );
        }
    }

    pub fn kick(&mut self, slot: u8) {
        if usize::from(slot) < self.slots.len() {
            self.drop_slot(usize::from(slot), DisconnectReason::Kicked);
        }
    }

    fn slot_player_index(&self, index: usize) -> Option<usize> {
        self.slots[index]
            .player
            .and_then(|id| self.core.roster.index_of(id))
    }

    /// Sends to every connected slot except `except`. A player message is
    /// never sent to the slot owning the addressed player.
    fn broadcast(&mut self, message: &Message, except: Option<usize>) {
        let bytes = message.encode();
        let addressed = match message.category() {
            Category::Player => message.player_index().map(usize::from),
            _ => None,
        };

        for index in 0..self.slots.len() {
            if Some(index) == except || !self.slots[index].is_connected() {
                continue;
            }
            if addressed.is_some() && addressed == self.slot_player_index(index) {
                continue;
            }
            self.slots[index].send(&bytes);
        }
    }

    pub fn slot_infos(&self) -> Vec<SlotInfo> {
        self.slots
            .iter()
            .map(|slot| SlotInfo {
                id: slot.id,
                status: slot.status,
                peer: slot.connection.as_ref().map(|c| c.peer_addr()),
                player: slot.player.and_then(|id| self.core.roster.index_of(id)),
                stats: slot
                    .connection
                    .as_ref()
                    .map(|c| *c.stats())
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut total = NetworkStats::default();
        for connection in self.slots.iter().filter_map(|slot| slot.connection.as_ref()) {
            total.merge(connection.stats());
        }
        total
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_connected()).count()
    }

    pub fn shutdown(&mut self) {
        for index in 0..self.slots.len() {
            self.drop_slot(index, DisconnectReason::Shutdown);
        }
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            slot.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::GameModeKind;

    fn config() -> SessionConfig {
        SessionConfig {
            port: 0,
            max_clients: 4,
            player: None,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_single_mode_cannot_be_hosted() {
        let config = SessionConfig {
            mode: GameModeKind::Single,
            ..config()
        };
        assert!(matches!(
            HostSession::with_level(config, None),
            Err(NetError::Other(_))
        ));
    }

    #[test]
    fn test_missing_level_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LEVEL9.000");
        let result = HostSession::start(config(), path.to_str());
        assert!(matches!(result, Err(NetError::File(_))));
    }

    #[test]
    fn test_checkpoint_is_idempotent() {
        let mut host = HostSession::with_level(config(), None).unwrap();
        host.set_checkpoint(12, 7);
        host.set_checkpoint(12, 7);
        assert_eq!(host.core.checkpoint, Checkpoint { x: 12, y: 7 });
    }

    #[test]
    fn test_host_player_joins_roster() {
        let config = SessionConfig {
            player: Some(crate::player::PlayerProfile::default()),
            ..config()
        };
        let host = HostSession::with_level(config, None).unwrap();
        assert_eq!(host.core.roster.len(), 1);
        assert_eq!(host.slot_infos().len(), 4);
        assert_eq!(host.connected_count(), 0);
    }

    #[test]
    fn test_set_level_reports_type() {
        let mut host = HostSession::with_level(config(), None).unwrap();
        let blob = LevelBlob::from_bytes("BONUSMAP.001", vec![1; 10]).unwrap();
        let status = host.set_level_data(Some(blob));
        assert!(matches!(
            status,
            LevelStatus::Ready {
                level_type: crate::level::LevelType::Bonus,
                ..
            }
        ));
        assert_eq!(host.set_level_data(None), LevelStatus::Ended);
    }
}
