use std::net::SocketAddr;

use crate::net::{Connection, FrameReader, NetworkStats};
use crate::roster::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    NotConnected,
    /// Level bytes before `offset` have been queued.
    Streaming { offset: usize, announced: bool },
    Operational,
}

/// Host-side record for one potential client.
#[derive(Debug)]
pub(super) struct Slot {
    pub(super) id: u8,
    pub(super) status: SlotStatus,
    pub(super) connection: Option<Connection>,
    pub(super) reader: FrameReader,
    pub(super) player: Option<PlayerId>,
}

impl Slot {
    pub(super) fn new(id: u8) -> Self {
        Self {
            id,
            status: SlotStatus::NotConnected,
            connection: None,
            reader: FrameReader::new(),
            player: None,
        }
    }

    pub(super) fn attach(&mut self, connection: Connection) {
        self.connection = Some(connection);
        self.status = SlotStatus::Streaming {
            offset: 0,
            announced: false,
        };
        self.reader.reset();
        self.player = None;
    }

    /// Closes the socket; returns the player the slot owned.
    pub(super) fn disconnect(&mut self) -> Option<PlayerId> {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.status = SlotStatus::NotConnected;
        self.reader.reset();
        self.player.take()
    }

    pub(super) fn is_connected(&self) -> bool {
        self.status != SlotStatus::NotConnected
    }

    /// Clients are heard once their level is down or they own a player.
    pub(super) fn accepts_input(&self) -> bool {
        self.status == SlotStatus::Operational || self.player.is_some()
    }

    pub(super) fn restart_stream(&mut self) {
        if self.is_connected() {
            self.status = SlotStatus::Streaming {
                offset: 0,
                announced: false,
            };
        }
    }

    pub(super) fn send(&mut self, bytes: &[u8]) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(e) = connection.send(bytes) {
            log::debug!("Send to client {} failed: {}", self.id, e);
        }
    }
}

/// Snapshot of a slot for status displays.
#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub id: u8,
    pub status: SlotStatus,
    pub peer: Option<SocketAddr>,
    pub player: Option<usize>,
    pub stats: NetworkStats,
}
