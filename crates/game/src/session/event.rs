use std::net::SocketAddr;

/// Things a host did that a status display may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    ClientConnected {
        slot: u8,
        addr: SocketAddr,
    },
    LevelSent {
        slot: u8,
        bytes: usize,
    },
    PlayerJoined {
        slot: u8,
        player: usize,
        team: u8,
        name: String,
    },
    PlayerLeft {
        slot: u8,
        player: usize,
    },
    ClientDisconnected {
        slot: u8,
        reason: DisconnectReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Lost,
    Kicked,
    RosterFull,
    Malformed,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Lost => "disconnected",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::RosterFull => "rejected, game full",
            DisconnectReason::Malformed => "dropped for malformed data",
            DisconnectReason::Shutdown => "closed on shutdown",
        }
    }
}
