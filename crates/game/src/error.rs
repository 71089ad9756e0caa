use std::io;

use crate::net::PacketError;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("could not create socket: {0}")]
    Socket(#[source] io::Error),
    #[error("could not bind to port: {0}")]
    Bind(#[source] io::Error),
    #[error("could not listen for connections: {0}")]
    Listen(#[source] io::Error),
    #[error("invalid address: {0}")]
    Address(String),
    #[error("could not connect to server: {0}")]
    Connect(#[source] io::Error),
    #[error("disconnected")]
    Disconnected,
    #[error("timed out")]
    Timeout,
    #[error("malformed data: {0}")]
    Data(String),
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    Version { expected: u8, found: u8 },
    #[error("level file error: {0}")]
    File(#[source] io::Error),
    #[error("{0}")]
    Other(String),
    #[error("cancelled")]
    Cancelled,
    #[error("quit requested")]
    Quit,
}

impl NetError {
    /// Negative status code reported to the menu layer.
    pub fn code(&self) -> i32 {
        match self {
            NetError::Quit => -1,
            NetError::Cancelled => -2,
            NetError::File(_) => -4,
            NetError::Socket(_) => -6,
            NetError::Bind(_) => -7,
            NetError::Listen(_) => -8,
            NetError::Address(_) => -9,
            NetError::Connect(_) => -10,
            NetError::Disconnected | NetError::Other(_) => -11,
            NetError::Timeout => -12,
            NetError::Version { .. } => -13,
            NetError::Data(_) => -14,
        }
    }

    /// True for errors caused by the user backing out of a wait.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, NetError::Cancelled | NetError::Quit)
    }
}

impl From<PacketError> for NetError {
    fn from(err: PacketError) -> Self {
        NetError::Data(err.to_string())
    }
}
