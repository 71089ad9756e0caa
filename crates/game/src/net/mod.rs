mod framing;
mod protocol;
mod stats;
mod transport;
mod wait;

pub(crate) use wait::next_tick;

pub use framing::{ByteSource, FrameReader};
pub use protocol::{
    BUFFER_LENGTH, Category, GameProps, GridChange, GridField, HEADER_LEN, LEVEL_CHUNK_LEN,
    LEVEL_HEADER_LEN, LevelMessage, LevelProp, MAX_CLIENTS, MAX_NAME_LEN, MAX_PLAYERS, Message,
    MessageType, NET_PORT, NO_CLIENT, PLAYER_ANIMS, PROTOCOL_VERSION, PacketError, PlayerJoin,
    PlayerMessage,
};
pub use stats::NetworkStats;
pub use transport::{Connection, Connector, LISTEN_BACKLOG, Listener, MAX_PENDING_BYTES, join};
pub use wait::{FrameControl, FrameDriver, WaitStage};
