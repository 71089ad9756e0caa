pub mod config;
pub mod error;
pub mod level;
pub mod mode;
pub mod net;
pub mod player;
pub mod roster;
pub mod session;

pub use config::{SessionConfig, Timings};
pub use error::{NetError, NetResult};
pub use level::{Checkpoint, LevelBlob, LevelDownload, LevelHandler, LevelStatus, LevelType};
pub use mode::{GameModeKind, KillOutcome, LevelExit, ModePolicy, create_mode};
pub use net::{
    FrameControl, FrameDriver, LevelMessage, Message, NET_PORT, NetworkStats, PacketError,
    PlayerMessage, WaitStage,
};
pub use player::{Controls, Player, PlayerProfile, PlayerTemp};
pub use roster::{PlayerId, Roster};
pub use session::{
    ClientSession, DisconnectReason, HostEvent, HostSession, LocalSession, Session, SlotInfo,
    SlotStatus,
};
