use crate::level::LevelType;
use crate::mode::GameModeKind;
use crate::player::PlayerTemp;

pub const BUFFER_LENGTH: usize = 255;
pub const HEADER_LEN: usize = 2;
pub const PROTOCOL_VERSION: u8 = 1;
pub const NET_PORT: u16 = 10052;
pub const MAX_CLIENTS: usize = 31;
pub const MAX_PLAYERS: usize = MAX_CLIENTS + 1;
pub const PLAYER_ANIMS: usize = 38;

/// Client id used in PJOIN for players no client owns (the host's own).
pub const NO_CLIENT: u8 = 0xFF;

pub const CATEGORY_MASK: u8 = 0xF0;

pub const LEVEL_HEADER_LEN: usize = 4;
pub const LEVEL_CHUNK_LEN: usize = BUFFER_LENGTH - LEVEL_HEADER_LEN;

const JOIN_NAME_OFFSET: usize = 9;
pub const MAX_NAME_LEN: usize = BUFFER_LENGTH - JOIN_NAME_OFFSET - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Game,
    Level,
    Player,
}

impl Category {
    pub fn of(type_byte: u8) -> Option<Self> {
        match type_byte & CATEGORY_MASK {
            0x00 => Some(Category::Game),
            0x10 => Some(Category::Level),
            0x20 => Some(Category::Player),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Props = 0x00,
    PlayerJoin = 0x01,
    PlayerQuit = 0x02,
    LevelChunk = 0x03,
    Checkpoint = 0x04,
    Score = 0x05,
    LevelType = 0x06,
    LevelProp = 0x10,
    LevelGrid = 0x11,
    LevelStage = 0x12,
    PlayerAnims = 0x20,
    PlayerTemp = 0x21,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let ty = match byte {
            0x00 => MessageType::Props,
            0x01 => MessageType::PlayerJoin,
            0x02 => MessageType::PlayerQuit,
            0x03 => MessageType::LevelChunk,
            0x04 => MessageType::Checkpoint,
            0x05 => MessageType::Score,
            0x06 => MessageType::LevelType,
            0x10 => MessageType::LevelProp,
            0x11 => MessageType::LevelGrid,
            0x12 => MessageType::LevelStage,
            0x20 => MessageType::PlayerAnims,
            0x21 => MessageType::PlayerTemp,
            _ => return None,
        };
        Some(ty)
    }

    pub fn category(self) -> Category {
        match self {
            MessageType::LevelProp | MessageType::LevelGrid | MessageType::LevelStage => {
                Category::Level
            }
            MessageType::PlayerAnims | MessageType::PlayerTemp => Category::Player,
            _ => Category::Game,
        }
    }

    /// Minimum length of the message, header included.
    pub fn min_len(self) -> usize {
        match self {
            MessageType::Props => 8,
            MessageType::PlayerJoin => 10,
            MessageType::PlayerQuit => 3,
            MessageType::LevelChunk => LEVEL_HEADER_LEN,
            MessageType::Checkpoint => 6,
            MessageType::Score => 3,
            MessageType::LevelType => 3,
            MessageType::LevelProp => 5,
            MessageType::LevelGrid => 8,
            MessageType::LevelStage => 3,
            MessageType::PlayerAnims => 3,
            MessageType::PlayerTemp => PlayerTemp::MESSAGE_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameProps {
    pub version: u8,
    pub mode: GameModeKind,
    pub difficulty: u8,
    pub max_players: u8,
    pub player_count: u8,
    pub client_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerJoin {
    pub client_id: u8,
    pub player: u8,
    pub team: u8,
    pub colors: [u8; 4],
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelProp {
    NextLevel { level: u8, world: u8 },
    WaterLevel(u16),
    AddTime { seconds: u8 },
    Unknown { op: u8, args: [u8; 2] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridField {
    Tile,
    Event,
    Hits,
    Other(u8),
}

impl GridField {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => GridField::Tile,
            2 => GridField::Event,
            3 => GridField::Hits,
            other => GridField::Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            GridField::Tile => 0,
            GridField::Event => 2,
            GridField::Hits => 3,
            GridField::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridChange {
    pub x: u16,
    pub y: u16,
    pub field: GridField,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelMessage {
    Prop(LevelProp),
    Grid(GridChange),
    Stage(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerMessage {
    Anims(Vec<u8>),
    Temp(PlayerTemp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Props(GameProps),
    PlayerJoin(PlayerJoin),
    PlayerQuit { player: u8 },
    LevelChunk { offset: u16, data: Vec<u8> },
    Checkpoint { x: u16, y: u16 },
    Score { team: u8 },
    LevelType(LevelType),
    Level(LevelMessage),
    Player { player: u8, message: PlayerMessage },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("message of {0} bytes has no type byte")]
    MissingHeader(usize),
    #[error("declared length {declared} does not match {actual} received bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),
    #[error("{ty:?} needs at least {min} bytes, got {len}")]
    TooShort {
        ty: MessageType,
        len: usize,
        min: usize,
    },
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: u8 },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Props(_) => MessageType::Props,
            Message::PlayerJoin(_) => MessageType::PlayerJoin,
            Message::PlayerQuit { .. } => MessageType::PlayerQuit,
            Message::LevelChunk { .. } => MessageType::LevelChunk,
            Message::Checkpoint { .. } => MessageType::Checkpoint,
            Message::Score { .. } => MessageType::Score,
            Message::LevelType(_) => MessageType::LevelType,
            Message::Level(LevelMessage::Prop(_)) => MessageType::LevelProp,
            Message::Level(LevelMessage::Grid(_)) => MessageType::LevelGrid,
            Message::Level(LevelMessage::Stage(_)) => MessageType::LevelStage,
            Message::Player {
                message: PlayerMessage::Anims(_),
                ..
            } => MessageType::PlayerAnims,
            Message::Player {
                message: PlayerMessage::Temp(_),
                ..
            } => MessageType::PlayerTemp,
        }
    }

    pub fn category(&self) -> Category {
        self.message_type().category()
    }

    /// Index of the player a PLAYER-category message addresses.
    pub fn player_index(&self) -> Option<u8> {
        match self {
            Message::Player { player, .. } => Some(*player),
            _ => None,
        }
    }

    /// Serializes the message; byte 0 always holds the total length.
    ///
    /// Variable-length payloads that would overflow `BUFFER_LENGTH` are
    /// truncated and logged.
    pub fn encode(&self) -> Vec<u8> {
        let ty = self.message_type();
        let mut buf = vec![0u8; ty.min_len()];
        buf[1] = ty as u8;

        match self {
            Message::Props(props) => {
                buf[2] = props.version;
                buf[3] = props.mode as u8;
                buf[4] = props.difficulty;
                buf[5] = props.max_players;
                buf[6] = props.player_count;
                buf[7] = props.client_id;
            }
            Message::PlayerJoin(join) => {
                buf[2] = join.client_id;
                buf[3] = join.player;
                buf[4] = join.team;
                buf[5..9].copy_from_slice(&join.colors);
                let name = truncate_name(&join.name);
                buf.truncate(JOIN_NAME_OFFSET);
                buf.extend_from_slice(name);
                buf.push(0);
            }
            Message::PlayerQuit { player } => buf[2] = *player,
            Message::LevelChunk { offset, data } => {
                buf[2..4].copy_from_slice(&offset.to_be_bytes());
                let data = clamp_payload("level chunk", data, LEVEL_CHUNK_LEN);
                buf.extend_from_slice(data);
            }
            Message::Checkpoint { x, y } => {
                buf[2..4].copy_from_slice(&x.to_be_bytes());
                buf[4..6].copy_from_slice(&y.to_be_bytes());
            }
            Message::Score { team } => buf[2] = *team,
            Message::LevelType(level_type) => buf[2] = *level_type as u8,
            Message::Level(LevelMessage::Prop(prop)) => {
                let (op, args) = match *prop {
                    LevelProp::NextLevel { level, world } => (0, [level, world]),
                    LevelProp::WaterLevel(height) => (1, height.to_le_bytes()),
                    LevelProp::AddTime { seconds } => (2, [seconds, 0]),
                    LevelProp::Unknown { op, args } => (op, args),
                };
                buf[2] = op;
                buf[3..5].copy_from_slice(&args);
            }
            Message::Level(LevelMessage::Grid(change)) => {
                let [x_lo, x_hi] = change.x.to_le_bytes();
                let [y_lo, y_hi] = change.y.to_le_bytes();
                buf[2] = x_lo;
                buf[3] = y_lo;
                buf[4] = change.field.to_byte();
                buf[5] = change.value;
                buf[6] = x_hi;
                buf[7] = y_hi;
            }
            Message::Level(LevelMessage::Stage(stage)) => buf[2] = *stage,
            Message::Player { player, message } => {
                buf[2] = *player;
                match message {
                    PlayerMessage::Anims(anims) => {
                        let anims =
                            clamp_payload("animation table", anims, BUFFER_LENGTH - 3);
                        buf.extend_from_slice(anims);
                    }
                    PlayerMessage::Temp(temp) => temp.write(&mut buf),
                }
            }
        }

        buf[0] = buf.len() as u8;
        buf
    }

    /// Parses one complete framed message.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::MissingHeader(buf.len()));
        }
        let declared = buf[0] as usize;
        if declared != buf.len() {
            return Err(PacketError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }

        let ty = MessageType::from_byte(buf[1]).ok_or(PacketError::UnknownType(buf[1]))?;
        let min = ty.min_len();
        if buf.len() < min {
            return Err(PacketError::TooShort {
                ty,
                len: buf.len(),
                min,
            });
        }

        let message = match ty {
            MessageType::Props => Message::Props(GameProps {
                version: buf[2],
                mode: GameModeKind::try_from(buf[3]).map_err(|value| {
                    PacketError::InvalidField {
                        field: "game mode",
                        value,
                    }
                })?,
                difficulty: buf[4],
                max_players: buf[5],
                player_count: buf[6],
                client_id: buf[7],
            }),
            MessageType::PlayerJoin => {
                let raw_name = &buf[JOIN_NAME_OFFSET..];
                let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
                let mut colors = [0u8; 4];
                colors.copy_from_slice(&buf[5..9]);
                Message::PlayerJoin(PlayerJoin {
                    client_id: buf[2],
                    player: buf[3],
                    team: buf[4],
                    colors,
                    name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
                })
            }
            MessageType::PlayerQuit => Message::PlayerQuit { player: buf[2] },
            MessageType::LevelChunk => Message::LevelChunk {
                offset: u16::from_be_bytes([buf[2], buf[3]]),
                data: buf[LEVEL_HEADER_LEN..].to_vec(),
            },
            MessageType::Checkpoint => Message::Checkpoint {
                x: u16::from_be_bytes([buf[2], buf[3]]),
                y: u16::from_be_bytes([buf[4], buf[5]]),
            },
            MessageType::Score => Message::Score { team: buf[2] },
            MessageType::LevelType => Message::LevelType(LevelType::from_wire(buf[2])),
            MessageType::LevelProp => {
                let args = [buf[3], buf[4]];
                let prop = match buf[2] {
                    0 => LevelProp::NextLevel {
                        level: args[0],
                        world: args[1],
                    },
                    1 => LevelProp::WaterLevel(u16::from_le_bytes(args)),
                    2 => LevelProp::AddTime { seconds: args[0] },
                    op => LevelProp::Unknown { op, args },
                };
                Message::Level(LevelMessage::Prop(prop))
            }
            MessageType::LevelGrid => Message::Level(LevelMessage::Grid(GridChange {
                x: u16::from_le_bytes([buf[2], buf[6]]),
                y: u16::from_le_bytes([buf[3], buf[7]]),
                field: GridField::from_byte(buf[4]),
                value: buf[5],
            })),
            MessageType::LevelStage => Message::Level(LevelMessage::Stage(buf[2])),
            MessageType::PlayerAnims => Message::Player {
                player: buf[2],
                message: PlayerMessage::Anims(buf[3..].to_vec()),
            },
            MessageType::PlayerTemp => Message::Player {
                player: buf[2],
                message: PlayerMessage::Temp(PlayerTemp::read(buf)),
            },
        };

        Ok(message)
    }
}

fn truncate_name(name: &str) -> &[u8] {
    let name = name.split('\0').next().unwrap_or_default();
    if name.len() <= MAX_NAME_LEN {
        return name.as_bytes();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    log::warn!("Player name truncated to {} bytes", end);
    &name.as_bytes()[..end]
}

fn clamp_payload<'a>(what: &str, data: &'a [u8], max: usize) -> &'a [u8] {
    if data.len() > max {
        log::warn!("Clamping {} of {} bytes to {}", what, data.len(), max);
        &data[..max]
    } else {
        data
    }
}
