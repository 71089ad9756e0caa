use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};
use crate::net::{LEVEL_CHUNK_LEN, LevelMessage};

/// Tile coordinates players respawn at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LevelType {
    #[default]
    Level = 0,
    Bonus = 1,
    Extended = 2,
}

impl LevelType {
    pub fn from_file_name(name: &str) -> Self {
        let path = Path::new(name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if extension.as_deref() == Some("j2l") {
            return LevelType::Extended;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if stem.starts_with("bonusmap") {
            LevelType::Bonus
        } else {
            LevelType::Level
        }
    }

    /// Out-of-range values are clamped to the last known type.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 => LevelType::Level,
            1 => LevelType::Bonus,
            2 => LevelType::Extended,
            other => {
                log::warn!("Level type {} out of range, clamping", other);
                LevelType::Extended
            }
        }
    }
}

/// The active level, as far as the network layer is concerned.
pub trait LevelHandler {
    fn receive(&mut self, message: &LevelMessage);
}

/// Where a client's level download stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelStatus {
    Waiting,
    Downloading { bytes: usize },
    Ready { path: PathBuf, level_type: LevelType },
    /// The host has no further level.
    Ended,
}

/// A level held in memory by the host, sent in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct LevelBlob {
    name: String,
    level_type: LevelType,
    data: Vec<u8>,
}

impl LevelBlob {
    pub fn load(path: impl AsRef<Path>) -> NetResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(NetError::File)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Self::from_bytes(name, data)
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> NetResult<Self> {
        let name = name.into();
        // An empty first chunk reads as "no further level" on the client
        if data.is_empty() {
            return Err(NetError::Data(format!("level {} is empty", name)));
        }
        if data.len() > usize::from(u16::MAX) {
            return Err(NetError::Other(format!(
                "level {} is {} bytes, more than a chunk offset can address",
                name,
                data.len()
            )));
        }

        Ok(Self {
            level_type: LevelType::from_file_name(&name),
            name,
            data,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level_type(&self) -> LevelType {
        self.level_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes to send from `offset`; empty once the level is exhausted.
    pub fn chunk(&self, offset: usize) -> &[u8] {
        if offset >= self.data.len() {
            return &[];
        }
        let end = (offset + LEVEL_CHUNK_LEN).min(self.data.len());
        &self.data[offset..end]
    }
}

/// A client-side staging file chunks are written into.
#[derive(Debug)]
pub struct LevelDownload {
    path: PathBuf,
    file: File,
    written: usize,
    end: u64,
}

impl LevelDownload {
    pub fn create(path: impl Into<PathBuf>) -> NetResult<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(NetError::File)?;
        log::debug!("Staging level download in {}", path.display());
        Ok(Self {
            path,
            file,
            written: 0,
            end: 0,
        })
    }

    pub fn write_chunk(&mut self, offset: u16, data: &[u8]) -> NetResult<()> {
        self.file
            .seek(SeekFrom::Start(u64::from(offset)))
            .map_err(NetError::File)?;
        self.file.write_all(data).map_err(NetError::File)?;
        self.written += data.len();
        self.end = self.end.max(u64::from(offset) + data.len() as u64);
        Ok(())
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cuts the file to the furthest byte written, then flushes and closes it.
    pub fn finish(mut self) -> NetResult<PathBuf> {
        self.file.set_len(self.end).map_err(NetError::File)?;
        self.file.flush().map_err(NetError::File)?;
        self.file.sync_all().map_err(NetError::File)?;
        Ok(self.path)
    }
}
