//! error.rs — failure taxonomy for environment records and sessions

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EnvResult<T> = Result<T, EnvError>;

#[derive(Debug, Error)]
pub enum EnvError {
    /// Structural damage: wrong length, truncated user variable, bad type payload.
    #[error("corrupt environment record: {0}")]
    CorruptRecord(String),

    #[error("crc mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("selected partition {index} out of range, valid range: 0..{max}")]
    SlotOutOfRange { index: usize, max: usize },

    /// Every slot failed to decode; the environment is unavailable.
    #[error("no valid environment found in any of {0} slots")]
    NoValidSlot(usize),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{field} is too long, maximum of {max} characters permitted")]
    StringTooLong { field: &'static str, max: usize },

    #[error("not enough space left for user variable {0:?}")]
    UserVarSpace(String),

    #[error("invalid user variable key {0:?}")]
    InvalidKey(String),

    #[error("out of memory while queuing journal action")]
    OutOfMemory,

    #[error("invalid ustate value {0}")]
    InvalidUstate(u16),

    #[error("slot {index}: {source}")]
    Slot {
        index: usize,
        #[source]
        source: Box<EnvError>,
    },

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EnvError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        EnvError::CorruptRecord(reason.into())
    }

    pub fn invalid_value(key: &str, value: &str) -> Self {
        EnvError::InvalidValue { key: key.to_string(), value: value.to_string() }
    }

    /// True for damaged or checksum-failing data, as opposed to I/O or input errors.
    pub fn is_corruption(&self) -> bool {
        match self {
            EnvError::CorruptRecord(_) | EnvError::CrcMismatch { .. } => true,
            EnvError::Slot { source, .. } => source.is_corruption(),
            _ => false,
        }
    }

    /// True when the backing file or device does not exist yet.
    pub fn is_not_found(&self) -> bool {
        match self {
            EnvError::File { source, .. } | EnvError::Io(source) => {
                source.kind() == io::ErrorKind::NotFound
            }
            EnvError::Slot { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
