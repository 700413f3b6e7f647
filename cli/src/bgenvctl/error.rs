// cli/src/bgenvctl/error.rs — tool-level failures and their exit statuses

use std::process::ExitCode;

use bootguard_env::EnvError;
use colored::Colorize;
use thiserror::Error;

pub const EXIT_USAGE: u8 = 2;
pub const EXIT_VALIDATION: u8 = 3;
pub const EXIT_CORRUPT: u8 = 4;
pub const EXIT_IO: u8 = 5;
pub const EXIT_CONFIG: u8 = 6;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Validation(String),

    #[error("Error initializing FAT environment: {0}")]
    Config(String),

    /// The record was written, but some journal actions were rejected.
    #[error("{count} change(s) could not be applied")]
    Rejected { count: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        CliError::Usage(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CliError::Validation(msg.into())
    }

    pub fn status(&self) -> u8 {
        match self {
            CliError::Usage(_) => EXIT_USAGE,
            CliError::Validation(_) | CliError::Rejected { .. } => EXIT_VALIDATION,
            CliError::Config(_) => EXIT_CONFIG,
            CliError::Json(_) => EXIT_IO,
            CliError::Env(e) => env_status(e),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }

    /// Print the diagnostic on stderr.
    pub fn report(&self) {
        eprintln!("{} {}", "error:".red().bold(), self);
    }
}

fn env_status(e: &EnvError) -> u8 {
    match e {
        EnvError::CorruptRecord(_) | EnvError::CrcMismatch { .. } | EnvError::NoValidSlot(_) => {
            EXIT_CORRUPT
        }
        EnvError::Slot { source, .. } => env_status(source),
        EnvError::SlotOutOfRange { .. }
        | EnvError::InvalidValue { .. }
        | EnvError::StringTooLong { .. }
        | EnvError::UserVarSpace(_)
        | EnvError::InvalidKey(_)
        | EnvError::InvalidUstate(_) => EXIT_VALIDATION,
        EnvError::OutOfMemory | EnvError::File { .. } | EnvError::Io(_) => EXIT_IO,
    }
}
