//! bootguard-env — redundant boot environment records for the EFI Boot Guard
//!
//! The boot firmware and the host tooling agree on one fixed-size, CRC-protected
//! record per configuration slot. This crate owns that contract:
//!
//! - [`record`]   fixed binary layout, encode/decode, CRC
//! - [`uservars`] typed key/value area embedded in each record
//! - [`ustate`]   update lifecycle states
//! - [`journal`]  ordered SET/DELETE actions replayed against one record
//! - [`selector`] latest/oldest slot selection across the redundant store
//! - [`session`]  one end-to-end update: resolve, replay, seal, persist
//!
//! Storage itself is a collaborator behind the traits in [`storage`].

pub mod error;
pub mod journal;
pub mod record;
pub mod selector;
pub mod session;
pub mod storage;
pub mod text;
pub mod uservars;
pub mod ustate;

pub use error::{EnvError, EnvResult};
pub use journal::{EnvAction, EnvOperation, Journal, JournalReport};
pub use record::EnvRecord;
pub use selector::{SlotScan, SlotSelector};
pub use session::{update_file, EnvSession, Location, SessionTarget, UpdateOutcome};
pub use storage::{EnvFile, GlobalState, MemSlotStore, RecordState, SlotStore};
pub use text::EnvString;
pub use uservars::{UserVar, UserVarArea, UserVarFlags, UserVarKind, UserVarType, UserVarValue};
pub use ustate::Ustate;

/// UTF-16 code units reserved for each of the kernel file / kernel params fields.
pub const ENV_STRING_LENGTH: usize = 255;

/// Bytes reserved for the user variable area of one record.
pub const ENV_MEM_USERVARS: usize = 131_072;

/// Number of redundant configuration slots.
pub const ENV_NUM_CONFIG_PARTS: usize = 2;

/// File name of a stand-alone environment and of each slot file on its partition.
pub const FAT_ENV_FILENAME: &str = "BGENV.DAT";
