//! storage.rs — collaborators the session talks to
//!
//! The redundant store and the stand-alone file only move raw record bytes;
//! decoding, journal replay and checksums stay in this crate.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{EnvError, EnvResult};
use crate::record::{EnvRecord, RECORD_SIZE};
use crate::ustate::Ustate;
use crate::ENV_NUM_CONFIG_PARTS;

/// Redundant slot store, indexed `0..slot_count()`.
///
/// Opening the store is the implementor's `init`; dropping it (or calling
/// [`SlotStore::finalize`]) is the matching teardown. Exactly one slot is
/// written per logical update.
pub trait SlotStore {
    fn slot_count(&self) -> usize;

    /// Raw bytes of one slot, exactly as stored.
    fn read_slot(&mut self, index: usize) -> EnvResult<Vec<u8>>;

    /// Replace one slot. Must not touch any other slot.
    fn write_slot(&mut self, index: usize, bytes: &[u8]) -> EnvResult<()>;

    /// Flush whatever the backend buffers. Default: nothing to do.
    fn finalize(&mut self) -> EnvResult<()> {
        Ok(())
    }
}

/// Side channel for the journal's `ustate` key.
pub trait GlobalState {
    fn set_global_state(&mut self, target: &mut EnvRecord, state: u16) -> EnvResult<()>;
}

/// Applies the update state to the record being edited. Confirming (`OK`) also
/// clears the in-progress flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordState;

impl GlobalState for RecordState {
    fn set_global_state(&mut self, target: &mut EnvRecord, state: u16) -> EnvResult<()> {
        let state = Ustate::from_u16(state)?;
        target.ustate = state.as_u16();
        if state == Ustate::Ok {
            target.in_progress = false;
        }
        debug!("global update state set to {}", state);
        Ok(())
    }
}

/// Slot store kept in memory; used for staging images and in tests.
#[derive(Debug, Clone)]
pub struct MemSlotStore {
    slots: Vec<Vec<u8>>,
    writes: Vec<usize>,
}

impl MemSlotStore {
    /// `ENV_NUM_CONFIG_PARTS` blank slots, each a valid record with revision 0.
    pub fn new() -> Self {
        Self::from_records((0..ENV_NUM_CONFIG_PARTS).map(|_| EnvRecord::blank()))
    }

    pub fn from_records<I: IntoIterator<Item = EnvRecord>>(records: I) -> Self {
        Self::from_raw(records.into_iter().map(|r| r.encode()).collect())
    }

    /// Slots with arbitrary bytes, corrupt ones included.
    pub fn from_raw(slots: Vec<Vec<u8>>) -> Self {
        Self { slots, writes: Vec::new() }
    }

    pub fn raw(&self, index: usize) -> &[u8] {
        &self.slots[index]
    }

    /// Indices written so far, in order.
    pub fn writes(&self) -> &[usize] {
        &self.writes
    }
}

impl Default for MemSlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStore for MemSlotStore {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn read_slot(&mut self, index: usize) -> EnvResult<Vec<u8>> {
        self.slots
            .get(index)
            .cloned()
            .ok_or(EnvError::SlotOutOfRange { index, max: self.slots.len().saturating_sub(1) })
    }

    fn write_slot(&mut self, index: usize, bytes: &[u8]) -> EnvResult<()> {
        let max = self.slots.len().saturating_sub(1);
        let slot = self.slots.get_mut(index).ok_or(EnvError::SlotOutOfRange { index, max })?;
        *slot = bytes.to_vec();
        self.writes.push(index);
        Ok(())
    }
}

/// A single stand-alone environment file (usually `BGENV.DAT`).
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read exactly one record's worth of bytes.
    pub fn read_raw(&self) -> EnvResult<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(|e| self.io(e))?;
        let mut bytes = vec![0u8; RECORD_SIZE];
        file.read_exact(&mut bytes).map_err(|e| self.io(e))?;
        Ok(bytes)
    }

    pub fn load(&self) -> EnvResult<EnvRecord> {
        EnvRecord::decode(&self.read_raw()?)
    }

    /// Write one record and sync it before reporting success.
    pub fn store(&self, bytes: &[u8]) -> EnvResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| self.io(e))?;
        file.write_all(bytes).map_err(|e| self.io(e))?;
        file.sync_all().map_err(|e| self.io(e))?;
        info!("wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    pub fn exists(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.is_file()).unwrap_or(false)
    }

    fn io(&self, source: std::io::Error) -> EnvError {
        EnvError::File { path: self.path.clone(), source }
    }
}
