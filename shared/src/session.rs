//! session.rs — one end-to-end environment update
//!
//! resolve target -> take baseline -> replay journal -> seal (CRC) -> persist.
//! Exactly one slot, or the one stand-alone file, is written per update.

use std::fmt;
use std::path::PathBuf;

use log::{info, warn};

use crate::error::{EnvError, EnvResult};
use crate::journal::{Journal, JournalReport};
use crate::record::EnvRecord;
use crate::selector::{check_slot_index, clone_for_update, SlotSelector};
use crate::storage::{EnvFile, GlobalState, RecordState, SlotStore};

/// Which slot of the redundant store an update lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTarget {
    /// Edit the latest slot in place.
    Latest,
    /// Clone the latest slot into the oldest one with revision + 1.
    AutoUpdate,
    /// Edit one slot in place.
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Slot(usize),
    File(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Slot(i) => write!(f, "config partition #{}", i),
            Location::File(p) => write!(f, "{}", p.display()),
        }
    }
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub location: Location,
    /// The record as written, CRC included.
    pub record: EnvRecord,
    pub report: JournalReport,
}

pub struct EnvSession<'a> {
    store: &'a mut dyn SlotStore,
    state: Box<dyn GlobalState + 'a>,
}

impl<'a> EnvSession<'a> {
    pub fn new(store: &'a mut dyn SlotStore) -> Self {
        Self { store, state: Box::new(RecordState) }
    }

    pub fn with_state(mut self, state: impl GlobalState + 'a) -> Self {
        self.state = Box::new(state);
        self
    }

    pub fn scan(&mut self) -> SlotSelector {
        SlotSelector::scan(&mut *self.store)
    }

    /// Resolve the slot to write and the record to start from.
    pub fn open(&mut self, target: SessionTarget) -> EnvResult<(usize, EnvRecord)> {
        if let SessionTarget::Index(index) = target {
            check_slot_index(index, self.store.slot_count())?;
        }
        let selector = self.scan();
        match target {
            SessionTarget::Latest => {
                let index = selector.select_latest()?;
                Ok((index, baseline(selector, index)?))
            }
            SessionTarget::AutoUpdate => {
                let latest = selector.select_latest()?;
                let index = auto_update_target(&selector, latest)?;
                let current = baseline(selector, latest)?;
                info!(
                    "auto-update: cloning revision {} from slot {} into slot {}",
                    current.revision, latest, index
                );
                Ok((index, clone_for_update(&current)?))
            }
            SessionTarget::Index(index) => Ok((index, baseline(selector, index)?)),
        }
    }

    /// Run one update against the redundant store.
    pub fn update(
        &mut self,
        target: SessionTarget,
        journal: &mut Journal,
    ) -> EnvResult<UpdateOutcome> {
        let (index, mut record) = self.open(target)?;
        let report = journal.drain_and_apply(&mut record, self.state.as_mut());
        let bytes = record.seal();
        self.store.write_slot(index, &bytes)?;
        info!("environment revision {} written to slot {}", record.revision, index);
        Ok(UpdateOutcome { location: Location::Slot(index), record, report })
    }

    /// Tear down access to the store.
    pub fn finalize(self) -> EnvResult<()> {
        self.store.finalize()
    }
}

/// Run one update against a stand-alone file. Without `preserve` the baseline
/// is a blank record; with it the existing file must decode cleanly.
pub fn update_file(
    file: &EnvFile,
    preserve: bool,
    journal: &mut Journal,
    state: &mut dyn GlobalState,
) -> EnvResult<UpdateOutcome> {
    let mut record = if preserve { file.load()? } else { EnvRecord::blank() };
    let report = journal.drain_and_apply(&mut record, state);
    let bytes = record.seal();
    file.store(&bytes)?;
    Ok(UpdateOutcome { location: Location::File(file.path().to_path_buf()), record, report })
}

// A slot that does not decode is never trusted; editing it explicitly starts
// over from a blank record, as does a slot whose file does not exist yet. Any
// other read failure aborts the update before anything is written.
fn baseline(selector: SlotSelector, index: usize) -> EnvResult<EnvRecord> {
    match selector.into_slot(index)?.outcome {
        Ok(record) => Ok(record),
        Err(e) if e.is_corruption() || e.is_not_found() => {
            warn!("slot {} is unreadable, rebuilding it from a blank environment", index);
            Ok(EnvRecord::blank())
        }
        Err(e) => Err(e),
    }
}

// The oldest readable slot, unless that is the latest itself (ties, or only
// one readable slot): then the first other slot, unreadable ones included, so
// the latest copy is never the one overwritten.
fn auto_update_target(selector: &SlotSelector, latest: usize) -> EnvResult<usize> {
    let oldest = selector.select_oldest()?;
    if oldest != latest {
        return Ok(oldest);
    }
    let others = || selector.slots().iter().filter(|s| s.index != latest);
    others()
        .find(|s| s.record().is_none())
        .or_else(|| others().next())
        .map(|s| s.index)
        .ok_or(EnvError::NoValidSlot(selector.slot_count()))
}
