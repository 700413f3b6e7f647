//! selector.rs — pick the latest / oldest slot of the redundant store
//!
//! Every slot is read and decoded once per scan. Slots that fail to decode are
//! kept as per-slot errors and left out of the latest/oldest comparison; only
//! when no slot decodes does selection fail as a whole. Equal revisions resolve
//! to the lowest slot index.

use log::warn;

use crate::error::{EnvError, EnvResult};
use crate::record::EnvRecord;
use crate::storage::SlotStore;

/// Outcome of reading and decoding one slot.
#[derive(Debug)]
pub struct SlotScan {
    pub index: usize,
    pub outcome: EnvResult<EnvRecord>,
}

impl SlotScan {
    pub fn record(&self) -> Option<&EnvRecord> {
        self.outcome.as_ref().ok()
    }
}

#[derive(Debug)]
pub struct SlotSelector {
    slots: Vec<SlotScan>,
}

/// Range check for an explicit slot index; meant to run before any I/O.
pub fn check_slot_index(index: usize, slot_count: usize) -> EnvResult<usize> {
    if index < slot_count {
        Ok(index)
    } else {
        Err(EnvError::SlotOutOfRange { index, max: slot_count.saturating_sub(1) })
    }
}

impl SlotSelector {
    /// Read and decode every slot of the store.
    pub fn scan(store: &mut dyn SlotStore) -> Self {
        let slots = (0..store.slot_count())
            .map(|index| {
                let outcome = store
                    .read_slot(index)
                    .and_then(|bytes| EnvRecord::decode(&bytes))
                    .map_err(|e| EnvError::Slot { index, source: Box::new(e) });
                if let Err(e) = &outcome {
                    warn!("environment {}", e);
                }
                SlotScan { index, outcome }
            })
            .collect();
        Self { slots }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[SlotScan] {
        &self.slots
    }

    pub fn select_latest(&self) -> EnvResult<usize> {
        self.select_by(|candidate, best| candidate > best)
    }

    /// Target of the next auto-update: the least recent readable slot.
    pub fn select_oldest(&self) -> EnvResult<usize> {
        self.select_by(|candidate, best| candidate < best)
    }

    pub fn select_by_index(&self, index: usize) -> EnvResult<usize> {
        check_slot_index(index, self.slots.len())
    }

    /// One slot's scan result, range-checked.
    pub fn slot(&self, index: usize) -> EnvResult<&SlotScan> {
        let index = self.select_by_index(index)?;
        Ok(&self.slots[index])
    }

    /// Consume the scan, keeping one slot's result.
    pub fn into_slot(self, index: usize) -> EnvResult<SlotScan> {
        let index = self.select_by_index(index)?;
        let mut slots = self.slots;
        Ok(slots.swap_remove(index))
    }

    // `better(candidate, best)` must be a strict comparison so the first slot
    // holding the extreme revision is kept.
    fn select_by(&self, better: impl Fn(u32, u32) -> bool) -> EnvResult<usize> {
        let mut best: Option<(usize, u32)> = None;
        for scan in &self.slots {
            let Some(record) = scan.record() else { continue };
            match best {
                Some((_, rev)) if !better(record.revision, rev) => {}
                _ => best = Some((scan.index, record.revision)),
            }
        }
        best.map(|(index, _)| index).ok_or(EnvError::NoValidSlot(self.slots.len()))
    }
}

/// Baseline for an auto-update: a full copy of `current` with the revision
/// bumped by one. Never wraps.
pub fn clone_for_update(current: &EnvRecord) -> EnvResult<EnvRecord> {
    let revision = current
        .revision
        .checked_add(1)
        .ok_or_else(|| EnvError::invalid_value("revision", &current.revision.to_string()))?;
    Ok(EnvRecord { revision, ..current.clone() })
}
