//! journal.rs — ordered SET/DELETE actions replayed against one record
//!
//! Actions accumulate in insertion order and are consumed exactly once by
//! [`Journal::drain_and_apply`]. Later actions on the same key overwrite earlier
//! ones in place; nothing is deduplicated up front.
//!
//! A failing action (unparsable number, oversized text, full user variable
//! area) is reported in the [`JournalReport`] and skipped; the replay goes on.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, warn};

use crate::error::{EnvError, EnvResult};
use crate::record::EnvRecord;
use crate::storage::GlobalState;
use crate::text::EnvString;
use crate::uservars::{UserVarFlags, UserVarKind, UserVarType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvOperation {
    Set,
    Delete,
}

/// Record fields addressable by name. Any other key is a user variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    KernelFile,
    KernelParams,
    Revision,
    WatchdogTimeout,
    Ustate,
    InProgress,
    User,
}

impl EnvKey {
    pub fn from_key(key: &str) -> Self {
        match key {
            "kernelfile" => EnvKey::KernelFile,
            "kernelparams" => EnvKey::KernelParams,
            "revision" => EnvKey::Revision,
            "watchdog_timeout_sec" => EnvKey::WatchdogTimeout,
            "ustate" => EnvKey::Ustate,
            "in_progress" => EnvKey::InProgress,
            _ => EnvKey::User,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct EnvAction {
    pub operation: EnvOperation,
    pub key: String,
    pub ty: UserVarType,
    /// Payload. Text is stored without its terminator; the terminator is added
    /// when the action is applied. Empty for deletes.
    pub data: Vec<u8>,
}

impl EnvAction {
    pub fn set(key: &str, ty: UserVarType, data: &[u8]) -> Self {
        Self { operation: EnvOperation::Set, key: key.to_string(), ty, data: data.to_vec() }
    }

    /// Set a well-known field or an ASCII user variable from text.
    pub fn set_str(key: &str, value: &str) -> Self {
        Self::set(key, UserVarType::new(UserVarKind::Ascii), value.as_bytes())
    }

    pub fn delete(key: &str) -> Self {
        Self {
            operation: EnvOperation::Delete,
            key: key.to_string(),
            ty: UserVarType::new(UserVarKind::Ascii).with(UserVarFlags::DELETED),
            data: Vec::new(),
        }
    }

    fn text(&self) -> String {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }
}

impl fmt::Debug for EnvAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            EnvOperation::Set => write!(
                f,
                "SET key = {}, type = {:#x}, val = {:?}",
                self.key,
                self.ty.raw(),
                self.text()
            ),
            EnvOperation::Delete => write!(f, "DEL key = {}", self.key),
        }
    }
}

/// Outcome of one replay.
#[derive(Debug, Default)]
pub struct JournalReport {
    pub applied: usize,
    pub failed: Vec<(String, EnvError)>,
}

impl JournalReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// FIFO of pending actions, owned by exactly one session.
#[derive(Debug, Default)]
pub struct Journal {
    actions: VecDeque<EnvAction>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        operation: EnvOperation,
        key: &str,
        ty: UserVarType,
        data: &[u8],
    ) -> EnvResult<()> {
        self.actions.try_reserve(1).map_err(|_| EnvError::OutOfMemory)?;
        let mut owned_key = String::new();
        owned_key.try_reserve_exact(key.len()).map_err(|_| EnvError::OutOfMemory)?;
        owned_key.push_str(key);
        let mut owned_data = Vec::new();
        if operation == EnvOperation::Set {
            owned_data.try_reserve_exact(data.len()).map_err(|_| EnvError::OutOfMemory)?;
            owned_data.extend_from_slice(data);
        }
        self.actions.push_back(EnvAction { operation, key: owned_key, ty, data: owned_data });
        Ok(())
    }

    pub fn push(&mut self, action: EnvAction) -> EnvResult<()> {
        self.actions.try_reserve(1).map_err(|_| EnvError::OutOfMemory)?;
        self.actions.push_back(action);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Take each action from the head, apply it, drop it. The journal is empty
    /// afterwards whatever the individual outcomes were.
    pub fn drain_and_apply(
        &mut self,
        target: &mut EnvRecord,
        state: &mut dyn GlobalState,
    ) -> JournalReport {
        let mut report = JournalReport::default();
        while let Some(action) = self.actions.pop_front() {
            debug!("Task = {:?}", action);
            match apply(target, &action, state) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("skipping {}: {}", action.key, e);
                    report.failed.push((action.key, e));
                }
            }
        }
        report
    }
}

/// Apply one action to the record.
pub fn apply(
    target: &mut EnvRecord,
    action: &EnvAction,
    state: &mut dyn GlobalState,
) -> EnvResult<()> {
    let key = EnvKey::from_key(&action.key);
    match action.operation {
        EnvOperation::Set => {
            if key == EnvKey::Ustate {
                let value = parse_journal_int(&action.key, &action.data)?;
                let raw = u16::try_from(value)
                    .map_err(|_| EnvError::invalid_value(&action.key, &action.text()))?;
                return state.set_global_state(target, raw);
            }
            set_field(target, key, action)
        }
        EnvOperation::Delete => match key {
            EnvKey::User => {
                let tombstone = UserVarType::new(UserVarKind::Ascii)
                    .with(action.ty.flags | UserVarFlags::DELETED);
                target.user_vars.set(&action.key, tombstone, &[0])
            }
            _ => set_field(target, key, &EnvAction::set_str(&action.key, "")),
        },
    }
}

fn set_field(target: &mut EnvRecord, key: EnvKey, action: &EnvAction) -> EnvResult<()> {
    match key {
        EnvKey::KernelFile => {
            target.kernel_file = EnvString::new("kernel filename", &action.text())?
        }
        EnvKey::KernelParams => {
            target.kernel_params = EnvString::new("kernel arguments", &action.text())?
        }
        EnvKey::Revision => target.revision = parse_u32(action)?,
        EnvKey::WatchdogTimeout => target.watchdog_timeout_sec = parse_u32(action)?,
        EnvKey::InProgress => {
            target.in_progress = match parse_journal_int(&action.key, &action.data)? {
                0 => false,
                1 => true,
                _ => return Err(EnvError::invalid_value(&action.key, &action.text())),
            }
        }
        EnvKey::Ustate => {
            let value = parse_journal_int(&action.key, &action.data)?;
            target.ustate = u16::try_from(value)
                .map_err(|_| EnvError::invalid_value(&action.key, &action.text()))?;
        }
        EnvKey::User => {
            if action.ty.kind == UserVarKind::Ascii {
                let mut payload = action.text().into_bytes();
                payload.push(0);
                target.user_vars.set(&action.key, action.ty, &payload)?;
            } else {
                target.user_vars.set(&action.key, action.ty, &action.data)?;
            }
        }
    }
    Ok(())
}

fn parse_u32(action: &EnvAction) -> EnvResult<u32> {
    let value = parse_journal_int(&action.key, &action.data)?;
    u32::try_from(value).map_err(|_| EnvError::invalid_value(&action.key, &action.text()))
}

/// Strict decimal parse of a journal payload: no empty input, no trailing
/// garbage, must fit the native signed integer. A single trailing NUL is
/// tolerated.
pub fn parse_journal_int(key: &str, data: &[u8]) -> EnvResult<i64> {
    let data = data.strip_suffix(b"\0").unwrap_or(data);
    let text = std::str::from_utf8(data)
        .map_err(|_| EnvError::invalid_value(key, &String::from_utf8_lossy(data)))?;
    text.parse::<i64>().map_err(|_| EnvError::invalid_value(key, text))
}
