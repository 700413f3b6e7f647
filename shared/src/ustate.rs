//! ustate.rs — update lifecycle state of a slot
//!
//! A validated enum only. Who moves a slot into `Testing` or `Failed` is up to
//! the bootloader and the update agent.

use std::fmt;

use serde::Serialize;

use crate::error::{EnvError, EnvResult};

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ustate {
    Ok = 0,
    Installed = 1,
    Testing = 2,
    Failed = 3,
    /// Parse-failure sentinel, never persisted.
    Unknown = 4,
}

const NAMES: [&str; 5] = ["OK", "INSTALLED", "TESTING", "FAILED", "UNKNOWN"];

impl Ustate {
    /// The persistable states in numeric order.
    pub const VALID: [Ustate; 4] = [Ustate::Ok, Ustate::Installed, Ustate::Testing, Ustate::Failed];

    /// Highest value that may be written to a record.
    pub const MAX_VALID: u16 = Ustate::Failed as u16;

    /// Case-insensitive match where the canonical name must prefix the input,
    /// so "testing" and "TESTING-now" both give `Testing`.
    pub fn parse(text: &str) -> Ustate {
        Self::VALID
            .into_iter()
            .find(|state| {
                let name = state.name();
                text.get(..name.len()).is_some_and(|head| head.eq_ignore_ascii_case(name))
            })
            .unwrap_or(Ustate::Unknown)
    }

    /// Numeric conversion for persisted values; anything above 3 is rejected.
    pub fn from_u16(value: u16) -> EnvResult<Ustate> {
        Self::VALID
            .get(usize::from(value))
            .copied()
            .ok_or(EnvError::InvalidUstate(value))
    }

    pub fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Display name for a raw stored value. Anything above the valid range is
    /// shown as `FAILED`.
    pub fn name_of(raw: u16) -> &'static str {
        NAMES[usize::from(raw.min(Self::MAX_VALID))]
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Ustate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_number_agree() {
        assert_eq!(Ustate::parse("testing"), Ustate::Testing);
        assert_eq!(Ustate::from_u16(2).unwrap(), Ustate::Testing);
    }

    #[test]
    fn parse_is_prefix_and_case_insensitive() {
        assert_eq!(Ustate::parse("ok"), Ustate::Ok);
        assert_eq!(Ustate::parse("Installed"), Ustate::Installed);
        assert_eq!(Ustate::parse("FAILEDx"), Ustate::Failed);
        assert_eq!(Ustate::parse("fail"), Ustate::Unknown);
        assert_eq!(Ustate::parse(""), Ustate::Unknown);
        assert_eq!(Ustate::parse("unknown"), Ustate::Unknown);
    }

    #[test]
    fn out_of_range_number_rejected() {
        assert!(matches!(Ustate::from_u16(99), Err(EnvError::InvalidUstate(99))));
        assert!(Ustate::from_u16(4).is_err());
    }

    #[test]
    fn name_of_clamps() {
        assert_eq!(Ustate::name_of(1), "INSTALLED");
        assert_eq!(Ustate::name_of(4), "FAILED");
        assert_eq!(Ustate::name_of(500), Ustate::name_of(Ustate::MAX_VALID));
    }
}
