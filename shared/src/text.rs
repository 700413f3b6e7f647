//! text.rs — bounded UTF-16 text fields (kernel file, kernel params)
//
// The firmware reads these fields as CHAR16 arrays of ENV_STRING_LENGTH units.
// A value shorter than the capacity is zero-terminated and zero-padded; a value
// of exactly the capacity has no terminator. Nothing here ever looks past the
// capacity.

use std::fmt;

use serde::Serialize;

use crate::error::{EnvError, EnvResult};
use crate::ENV_STRING_LENGTH;

#[derive(Clone, PartialEq, Eq, Default)]
pub struct EnvString {
    units: Vec<u16>,
}

impl EnvString {
    /// Encode narrow text, rejecting anything longer than the field capacity.
    pub fn new(field: &'static str, value: &str) -> EnvResult<Self> {
        let units: Vec<u16> = value.encode_utf16().collect();
        if units.len() > ENV_STRING_LENGTH {
            return Err(EnvError::StringTooLong { field, max: ENV_STRING_LENGTH });
        }
        if units.contains(&0) {
            return Err(EnvError::invalid_value(field, value));
        }
        Ok(Self { units })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Read a field from its raw code units. Stops at the first zero unit or at
    /// the capacity, whichever comes first.
    pub fn from_units(raw: &[u16]) -> Self {
        let bounded = &raw[..raw.len().min(ENV_STRING_LENGTH)];
        let end = bounded.iter().position(|&u| u == 0).unwrap_or(bounded.len());
        Self { units: bounded[..end].to_vec() }
    }

    /// The fixed-width, zero-padded representation stored in the record.
    pub fn to_field(&self) -> [u16; ENV_STRING_LENGTH] {
        let mut field = [0u16; ENV_STRING_LENGTH];
        field[..self.units.len()].copy_from_slice(&self.units);
        field
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Narrow text for presentation. Unpaired surrogates become U+FFFD.
    pub fn to_narrow(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl fmt::Display for EnvString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_narrow())
    }
}

impl fmt::Debug for EnvString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_narrow())
    }
}

impl Serialize for EnvString {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_narrow())
    }
}
