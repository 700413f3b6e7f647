//! uservars.rs — typed key/value area embedded in every environment record
//!
//! Entry layout (little-endian, densely packed):
//!
//! ```text
//!   +-----------------+
//!   | key bytes       |  non-empty, no NUL
//!   | 0x00            |
//!   | entry_size      |  u32, whole entry including the key
//!   | type            |  u64, kind in the low 32 bits, flags above
//!   | payload ...     |  entry_size - key - 13 bytes
//!   +-----------------+
//!   | next entry ...  |
//!   | 0x00            |  sentinel: an entry whose first byte is zero
//!   +-----------------+
//! ```
//!
//! There is no index. Readers walk from the start with [`UserVarIter`], which
//! bounds-checks every step against the area and turns overruns into
//! [`EnvError::CorruptRecord`].

use std::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{EnvError, EnvResult};
use crate::ENV_MEM_USERVARS;

/// Low bits of the type tag that select the primitive kind.
pub const USERVAR_STANDARD_TYPE_MASK: u64 = (1 << 32) - 1;

/// Printed in place of a value whose kind has no text form.
pub const NOT_PRINTABLE: &str = "( Type is not printable )";

const ENTRY_HEADER: usize = 4 + 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserVarFlags: u64 {
        /// Value was never explicitly set.
        const DEFAULT = 1 << 62;
        /// Tombstone: logically absent, physically present.
        const DELETED = 1 << 63;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserVarKind {
    Char,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    Ascii,
    /// A kind this build does not know. Kept verbatim so it survives rewrites.
    Unknown(u32),
}

impl UserVarKind {
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            1 => UserVarKind::Char,
            2 => UserVarKind::U8,
            3 => UserVarKind::U16,
            4 => UserVarKind::U32,
            5 => UserVarKind::U64,
            6 => UserVarKind::I8,
            7 => UserVarKind::I16,
            8 => UserVarKind::I32,
            9 => UserVarKind::I64,
            10 => UserVarKind::Bool,
            32 => UserVarKind::Ascii,
            other => UserVarKind::Unknown(other),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            UserVarKind::Char => 1,
            UserVarKind::U8 => 2,
            UserVarKind::U16 => 3,
            UserVarKind::U32 => 4,
            UserVarKind::U64 => 5,
            UserVarKind::I8 => 6,
            UserVarKind::I16 => 7,
            UserVarKind::I32 => 8,
            UserVarKind::I64 => 9,
            UserVarKind::Bool => 10,
            UserVarKind::Ascii => 32,
            UserVarKind::Unknown(tag) => tag,
        }
    }

    /// Payload width for fixed-size kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            UserVarKind::Char | UserVarKind::U8 | UserVarKind::I8 | UserVarKind::Bool => Some(1),
            UserVarKind::U16 | UserVarKind::I16 => Some(2),
            UserVarKind::U32 | UserVarKind::I32 => Some(4),
            UserVarKind::U64 | UserVarKind::I64 => Some(8),
            UserVarKind::Ascii | UserVarKind::Unknown(_) => None,
        }
    }
}

/// Full 64-bit type tag: kind plus flags. Unrecognised high bits are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserVarType {
    pub kind: UserVarKind,
    pub flags: UserVarFlags,
}

impl UserVarType {
    pub const fn new(kind: UserVarKind) -> Self {
        Self { kind, flags: UserVarFlags::empty() }
    }

    pub fn with(mut self, flags: UserVarFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            kind: UserVarKind::from_tag((raw & USERVAR_STANDARD_TYPE_MASK) as u32),
            flags: UserVarFlags::from_bits_retain(raw & !USERVAR_STANDARD_TYPE_MASK),
        }
    }

    pub fn raw(self) -> u64 {
        u64::from(self.kind.tag()) | self.flags.bits()
    }

    pub fn is_deleted(self) -> bool {
        self.flags.contains(UserVarFlags::DELETED)
    }
}

/// Decoded payload of one variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UserVarValue {
    Char(char),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Ascii(String),
    Unprintable { tag: u32, len: usize },
}

impl UserVarValue {
    pub fn decode(kind: UserVarKind, data: &[u8]) -> EnvResult<Self> {
        if let Some(width) = kind.width() {
            if data.len() != width {
                return Err(EnvError::corrupt(format!(
                    "{:?} payload is {} bytes, expected {}",
                    kind,
                    data.len(),
                    width
                )));
            }
        }
        Ok(match kind {
            UserVarKind::Char => UserVarValue::Char(char::from(data[0])),
            UserVarKind::U8 => UserVarValue::U8(data[0]),
            UserVarKind::U16 => UserVarValue::U16(LittleEndian::read_u16(data)),
            UserVarKind::U32 => UserVarValue::U32(LittleEndian::read_u32(data)),
            UserVarKind::U64 => UserVarValue::U64(LittleEndian::read_u64(data)),
            UserVarKind::I8 => UserVarValue::I8(data[0] as i8),
            UserVarKind::I16 => UserVarValue::I16(LittleEndian::read_i16(data)),
            UserVarKind::I32 => UserVarValue::I32(LittleEndian::read_i32(data)),
            UserVarKind::I64 => UserVarValue::I64(LittleEndian::read_i64(data)),
            UserVarKind::Bool => UserVarValue::Bool(data[0] != 0),
            UserVarKind::Ascii => {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                UserVarValue::Ascii(String::from_utf8_lossy(&data[..end]).into_owned())
            }
            UserVarKind::Unknown(tag) => UserVarValue::Unprintable { tag, len: data.len() },
        })
    }

    pub fn kind(&self) -> UserVarKind {
        match self {
            UserVarValue::Char(_) => UserVarKind::Char,
            UserVarValue::U8(_) => UserVarKind::U8,
            UserVarValue::U16(_) => UserVarKind::U16,
            UserVarValue::U32(_) => UserVarKind::U32,
            UserVarValue::U64(_) => UserVarKind::U64,
            UserVarValue::I8(_) => UserVarKind::I8,
            UserVarValue::I16(_) => UserVarKind::I16,
            UserVarValue::I32(_) => UserVarKind::I32,
            UserVarValue::I64(_) => UserVarKind::I64,
            UserVarValue::Bool(_) => UserVarKind::Bool,
            UserVarValue::Ascii(_) => UserVarKind::Ascii,
            UserVarValue::Unprintable { tag, .. } => UserVarKind::Unknown(*tag),
        }
    }

    /// Payload bytes as stored. Strings carry their terminator.
    /// `None` for `Unprintable` and for a `Char` outside one byte.
    pub fn to_payload(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            UserVarValue::Char(c) => buf.push(u8::try_from(*c).ok()?),
            UserVarValue::U8(v) => buf.push(*v),
            UserVarValue::U16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::U32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::U64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::I8(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::I16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::I64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UserVarValue::Bool(v) => buf.push(u8::from(*v)),
            UserVarValue::Ascii(s) => {
                buf.extend_from_slice(s.as_bytes());
                buf.push(0);
            }
            UserVarValue::Unprintable { .. } => return None,
        }
        Some(buf)
    }

    pub fn is_printable(&self) -> bool {
        !matches!(self, UserVarValue::Unprintable { .. })
    }
}

impl fmt::Display for UserVarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserVarValue::Char(c) => write!(f, "{}", c),
            UserVarValue::U8(v) => write!(f, "{}", v),
            UserVarValue::U16(v) => write!(f, "{}", v),
            UserVarValue::U32(v) => write!(f, "{}", v),
            UserVarValue::U64(v) => write!(f, "{}", v),
            UserVarValue::I8(v) => write!(f, "{}", v),
            UserVarValue::I16(v) => write!(f, "{}", v),
            UserVarValue::I32(v) => write!(f, "{}", v),
            UserVarValue::I64(v) => write!(f, "{}", v),
            UserVarValue::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
            UserVarValue::Ascii(s) => f.write_str(s),
            UserVarValue::Unprintable { .. } => f.write_str(NOT_PRINTABLE),
        }
    }
}

/// Borrowed view of one entry inside the area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserVar<'a> {
    pub key: &'a str,
    pub ty: UserVarType,
    pub data: &'a [u8],
    offset: usize,
    size: usize,
}

impl<'a> UserVar<'a> {
    pub fn value(&self) -> EnvResult<UserVarValue> {
        UserVarValue::decode(self.ty.kind, self.data)
    }

    /// Canonical text form of the value; unknown kinds give [`NOT_PRINTABLE`].
    pub fn format_value(&self) -> EnvResult<String> {
        Ok(self.value()?.to_string())
    }

    /// Byte range of the whole entry within its area.
    pub fn span(&self) -> (usize, usize) {
        (self.offset, self.size)
    }
}

/// Lazy walker over an area. Finite; yields at most one error and then stops.
pub struct UserVarIter<'a> {
    area: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> UserVarIter<'a> {
    pub fn new(area: &'a [u8]) -> Self {
        Self { area, pos: 0, done: false }
    }

    /// Offset of the sentinel once the walk has finished cleanly.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn step(&mut self) -> EnvResult<Option<UserVar<'a>>> {
        let area = self.area;
        let start = self.pos;
        match area.get(start) {
            None => return Err(EnvError::corrupt("user variable area has no terminator")),
            Some(0) => return Ok(None),
            Some(_) => {}
        }

        let key_len = area[start..].iter().position(|&b| b == 0).ok_or_else(|| {
            EnvError::corrupt(format!("unterminated user variable key at {}", start))
        })?;
        let key = std::str::from_utf8(&area[start..start + key_len])
            .map_err(|_| EnvError::corrupt(format!("user variable key at {} is not text", start)))?;

        let header_at = start + key_len + 1;
        let payload_at = header_at + ENTRY_HEADER;
        if payload_at > area.len() {
            return Err(EnvError::corrupt(format!("user variable {:?} header truncated", key)));
        }
        let size = LittleEndian::read_u32(&area[header_at..header_at + 4]) as usize;
        let ty = UserVarType::from_raw(LittleEndian::read_u64(&area[header_at + 4..payload_at]));

        let end = start
            .checked_add(size)
            .filter(|&end| end >= payload_at && end <= area.len())
            .ok_or_else(|| {
                EnvError::corrupt(format!("user variable {:?} has invalid size {}", key, size))
            })?;

        self.pos = end;
        Ok(Some(UserVar { key, ty, data: &area[payload_at..end], offset: start, size }))
    }
}

impl<'a> Iterator for UserVarIter<'a> {
    type Item = EnvResult<UserVar<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(var)) => Some(Ok(var)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Owned, fixed-capacity user variable area of one record.
#[derive(Clone, PartialEq, Eq)]
pub struct UserVarArea {
    bytes: Vec<u8>,
}

impl Default for UserVarArea {
    fn default() -> Self {
        Self { bytes: vec![0u8; ENV_MEM_USERVARS] }
    }
}

impl fmt::Debug for UserVarArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for var in self.iter() {
            match var {
                Ok(v) => list.entry(&(v.key, v.ty.raw(), v.data.len())),
                Err(e) => list.entry(&e.to_string()),
            };
        }
        list.finish()
    }
}

impl UserVarArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(raw: &[u8]) -> EnvResult<Self> {
        if raw.len() != ENV_MEM_USERVARS {
            return Err(EnvError::corrupt(format!(
                "user variable area is {} bytes, expected {}",
                raw.len(),
                ENV_MEM_USERVARS
            )));
        }
        Ok(Self { bytes: raw.to_vec() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn iter(&self) -> UserVarIter<'_> {
        UserVarIter::new(&self.bytes)
    }

    /// Offset of the sentinel, i.e. bytes in use.
    pub fn used(&self) -> EnvResult<usize> {
        let mut walker = self.iter();
        for var in walker.by_ref() {
            var?;
        }
        Ok(walker.position())
    }

    pub fn get(&self, key: &str) -> EnvResult<Option<UserVar<'_>>> {
        for var in self.iter() {
            let var = var?;
            if var.key == key {
                return Ok(Some(var));
            }
        }
        Ok(None)
    }

    /// Write `payload` under `key`. An existing entry is rewritten at its
    /// current position, later entries shift; a new key is appended. At least
    /// one zero byte always remains after the last entry.
    pub fn set(&mut self, key: &str, ty: UserVarType, payload: &[u8]) -> EnvResult<()> {
        if key.is_empty() || key.contains('\0') {
            return Err(EnvError::InvalidKey(key.to_string()));
        }
        let entry = serialize_entry(key, ty, payload)?;

        let used = self.used()?;
        let (at, old_size) = match self.get(key)? {
            Some(var) => var.span(),
            None => (used, 0),
        };

        let new_used = used - old_size + entry.len();
        if new_used >= self.bytes.len() {
            return Err(EnvError::UserVarSpace(key.to_string()));
        }

        let tail = self.bytes[at + old_size..used].to_vec();
        self.bytes[at..at + entry.len()].copy_from_slice(&entry);
        self.bytes[at + entry.len()..new_used].copy_from_slice(&tail);
        if new_used < used {
            self.bytes[new_used..used].fill(0);
        }
        self.bytes[new_used] = 0;
        Ok(())
    }

    pub fn set_value(
        &mut self,
        key: &str,
        value: &UserVarValue,
        flags: UserVarFlags,
    ) -> EnvResult<()> {
        let payload = value
            .to_payload()
            .ok_or_else(|| EnvError::invalid_value(key, &value.to_string()))?;
        self.set(key, UserVarType::new(value.kind()).with(flags), &payload)
    }
}

fn serialize_entry(key: &str, ty: UserVarType, payload: &[u8]) -> EnvResult<Vec<u8>> {
    let total = key.len() + 1 + ENTRY_HEADER + payload.len();
    let size = u32::try_from(total).map_err(|_| EnvError::UserVarSpace(key.to_string()))?;

    let mut entry = Vec::with_capacity(total);
    entry.extend_from_slice(key.as_bytes());
    entry.push(0);
    entry.extend_from_slice(&size.to_le_bytes());
    entry.extend_from_slice(&ty.raw().to_le_bytes());
    entry.extend_from_slice(payload);
    Ok(entry)
}
