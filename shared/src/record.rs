//! record.rs — the environment record shared with the boot firmware
//
// Layout (little-endian, packed, RECORD_SIZE bytes):
//   +------------------------+ 0
//   | kernel_file            | 255 x u16
//   | kernel_params          | 255 x u16
//   | in_progress            | u8
//   | ustate                 | u16
//   | watchdog_timeout_sec   | u32
//   | revision               | u32
//   | user variables         | ENV_MEM_USERVARS bytes
//   | crc32                  | u32, CRC-32 (zlib) of every byte above
//   +------------------------+ RECORD_SIZE
//
// The CRC is recomputed on every encode and checked on every decode; a stored
// checksum is never carried over from the caller.

use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{EnvError, EnvResult};
use crate::text::EnvString;
use crate::uservars::UserVarArea;
use crate::{ENV_MEM_USERVARS, ENV_STRING_LENGTH};

const TEXT_FIELD_BYTES: usize = ENV_STRING_LENGTH * 2;

/// Bytes covered by the checksum.
pub const CRC_COVERED: usize = TEXT_FIELD_BYTES * 2 + 1 + 2 + 4 + 4 + ENV_MEM_USERVARS;

/// Size of one encoded record.
pub const RECORD_SIZE: usize = CRC_COVERED + 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvRecord {
    pub kernel_file: EnvString,
    pub kernel_params: EnvString,
    pub in_progress: bool,
    /// Raw stored value; may lie outside the valid range on disk.
    pub ustate: u16,
    pub watchdog_timeout_sec: u32,
    pub revision: u32,
    pub user_vars: UserVarArea,
    /// Checksum as last read or sealed. Ignored by [`EnvRecord::encode`].
    pub crc32: u32,
}

impl EnvRecord {
    /// An all-zero record, as written by a fresh stand-alone file.
    pub fn blank() -> Self {
        Self::default()
    }

    /// Decode and verify one record. Fails on a length mismatch or a CRC
    /// mismatch; user variables are not walked here.
    pub fn decode(bytes: &[u8]) -> EnvResult<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(EnvError::corrupt(format!(
                "record is {} bytes, expected {}",
                bytes.len(),
                RECORD_SIZE
            )));
        }

        let stored = u32::from_le_bytes([
            bytes[CRC_COVERED],
            bytes[CRC_COVERED + 1],
            bytes[CRC_COVERED + 2],
            bytes[CRC_COVERED + 3],
        ]);
        let computed = crc32fast::hash(&bytes[..CRC_COVERED]);
        if stored != computed {
            return Err(EnvError::CrcMismatch { stored, computed });
        }

        let mut cur = Cursor::new(&bytes[..CRC_COVERED]);
        let kernel_file = EnvString::from_units(&read_units(&mut cur)?);
        let kernel_params = EnvString::from_units(&read_units(&mut cur)?);
        let in_progress = cur.read_u8()? != 0;
        let ustate = cur.read_u16::<LittleEndian>()?;
        let watchdog_timeout_sec = cur.read_u32::<LittleEndian>()?;
        let revision = cur.read_u32::<LittleEndian>()?;
        let mut area = vec![0u8; ENV_MEM_USERVARS];
        cur.read_exact(&mut area)?;

        Ok(Self {
            kernel_file,
            kernel_params,
            in_progress,
            ustate,
            watchdog_timeout_sec,
            revision,
            user_vars: UserVarArea::from_bytes(&area)?,
            crc32: stored,
        })
    }

    /// Serialize with a freshly computed checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        self.write_body(&mut buf);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Recompute the checksum, store it in the record and return the bytes.
    pub fn seal(&mut self) -> Vec<u8> {
        let bytes = self.encode();
        self.crc32 = crc32fast::hash(&bytes[..CRC_COVERED]);
        bytes
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        let mut units = [0u8; TEXT_FIELD_BYTES];
        LittleEndian::write_u16_into(&self.kernel_file.to_field(), &mut units);
        buf.extend_from_slice(&units);
        LittleEndian::write_u16_into(&self.kernel_params.to_field(), &mut units);
        buf.extend_from_slice(&units);
        buf.push(u8::from(self.in_progress));
        buf.extend_from_slice(&self.ustate.to_le_bytes());
        buf.extend_from_slice(&self.watchdog_timeout_sec.to_le_bytes());
        buf.extend_from_slice(&self.revision.to_le_bytes());
        buf.extend_from_slice(self.user_vars.as_bytes());
    }
}

fn read_units(cur: &mut Cursor<&[u8]>) -> std::io::Result<Vec<u16>> {
    let mut units = vec![0u16; ENV_STRING_LENGTH];
    cur.read_u16_into::<LittleEndian>(&mut units)?;
    Ok(units)
}
