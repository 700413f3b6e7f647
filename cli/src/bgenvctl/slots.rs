// cli/src/bgenvctl/slots.rs — the redundant store as one file per config partition

use bootguard_env::{EnvError, EnvFile, EnvResult, SlotStore};
use tracing::debug;

use super::config::Config;

/// Slot `i` is the file at `config.slots[i]`.
#[derive(Debug)]
pub struct FileSlotStore {
    files: Vec<EnvFile>,
}

impl FileSlotStore {
    pub fn open(config: &Config) -> Self {
        let files: Vec<EnvFile> = config.slots.iter().map(EnvFile::new).collect();
        debug!("opened {} config partitions", files.len());
        Self { files }
    }

    fn file(&self, index: usize) -> EnvResult<&EnvFile> {
        self.files.get(index).ok_or(EnvError::SlotOutOfRange {
            index,
            max: self.files.len().saturating_sub(1),
        })
    }
}

impl SlotStore for FileSlotStore {
    fn slot_count(&self) -> usize {
        self.files.len()
    }

    fn read_slot(&mut self, index: usize) -> EnvResult<Vec<u8>> {
        self.file(index)?.read_raw()
    }

    fn write_slot(&mut self, index: usize, bytes: &[u8]) -> EnvResult<()> {
        self.file(index)?.store(bytes)
    }
}
