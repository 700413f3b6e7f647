// cli/src/bgenvctl/config.rs — where the configuration slots live
//
//   slots = ["/boot/efi/BOOT0/BGENV.DAT", "/boot/efi/BOOT1/BGENV.DAT"]
//
// Relative entries are taken relative to the directory holding the config file.

use std::fs;
use std::path::{Path, PathBuf};

use bootguard_env::ENV_NUM_CONFIG_PARTS;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::CliError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/efibootguard/bgenv.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub slots: Vec<PathBuf>,
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`].
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let text = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::parse(&text)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
        if let Some(base) = path.parent() {
            for slot in config.slots.iter_mut().filter(|s| s.is_relative()) {
                *slot = base.join(&*slot);
            }
        }
        debug!("config {}: slots {:?}", path.display(), config.slots);
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(text).map_err(|e| e.to_string())?;
        if config.slots.len() != ENV_NUM_CONFIG_PARTS {
            return Err(format!(
                "expected {} slots, found {}",
                ENV_NUM_CONFIG_PARTS,
                config.slots.len()
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn parse_two_slots() {
        let config = Config::parse("slots = [\"/a/BGENV.DAT\", \"/b/BGENV.DAT\"]\n").unwrap();
        assert_eq!(
            config.slots,
            vec![PathBuf::from("/a/BGENV.DAT"), PathBuf::from("/b/BGENV.DAT")]
        );
    }

    #[test]
    fn wrong_slot_count() {
        assert!(Config::parse("slots = [\"/a\"]").is_err());
        assert!(Config::parse("slots = [\"/a\", \"/b\", \"/c\"]").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("slots = [\"/a\", \"/b\"]\nmode = \"fat\"").is_err());
    }

    #[test]
    fn relative_slots_follow_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bgenv.toml");
        fs::write(&path, "slots = [\"p0/BGENV.DAT\", \"/abs/BGENV.DAT\"]").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.slots[0], dir.path().join("p0/BGENV.DAT"));
        assert_eq!(config.slots[1], PathBuf::from("/abs/BGENV.DAT"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("none.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
