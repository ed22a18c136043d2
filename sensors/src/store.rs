//! Persistent storage for configuration groups
//!
//! A group is a map from channel name to its [`CalibrationConfig`]. The
//! on-disk form is one TOML file per group:
//!
//! ```toml
//! [leak]
//! in_min = 9.0
//! in_max = 4095.0
//! out_min = 0.0
//! out_max = 100.0
//! decimals = 0
//! ```

use crate::calibration::CalibrationConfig;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stored calibrations keyed by channel name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigGroup(pub BTreeMap<String, CalibrationConfig>);

impl ConfigGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &str) -> Option<&CalibrationConfig> {
        self.0.get(channel)
    }

    pub fn insert(&mut self, channel: &str, config: CalibrationConfig) {
        self.0.insert(channel.to_string(), config);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CalibrationConfig)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Load and save named configuration groups
pub trait ConfigStore: Send {
    /// `Ok(None)` when the group has never been saved
    fn load(&self, group: &str) -> Result<Option<ConfigGroup>, ConfigError>;

    fn save(&mut self, group: &str, config: &ConfigGroup) -> Result<(), ConfigError>;
}

fn check_group_name(group: &str) -> Result<(), ConfigError> {
    let valid = !group.is_empty()
        && group.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidGroup(group.to_string()))
    }
}

/// One `<group>.toml` file per group under a directory
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    dir: PathBuf,
}

impl TomlConfigStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, group: &str) -> Result<PathBuf, ConfigError> {
        check_group_name(group)?;
        Ok(self.dir.join(format!("{}.toml", group)))
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self, group: &str) -> Result<Option<ConfigGroup>, ConfigError> {
        let path = self.path_for(group)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let config: ConfigGroup = toml::from_str(&content)?;
        tracing::debug!("Loaded {} channel(s) from {:?}", config.0.len(), path);
        Ok(Some(config))
    }

    fn save(&mut self, group: &str, config: &ConfigGroup) -> Result<(), ConfigError> {
        let path = self.path_for(group)?;
        std::fs::create_dir_all(&self.dir)?;

        let content = toml::to_string_pretty(config)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!("Saved configuration group {} to {:?}", group, path);
        Ok(())
    }
}

/// In-memory store; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    groups: BTreeMap<String, ConfigGroup>,
    saves: usize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.inner().saves
    }

    pub fn group(&self, group: &str) -> Option<ConfigGroup> {
        self.inner().groups.get(group).cloned()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self, group: &str) -> Result<Option<ConfigGroup>, ConfigError> {
        check_group_name(group)?;
        Ok(self.inner().groups.get(group).cloned())
    }

    fn save(&mut self, group: &str, config: &ConfigGroup) -> Result<(), ConfigError> {
        check_group_name(group)?;
        let mut inner = self.inner();
        inner.groups.insert(group.to_string(), config.clone());
        inner.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roomwatch-store-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sample_group() -> ConfigGroup {
        let mut group = ConfigGroup::new();
        group.insert("leak", CalibrationConfig::new(20.0, 4000.0, 0.0, 100.0, 1));
        group.insert("light", CalibrationConfig::new(4095.0, 600.0, 0.0, 100.0, 1));
        group
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = temp_dir("roundtrip");
        let mut store = TomlConfigStore::new(&dir);
        assert_eq!(store.load("room_cfg").unwrap(), None);

        store.save("room_cfg", &sample_group()).unwrap();
        assert!(dir.join("room_cfg.toml").exists());
        assert!(!dir.join("room_cfg.toml.tmp").exists());
        assert_eq!(store.load("room_cfg").unwrap(), Some(sample_group()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_layout() {
        let content = toml::to_string_pretty(&sample_group()).unwrap();
        assert!(content.contains("[leak]"));
        assert!(content.contains("in_min = 20.0"));
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("room_cfg.toml"), "[leak\nin_min = ").unwrap();

        let store = TomlConfigStore::new(&dir);
        assert!(matches!(store.load("room_cfg"), Err(ConfigError::Deserialize(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_group_name_validated() {
        let store = TomlConfigStore::new("/tmp");
        assert!(matches!(store.path_for("../etc/passwd"), Err(ConfigError::InvalidGroup(_))));
        assert!(store.path_for("").is_err());
        assert!(store.path_for("room-cfg_2").is_ok());
    }

    #[test]
    fn test_memory_store_shares_state() {
        let store = MemoryConfigStore::new();
        let mut writer = store.clone();
        writer.save("room_cfg", &sample_group()).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load("room_cfg").unwrap(), Some(sample_group()));
        assert_eq!(store.load("other").unwrap(), None);
    }
}
