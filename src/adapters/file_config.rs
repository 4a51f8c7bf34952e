//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] over a single JSON document on disk.
//!
//! - Missing fields take their defaults (`#[serde(default)]` on the config).
//! - Values are validated on load and before every save; invalid ranges
//!   are rejected, never clamped.
//! - Saves write a sibling temp file and rename it over the original, so
//!   a crash mid-write leaves the previous file intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "sterisort.json";

pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonFileConfig {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ConfigError::NotFound),
            Err(e) => {
                warn!("Config: reading {} failed: {}", self.path.display(), e);
                return Err(ConfigError::IoError);
            }
        };
        let config: SystemConfig = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("Config: {} is not valid JSON: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        config.validate()?;
        info!("Config: loaded {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let json = serde_json::to_vec_pretty(config).map_err(|_| ConfigError::IoError)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|_| ConfigError::IoError)?;
        fs::rename(&tmp, &self.path).map_err(|_| ConfigError::IoError)?;
        info!("Config: saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_path(name: &str) -> PathBuf {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "sterisort-{}-{}-{}.json",
            std::process::id(),
            n,
            name
        ))
    }

    #[test]
    fn missing_file_is_not_found() {
        let store = JsonFileConfig::new(scratch_path("missing"));
        assert_eq!(store.load().unwrap_err(), ConfigError::NotFound);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let path = scratch_path("roundtrip");
        let store = JsonFileConfig::new(&path);
        let cfg = SystemConfig {
            auto_act: true,
            alert_dwell_ms: 3_500,
            ..SystemConfig::default()
        };
        store.save(&cfg).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.auto_act);
        assert_eq!(loaded.alert_dwell_ms, 3_500);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = scratch_path("partial");
        fs::write(&path, br#"{"backend_addr":"10.0.0.7:5001"}"#).unwrap();
        let loaded = JsonFileConfig::new(&path).load().unwrap();
        assert_eq!(loaded.backend_addr, "10.0.0.7:5001");
        assert_eq!(loaded.alert_dwell_ms, SystemConfig::default().alert_dwell_ms);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn garbage_is_corrupted() {
        let path = scratch_path("garbage");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(
            JsonFileConfig::new(&path).load().unwrap_err(),
            ConfigError::Corrupted
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn invalid_values_are_not_saved() {
        let path = scratch_path("invalid");
        let store = JsonFileConfig::new(&path);
        let cfg = SystemConfig {
            alert_dwell_ms: 0,
            ..SystemConfig::default()
        };
        assert!(matches!(
            store.save(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert!(!path.exists());
    }
}
