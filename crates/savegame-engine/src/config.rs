//! Save engine configuration.
//!
//! # Environment Variables
//!
//! - `SAVEGAME_DIR`: Override the slot root directory
//! - `SAVEGAME_MAX_SAVE_SLOTS`: Maximum number of slots
//! - `SAVEGAME_BACKUPS_ENABLED`: `true`/`false`
//! - `SAVEGAME_MAX_BACKUPS`: Backups kept per slot
//! - `SAVEGAME_AUTOSAVE_ENABLED`: `true`/`false`
//! - `SAVEGAME_AUTOSAVE_INTERVAL_SECS`: Seconds between autosaves
//! - `SAVEGAME_MAX_LOAD_RETRIES`: Load attempts before giving up
//! - `SAVEGAME_RETRY_BACKOFF_MS`: Base backoff between load attempts
//! - `SAVEGAME_CACHE_TTL_SECS`: Slot discovery cache lifetime

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use savegame_models::CURRENT_SAVE_VERSION;

use crate::error::ConfigError;

/// Environment variable for the slot root directory.
pub const SAVE_DIR_ENV: &str = "SAVEGAME_DIR";

/// Default slot root under home.
const DEFAULT_SAVE_DIR: &str = ".savegame/slots";

/// Get the slot root directory.
///
/// The directory is determined by:
/// 1. `SAVEGAME_DIR` environment variable if set
/// 2. `~/.savegame/slots` if home directory is available
/// 3. `.savegame/slots` in current directory as fallback
pub fn default_save_root() -> PathBuf {
    std::env::var(SAVE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_SAVE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR))
        })
}

/// Configuration for saving and loading.
#[derive(Debug, Clone)]
pub struct SaveConfig {
    /// Maximum number of distinct slots.
    pub max_save_slots: usize,
    /// Whether a backup is taken before overwriting a slot.
    pub backups_enabled: bool,
    /// Backups kept per slot; older ones are pruned first.
    pub max_backups: usize,
    pub autosave_enabled: bool,
    pub autosave_interval: Duration,
    /// Load attempts before reporting failure.
    pub max_load_retries: u32,
    /// Linear backoff unit between load attempts.
    pub retry_backoff: Duration,
    /// How long discovered slot descriptors stay fresh.
    pub discovery_cache_ttl: Duration,
    /// Validate raw payload bytes before decoding.
    pub auto_validate_before_load: bool,
    /// Restore from the newest backup after a failed load attempt.
    pub error_recovery_enabled: bool,
    /// Schema version written by this build.
    pub running_version: String,
    /// Upper bound for the save attempted at shutdown.
    pub shutdown_save_timeout: Duration,
    /// Pause after applying a loaded record.
    pub settle_delay: Duration,
    /// Pause before the streaming strategy reads the payload.
    pub streaming_delay: Duration,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            max_save_slots: 20,
            backups_enabled: true,
            max_backups: 3,
            autosave_enabled: true,
            autosave_interval: Duration::from_secs(300),
            max_load_retries: 3,
            retry_backoff: Duration::from_secs(1),
            discovery_cache_ttl: Duration::from_secs(120),
            auto_validate_before_load: true,
            error_recovery_enabled: true,
            running_version: CURRENT_SAVE_VERSION.to_string(),
            shutdown_save_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(100),
            streaming_delay: Duration::from_millis(50),
        }
    }
}

/// On-disk settings file; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    max_save_slots: Option<usize>,
    backups_enabled: Option<bool>,
    max_backups: Option<usize>,
    autosave_enabled: Option<bool>,
    autosave_interval_secs: Option<u64>,
    max_load_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    discovery_cache_ttl_secs: Option<u64>,
    auto_validate_before_load: Option<bool>,
    error_recovery_enabled: Option<bool>,
    shutdown_save_timeout_secs: Option<u64>,
}

impl SaveConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SAVEGAME_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by a JSON settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::default().apply_file(file))
    }

    /// Applies overrides from a key lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring invalid config value");
                    None
                }
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        if let Some(v) = parse(lookup, "SAVEGAME_MAX_SAVE_SLOTS") {
            self.max_save_slots = v;
        }
        if let Some(v) = parse(lookup, "SAVEGAME_BACKUPS_ENABLED") {
            self.backups_enabled = v;
        }
        if let Some(v) = parse(lookup, "SAVEGAME_MAX_BACKUPS") {
            self.max_backups = v;
        }
        if let Some(v) = parse(lookup, "SAVEGAME_AUTOSAVE_ENABLED") {
            self.autosave_enabled = v;
        }
        if let Some(v) = parse(lookup, "SAVEGAME_AUTOSAVE_INTERVAL_SECS") {
            self.autosave_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse(lookup, "SAVEGAME_MAX_LOAD_RETRIES") {
            self.max_load_retries = v;
        }
        if let Some(v) = parse(lookup, "SAVEGAME_RETRY_BACKOFF_MS") {
            self.retry_backoff = Duration::from_millis(v);
        }
        if let Some(v) = parse(lookup, "SAVEGAME_CACHE_TTL_SECS") {
            self.discovery_cache_ttl = Duration::from_secs(v);
        }
        self
    }

    fn apply_file(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.max_save_slots {
            self.max_save_slots = v;
        }
        if let Some(v) = file.backups_enabled {
            self.backups_enabled = v;
        }
        if let Some(v) = file.max_backups {
            self.max_backups = v;
        }
        if let Some(v) = file.autosave_enabled {
            self.autosave_enabled = v;
        }
        if let Some(v) = file.autosave_interval_secs {
            self.autosave_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.max_load_retries {
            self.max_load_retries = v;
        }
        if let Some(v) = file.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(v);
        }
        if let Some(v) = file.discovery_cache_ttl_secs {
            self.discovery_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = file.auto_validate_before_load {
            self.auto_validate_before_load = v;
        }
        if let Some(v) = file.error_recovery_enabled {
            self.error_recovery_enabled = v;
        }
        if let Some(v) = file.shutdown_save_timeout_secs {
            self.shutdown_save_timeout = Duration::from_secs(v);
        }
        self
    }

    pub fn with_max_save_slots(mut self, max: usize) -> Self {
        self.max_save_slots = max;
        self
    }

    pub fn with_backups_enabled(mut self, enabled: bool) -> Self {
        self.backups_enabled = enabled;
        self
    }

    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.max_backups = max;
        self
    }

    pub fn with_autosave(mut self, enabled: bool, interval: Duration) -> Self {
        self.autosave_enabled = enabled;
        self.autosave_interval = interval;
        self
    }

    /// Sets the load retry budget and backoff unit.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_load_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_discovery_cache_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_cache_ttl = ttl;
        self
    }

    pub fn with_auto_validate(mut self, enabled: bool) -> Self {
        self.auto_validate_before_load = enabled;
        self
    }

    pub fn with_error_recovery(mut self, enabled: bool) -> Self {
        self.error_recovery_enabled = enabled;
        self
    }

    pub fn with_running_version(mut self, version: impl Into<String>) -> Self {
        self.running_version = version.into();
        self
    }

    pub fn with_shutdown_save_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_save_timeout = timeout;
        self
    }

    /// Sets the settle and streaming delays.
    pub fn with_delays(mut self, settle: Duration, streaming: Duration) -> Self {
        self.settle_delay = settle;
        self.streaming_delay = streaming;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SaveConfig::default();

        assert_eq!(config.max_save_slots, 20);
        assert!(config.backups_enabled);
        assert_eq!(config.max_backups, 3);
        assert_eq!(config.autosave_interval, Duration::from_secs(300));
        assert_eq!(config.max_load_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.discovery_cache_ttl, Duration::from_secs(120));
        assert_eq!(config.running_version, "1.2.0");
        assert_eq!(config.shutdown_save_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = SaveConfig::new()
            .with_max_save_slots(5)
            .with_max_backups(1)
            .with_retries(2, Duration::from_millis(10))
            .with_autosave(false, Duration::from_secs(60));

        assert_eq!(config.max_save_slots, 5);
        assert_eq!(config.max_backups, 1);
        assert_eq!(config.max_load_retries, 2);
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
        assert!(!config.autosave_enabled);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SAVEGAME_MAX_BACKUPS", "7"),
            ("SAVEGAME_BACKUPS_ENABLED", "false"),
            ("SAVEGAME_RETRY_BACKOFF_MS", "250"),
            ("SAVEGAME_MAX_SAVE_SLOTS", "lots"),
        ]
        .into_iter()
        .collect();

        let config = SaveConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.max_backups, 7);
        assert!(!config.backups_enabled);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        // Invalid value keeps the default
        assert_eq!(config.max_save_slots, 20);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("savegame.json");
        fs::write(&path, r#"{"max_backups": 5, "autosave_interval_secs": 30}"#).unwrap();

        let config = SaveConfig::from_file(&path).unwrap();

        assert_eq!(config.max_backups, 5);
        assert_eq!(config.autosave_interval, Duration::from_secs(30));
        assert_eq!(config.max_save_slots, 20);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempdir().unwrap();
        let missing = SaveConfig::from_file(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"max_backups": "three"}"#).unwrap();
        assert!(matches!(SaveConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
