//! # Coordinator Configuration
//!
//! Configuration management for refresh coordinators.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CADENCE_UPDATE_INTERVAL_SECS=60                                    │
//! │     CADENCE_DEBOUNCE_COOLDOWN_MS=5000                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cadence/cadence.toml (Linux)                             │
//! │     ~/Library/Application Support/dev.cadence.cadence/cadence.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30s interval, 50-500ms jitter, 10s cooldown                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cadence.toml
//! [coordinator]
//! name = "weather"
//! update_interval_secs = 30    # omit to disable scheduling
//! always_update = true
//! reschedule_on_auth_failure = true
//!
//! [jitter]
//! min_ms = 50
//! max_ms = 500
//!
//! [debounce]
//! cooldown_ms = 10000
//! immediate = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use cadence_core::{
    DEFAULT_JITTER_MAX_MS, DEFAULT_JITTER_MIN_MS, DEFAULT_REQUEST_REFRESH_COOLDOWN_MS,
    DEFAULT_REQUEST_REFRESH_IMMEDIATE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, CoordinatorResult};

// =============================================================================
// Coordinator Settings
// =============================================================================

/// Settings for one coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Name used in logs and diagnostics.
    #[serde(default = "default_name")]
    pub name: String,

    /// Seconds between scheduled refreshes. `None` disables scheduling.
    ///
    /// Omitting the key inside a `[coordinator]` table disables scheduling;
    /// omitting the whole table keeps the default interval.
    #[serde(default)]
    pub update_interval_secs: Option<u64>,

    /// Notify listeners on every successful fetch, even when unchanged.
    #[serde(default = "default_true")]
    pub always_update: bool,

    /// Keep polling while reauthentication is pending.
    #[serde(default = "default_true")]
    pub reschedule_on_auth_failure: bool,
}

fn default_name() -> String {
    "cadence".to_string()
}

fn default_update_interval() -> Option<u64> {
    Some(30)
}

fn default_true() -> bool {
    true
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            name: default_name(),
            update_interval_secs: default_update_interval(),
            always_update: true,
            reschedule_on_auth_failure: true,
        }
    }
}

// =============================================================================
// Jitter Settings
// =============================================================================

/// Range the per-coordinator jitter offset is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterSettings {
    #[serde(default = "default_jitter_min")]
    pub min_ms: u64,

    #[serde(default = "default_jitter_max")]
    pub max_ms: u64,
}

fn default_jitter_min() -> u64 {
    DEFAULT_JITTER_MIN_MS
}

fn default_jitter_max() -> u64 {
    DEFAULT_JITTER_MAX_MS
}

impl Default for JitterSettings {
    fn default() -> Self {
        JitterSettings {
            min_ms: default_jitter_min(),
            max_ms: default_jitter_max(),
        }
    }
}

// =============================================================================
// Debounce Settings
// =============================================================================

/// Settings for the refresh request debouncer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebounceSettings {
    /// Cooldown window (milliseconds).
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Run the first request of a burst right away.
    #[serde(default = "default_immediate")]
    pub immediate: bool,
}

fn default_cooldown() -> u64 {
    DEFAULT_REQUEST_REFRESH_COOLDOWN_MS
}

fn default_immediate() -> bool {
    DEFAULT_REQUEST_REFRESH_IMMEDIATE
}

impl Default for DebounceSettings {
    fn default() -> Self {
        DebounceSettings {
            cooldown_ms: default_cooldown(),
            immediate: default_immediate(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    #[serde(default)]
    pub jitter: JitterSettings,

    #[serde(default)]
    pub debounce: DebounceSettings,
}

impl CadenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cadence.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CoordinatorResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading cadence config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load cadence config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CoordinatorResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CoordinatorError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoordinatorError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| CoordinatorError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Cadence config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.coordinator.name.trim().is_empty() {
            return Err(CoordinatorError::InvalidConfig(
                "coordinator name must not be empty".into(),
            ));
        }

        if self.coordinator.update_interval_secs == Some(0) {
            return Err(CoordinatorError::InvalidConfig(
                "update_interval_secs must be greater than 0 (omit it to disable polling)".into(),
            ));
        }

        if self.jitter.min_ms > self.jitter.max_ms {
            return Err(CoordinatorError::InvalidConfig(format!(
                "jitter min_ms ({}) exceeds max_ms ({})",
                self.jitter.min_ms, self.jitter.max_ms
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("CADENCE_NAME") {
            debug!(name = %name, "Overriding coordinator name from environment");
            self.coordinator.name = name;
        }

        if let Some(interval) = lookup("CADENCE_UPDATE_INTERVAL_SECS") {
            match interval.to_lowercase().as_str() {
                "0" | "none" | "off" => self.coordinator.update_interval_secs = None,
                other => match other.parse::<u64>() {
                    Ok(secs) => {
                        debug!(secs, "Overriding update interval from environment");
                        self.coordinator.update_interval_secs = Some(secs);
                    }
                    Err(_) => warn!(value = %interval, "Invalid update interval in environment"),
                },
            }
        }

        if let Some(always) = lookup("CADENCE_ALWAYS_UPDATE") {
            match parse_bool(&always) {
                Some(b) => self.coordinator.always_update = b,
                None => warn!(value = %always, "Invalid CADENCE_ALWAYS_UPDATE in environment"),
            }
        }

        if let Some(cooldown) = lookup("CADENCE_DEBOUNCE_COOLDOWN_MS") {
            if let Ok(ms) = cooldown.parse::<u64>() {
                debug!(ms, "Overriding debounce cooldown from environment");
                self.debounce.cooldown_ms = ms;
            }
        }

        if let Some(immediate) = lookup("CADENCE_DEBOUNCE_IMMEDIATE") {
            match parse_bool(&immediate) {
                Some(b) => self.debounce.immediate = b,
                None => warn!(value = %immediate, "Invalid CADENCE_DEBOUNCE_IMMEDIATE in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "cadence", "cadence")
            .map(|dirs| dirs.config_dir().join("cadence.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the update interval, `None` when scheduling is off.
    pub fn update_interval(&self) -> Option<Duration> {
        self.coordinator.update_interval_secs.map(Duration::from_secs)
    }

    /// Returns the debounce cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.debounce.cooldown_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CadenceConfig::default();
        assert_eq!(config.update_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.jitter.min_ms, 50);
        assert_eq!(config.jitter.max_ms, 500);
        assert_eq!(config.cooldown(), Duration::from_secs(10));
        assert!(config.debounce.immediate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CadenceConfig::default();

        config.coordinator.name = "  ".to_string();
        assert!(config.validate().is_err());

        config.coordinator.name = "weather".to_string();
        config.coordinator.update_interval_secs = Some(0);
        assert!(config.validate().is_err());

        config.coordinator.update_interval_secs = None;
        assert!(config.validate().is_ok());

        config.jitter.min_ms = 600;
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CadenceConfig = toml::from_str(
            r#"
            [coordinator]
            name = "weather"

            [debounce]
            immediate = false
            "#,
        )
        .unwrap();
        assert_eq!(config.coordinator.name, "weather");
        assert_eq!(config.coordinator.update_interval_secs, None);
        assert_eq!(config.jitter, JitterSettings::default());
        assert!(!config.debounce.immediate);
        assert_eq!(config.debounce.cooldown_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CADENCE_NAME", "garage"),
            ("CADENCE_UPDATE_INTERVAL_SECS", "none"),
            ("CADENCE_ALWAYS_UPDATE", "false"),
            ("CADENCE_DEBOUNCE_COOLDOWN_MS", "250"),
            ("CADENCE_DEBOUNCE_IMMEDIATE", "no"),
        ]
        .into_iter()
        .collect();

        let mut config = CadenceConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.coordinator.name, "garage");
        assert_eq!(config.update_interval(), None);
        assert!(!config.coordinator.always_update);
        assert_eq!(config.debounce.cooldown_ms, 250);
        assert!(!config.debounce.immediate);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = CadenceConfig::default();
        config.apply_overrides_from(|key| match key {
            "CADENCE_UPDATE_INTERVAL_SECS" => Some("soon".to_string()),
            "CADENCE_ALWAYS_UPDATE" => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config.coordinator.update_interval_secs, Some(30));
        assert!(config.coordinator.always_update);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("cadence-test-{}.toml", std::process::id()));
        let mut config = CadenceConfig::default();
        config.coordinator.name = "solar".to_string();
        config.coordinator.update_interval_secs = Some(120);
        config.save(Some(path.clone())).unwrap();

        let loaded = CadenceConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.coordinator.name, "solar");
        assert_eq!(loaded.update_interval(), Some(Duration::from_secs(120)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_toml_serialization() {
        let config = CadenceConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[coordinator]"));
        assert!(toml_str.contains("[jitter]"));
        assert!(toml_str.contains("[debounce]"));
    }
}
