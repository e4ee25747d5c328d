//! Configuration loading and management
//!
//! [`GuardConfig`] is what the guard is constructed from. [`Settings`] is the
//! host-level configuration: defaults overlaid by an optional JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::keyboard::{BlockPolicy, ExitCombination};

/// Environment variable naming the JSON settings file
pub const CONFIG_PATH_ENV: &str = "KIOSK_GUARD_CONFIG";

/// Maximum spread between the first and last key of the exit combination
pub const DEFAULT_EXIT_WINDOW: Duration = Duration::from_secs(2);

/// Age after which a held key is presumed stuck and evicted
pub const DEFAULT_MAX_KEY_AGE: Duration = Duration::from_secs(10);

/// How often the host checks the exit flag
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised while building or loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("exit combination must name at least one key")]
    EmptyExitCombination,

    #[error("unknown key name {0:?}")]
    UnknownKeyName(String),

    #[error("unknown blocked key rule {0:?}")]
    UnknownBlockRule(String),

    #[error("exit window must be greater than zero")]
    ZeroExitWindow,

    #[error("max key age ({max_key_age:?}) must not be shorter than the exit window ({exit_window:?})")]
    KeyAgeBelowWindow {
        max_key_age: Duration,
        exit_window: Duration,
    },

    #[error("config file is not a JSON object: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Guard construction parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Key names that must be held together to request exit
    pub exit_combination: Vec<String>,

    /// Shortcut rules to suppress (`windows`, `alt+tab`, `alt+f4`, ...)
    pub blocked_keys: Vec<String>,

    /// Maximum press-time spread across the exit combination
    pub exit_window: Duration,

    /// Held keys older than this are evicted on the next press
    pub max_key_age: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            exit_combination: vec!["ctrl".into(), "shift".into(), "esc".into()],
            blocked_keys: vec!["windows".into(), "alt+tab".into(), "alt+f4".into()],
            exit_window: DEFAULT_EXIT_WINDOW,
            max_key_age: DEFAULT_MAX_KEY_AGE,
        }
    }
}

impl GuardConfig {
    /// Check the timing constraints
    ///
    /// Key names are validated when the guard converts them, see
    /// [`ExitCombination::parse`] and [`BlockPolicy::from_names`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exit_window.is_zero() {
            return Err(ConfigError::ZeroExitWindow);
        }
        if self.max_key_age < self.exit_window {
            return Err(ConfigError::KeyAgeBelowWindow {
                max_key_age: self.max_key_age,
                exit_window: self.exit_window,
            });
        }
        Ok(())
    }
}

/// Host application settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Whether the keyboard guard should be started at all
    pub enable_keyboard_lock: bool,

    /// Guard parameters
    pub guard: GuardConfig,

    /// Interval at which the host polls the exit flag
    pub poll_interval: Duration,

    /// File the settings were read from, if any
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_keyboard_lock: true,
            guard: GuardConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            config_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `KIOSK_GUARD_CONFIG`, or defaults
    pub fn load() -> Self {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(path),
            None => {
                debug!("{} not set, using default settings", CONFIG_PATH_ENV);
                Self::default()
            }
        }
    }

    /// Load settings from a JSON file
    ///
    /// A missing, unreadable or malformed file yields defaults, so a broken
    /// settings file never keeps the kiosk from starting.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file found, using defaults");
            return Self::default();
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read config file, using defaults"
                );
                return Self::default();
            }
        };

        match Self::from_json_str(&text) {
            Ok(mut settings) => {
                settings.config_path = Some(path.to_path_buf());
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                Self::default()
            }
        }
    }

    /// Parse settings from JSON text
    ///
    /// Keys starting with `_` are comments. Unknown keys and invalid values
    /// are skipped with a warning and the default is kept.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let entries: Map<String, Value> = serde_json::from_str(text)?;
        let mut settings = Self::default();

        for (key, value) in entries {
            if key.starts_with('_') {
                continue;
            }
            if let Err(reason) = settings.apply(&key, value) {
                warn!(key = %key, reason = %reason, "ignoring config value");
            }
        }

        if let Err(e) = settings.guard.validate() {
            warn!(error = %e, "inconsistent timing settings, restoring defaults");
            settings.guard.exit_window = DEFAULT_EXIT_WINDOW;
            settings.guard.max_key_age = DEFAULT_MAX_KEY_AGE;
        }

        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: Value) -> Result<(), String> {
        match key {
            "enable_keyboard_lock" => {
                self.enable_keyboard_lock = typed(value)?;
            }
            "exit_combination" => {
                let names: Vec<String> = typed(value)?;
                ExitCombination::parse(&names).map_err(|e| e.to_string())?;
                self.guard.exit_combination = names;
            }
            "blocked_keys" => {
                let names: Vec<String> = typed(value)?;
                BlockPolicy::from_names(&names).map_err(|e| e.to_string())?;
                self.guard.blocked_keys = names;
            }
            "exit_window_ms" => {
                self.guard.exit_window = millis_in(value, 1..=60_000)?;
            }
            "max_key_age_ms" => {
                self.guard.max_key_age = millis_in(value, 1..=600_000)?;
            }
            "poll_interval_ms" => {
                self.poll_interval = millis_in(value, 1..=1_000)?;
            }
            _ => return Err("unknown config key".to_string()),
        }
        debug!(key, "applied config value");
        Ok(())
    }
}

fn typed<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("wrong type: {e}"))
}

fn millis_in(value: Value, range: std::ops::RangeInclusive<u64>) -> Result<Duration, String> {
    let ms: u64 = typed(value)?;
    if !range.contains(&ms) {
        return Err(format!(
            "{ms}ms outside {}..={}ms",
            range.start(),
            range.end()
        ));
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.exit_combination, vec!["ctrl", "shift", "esc"]);
        assert_eq!(config.exit_window, Duration::from_secs(2));
        assert_eq!(config.max_key_age, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_windows() {
        let zero = GuardConfig {
            exit_window: Duration::ZERO,
            ..GuardConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroExitWindow)));

        let short_age = GuardConfig {
            max_key_age: Duration::from_secs(1),
            ..GuardConfig::default()
        };
        assert!(matches!(
            short_age.validate(),
            Err(ConfigError::KeyAgeBelowWindow { .. })
        ));
    }

    #[test]
    fn test_settings_from_json() {
        let settings = Settings::from_json_str(
            r#"{
                "_comment": "parent lock settings",
                "enable_keyboard_lock": false,
                "exit_combination": ["Ctrl", "Alt", "q"],
                "exit_window_ms": 1500,
                "poll_interval_ms": 50
            }"#,
        )
        .unwrap();

        assert!(!settings.enable_keyboard_lock);
        assert_eq!(settings.guard.exit_combination, vec!["Ctrl", "Alt", "q"]);
        assert_eq!(settings.guard.exit_window, Duration::from_millis(1500));
        assert_eq!(settings.poll_interval, Duration::from_millis(50));
        assert_eq!(settings.guard.max_key_age, DEFAULT_MAX_KEY_AGE);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let settings = Settings::from_json_str(
            r#"{
                "enable_keyboard_lock": "yes",
                "exit_combination": [],
                "blocked_keys": ["alt+space"],
                "fps": 60,
                "poll_interval_ms": 0
            }"#,
        )
        .unwrap();

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unknown_exit_key_keeps_default() {
        let settings =
            Settings::from_json_str(r#"{ "exit_combination": ["ctrl", "hyper"] }"#).unwrap();
        assert_eq!(
            settings.guard.exit_combination,
            GuardConfig::default().exit_combination
        );
    }

    #[test]
    fn test_inconsistent_timing_restores_defaults() {
        let settings = Settings::from_json_str(
            r#"{ "exit_window_ms": 5000, "max_key_age_ms": 1000 }"#,
        )
        .unwrap();
        assert_eq!(settings.guard.exit_window, DEFAULT_EXIT_WINDOW);
        assert_eq!(settings.guard.max_key_age, DEFAULT_MAX_KEY_AGE);
    }

    #[test]
    fn test_non_object_is_error() {
        assert!(matches!(
            Settings::from_json_str("[1, 2, 3]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::from_file("/nonexistent/kiosk-guard/config.json");
        assert_eq!(settings, Settings::default());
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kiosk-guard-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let path = scratch_path("malformed.json");
        std::fs::write(&path, "{ not json").unwrap();

        let settings = Settings::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.config_path, None);
    }

    #[test]
    fn test_unreadable_file_uses_defaults() {
        // A directory exists but cannot be read as text
        let path = scratch_path("config-dir");
        std::fs::create_dir_all(&path).unwrap();

        let settings = Settings::from_file(&path);
        std::fs::remove_dir(&path).unwrap();

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_valid_file_records_path() {
        let path = scratch_path("valid.json");
        std::fs::write(&path, r#"{ "enable_keyboard_lock": false }"#).unwrap();

        let settings = Settings::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(!settings.enable_keyboard_lock);
        assert_eq!(settings.config_path.as_deref(), Some(path.as_path()));
    }
}
