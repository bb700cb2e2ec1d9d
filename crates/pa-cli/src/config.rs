//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pa_core::{ConfigError, TrackersConfig};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Per-collector settings.
    #[serde(default)]
    pub trackers: TrackersConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("pa.db"),
            trackers: TrackersConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PA_*, nested keys split on "__")
        figment = figment.merge(Env::prefixed("PA_").split("__"));

        figment.extract()
    }

    /// Checks the tracker settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trackers.validate()
    }

    /// Lock file guarding against two `pa run` processes on one database.
    pub fn lock_path(&self) -> PathBuf {
        self.database_path.with_extension("lock")
    }
}

/// Returns the platform-specific config directory for pa.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pa"))
}

/// Returns the platform-specific data directory for pa.
///
/// On Linux: `~/.local/share/pa`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pa"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_pa() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "pa");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("pa.db"));
        assert_eq!(config.lock_path(), data_dir.join("pa.lock"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_overrides_nested_tracker_settings() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/pa-test.db"

[trackers.self_report]
interval_ms = 1500
sampling_randomization = 0.0

[trackers.user_input]
enabled = false
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/pa-test.db"));
        assert_eq!(config.trackers.self_report.interval_ms, 1500);
        assert!(config.trackers.self_report.sampling_randomization.abs() < f64::EPSILON);
        assert_eq!(config.trackers.self_report.scale, 7);
        assert!(!config.trackers.user_input.enabled);
        assert!(config.trackers.window_activity.enabled);
    }

    #[test]
    fn test_invalid_tracker_settings_fail_validation() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[trackers.self_report]\nscale = 1\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "self-report scale must be at least 2, got 1"
        );
    }
}
