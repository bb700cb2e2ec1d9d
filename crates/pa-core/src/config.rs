//! Tracker configuration.
//!
//! Defaults mirror the study configuration the tracker ships with: window
//! activity every second, input counts every ten seconds, a self-report prompt
//! roughly every hour (±20%) and a participation check every minute.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::CollectorKind;

/// Longest accepted collector interval: one week.
pub const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Invalid tracker configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{kind} interval must be greater than zero")]
    ZeroInterval { kind: CollectorKind },

    #[error("{kind} interval of {value} ms exceeds the maximum of {MAX_INTERVAL_MS} ms")]
    IntervalTooLong { kind: CollectorKind, value: u64 },

    #[error("sampling randomization must be in [0, 1), got {value}")]
    RandomizationOutOfRange { value: f64 },

    #[error("self-report scale must be at least 2, got {value}")]
    ScaleTooSmall { value: u8 },

    #[error("self-report needs at least one question")]
    NoQuestions,

    #[error("self-report question {index} is empty")]
    EmptyQuestion { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowActivityConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub track_urls: bool,
    pub track_window_titles: bool,
}

impl Default for WindowActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            track_urls: true,
            track_window_titles: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInputConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for UserInputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfReportConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Fraction by which each prompt interval is randomly stretched or shrunk.
    pub sampling_randomization: f64,
    pub scale: u8,
    pub questions: Vec<String>,
    /// Low/middle/high labels, one list per question.
    pub response_options: Vec<Vec<String>>,
}

impl Default for SelfReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60 * 60 * 1000,
            sampling_randomization: 0.2,
            scale: 7,
            questions: vec![
                "Compared to your normal level of productivity, how productive do you consider the previous session?".to_string(),
                "How well did you spend your time in the previous session?".to_string(),
            ],
            response_options: vec![
                vec![
                    "not at all productive".to_string(),
                    "moderately productive".to_string(),
                    "very productive".to_string(),
                ],
                vec![
                    "not well".to_string(),
                    "moderately well".to_string(),
                    "very well".to_string(),
                ],
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipationConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for ParticipationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
        }
    }
}

/// Per-kind collector settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackersConfig {
    pub window_activity: WindowActivityConfig,
    pub user_input: UserInputConfig,
    pub self_report: SelfReportConfig,
    pub participation: ParticipationConfig,
}

impl TrackersConfig {
    pub const fn is_enabled(&self, kind: CollectorKind) -> bool {
        match kind {
            CollectorKind::WindowActivity => self.window_activity.enabled,
            CollectorKind::UserInput => self.user_input.enabled,
            CollectorKind::SelfReport => self.self_report.enabled,
            CollectorKind::ParticipationCounter => self.participation.enabled,
        }
    }

    pub const fn interval_ms(&self, kind: CollectorKind) -> u64 {
        match kind {
            CollectorKind::WindowActivity => self.window_activity.interval_ms,
            CollectorKind::UserInput => self.user_input.interval_ms,
            CollectorKind::SelfReport => self.self_report.interval_ms,
            CollectorKind::ParticipationCounter => self.participation.interval_ms,
        }
    }

    pub const fn interval(&self, kind: CollectorKind) -> Duration {
        Duration::from_millis(self.interval_ms(kind))
    }

    /// Kinds enabled in this configuration, in registration order.
    pub fn enabled_kinds(&self) -> Vec<CollectorKind> {
        CollectorKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// Checks the settings of every enabled collector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in self.enabled_kinds() {
            let value = self.interval_ms(kind);
            if value == 0 {
                return Err(ConfigError::ZeroInterval { kind });
            }
            if value > MAX_INTERVAL_MS {
                return Err(ConfigError::IntervalTooLong { kind, value });
            }
        }
        if !self.self_report.enabled {
            return Ok(());
        }
        let report = &self.self_report;
        if !(0.0..1.0).contains(&report.sampling_randomization) {
            return Err(ConfigError::RandomizationOutOfRange {
                value: report.sampling_randomization,
            });
        }
        if report.scale < 2 {
            return Err(ConfigError::ScaleTooSmall {
                value: report.scale,
            });
        }
        if report.questions.is_empty() {
            return Err(ConfigError::NoQuestions);
        }
        if let Some(index) = report.questions.iter().position(|q| q.trim().is_empty()) {
            return Err(ConfigError::EmptyQuestion { index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_enable_everything() {
        let config = TrackersConfig::default();
        config.validate().unwrap();
        assert_eq!(config.enabled_kinds(), CollectorKind::ALL.to_vec());
        assert_eq!(
            config.interval(CollectorKind::SelfReport),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn partial_toml_style_input_fills_defaults() {
        let config: TrackersConfig = serde_json::from_value(serde_json::json!({
            "user_input": {"enabled": false},
            "self_report": {"interval_ms": 1000}
        }))
        .unwrap();
        assert!(!config.is_enabled(CollectorKind::UserInput));
        assert_eq!(config.user_input.interval_ms, 10_000);
        assert_eq!(config.self_report.interval_ms, 1000);
        assert_eq!(config.self_report.scale, 7);
    }

    #[test]
    fn zero_interval_is_rejected_only_when_enabled() {
        let mut config = TrackersConfig::default();
        config.user_input.interval_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                kind: CollectorKind::UserInput
            })
        );
        config.user_input.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_longer_than_a_week_is_rejected() {
        let mut config = TrackersConfig::default();
        config.self_report.interval_ms = u64::MAX;
        assert_eq!(
            config.validate(),
            Err(ConfigError::IntervalTooLong {
                kind: CollectorKind::SelfReport,
                value: u64::MAX
            })
        );
        config.self_report.interval_ms = MAX_INTERVAL_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn self_report_settings_are_checked() {
        let mut config = TrackersConfig::default();
        config.self_report.sampling_randomization = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RandomizationOutOfRange { .. })
        ));

        let mut config = TrackersConfig::default();
        config.self_report.questions = vec!["ok".into(), " ".into()];
        assert_eq!(config.validate(), Err(ConfigError::EmptyQuestion { index: 1 }));

        let mut config = TrackersConfig::default();
        config.self_report.questions.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoQuestions));
    }
}
