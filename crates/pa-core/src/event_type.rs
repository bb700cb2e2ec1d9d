//! Usage event type enum as the single source of truth for event type strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of lifecycle and activity events written to the usage event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageEventType {
    AppStart,
    AppQuit,
    SystemSuspend,
    SystemResume,
    SystemShutdown,
    SystemLockScreen,
    SystemUnlockScreen,
    SelfReportPrompted,
    SelfReportAnswered,
}

impl UsageEventType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::AppStart,
        Self::AppQuit,
        Self::SystemSuspend,
        Self::SystemResume,
        Self::SystemShutdown,
        Self::SystemLockScreen,
        Self::SystemUnlockScreen,
        Self::SelfReportPrompted,
        Self::SelfReportAnswered,
    ];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AppStart => "app_start",
            Self::AppQuit => "app_quit",
            Self::SystemSuspend => "system_suspend",
            Self::SystemResume => "system_resume",
            Self::SystemShutdown => "system_shutdown",
            Self::SystemLockScreen => "system_lock_screen",
            Self::SystemUnlockScreen => "system_unlock_screen",
            Self::SelfReportPrompted => "self_report_prompted",
            Self::SelfReportAnswered => "self_report_answered",
        }
    }

    /// Whether this event closes a session window.
    #[must_use]
    pub const fn is_terminating(&self) -> bool {
        matches!(self, Self::SelfReportAnswered | Self::AppQuit)
    }
}

impl fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app_start" => Ok(Self::AppStart),
            "app_quit" => Ok(Self::AppQuit),
            "system_suspend" => Ok(Self::SystemSuspend),
            "system_resume" => Ok(Self::SystemResume),
            "system_shutdown" => Ok(Self::SystemShutdown),
            "system_lock_screen" => Ok(Self::SystemLockScreen),
            "system_unlock_screen" => Ok(Self::SystemUnlockScreen),
            // Older builds called the self-report prompt "experience sampling".
            "self_report_prompted" | "experience_sampling_prompted" => {
                Ok(Self::SelfReportPrompted)
            }
            "self_report_answered" | "experience_sampling_answered" => {
                Ok(Self::SelfReportAnswered)
            }
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

impl Serialize for UsageEventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UsageEventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        for variant in &UsageEventType::ALL {
            let s = variant.to_string();
            let parsed: UsageEventType = s.parse().expect("should parse");
            assert_eq!(parsed, *variant, "roundtrip failed for {variant:?}");
        }
    }

    #[test]
    fn legacy_aliases_parse() {
        let prompted: UsageEventType = "experience_sampling_prompted".parse().expect("should parse");
        assert_eq!(prompted, UsageEventType::SelfReportPrompted);

        let answered: UsageEventType = "experience_sampling_answered".parse().expect("should parse");
        assert_eq!(answered, UsageEventType::SelfReportAnswered);
    }

    #[test]
    fn only_answers_and_quits_terminate() {
        let terminating: Vec<_> = UsageEventType::ALL
            .into_iter()
            .filter(UsageEventType::is_terminating)
            .collect();
        assert_eq!(
            terminating,
            vec![UsageEventType::AppQuit, UsageEventType::SelfReportAnswered]
        );
    }

    #[test]
    fn unknown_type_errors() {
        let result: Result<UsageEventType, _> = "window_focus".parse();
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "unknown event type: window_focus");
    }
}
