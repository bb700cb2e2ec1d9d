//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use pa_core::Session;
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").expect("valid relative time regex")
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s.trim()) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Parses an optional `--after`/`--before` flag value.
pub fn parse_bound(
    value: Option<&str>,
    name: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| parse_datetime(s, now).with_context(|| format!("invalid --{name} value")))
        .transpose()
}

/// Formats a duration in seconds as e.g. `1h 05m 30s`.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// One-line summary of a session.
pub fn describe_session(session: &Session) -> String {
    let survey = match (session.response, session.skipped, session.scale) {
        (Some(response), _, Some(scale)) => format!("answered {response}/{scale}"),
        (None, Some(true), _) => "skipped".to_string(),
        _ => "no self-report".to_string(),
    };
    format!(
        "{} -> {}  {:>12}  {survey}",
        session.started_at.format("%Y-%m-%d %H:%M:%S"),
        session.ended_at.format("%Y-%m-%d %H:%M:%S"),
        format_duration(session.duration_in_seconds),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_iso_and_relative_times() {
        assert_eq!(
            parse_datetime("2026-01-15T10:30:00Z", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap()
        );
        assert_eq!(
            parse_datetime("2 hours ago", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_datetime("1 week ago", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_and_huge_values() {
        assert!(parse_datetime("yesterday", now()).is_err());
        assert!(parse_datetime("99999999999 weeks ago", now()).is_err());
        let err = parse_bound(Some("soon"), "after", now()).unwrap_err();
        assert_eq!(err.to_string(), "invalid --after value");
        assert_eq!(parse_bound(None, "after", now()).unwrap(), None);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(330), "5m 30s");
        assert_eq!(format_duration(3930), "1h 05m 30s");
    }
}
