//! Discrete lifecycle events recorded in the usage event log.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::UsageEventType;

/// An immutable, timestamped entry of the append-only usage event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// The kind of lifecycle or activity signal.
    #[serde(rename = "type")]
    pub event_type: UsageEventType,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Optional additional context as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl UsageEvent {
    pub const fn new(event_type: UsageEventType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            occurred_at,
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Source of the current time.
///
/// Everything that stamps events goes through a clock so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock at whole-second precision, the precision of the event log and sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_seconds(Utc::now())
    }
}

/// Clock that reports whatever instant it was last set to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops the sub-second component, matching the precision sessions are stored at.
pub fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}
