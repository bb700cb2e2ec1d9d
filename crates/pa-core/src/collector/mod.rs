//! Background collectors and the registry that owns them.
//!
//! Each collector captures one category of raw usage signal on its own tokio
//! task and hands what it captures to a fire-and-forget [`Callback`]. The
//! registry starts, stops and resumes them as a batch.
//!
//! # Architecture
//!
//! - [`Collector`]: the start/stop/resume capability every kind implements
//! - [`IntervalCollector`]: polls a native [`Probe`] (window activity, user input)
//! - [`SelfReportCollector`]: fires self-report prompts at randomized intervals
//! - [`ParticipationCounter`]: reports each local day the tracker runs on
//! - [`CollectorRegistry`]: one collector per kind, batch lifecycle operations

mod interval;
mod participation;
mod registry;
mod self_report;
mod task;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use interval::{IntervalCollector, Probe, ProbeError};
pub use participation::ParticipationCounter;
pub use registry::{
    BatchReport, CollectorFactory, CollectorRegistry, RegistryError, StandardFactory,
    UnsupportedReason,
};
pub use self_report::{SelfReportCollector, SelfReportPrompt, jittered_interval};

/// The kinds of collector the registry knows about. A kind is a collector's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    WindowActivity,
    UserInput,
    SelfReport,
    ParticipationCounter,
}

impl CollectorKind {
    pub const ALL: [Self; 4] = [
        Self::WindowActivity,
        Self::UserInput,
        Self::SelfReport,
        Self::ParticipationCounter,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WindowActivity => "window_activity",
            Self::UserInput => "user_input",
            Self::SelfReport => "self_report",
            Self::ParticipationCounter => "participation_counter",
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("invalid collector kind: {s}"))
    }
}

/// Something a collector captured.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectedData {
    /// An opaque sample from a native probe.
    Sample {
        kind: CollectorKind,
        captured_at: DateTime<Utc>,
        data: serde_json::Value,
    },
    /// A self-report prompt is due.
    Prompt(SelfReportPrompt),
    /// The tracker ran on this local day.
    ParticipationDay(NaiveDate),
}

/// Receives collected data. Invoked on the collector's task; must not block.
pub type Callback = Arc<dyn Fn(CollectedData) + Send + Sync>;

/// Collector lifecycle failures.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The native backend refused to start (missing permission, hook failure).
    #[error("{kind} failed to start: {reason}")]
    StartFailed { kind: CollectorKind, reason: String },

    /// The capture task panicked.
    #[error("{kind} capture task failed: {source}")]
    Task {
        kind: CollectorKind,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// A background unit collecting one category of usage signal.
///
/// `stop` must be idempotent and must guarantee that the callback is not
/// invoked again once it returns.
#[async_trait]
pub trait Collector: Send {
    fn kind(&self) -> CollectorKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// How often the collector captures.
    fn interval(&self) -> Duration;

    fn is_running(&self) -> bool;

    async fn start(&mut self) -> Result<(), CollectorError>;

    async fn stop(&mut self) -> Result<(), CollectorError>;

    /// Restarts capture after a suspend or screen lock.
    async fn resume(&mut self) -> Result<(), CollectorError> {
        self.start().await
    }
}
