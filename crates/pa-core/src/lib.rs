//! Core domain logic for the usage tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Collectors: background capture units and the registry that runs them
//! - Power state: reacting to suspend/resume/lock/quit signals
//! - Usage events: the append-only lifecycle log and its storage contract
//! - Session reconstruction: deriving sessions from terminating events
//! - Self-reports: recording prompts and resolving them into sessions

pub mod collector;
pub mod config;
mod event;
mod event_log;
pub mod event_type;
pub mod power;
pub mod session;
pub mod store;
pub mod survey;
mod types;

pub use collector::{
    BatchReport, Callback, CollectedData, Collector, CollectorError, CollectorKind,
    CollectorRegistry, RegistryError, SelfReportPrompt, StandardFactory, UnsupportedReason,
};
pub use config::{ConfigError, MAX_INTERVAL_MS, TrackersConfig};
pub use event::{Clock, ManualClock, SystemClock, UsageEvent, truncate_to_seconds};
pub use event_log::UsageEventLog;
pub use event_type::{UnknownEventType, UsageEventType};
pub use power::{PowerSignal, PowerStateCoordinator, SignalOutcome};
pub use session::{ReconstructError, Session, SessionReconstructor};
pub use store::{MemoryStore, SharedStore, Store, StoreError, shared};
pub use survey::{Resolution, SelfReportFlow, SurveyError};
pub use types::{SelfReportResponse, SessionId, ValidationError};
