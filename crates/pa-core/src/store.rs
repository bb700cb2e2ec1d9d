//! Persistence gateway consumed by the orchestration core.
//!
//! The core never talks to a database directly. Everything it reads or writes
//! goes through [`Store`], which `pa-db` implements on top of SQLite and
//! [`MemoryStore`] implements for tests.
//!
//! # Thread Safety
//!
//! Stores are `Send` but not required to be `Sync`. The orchestrator shares a
//! single store as a [`SharedStore`], so every write is serialized behind one
//! async mutex regardless of which task issues it.

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::event::UsageEvent;
use crate::event_type::UsageEventType;
use crate::session::Session;
use crate::types::SelfReportResponse;

/// A failed round-trip to the persistence backend.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct StoreError {
    operation: &'static str,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    pub fn new(operation: &'static str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// The gateway operation that failed (e.g. `save_session`).
    pub const fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Save/find/query contract over usage events, self-report responses and sessions.
pub trait Store: Send {
    /// Appends an event. Events are never updated or deleted.
    fn append_event(&mut self, event: &UsageEvent) -> Result<(), StoreError>;

    /// Most recent event of `event_type` with `occurred_at` strictly before `before`.
    fn latest_event_before(
        &self,
        event_type: UsageEventType,
        before: DateTime<Utc>,
    ) -> Result<Option<UsageEvent>, StoreError>;

    /// Events in `[after, before)`, oldest first. Open bounds are unbounded.
    fn list_events(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError>;

    /// Inserts a response, or replaces the one with the same `prompted_at`.
    fn save_response(&mut self, response: &SelfReportResponse) -> Result<(), StoreError>;

    /// The response whose `prompted_at` equals `prompted_at` exactly.
    fn response_prompted_at(
        &self,
        prompted_at: DateTime<Utc>,
    ) -> Result<Option<SelfReportResponse>, StoreError>;

    /// Responses neither answered nor skipped, oldest first.
    fn pending_responses(&self) -> Result<Vec<SelfReportResponse>, StoreError>;

    fn save_session(&mut self, session: &Session) -> Result<(), StoreError>;

    /// Up to `limit` sessions, most recent `started_at` first.
    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    /// Records a participation day. Returns `false` if it was already recorded.
    fn record_participation_day(&mut self, day: NaiveDate) -> Result<bool, StoreError>;

    fn participation_day_count(&self) -> Result<usize, StoreError>;
}

/// A store shared between the coordinator, the reconstructor and collector callbacks.
pub type SharedStore = Arc<Mutex<dyn Store>>;

/// Wraps a store for sharing.
pub fn shared<S: Store + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Volatile [`Store`] backed by vectors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Vec<UsageEvent>,
    responses: Vec<SelfReportResponse>,
    sessions: Vec<Session>,
    participation: BTreeSet<NaiveDate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> &[SelfReportResponse] {
        &self.responses
    }
}

impl Store for MemoryStore {
    fn append_event(&mut self, event: &UsageEvent) -> Result<(), StoreError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn latest_event_before(
        &self,
        event_type: UsageEventType,
        before: DateTime<Utc>,
    ) -> Result<Option<UsageEvent>, StoreError> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.event_type == event_type && e.occurred_at < before)
            .max_by_key(|e| e.occurred_at)
            .cloned())
    }

    fn list_events(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        let mut events: Vec<UsageEvent> = self
            .events
            .iter()
            .filter(|e| after.is_none_or(|a| e.occurred_at >= a))
            .filter(|e| before.is_none_or(|b| e.occurred_at < b))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    fn save_response(&mut self, response: &SelfReportResponse) -> Result<(), StoreError> {
        if let Some(existing) = self
            .responses
            .iter_mut()
            .find(|r| r.prompted_at == response.prompted_at)
        {
            *existing = response.clone();
        } else {
            self.responses.push(response.clone());
        }
        Ok(())
    }

    fn response_prompted_at(
        &self,
        prompted_at: DateTime<Utc>,
    ) -> Result<Option<SelfReportResponse>, StoreError> {
        Ok(self
            .responses
            .iter()
            .find(|r| r.prompted_at == prompted_at)
            .cloned())
    }

    fn pending_responses(&self) -> Result<Vec<SelfReportResponse>, StoreError> {
        let mut pending: Vec<SelfReportResponse> = self
            .responses
            .iter()
            .filter(|r| !r.is_resolved())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.prompted_at);
        Ok(pending)
    }

    fn save_session(&mut self, session: &Session) -> Result<(), StoreError> {
        self.sessions.push(session.clone());
        Ok(())
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.sessions.clone();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn record_participation_day(&mut self, day: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.participation.insert(day))
    }

    fn participation_day_count(&self) -> Result<usize, StoreError> {
        Ok(self.participation.len())
    }
}
