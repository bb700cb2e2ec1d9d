//! Append-only write path for usage events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::event::{Clock, UsageEvent};
use crate::event_type::UsageEventType;
use crate::store::{SharedStore, Store, StoreError};

/// Stamps and appends usage events.
///
/// Every append takes the store lock for the duration of one write, so events
/// from a single emitter land in the order they were issued.
#[derive(Clone)]
pub struct UsageEventLog {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl UsageEventLog {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records an event of `event_type` occurring now.
    pub async fn record(&self, event_type: UsageEventType) -> Result<UsageEvent, StoreError> {
        self.append(UsageEvent::new(event_type, self.clock.now()))
            .await
    }

    /// Records an event occurring now with a JSON payload.
    pub async fn record_with_payload(
        &self,
        event_type: UsageEventType,
        payload: serde_json::Value,
    ) -> Result<UsageEvent, StoreError> {
        self.append(UsageEvent::new(event_type, self.clock.now()).with_payload(payload))
            .await
    }

    /// Records an event at an explicit instant.
    pub async fn record_at(
        &self,
        event_type: UsageEventType,
        occurred_at: DateTime<Utc>,
    ) -> Result<UsageEvent, StoreError> {
        self.append(UsageEvent::new(event_type, occurred_at)).await
    }

    pub async fn append(&self, event: UsageEvent) -> Result<UsageEvent, StoreError> {
        let result = self.store.lock().await.append_event(&event);
        match result {
            Ok(()) => {
                tracing::debug!(event_type = %event.event_type, occurred_at = %event.occurred_at, "usage event recorded");
                Ok(event)
            }
            Err(err) => {
                tracing::error!(event_type = %event.event_type, error = %err, "failed to record usage event");
                Err(err)
            }
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}
