//! Session reconstruction from the usage event log.
//!
//! A session is never created directly. It is derived when a terminating
//! event (a self-report answer or an application quit) arrives: the
//! reconstructor looks backward through the event log for the latest start
//! boundary, validates the interval and persists one [`Session`].
//!
//! Sessions are stored at whole-second precision. Both ends are truncated
//! before the range check, so a start and end that fall within the same
//! second are rejected as an empty interval rather than stored with
//! `started_at == ended_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::truncate_to_seconds;
use crate::event_type::UsageEventType;
use crate::store::{SharedStore, Store, StoreError};
use crate::types::{SelfReportResponse, SessionId};

/// A bounded interval of usage, optionally carrying the self-report that closed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_in_seconds: i64,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub scale: Option<u8>,
    #[serde(default)]
    pub response: Option<u8>,
    #[serde(default)]
    pub skipped: Option<bool>,
}

impl Session {
    /// Builds a session without survey data from two instants.
    ///
    /// Both ends are truncated to whole seconds; the truncated start must be
    /// strictly before the truncated end.
    pub fn between(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<Self, ReconstructError> {
        let started_at = truncate_to_seconds(started_at);
        let ended_at = truncate_to_seconds(ended_at);
        if started_at >= ended_at {
            return Err(ReconstructError::InvalidRange {
                started_at,
                ended_at,
            });
        }
        Ok(Self {
            id: SessionId::generate(),
            started_at,
            ended_at,
            duration_in_seconds: ended_at.signed_duration_since(started_at).num_seconds(),
            question: None,
            scale: None,
            response: None,
            skipped: None,
        })
    }

    /// Attaches the survey fields of the self-report that closed this session.
    #[must_use]
    pub fn with_survey(mut self, response: &SelfReportResponse) -> Self {
        self.question = Some(response.question.clone());
        self.scale = Some(response.scale);
        self.response = response.response;
        self.skipped = Some(response.skipped);
        self
    }

    pub const fn has_survey(&self) -> bool {
        self.question.is_some()
    }
}

/// Why a terminating event produced no session.
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// Only `SelfReportAnswered` and `AppQuit` close sessions.
    #[error("{event_type} does not terminate a session")]
    UnsupportedEvent { event_type: UsageEventType },

    /// No start boundary exists before the terminating event.
    #[error("no session start boundary before {ended_at}")]
    NoPriorBoundary { ended_at: DateTime<Utc> },

    /// The start boundary is not strictly before the end (clock skew or reordering).
    #[error("invalid session range: start {started_at} is not before end {ended_at}")]
    InvalidRange {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    },

    /// Reading the event log or writing the session failed.
    #[error("session persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl ReconstructError {
    /// Whether the failure came from the persistence gateway rather than the data.
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Derives sessions from terminating events.
#[derive(Clone)]
pub struct SessionReconstructor {
    store: SharedStore,
}

impl SessionReconstructor {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Materializes the session that ends with `event_type` at `occurred_at`.
    ///
    /// Lookups and the final write happen under a single store lock. Repeated
    /// calls with the same instant create repeated sessions.
    pub async fn reconstruct(
        &self,
        event_type: UsageEventType,
        occurred_at: DateTime<Utc>,
    ) -> Result<Session, ReconstructError> {
        let mut store = self.store.lock().await;
        let result = build_session(&*store, event_type, occurred_at).and_then(|session| {
            store.save_session(&session)?;
            Ok(session)
        });

        match &result {
            Ok(session) => tracing::info!(
                %event_type,
                started_at = %session.started_at,
                ended_at = %session.ended_at,
                duration_in_seconds = session.duration_in_seconds,
                "session created"
            ),
            Err(err) if err.is_persistence() => {
                tracing::error!(%event_type, %occurred_at, error = %err, "failed to reconstruct session");
            }
            Err(err) => {
                tracing::warn!(%event_type, %occurred_at, error = %err, "no session created");
            }
        }
        result
    }
}

fn build_session(
    store: &dyn Store,
    event_type: UsageEventType,
    ended_at: DateTime<Utc>,
) -> Result<Session, ReconstructError> {
    if !event_type.is_terminating() {
        return Err(ReconstructError::UnsupportedEvent { event_type });
    }

    let prior_app_start = store.latest_event_before(UsageEventType::AppStart, ended_at)?;
    let prior_prompt = if event_type == UsageEventType::SelfReportAnswered {
        store.latest_event_before(UsageEventType::SelfReportPrompted, ended_at)?
    } else {
        None
    };

    let start = [prior_app_start, prior_prompt]
        .into_iter()
        .flatten()
        .max_by_key(|event| event.occurred_at)
        .ok_or(ReconstructError::NoPriorBoundary { ended_at })?;

    let session = Session::between(start.occurred_at, ended_at)?;
    if event_type != UsageEventType::SelfReportAnswered {
        return Ok(session);
    }

    match store.response_prompted_at(ended_at)? {
        Some(response) => {
            tracing::info!(
                question = %response.question,
                response = ?response.response,
                skipped = response.skipped,
                "found self-report response"
            );
            Ok(session.with_survey(&response))
        }
        None => {
            tracing::warn!(
                %ended_at,
                "no self-report response found, creating session without response data"
            );
            Ok(session)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UsageEvent;
    use crate::store::{MemoryStore, shared};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, s).unwrap()
    }

    fn store_with(events: &[(UsageEventType, DateTime<Utc>)]) -> SharedStore {
        let mut store = MemoryStore::new();
        for (event_type, occurred_at) in events {
            store
                .append_event(&UsageEvent::new(*event_type, *occurred_at))
                .unwrap();
        }
        shared(store)
    }

    async fn saved_sessions(store: &SharedStore) -> Vec<Session> {
        store.lock().await.recent_sessions(usize::MAX).unwrap()
    }

    #[tokio::test]
    async fn quit_after_start_creates_session() {
        let store = store_with(&[(UsageEventType::AppStart, at(10, 0, 0))]);
        let reconstructor = SessionReconstructor::new(store.clone());

        let session = reconstructor
            .reconstruct(UsageEventType::AppQuit, at(10, 5, 30))
            .await
            .unwrap();

        assert_eq!(session.started_at, at(10, 0, 0));
        assert_eq!(session.ended_at, at(10, 5, 30));
        assert_eq!(session.duration_in_seconds, 330);
        assert!(!session.has_survey());
        assert_eq!(saved_sessions(&store).await, vec![session]);
    }

    #[tokio::test]
    async fn quit_ignores_prompts_as_start_boundary() {
        let store = store_with(&[
            (UsageEventType::AppStart, at(8, 0, 0)),
            (UsageEventType::SelfReportPrompted, at(9, 0, 0)),
        ]);
        let session = SessionReconstructor::new(store)
            .reconstruct(UsageEventType::AppQuit, at(9, 30, 0))
            .await
            .unwrap();
        assert_eq!(session.started_at, at(8, 0, 0));
        assert_eq!(session.duration_in_seconds, 5400);
    }

    #[tokio::test]
    async fn answer_uses_later_of_start_and_previous_prompt() {
        let store = store_with(&[
            (UsageEventType::AppStart, at(8, 0, 0)),
            (UsageEventType::SelfReportPrompted, at(9, 0, 0)),
            (UsageEventType::SelfReportPrompted, at(10, 0, 0)),
        ]);
        let session = SessionReconstructor::new(store)
            .reconstruct(UsageEventType::SelfReportAnswered, at(10, 0, 0))
            .await
            .unwrap();
        assert_eq!(session.started_at, at(9, 0, 0));
        assert_eq!(session.ended_at, at(10, 0, 0));
        assert_eq!(session.duration_in_seconds, 3600);
    }

    #[tokio::test]
    async fn answer_after_restart_starts_at_app_start() {
        let store = store_with(&[
            (UsageEventType::SelfReportPrompted, at(9, 0, 0)),
            (UsageEventType::AppStart, at(9, 40, 0)),
        ]);
        let session = SessionReconstructor::new(store)
            .reconstruct(UsageEventType::SelfReportAnswered, at(10, 0, 0))
            .await
            .unwrap();
        assert_eq!(session.started_at, at(9, 40, 0));
    }

    #[tokio::test]
    async fn answer_attaches_matching_response() {
        let store = store_with(&[(UsageEventType::AppStart, at(8, 0, 0))]);
        let mut response = SelfReportResponse::prompted(at(9, 0, 0), "How productive?", 7).unwrap();
        response.answer(5).unwrap();
        store.lock().await.save_response(&response).unwrap();

        let session = SessionReconstructor::new(store)
            .reconstruct(UsageEventType::SelfReportAnswered, at(9, 0, 0))
            .await
            .unwrap();

        assert_eq!(session.question.as_deref(), Some("How productive?"));
        assert_eq!(session.scale, Some(7));
        assert_eq!(session.response, Some(5));
        assert_eq!(session.skipped, Some(false));
        assert_eq!(session.ended_at, response.prompted_at);
    }

    #[tokio::test]
    async fn answer_matches_response_exactly_not_by_range() {
        let store = store_with(&[(UsageEventType::AppStart, at(8, 0, 0))]);
        let response = SelfReportResponse::prompted(at(9, 0, 1), "How productive?", 7).unwrap();
        store.lock().await.save_response(&response).unwrap();

        let session = SessionReconstructor::new(store)
            .reconstruct(UsageEventType::SelfReportAnswered, at(9, 0, 0))
            .await
            .unwrap();

        assert!(!session.has_survey());
        assert_eq!(session.response, None);
        assert_eq!(session.skipped, None);
    }

    #[tokio::test]
    async fn no_prior_boundary_creates_nothing() {
        let store = store_with(&[(UsageEventType::AppStart, at(11, 0, 0))]);
        let result = SessionReconstructor::new(store.clone())
            .reconstruct(UsageEventType::AppQuit, at(10, 0, 0))
            .await;

        assert!(matches!(
            result,
            Err(ReconstructError::NoPriorBoundary { ended_at }) if ended_at == at(10, 0, 0)
        ));
        assert!(saved_sessions(&store).await.is_empty());
    }

    #[tokio::test]
    async fn prompt_within_same_second_is_invalid_range() {
        // Prompt logged at 09:00:00.000, answered for the prompt shown at 09:00:00.400.
        let prompted = at(9, 0, 0);
        let answered = prompted + Duration::milliseconds(400);
        let store = store_with(&[
            (UsageEventType::AppStart, at(8, 50, 0)),
            (UsageEventType::SelfReportPrompted, prompted),
        ]);

        let result = SessionReconstructor::new(store.clone())
            .reconstruct(UsageEventType::SelfReportAnswered, answered)
            .await;

        assert!(matches!(
            result,
            Err(ReconstructError::InvalidRange { started_at, ended_at })
                if started_at == at(9, 0, 0) && ended_at == at(9, 0, 0)
        ));
        assert!(saved_sessions(&store).await.is_empty());
    }

    #[tokio::test]
    async fn prompt_at_the_answer_instant_is_not_a_candidate() {
        let store = store_with(&[
            (UsageEventType::SelfReportPrompted, at(9, 0, 0)),
            (UsageEventType::AppStart, at(8, 50, 0)),
        ]);

        let session = SessionReconstructor::new(store.clone())
            .reconstruct(UsageEventType::SelfReportAnswered, at(9, 0, 0))
            .await
            .unwrap();

        assert_eq!(session.started_at, at(8, 50, 0));
        assert_eq!(session.ended_at, at(9, 0, 0));
        assert_eq!(session.duration_in_seconds, 600);
        assert_eq!(saved_sessions(&store).await, vec![session]);
    }

    #[tokio::test]
    async fn non_terminating_event_is_rejected() {
        let store = store_with(&[(UsageEventType::AppStart, at(8, 0, 0))]);
        let result = SessionReconstructor::new(store.clone())
            .reconstruct(UsageEventType::SystemSuspend, at(9, 0, 0))
            .await;
        assert!(matches!(
            result,
            Err(ReconstructError::UnsupportedEvent {
                event_type: UsageEventType::SystemSuspend
            })
        ));
        assert!(saved_sessions(&store).await.is_empty());
    }

    #[tokio::test]
    async fn repeated_reconstruction_is_not_deduplicated() {
        let store = store_with(&[(UsageEventType::AppStart, at(8, 0, 0))]);
        let reconstructor = SessionReconstructor::new(store.clone());
        let first = reconstructor
            .reconstruct(UsageEventType::AppQuit, at(9, 0, 0))
            .await
            .unwrap();
        let second = reconstructor
            .reconstruct(UsageEventType::AppQuit, at(9, 0, 0))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(saved_sessions(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_is_reported() {
        struct FailingStore(MemoryStore);

        impl Store for FailingStore {
            fn append_event(&mut self, event: &UsageEvent) -> Result<(), StoreError> {
                self.0.append_event(event)
            }
            fn latest_event_before(
                &self,
                event_type: UsageEventType,
                before: DateTime<Utc>,
            ) -> Result<Option<UsageEvent>, StoreError> {
                self.0.latest_event_before(event_type, before)
            }
            fn list_events(
                &self,
                after: Option<DateTime<Utc>>,
                before: Option<DateTime<Utc>>,
            ) -> Result<Vec<UsageEvent>, StoreError> {
                self.0.list_events(after, before)
            }
            fn save_response(&mut self, response: &SelfReportResponse) -> Result<(), StoreError> {
                self.0.save_response(response)
            }
            fn response_prompted_at(
                &self,
                prompted_at: DateTime<Utc>,
            ) -> Result<Option<SelfReportResponse>, StoreError> {
                self.0.response_prompted_at(prompted_at)
            }
            fn pending_responses(&self) -> Result<Vec<SelfReportResponse>, StoreError> {
                self.0.pending_responses()
            }
            fn save_session(&mut self, _session: &Session) -> Result<(), StoreError> {
                Err(StoreError::new("save_session", "disk full"))
            }
            fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
                self.0.recent_sessions(limit)
            }
            fn record_participation_day(&mut self, day: NaiveDate) -> Result<bool, StoreError> {
                self.0.record_participation_day(day)
            }
            fn participation_day_count(&self) -> Result<usize, StoreError> {
                self.0.participation_day_count()
            }
        }

        let mut inner = MemoryStore::new();
        inner
            .append_event(&UsageEvent::new(UsageEventType::AppStart, at(8, 0, 0)))
            .unwrap();
        let result = SessionReconstructor::new(shared(FailingStore(inner)))
            .reconstruct(UsageEventType::AppQuit, at(9, 0, 0))
            .await;

        let err = result.unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(
            err.to_string(),
            "session persistence failed: save_session failed: disk full"
        );
    }

    #[test]
    fn duration_matches_floor_of_elapsed_seconds() {
        let start = at(7, 59, 58);
        for elapsed in [1_i64, 59, 60, 3599, 86_400] {
            let end = start + Duration::seconds(elapsed);
            let session = Session::between(start, end).unwrap();
            assert_eq!(session.duration_in_seconds, elapsed);
            assert_eq!(
                session
                    .ended_at
                    .signed_duration_since(session.started_at)
                    .num_seconds(),
                session.duration_in_seconds
            );
        }
    }

    #[test]
    fn between_truncates_subseconds() {
        let start = at(10, 0, 0) + Duration::milliseconds(900);
        let end = at(10, 0, 2) + Duration::milliseconds(100);
        let session = Session::between(start, end).unwrap();
        assert_eq!(session.started_at, at(10, 0, 0));
        assert_eq!(session.ended_at, at(10, 0, 2));
        assert_eq!(session.duration_in_seconds, 2);
    }

    #[test]
    fn between_rejects_reversed_and_empty_ranges() {
        assert!(matches!(
            Session::between(at(10, 0, 0), at(10, 0, 0)),
            Err(ReconstructError::InvalidRange { .. })
        ));
        assert!(matches!(
            Session::between(at(10, 0, 1), at(10, 0, 0)),
            Err(ReconstructError::InvalidRange { .. })
        ));
    }
}
