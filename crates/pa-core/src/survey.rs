//! Self-report prompt lifecycle.
//!
//! A prompt is recorded as a `SelfReportPrompted` event plus a pending
//! [`SelfReportResponse`]. Answering or skipping it resolves the response,
//! records `SelfReportAnswered` at the prompt's own instant and reconstructs
//! the session that ends there. A prompt still pending when the next one
//! fires is skipped.

use serde_json::json;
use thiserror::Error;

use crate::collector::SelfReportPrompt;
use crate::event::{UsageEvent, truncate_to_seconds};
use crate::event_log::UsageEventLog;
use crate::event_type::UsageEventType;
use crate::session::{ReconstructError, Session, SessionReconstructor};
use crate::store::{Store, StoreError};
use crate::types::{SelfReportResponse, ValidationError};

/// How the user resolved a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Answer(u8),
    Skip,
}

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("no self-report prompt is waiting for an answer")]
    NoPendingPrompt,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Records prompts and resolves them into sessions.
#[derive(Clone)]
pub struct SelfReportFlow {
    event_log: UsageEventLog,
    reconstructor: SessionReconstructor,
}

impl SelfReportFlow {
    pub fn new(event_log: UsageEventLog, reconstructor: SessionReconstructor) -> Self {
        Self {
            event_log,
            reconstructor,
        }
    }

    /// Records a prompt that is being shown, after expiring any older pending prompt.
    ///
    /// The prompt instant is truncated to whole seconds so the session it later
    /// closes ends exactly at the response's `prompted_at`.
    pub async fn prompt(&self, prompt: &SelfReportPrompt) -> Result<SelfReportResponse, SurveyError> {
        self.expire_pending().await?;

        let prompted_at = truncate_to_seconds(prompt.prompted_at);
        let response =
            SelfReportResponse::prompted(prompted_at, prompt.question.clone(), prompt.scale)?;
        self.event_log
            .append(
                UsageEvent::new(UsageEventType::SelfReportPrompted, prompted_at)
                    .with_payload(json!({"question": prompt.question, "scale": prompt.scale})),
            )
            .await?;
        self.event_log
            .store()
            .lock()
            .await
            .save_response(&response)?;
        tracing::info!(%prompted_at, "self-report prompt shown");
        Ok(response)
    }

    /// Skips every pending prompt. Returns how many were expired.
    pub async fn expire_pending(&self) -> Result<usize, SurveyError> {
        let pending = self.event_log.store().lock().await.pending_responses()?;
        let expired = pending.len();
        for response in pending {
            tracing::warn!(prompted_at = %response.prompted_at, "self-report prompt timed out, skipping");
            self.close(response, Resolution::Skip).await?;
        }
        Ok(expired)
    }

    /// Resolves the most recent pending prompt.
    ///
    /// Returns the session it closed, or `None` when no valid session could be
    /// built (the reason is logged).
    pub async fn resolve_latest(&self, resolution: Resolution) -> Result<Option<Session>, SurveyError> {
        let latest = self
            .event_log
            .store()
            .lock()
            .await
            .pending_responses()?
            .pop()
            .ok_or(SurveyError::NoPendingPrompt)?;
        self.close(latest, resolution).await
    }

    async fn close(
        &self,
        mut response: SelfReportResponse,
        resolution: Resolution,
    ) -> Result<Option<Session>, SurveyError> {
        match resolution {
            Resolution::Answer(value) => response.answer(value)?,
            Resolution::Skip => response.skip()?,
        }
        self.event_log
            .store()
            .lock()
            .await
            .save_response(&response)?;

        let answered_at = self.event_log.clock().now();
        self.event_log
            .append(
                UsageEvent::new(UsageEventType::SelfReportAnswered, response.prompted_at)
                    .with_payload(json!({
                        "answered_at": answered_at,
                        "response": response.response,
                        "skipped": response.skipped,
                    })),
            )
            .await?;

        match self
            .reconstructor
            .reconstruct(UsageEventType::SelfReportAnswered, response.prompted_at)
            .await
        {
            Ok(session) => Ok(Some(session)),
            Err(ReconstructError::Persistence(err)) => Err(err.into()),
            Err(_) => Ok(None),
        }
    }
}
