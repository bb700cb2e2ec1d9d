//! Answer command for resolving the pending self-report prompt.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use pa_core::{
    Clock, Resolution, SelfReportFlow, SessionReconstructor, SharedStore, UsageEventLog,
};

use super::util::describe_session;

/// Answers (or skips) the most recent pending prompt and reports the session it closed.
pub async fn run<W: Write>(
    writer: &mut W,
    store: SharedStore,
    clock: Arc<dyn Clock>,
    resolution: Resolution,
) -> Result<()> {
    let flow = SelfReportFlow::new(
        UsageEventLog::new(Arc::clone(&store), clock),
        SessionReconstructor::new(store),
    );
    let session = flow
        .resolve_latest(resolution)
        .await
        .context("failed to record self-report")?;

    match resolution {
        Resolution::Answer(value) => writeln!(writer, "Recorded answer {value}.")?,
        Resolution::Skip => writeln!(writer, "Prompt skipped.")?,
    }
    match session {
        Some(session) => writeln!(writer, "Session: {}", describe_session(&session))?,
        None => writeln!(writer, "No session could be reconstructed for this prompt.")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use pa_core::{ManualClock, SelfReportPrompt, Store, UsageEventType, shared};
    use pa_db::Database;

    #[tokio::test]
    async fn answer_reports_closed_session() {
        let store = shared(Database::open_in_memory().unwrap());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap(),
        ));
        let log = UsageEventLog::new(Arc::clone(&store), Arc::clone(&clock));
        log.record(UsageEventType::AppStart).await.unwrap();
        SelfReportFlow::new(log, SessionReconstructor::new(Arc::clone(&store)))
            .prompt(&SelfReportPrompt {
                prompted_at: Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap(),
                question: "How productive?".to_string(),
                scale: 7,
                response_options: Vec::new(),
            })
            .await
            .unwrap();

        let mut output = Vec::new();
        run(&mut output, Arc::clone(&store), clock, Resolution::Answer(6))
            .await
            .unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Recorded answer 6.
        Session: 2025-03-04 09:00:00 -> 2025-03-04 10:00:00    1h 00m 00s  answered 6/7
        ");
        assert!(store.lock().await.pending_responses().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_without_prompt_fails() {
        let store = shared(Database::open_in_memory().unwrap());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let mut output = Vec::new();
        let err = run(&mut output, store, clock, Resolution::Skip)
            .await
            .unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "failed to record self-report: no self-report prompt is waiting for an answer"
        );
    }
}
