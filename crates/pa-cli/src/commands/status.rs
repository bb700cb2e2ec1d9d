//! Status command for showing what the tracker has recorded.

use std::io::Write;

use std::sync::Arc;

use anyhow::Result;
use pa_core::{CollectorKind, Store, SystemClock, UnsupportedReason};

use super::run::tracker_factory;
use super::util::describe_session;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, store: &dyn Store, config: &Config) -> Result<()> {
    writeln!(writer, "Usage tracker status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    let factory = tracker_factory(Arc::new(SystemClock));
    let (available, unavailable): (Vec<CollectorKind>, Vec<CollectorKind>) = config
        .trackers
        .enabled_kinds()
        .into_iter()
        .partition(|kind| factory.supports(*kind));
    writeln!(writer, "Enabled trackers: {}", kind_list(&available))?;
    if !unavailable.is_empty() {
        writeln!(
            writer,
            "Unavailable trackers: {} ({})",
            kind_list(&unavailable),
            UnsupportedReason::NoBackend
        )?;
    }

    let events = store.list_events(None, None)?;
    match events.last() {
        Some(last) => writeln!(
            writer,
            "Events: {} (last: {} at {})",
            events.len(),
            last.event_type,
            last.occurred_at.format("%Y-%m-%d %H:%M:%S")
        )?,
        None => writeln!(writer, "No events recorded.")?,
    }

    let pending = store.pending_responses()?;
    match pending.last() {
        Some(latest) => writeln!(
            writer,
            "Pending self-report: \"{}\" (1-{}), prompted at {}",
            latest.question,
            latest.scale,
            latest.prompted_at.format("%Y-%m-%d %H:%M:%S")
        )?,
        None => writeln!(writer, "Pending self-report: none")?,
    }

    writeln!(
        writer,
        "Days participated: {}",
        store.participation_day_count()?
    )?;

    if let Some(session) = store.recent_sessions(1)?.first() {
        writeln!(writer, "Last session: {}", describe_session(session))?;
    }

    Ok(())
}

fn kind_list(kinds: &[CollectorKind]) -> String {
    if kinds.is_empty() {
        return "none".to_string();
    }
    kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
