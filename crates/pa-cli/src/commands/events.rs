//! Events command for querying the local usage event log.
//!
//! This module outputs events from the local database as JSONL for debugging.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use pa_core::Store;

use super::util::parse_bound;

/// Writes events in `[after, before)` as JSONL, oldest first.
pub fn run<W: Write>(
    writer: &mut W,
    store: &dyn Store,
    after: Option<&str>,
    before: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    let after = parse_bound(after, "after", now)?;
    let before = parse_bound(before, "before", now)?;

    for event in store.list_events(after, before)? {
        let json = serde_json::to_string(&event)?;
        writeln!(writer, "{json}")?;
    }

    Ok(())
}
