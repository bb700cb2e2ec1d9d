//! Sessions command for listing reconstructed sessions.

use std::io::Write;

use anyhow::Result;
use pa_core::Store;

use super::util::describe_session;

/// Writes the `limit` most recent sessions, newest first.
pub fn run<W: Write>(writer: &mut W, store: &dyn Store, limit: usize, json: bool) -> Result<()> {
    let sessions = store.recent_sessions(limit)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &sessions)?;
        writeln!(writer)?;
        return Ok(());
    }

    if sessions.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
        return Ok(());
    }

    for session in &sessions {
        writeln!(writer, "{}", describe_session(session))?;
    }

    Ok(())
}
