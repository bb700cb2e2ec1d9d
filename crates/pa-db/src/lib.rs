//! Storage layer for the usage tracker.
//!
//! Provides the SQLite implementation of [`pa_core::Store`] using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The tracker shares one instance behind [`pa_core::SharedStore`], which serializes
//! every read and write through a single async mutex.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-01-15T10:30:00.000Z`). Because every value has the same shape:
//! - Lexicographic ordering matches chronological ordering
//! - Exact-match lookups (`prompted_at`) compare the formatted strings
//! - Values are human-readable and always UTC
//!
//! ## Event Payload Storage
//!
//! The `payload` column stores an optional JSON object (type-specific, e.g. the
//! `app_start` host details) and the `type` column stores the snake_case event type.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pa_core::{
    SelfReportResponse, Session, SessionId, Store, StoreError, UsageEvent, UsageEventType,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {table}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row does not describe a valid record.
    #[error("invalid {table} row: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Append-only lifecycle log
            -- occurred_at: RFC 3339 with milliseconds (e.g., '2025-01-15T10:30:00.000Z')
            -- type: snake_case event type (e.g., 'app_start')
            CREATE TABLE IF NOT EXISTS usage_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                payload TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_usage_events_type_time ON usage_events(type, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_usage_events_time ON usage_events(occurred_at);

            CREATE TABLE IF NOT EXISTS self_report_responses (
                prompted_at TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                scale INTEGER NOT NULL,
                response INTEGER,
                skipped INTEGER NOT NULL DEFAULT 0
            );

            -- Derived sessions, stored at whole-second precision
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                duration_in_seconds INTEGER NOT NULL,
                question TEXT,
                scale INTEGER,
                response INTEGER,
                skipped INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            CREATE TABLE IF NOT EXISTS participation_days (
                day TEXT PRIMARY KEY
            );
            ",
        )?;
        Ok(())
    }

    fn insert_event(&self, event: &UsageEvent) -> Result<(), DbError> {
        let payload = event.payload.as_ref().map(serde_json::Value::to_string);
        self.conn.execute(
            "INSERT INTO usage_events (type, occurred_at, payload) VALUES (?1, ?2, ?3)",
            params![
                event.event_type.as_str(),
                format_timestamp(event.occurred_at),
                payload
            ],
        )?;
        Ok(())
    }

    fn query_latest_event_before(
        &self,
        event_type: UsageEventType,
        before: DateTime<Utc>,
    ) -> Result<Option<UsageEvent>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT type, occurred_at, payload
                FROM usage_events
                WHERE type = ?1 AND occurred_at < ?2
                ORDER BY occurred_at DESC, id DESC
                LIMIT 1
                ",
                params![event_type.as_str(), format_timestamp(before)],
                raw_event,
            )
            .optional()?;
        row.map(RawEvent::into_event).transpose()
    }

    fn query_events(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT type, occurred_at, payload
            FROM usage_events
            WHERE (?1 IS NULL OR occurred_at >= ?1)
              AND (?2 IS NULL OR occurred_at < ?2)
            ORDER BY occurred_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![after.map(format_timestamp), before.map(format_timestamp)],
            raw_event,
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    fn upsert_response(&self, response: &SelfReportResponse) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO self_report_responses (prompted_at, question, scale, response, skipped)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(prompted_at) DO UPDATE SET
                question = excluded.question,
                scale = excluded.scale,
                response = excluded.response,
                skipped = excluded.skipped
            ",
            params![
                format_timestamp(response.prompted_at),
                response.question,
                response.scale,
                response.response,
                response.skipped
            ],
        )?;
        Ok(())
    }

    fn query_response(
        &self,
        prompted_at: DateTime<Utc>,
    ) -> Result<Option<SelfReportResponse>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT prompted_at, question, scale, response, skipped
                FROM self_report_responses
                WHERE prompted_at = ?1
                ",
                [format_timestamp(prompted_at)],
                raw_response,
            )
            .optional()?;
        row.map(RawResponse::into_response).transpose()
    }

    fn query_pending_responses(&self) -> Result<Vec<SelfReportResponse>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT prompted_at, question, scale, response, skipped
            FROM self_report_responses
            WHERE response IS NULL AND skipped = 0
            ORDER BY prompted_at ASC
            ",
        )?;
        let rows = stmt.query_map([], raw_response)?;
        let mut responses = Vec::new();
        for row in rows {
            responses.push(row?.into_response()?);
        }
        Ok(responses)
    }

    fn insert_session(&self, session: &Session) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO sessions
                (id, started_at, ended_at, duration_in_seconds, question, scale, response, skipped)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                session.id.as_str(),
                format_timestamp(session.started_at),
                format_timestamp(session.ended_at),
                session.duration_in_seconds,
                session.question,
                session.scale,
                session.response,
                session.skipped
            ],
        )?;
        Ok(())
    }

    fn query_recent_sessions(&self, limit: usize) -> Result<Vec<Session>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "
            SELECT id, started_at, ended_at, duration_in_seconds, question, scale, response, skipped
            FROM sessions
            ORDER BY started_at DESC, ended_at DESC
            LIMIT ?1
            ",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(RawSession {
                id: row.get(0)?,
                started_at: row.get(1)?,
                ended_at: row.get(2)?,
                duration_in_seconds: row.get(3)?,
                question: row.get(4)?,
                scale: row.get(5)?,
                response: row.get(6)?,
                skipped: row.get(7)?,
            })
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn insert_participation_day(&self, day: NaiveDate) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO participation_days (day) VALUES (?1)",
            [day.format("%Y-%m-%d").to_string()],
        )?;
        Ok(inserted == 1)
    }

    fn count_participation_days(&self) -> Result<usize, DbError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM participation_days", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| DbError::InvalidRow {
            table: "participation_days",
            message: format!("negative count {count}"),
        })
    }
}

impl Store for Database {
    fn append_event(&mut self, event: &UsageEvent) -> Result<(), StoreError> {
        self.insert_event(event)
            .map_err(|err| StoreError::new("append_event", err))
    }

    fn latest_event_before(
        &self,
        event_type: UsageEventType,
        before: DateTime<Utc>,
    ) -> Result<Option<UsageEvent>, StoreError> {
        self.query_latest_event_before(event_type, before)
            .map_err(|err| StoreError::new("latest_event_before", err))
    }

    fn list_events(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        self.query_events(after, before)
            .map_err(|err| StoreError::new("list_events", err))
    }

    fn save_response(&mut self, response: &SelfReportResponse) -> Result<(), StoreError> {
        self.upsert_response(response)
            .map_err(|err| StoreError::new("save_response", err))
    }

    fn response_prompted_at(
        &self,
        prompted_at: DateTime<Utc>,
    ) -> Result<Option<SelfReportResponse>, StoreError> {
        self.query_response(prompted_at)
            .map_err(|err| StoreError::new("response_prompted_at", err))
    }

    fn pending_responses(&self) -> Result<Vec<SelfReportResponse>, StoreError> {
        self.query_pending_responses()
            .map_err(|err| StoreError::new("pending_responses", err))
    }

    fn save_session(&mut self, session: &Session) -> Result<(), StoreError> {
        self.insert_session(session)
            .map_err(|err| StoreError::new("save_session", err))
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.query_recent_sessions(limit)
            .map_err(|err| StoreError::new("recent_sessions", err))
    }

    fn record_participation_day(&mut self, day: NaiveDate) -> Result<bool, StoreError> {
        self.insert_participation_day(day)
            .map_err(|err| StoreError::new("record_participation_day", err))
    }

    fn participation_day_count(&self) -> Result<usize, StoreError> {
        self.count_participation_days()
            .map_err(|err| StoreError::new("participation_day_count", err))
    }
}

struct RawEvent {
    event_type: String,
    occurred_at: String,
    payload: Option<String>,
}

fn raw_event(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        event_type: row.get(0)?,
        occurred_at: row.get(1)?,
        payload: row.get(2)?,
    })
}

impl RawEvent {
    fn into_event(self) -> Result<UsageEvent, DbError> {
        let event_type: UsageEventType =
            self.event_type.parse().map_err(|err| DbError::InvalidRow {
                table: "usage_events",
                message: format!("{err}"),
            })?;
        let occurred_at = parse_timestamp(&self.occurred_at, "usage_events")?;
        let mut event = UsageEvent::new(event_type, occurred_at);
        if let Some(payload) = self.payload {
            let value = serde_json::from_str(&payload).map_err(|err| DbError::InvalidRow {
                table: "usage_events",
                message: format!("payload is not JSON: {err}"),
            })?;
            event = event.with_payload(value);
        }
        Ok(event)
    }
}

struct RawResponse {
    prompted_at: String,
    question: String,
    scale: u8,
    response: Option<u8>,
    skipped: bool,
}

fn raw_response(row: &Row<'_>) -> rusqlite::Result<RawResponse> {
    Ok(RawResponse {
        prompted_at: row.get(0)?,
        question: row.get(1)?,
        scale: row.get(2)?,
        response: row.get(3)?,
        skipped: row.get(4)?,
    })
}

impl RawResponse {
    fn into_response(self) -> Result<SelfReportResponse, DbError> {
        Ok(SelfReportResponse {
            prompted_at: parse_timestamp(&self.prompted_at, "self_report_responses")?,
            question: self.question,
            scale: self.scale,
            response: self.response,
            skipped: self.skipped,
        })
    }
}

struct RawSession {
    id: String,
    started_at: String,
    ended_at: String,
    duration_in_seconds: i64,
    question: Option<String>,
    scale: Option<u8>,
    response: Option<u8>,
    skipped: Option<bool>,
}

impl RawSession {
    fn into_session(self) -> Result<Session, DbError> {
        let id = SessionId::new(self.id).map_err(|err| DbError::InvalidRow {
            table: "sessions",
            message: err.to_string(),
        })?;
        Ok(Session {
            id,
            started_at: parse_timestamp(&self.started_at, "sessions")?,
            ended_at: parse_timestamp(&self.ended_at, "sessions")?,
            duration_in_seconds: self.duration_in_seconds,
            question: self.question,
            scale: self.scale,
            response: self.response,
            skipped: self.skipped,
        })
    }
}

fn parse_timestamp(timestamp: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
