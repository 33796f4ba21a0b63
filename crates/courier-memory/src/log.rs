//! Append-only location log.
//!
//! # Storage layout
//!
//! [`SqliteLocationLog`] creates a single table (if it does not already
//! exist):
//!
//! | column   | type | description                           |
//! |----------|------|---------------------------------------|
//! | user     | TEXT | Tracked user                          |
//! | location | TEXT | Location label as reported            |
//! | event    | TEXT | `arrived` or `left`                   |
//! | time     | TEXT | RFC-3339 event time (UTC)             |
//!
//! Records are never updated or deleted.  "Most recent" means the row with
//! the highest `ROWID`, i.e. the last one appended, regardless of its
//! timestamp.

use chrono::{DateTime, Utc};
use courier_types::{LocationEvent, LocationRecord};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by a [`LocationLog`] backend.
#[derive(Error, Debug)]
pub enum LocationLogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt location record: {0}")]
    Corrupt(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// LocationLog trait
// ─────────────────────────────────────────────────────────────────────────────

/// Storage for the location history.
///
/// Implementations only need to append and read back; the
/// [`LocationTracker`][crate::tracker::LocationTracker] serialises all access
/// so a backend does not have to be `Sync`.
pub trait LocationLog: Send {
    /// Persist `record` at the end of the log.  Either the whole record is
    /// stored or nothing is.
    fn append(&mut self, record: &LocationRecord) -> Result<(), LocationLogError>;

    /// The last appended record, or `None` for an empty log.
    fn most_recent(&self) -> Result<Option<LocationRecord>, LocationLogError>;

    /// Every record in append order.
    fn records(&self) -> Result<Vec<LocationRecord>, LocationLogError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite backend
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed [`LocationLog`].
pub struct SqliteLocationLog {
    conn: Connection,
}

impl SqliteLocationLog {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: &str) -> Result<Self, LocationLogError> {
        let conn = Connection::open(path)?;
        let log = Self { conn };
        log.init_schema()?;
        Ok(log)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, LocationLogError> {
        let conn = Connection::open_in_memory()?;
        let log = Self { conn };
        log.init_schema()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<(), LocationLogError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS LOCATION_HISTORY (
                user     TEXT NOT NULL,
                location TEXT NOT NULL,
                event    TEXT NOT NULL,
                time     TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

type RawRow = (String, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row((user, location, event, time): RawRow) -> Result<LocationRecord, LocationLogError> {
    let event = LocationEvent::parse(&event)
        .ok_or_else(|| LocationLogError::Corrupt(format!("unknown event `{event}`")))?;
    let timestamp = time
        .parse::<DateTime<Utc>>()
        .map_err(|e| LocationLogError::Corrupt(format!("bad time `{time}`: {e}")))?;
    Ok(LocationRecord {
        user,
        location,
        event,
        timestamp,
    })
}

impl LocationLog for SqliteLocationLog {
    fn append(&mut self, record: &LocationRecord) -> Result<(), LocationLogError> {
        self.conn.execute(
            "INSERT INTO LOCATION_HISTORY (user, location, event, time)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.user,
                record.location,
                record.event.as_str(),
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn most_recent(&self) -> Result<Option<LocationRecord>, LocationLogError> {
        let row = self
            .conn
            .query_row(
                "SELECT user, location, event, time FROM LOCATION_HISTORY
                 ORDER BY ROWID DESC LIMIT 1",
                [],
                read_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    fn records(&self) -> Result<Vec<LocationRecord>, LocationLogError> {
        let mut stmt = self.conn.prepare(
            "SELECT user, location, event, time FROM LOCATION_HISTORY
             ORDER BY ROWID ASC",
        )?;
        let rows = stmt.query_map([], read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_row(row?)?);
        }
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────────

/// Volatile [`LocationLog`]; history is lost when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryLocationLog {
    records: Vec<LocationRecord>,
}

impl MemoryLocationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationLog for MemoryLocationLog {
    fn append(&mut self, record: &LocationRecord) -> Result<(), LocationLogError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn most_recent(&self) -> Result<Option<LocationRecord>, LocationLogError> {
        Ok(self.records.last().cloned())
    }

    fn records(&self) -> Result<Vec<LocationRecord>, LocationLogError> {
        Ok(self.records.clone())
    }
}
