//! SQLite-backed record store shared by every component.
//!
//! One connection serves all aggregates so that cross-aggregate commands
//! (finalizing a ticket into N dispatch entries, drawing a document number
//! together with the order insert) run inside a single transaction. The
//! per-aggregate trait impls live next to their domain types in each
//! module's `sqlite_store.rs`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::error::{storage, DispatchError, DispatchResult};

/// SQLite record store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> DispatchResult<Self> {
        let conn = Connection::open(path).map_err(storage)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(storage)?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> DispatchResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> DispatchResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(storage)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> DispatchResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DispatchError::Storage(format!("connection lock poisoned: {}", e)))
    }

    fn initialize_schema(conn: &Connection) -> DispatchResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS machines (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                layout TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                revision INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (layout, code)
            );

            CREATE TABLE IF NOT EXISTS maintenance_records (
                id TEXT PRIMARY KEY,
                machine_id TEXT NOT NULL REFERENCES machines(id),
                reason TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                finished_at TEXT,
                finished_by TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_maintenance_one_open
                ON maintenance_records(machine_id) WHERE state = 'open';

            CREATE TABLE IF NOT EXISTS dispatch_entries (
                id TEXT PRIMARY KEY,
                machine_id TEXT NOT NULL REFERENCES machines(id),
                client TEXT NOT NULL,
                article TEXT NOT NULL,
                color TEXT NOT NULL,
                quantity TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                release_note TEXT,
                final_report TEXT,
                ticket_id TEXT,
                os_number INTEGER
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_dispatch_one_active
                ON dispatch_entries(machine_id) WHERE state = 'active';
            CREATE INDEX IF NOT EXISTS idx_dispatch_machine_state
                ON dispatch_entries(machine_id, state);
            CREATE INDEX IF NOT EXISTS idx_dispatch_ticket ON dispatch_entries(ticket_id);

            CREATE TABLE IF NOT EXISTS production_orders (
                id TEXT PRIMARY KEY,
                number INTEGER NOT NULL UNIQUE,
                client TEXT NOT NULL,
                article TEXT NOT NULL,
                color TEXT NOT NULL,
                meters INTEGER NOT NULL,
                due_date TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                draft TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_orders_state_due ON production_orders(state, due_date);

            CREATE TABLE IF NOT EXISTS winding_tickets (
                id TEXT PRIMARY KEY,
                os_number INTEGER NOT NULL,
                order_id TEXT,
                client TEXT NOT NULL,
                article TEXT NOT NULL,
                color TEXT NOT NULL,
                machine_label TEXT NOT NULL DEFAULT '',
                raw_material TEXT NOT NULL DEFAULT '',
                thread_count TEXT NOT NULL DEFAULT '',
                meters INTEGER NOT NULL,
                load TEXT NOT NULL DEFAULT '',
                load_fractions TEXT NOT NULL DEFAULT '[]',
                note TEXT NOT NULL DEFAULT '',
                due_date TEXT,
                state TEXT NOT NULL,
                allocations TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_state ON winding_tickets(state);
            CREATE INDEX IF NOT EXISTS idx_tickets_order ON winding_tickets(order_id);

            CREATE TABLE IF NOT EXISTS status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_id TEXT NOT NULL,
                machine_code TEXT NOT NULL,
                layout TEXT NOT NULL,
                old_status TEXT NOT NULL,
                new_status TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                entry_id TEXT,
                maintenance_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_machine ON status_history(machine_id);
            CREATE INDEX IF NOT EXISTS idx_history_layout ON status_history(layout);

            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )
        .map_err(storage)?;

        Ok(())
    }
}

/// Build a column conversion error for `row.get` closures.
pub(crate) fn conversion_error(idx: usize, message: impl Into<String>) -> rusqlite::Error {
    let message: String = message.into();
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp {:?}: {}", raw, e)))
}

pub(crate) fn parse_optional_timestamp(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

pub(crate) fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("invalid date {:?}: {}", raw, e)))
}

/// Parse a text column through the type's `FromStr`.
pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, format!("invalid value {:?}: {}", raw, e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e.to_string()))
}

/// True when the error is a UNIQUE constraint violation (used to detect
/// races against the one-active-entry and one-open-maintenance indexes).
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Boxed parameter list helpers shared by the filtered list queries.
pub(crate) type BoxedParams = Vec<Box<dyn rusqlite::ToSql>>;

pub(crate) fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

pub(crate) fn param_refs(params: &BoxedParams) -> Vec<&dyn rusqlite::ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}
