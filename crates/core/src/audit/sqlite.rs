use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Value, Connection, Row};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore, SubjectKind};

const AUDIT_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        subject_kind TEXT,
        subject_id TEXT,
        machine_id TEXT,
        user_id TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_events(subject_kind, subject_id);
    CREATE INDEX IF NOT EXISTS idx_audit_machine ON audit_events(machine_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_event_type ON audit_events(event_type);
"#;

const RECORD_COLUMNS: &str =
    "id, timestamp, event_type, subject_kind, subject_id, machine_id, user_id, data";

fn db_err(e: impl std::fmt::Display) -> AuditError {
    AuditError::Database(e.to_string())
}

/// WHERE clause plus its bound values, built from an [`AuditFilter`].
struct Conditions {
    clauses: Vec<&'static str>,
    values: Vec<Value>,
}

impl Conditions {
    fn from_filter(filter: &AuditFilter) -> Self {
        let mut conditions = Conditions {
            clauses: Vec::new(),
            values: Vec::new(),
        };
        let text = |s: &str| Value::Text(s.to_string());

        conditions.push("subject_kind = ?", filter.subject_kind.map(|k| text(k.as_str())));
        conditions.push("subject_id = ?", filter.subject_id.as_deref().map(text));
        conditions.push("machine_id = ?", filter.machine_id.as_deref().map(text));
        conditions.push("event_type = ?", filter.event_type.as_deref().map(text));
        conditions.push("user_id = ?", filter.user_id.as_deref().map(text));
        conditions.push("timestamp >= ?", filter.from.as_ref().map(|t| Value::Text(stamp(t))));
        conditions.push("timestamp <= ?", filter.to.as_ref().map(|t| Value::Text(stamp(t))));
        conditions
    }

    fn push(&mut self, clause: &'static str, value: Option<Value>) {
        if let Some(value) = value {
            self.clauses.push(clause);
            self.values.push(value);
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Stored timestamps share one fixed-width format so they sort as text.
fn stamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A row as stored, before the timestamp and payload are decoded.
struct StoredRow {
    id: i64,
    timestamp: String,
    event_type: String,
    subject_kind: Option<String>,
    subject_id: Option<String>,
    machine_id: Option<String>,
    user_id: Option<String>,
    data: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type: row.get(2)?,
            subject_kind: row.get(3)?,
            subject_id: row.get(4)?,
            machine_id: row.get(5)?,
            user_id: row.get(6)?,
            data: row.get(7)?,
        })
    }

    fn decode(self) -> Result<AuditRecord, AuditError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| AuditError::Database(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);
        let data: AuditEvent = serde_json::from_str(&self.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        Ok(AuditRecord {
            id: self.id,
            timestamp,
            event_type: self.event_type,
            subject_kind: self.subject_kind.and_then(|k| k.parse::<SubjectKind>().ok()),
            subject_id: self.subject_id,
            machine_id: self.machine_id,
            user_id: self.user_id,
            data,
        })
    }
}

/// SQLite-backed audit store. Lives in the same database file as the plant
/// records but on its own connection, so audit writes never contend with a
/// dispatch transaction.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::from_connection(Connection::open(path).map_err(db_err)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(AUDIT_SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|e| AuditError::Database(format!("connection lock poisoned: {}", e)))
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_events \
             (timestamp, event_type, subject_kind, subject_id, machine_id, user_id, data) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stamp(&record.timestamp),
                record.event_type,
                record.subject_kind.map(|k| k.as_str()),
                record.subject_id,
                record.machine_id,
                record.user_id,
                data,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conditions = Conditions::from_filter(filter);
        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS,
            conditions.where_sql()
        );
        let mut values = conditions.values;
        values.push(Value::Integer(filter.limit));
        values.push(Value::Integer(filter.offset));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), StoredRow::read)
            .map_err(db_err)?;

        let records: Result<Vec<AuditRecord>, AuditError> =
            rows.map(|row| row.map_err(db_err)?.decode()).collect();
        records
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conditions = Conditions::from_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", conditions.where_sql());

        let conn = self.conn()?;
        conn.query_row(
            &sql,
            rusqlite::params_from_iter(conditions.values),
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}
