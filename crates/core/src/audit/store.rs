use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{AuditRecord, SubjectKind};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A slice of the plant's audit trail, read newest first.
///
/// Filters combine with AND. The machine trail (`for_machine`) collects
/// everything that happened on one machine: activation changes,
/// maintenance windows and queue entries.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub subject_kind: Option<SubjectKind>,
    pub subject_id: Option<String>,
    pub machine_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            subject_kind: None,
            subject_id: None,
            machine_id: None,
            event_type: None,
            user_id: None,
            from: None,
            to: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events about one record, e.g. every step of a winding ticket.
    pub fn for_subject(kind: SubjectKind, id: impl Into<String>) -> Self {
        Self {
            subject_kind: Some(kind),
            subject_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// The floor trail of one machine.
    pub fn for_machine(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: Some(machine_id.into()),
            ..Self::default()
        }
    }

    pub fn of_kind(mut self, kind: SubjectKind) -> Self {
        self.subject_kind = Some(kind);
        self
    }

    pub fn on_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn about(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn event(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Append-only storage for the audit trail.
pub trait AuditStore: Send + Sync {
    /// Append a record and return its assigned id.
    fn append(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Records matching `filter`, newest first, one page at a time.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Matching records across all pages.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
