//! Dispatch queue data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a queue entry: pending -> active -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Active,
    Finished,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Active => "active",
            EntryState::Finished => "finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Finished)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryState::Pending),
            "active" => Ok(EntryState::Active),
            "finished" => Ok(EntryState::Finished),
            other => Err(format!("unknown entry state: {}", other)),
        }
    }
}

/// Work fields of a queue entry as submitted by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    pub client: String,
    pub article: String,
    pub color: String,
    /// Free text, may carry units ("1.000 m", "3 cones").
    pub quantity: String,
    #[serde(default)]
    pub note: String,
}

/// One unit of work on one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub id: String,
    pub machine_id: String,
    pub client: String,
    pub article: String,
    pub color: String,
    pub quantity: String,
    pub note: String,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub release_note: Option<String>,
    pub final_report: Option<String>,
    /// Winding ticket this entry was fanned out from, if any.
    pub ticket_id: Option<String>,
    pub os_number: Option<u64>,
}

/// An entry about to be inserted.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: String,
    pub machine_id: String,
    pub fields: EntryFields,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub ticket_id: Option<String>,
    pub os_number: Option<u64>,
    /// Start right away if the machine is free at insert time.
    pub start_immediately: bool,
}

impl NewEntry {
    pub fn manual(
        machine_id: impl Into<String>,
        fields: EntryFields,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            machine_id: machine_id.into(),
            fields,
            created_by: created_by.into(),
            created_at: Utc::now(),
            ticket_id: None,
            os_number: None,
            start_immediately: false,
        }
    }

    pub fn into_entry(self) -> DispatchEntry {
        let (state, started_at) = if self.start_immediately {
            (EntryState::Active, Some(self.created_at))
        } else {
            (EntryState::Pending, None)
        };
        DispatchEntry {
            id: self.id,
            machine_id: self.machine_id,
            client: self.fields.client,
            article: self.fields.article,
            color: self.fields.color,
            quantity: self.fields.quantity,
            note: self.fields.note,
            state,
            created_at: self.created_at,
            created_by: self.created_by,
            started_at,
            finished_at: None,
            release_note: None,
            final_report: None,
            ticket_id: self.ticket_id,
            os_number: self.os_number,
        }
    }
}
