use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceState {
    Open,
    Closed,
}

impl MaintenanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceState::Open => "open",
            MaintenanceState::Closed => "closed",
        }
    }
}

impl fmt::Display for MaintenanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaintenanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(MaintenanceState::Open),
            "closed" => Ok(MaintenanceState::Closed),
            other => Err(format!("unknown maintenance state: {}", other)),
        }
    }
}

/// A maintenance window on one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: String,
    pub machine_id: String,
    pub reason: String,
    pub state: MaintenanceState,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub finished_by: Option<String>,
}

impl MaintenanceRecord {
    pub fn is_open(&self) -> bool {
        self.state == MaintenanceState::Open
    }
}
