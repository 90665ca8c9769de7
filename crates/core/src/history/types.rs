use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::MachineStatus;
use crate::fleet::LayoutFamily;

/// One recorded change of a machine's derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub machine_id: String,
    pub machine_code: String,
    pub layout: LayoutFamily,
    pub old_status: MachineStatus,
    pub new_status: MachineStatus,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub entry_id: Option<String>,
    pub maintenance_id: Option<String>,
}

/// What caused a machine mutation; stamped on the history row.
#[derive(Debug, Clone, Default)]
pub struct ChangeCause {
    pub changed_by: String,
    pub entry_id: Option<String>,
    pub maintenance_id: Option<String>,
}

impl ChangeCause {
    pub fn by(changed_by: impl Into<String>) -> Self {
        Self {
            changed_by: changed_by.into(),
            ..Default::default()
        }
    }

    pub fn with_entry(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn with_maintenance(mut self, maintenance_id: impl Into<String>) -> Self {
        self.maintenance_id = Some(maintenance_id.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub machine_id: Option<String>,
    pub layout: Option<LayoutFamily>,
    pub limit: i64,
    pub offset: i64,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutFamily) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
