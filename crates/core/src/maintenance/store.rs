use crate::error::DispatchResult;

use super::MaintenanceRecord;

#[derive(Debug, Clone, Default)]
pub struct MaintenanceFilter {
    pub machine_id: Option<String>,
    pub open_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl MaintenanceFilter {
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

    pub fn open_only(mut self) -> Self {
        self.open_only = true;
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

pub trait MaintenanceStore: Send + Sync {
    /// Open a window. The machine must currently be free; a second open
    /// window on the same machine is a `Conflict`.
    fn open_maintenance(
        &self,
        machine_id: &str,
        reason: &str,
        opened_by: &str,
    ) -> DispatchResult<MaintenanceRecord>;

    /// Close an open window. Closing twice is `InvalidState`.
    fn close_maintenance(&self, id: &str, closed_by: &str) -> DispatchResult<MaintenanceRecord>;

    fn get_maintenance(&self, id: &str) -> DispatchResult<Option<MaintenanceRecord>>;

    /// Newest first.
    fn list_maintenance(&self, filter: &MaintenanceFilter) -> DispatchResult<Vec<MaintenanceRecord>>;
}
