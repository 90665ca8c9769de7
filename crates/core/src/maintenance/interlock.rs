use std::sync::Arc;

use crate::audit::AuditEvent;
use crate::auth::{Caller, Permission};
use crate::error::{DispatchError, DispatchResult};
use crate::locks::acquire;
use crate::metrics::record_rejection;
use crate::plant::Shared;

use super::{MaintenanceFilter, MaintenanceRecord};

/// Maintenance Interlock.
#[derive(Clone)]
pub struct MaintenanceInterlock {
    shared: Arc<Shared>,
}

impl MaintenanceInterlock {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Take a free machine out of dispatch.
    pub fn open(
        &self,
        caller: &Caller,
        machine_id: &str,
        reason: &str,
    ) -> DispatchResult<MaintenanceRecord> {
        self.open_inner(caller, machine_id, reason)
            .inspect_err(record_rejection)
    }

    fn open_inner(
        &self,
        caller: &Caller,
        machine_id: &str,
        reason: &str,
    ) -> DispatchResult<MaintenanceRecord> {
        caller.require(Permission::Maintenance)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "maintenance reason is required".to_string(),
            ));
        }

        let lock = self.shared.machine_lock(machine_id)?;
        let _guard = acquire(&lock);

        let record = self
            .shared
            .store
            .open_maintenance(machine_id, reason, &caller.username)?;

        tracing::info!(
            record_id = %record.id,
            machine_id = %machine_id,
            by = %caller.username,
            "Maintenance opened"
        );
        self.shared.emit(AuditEvent::MaintenanceOpened {
            record_id: record.id.clone(),
            machine_id: machine_id.to_string(),
            reason: record.reason.clone(),
            opened_by: caller.username.clone(),
        });

        Ok(record)
    }

    /// Close a window; the machine's status is re-derived.
    pub fn close(&self, caller: &Caller, record_id: &str) -> DispatchResult<MaintenanceRecord> {
        self.close_inner(caller, record_id)
            .inspect_err(record_rejection)
    }

    fn close_inner(&self, caller: &Caller, record_id: &str) -> DispatchResult<MaintenanceRecord> {
        caller.require(Permission::Maintenance)?;
        let machine_id = self.get(record_id)?.machine_id;

        let lock = self.shared.machine_locks.get(&machine_id);
        let _guard = acquire(&lock);

        let record = self
            .shared
            .store
            .close_maintenance(record_id, &caller.username)?;

        tracing::info!(
            record_id = %record_id,
            machine_id = %machine_id,
            by = %caller.username,
            "Maintenance closed"
        );
        self.shared.emit(AuditEvent::MaintenanceClosed {
            record_id: record_id.to_string(),
            machine_id,
            closed_by: caller.username.clone(),
        });

        Ok(record)
    }

    pub fn get(&self, record_id: &str) -> DispatchResult<MaintenanceRecord> {
        self.shared
            .store
            .get_maintenance(record_id)?
            .ok_or_else(|| DispatchError::not_found("maintenance record", record_id))
    }

    pub fn list(&self, filter: &MaintenanceFilter) -> DispatchResult<Vec<MaintenanceRecord>> {
        self.shared.store.list_maintenance(filter)
    }
}
