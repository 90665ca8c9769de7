use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::AuditEvent;
use crate::auth::{Caller, Permission};
use crate::error::{DispatchError, DispatchResult};
use crate::locks::acquire;
use crate::metrics::record_rejection;
use crate::plant::Shared;

use super::{FleetCatalog, LayoutFamily, Machine, MachineListing};

/// How an operator names a machine: its id (`a-CD1`) or its code (`CD1`),
/// optionally narrowed to one layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    pub machine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutFamily>,
}

impl MachineRef {
    pub fn new(machine: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            layout: None,
        }
    }

    pub fn in_layout(mut self, layout: LayoutFamily) -> Self {
        self.layout = Some(layout);
        self
    }
}

/// Machine Registry.
#[derive(Clone)]
pub struct MachineRegistry {
    shared: Arc<Shared>,
}

impl MachineRegistry {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Insert the catalog's machines if the fleet is empty. Returns how many
    /// machines were inserted.
    pub fn provision(&self, catalog: &FleetCatalog) -> DispatchResult<usize> {
        let existing = self.shared.store.count_machines()?;
        if existing > 0 {
            tracing::debug!(existing, "Fleet already provisioned");
            return Ok(0);
        }

        let inserted = self.shared.store.provision_machines(&catalog.machines())?;
        tracing::info!(inserted, "Fleet provisioned");
        Ok(inserted)
    }

    /// Machines in floor order with a listing version for staleness checks.
    pub fn list_machines(&self, layout: Option<LayoutFamily>) -> DispatchResult<MachineListing> {
        let machines = self.shared.store.list_machines(layout)?;
        let version = machines.iter().map(|m| m.revision).max().unwrap_or(0);
        Ok(MachineListing {
            layout,
            version,
            machines,
        })
    }

    pub fn get_machine(&self, id: &str) -> DispatchResult<Machine> {
        self.shared
            .store
            .get_machine(id)?
            .ok_or_else(|| DispatchError::not_found("machine", id))
    }

    /// Resolve an operator reference to exactly one machine. An id match
    /// wins; otherwise the code is matched case-insensitively and must be
    /// unambiguous.
    pub fn resolve(&self, reference: &MachineRef) -> DispatchResult<Machine> {
        let label = reference.machine.trim();
        if label.is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "machine reference is empty".to_string(),
            ));
        }

        if let Some(machine) = self.shared.store.get_machine(label)? {
            if reference.layout.map_or(true, |l| l == machine.layout) {
                return Ok(machine);
            }
        }

        let mut found = self
            .shared
            .store
            .find_machines_by_code(label, reference.layout)?;
        match found.len() {
            0 => Err(DispatchError::not_found("machine", label)),
            1 => Ok(found.remove(0)),
            n => Err(DispatchError::PreconditionFailed(format!(
                "machine code {} matches {} machines; name the layout",
                label, n
            ))),
        }
    }

    /// Toggle a machine's active flag. Admin only. Re-activating does not
    /// touch the queue; status is re-derived from what is there.
    pub fn set_active(&self, caller: &Caller, id: &str, active: bool) -> DispatchResult<Machine> {
        caller
            .require(Permission::ManageFleet)
            .inspect_err(record_rejection)?;

        let lock = self.shared.machine_lock(id).inspect_err(record_rejection)?;
        let _guard = acquire(&lock);

        let machine = self
            .shared
            .store
            .set_machine_active(id, active, &caller.username)
            .inspect_err(record_rejection)?;

        tracing::info!(
            machine_id = %id,
            active,
            status = %machine.status,
            by = %caller.username,
            "Machine activation changed"
        );
        self.shared.emit(AuditEvent::MachineActivationChanged {
            machine_id: id.to_string(),
            active,
            changed_by: caller.username.clone(),
        });

        Ok(machine)
    }
}
