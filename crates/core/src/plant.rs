//! Entry point to the dispatch core.
//!
//! A [`Plant`] owns the store, the per-machine and per-ticket locks and the
//! optional audit handle. The component services it hands out are cheap
//! views over that shared state.

use std::sync::{Arc, Mutex};

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::Config;
use crate::dispatch::DispatchQueue;
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::{FleetCatalog, MachineRegistry};
use crate::locks::KeyedLocks;
use crate::maintenance::MaintenanceInterlock;
use crate::numbering::{NumberingService, DEFAULT_START_AFTER, DOCUMENT_SERIES};
use crate::production::ProductionLedger;
use crate::reports::Reports;
use crate::store::Store;
use crate::winding::WindingEngine;

/// Tunables taken from the `[numbering]` and `[dispatch]` config sections.
#[derive(Debug, Clone)]
pub struct PlantOptions {
    /// First document number is `start_after + 1`.
    pub start_after: u64,
    /// Start fanned-out entries immediately on machines that were free.
    pub auto_start_idle: bool,
}

impl Default for PlantOptions {
    fn default() -> Self {
        Self {
            start_after: DEFAULT_START_AFTER,
            auto_start_idle: true,
        }
    }
}

impl From<&Config> for PlantOptions {
    fn from(config: &Config) -> Self {
        Self {
            start_after: config.numbering.start_after,
            auto_start_idle: config.dispatch.auto_start_idle,
        }
    }
}

pub(crate) struct Shared {
    pub store: Arc<dyn Store>,
    pub machine_locks: KeyedLocks,
    pub ticket_locks: KeyedLocks,
    pub audit: Option<AuditHandle>,
    pub options: PlantOptions,
}

impl Shared {
    /// Lock for a registered machine. Unknown ids are rejected before a
    /// lock entry is created for them.
    pub fn machine_lock(&self, machine_id: &str) -> DispatchResult<Arc<Mutex<()>>> {
        if self.store.get_machine(machine_id)?.is_none() {
            return Err(DispatchError::not_found("machine", machine_id));
        }
        Ok(self.machine_locks.get(machine_id))
    }

    pub fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }
}

#[derive(Clone)]
pub struct Plant {
    shared: Arc<Shared>,
}

impl Plant {
    pub fn new(store: Arc<dyn Store>, options: PlantOptions, audit: Option<AuditHandle>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                machine_locks: KeyedLocks::new(),
                ticket_locks: KeyedLocks::new(),
                audit,
                options,
            }),
        }
    }

    /// Provision the fleet when the machine table is empty and seed the
    /// document series. Safe to call on every startup.
    pub fn initialize(&self, catalog: &FleetCatalog) -> DispatchResult<()> {
        let provisioned = self.registry().provision(catalog)?;
        let seeded = self
            .shared
            .store
            .seed_series(DOCUMENT_SERIES, self.shared.options.start_after)?;
        if seeded {
            tracing::info!(
                start_after = self.shared.options.start_after,
                "Document number series created"
            );
        }
        tracing::info!(provisioned, "Plant initialized");
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.shared.store
    }

    pub fn options(&self) -> &PlantOptions {
        &self.shared.options
    }

    pub fn registry(&self) -> MachineRegistry {
        MachineRegistry::new(Arc::clone(&self.shared))
    }

    pub fn maintenance(&self) -> MaintenanceInterlock {
        MaintenanceInterlock::new(Arc::clone(&self.shared))
    }

    pub fn queue(&self) -> DispatchQueue {
        DispatchQueue::new(Arc::clone(&self.shared))
    }

    pub fn orders(&self) -> ProductionLedger {
        ProductionLedger::new(Arc::clone(&self.shared))
    }

    pub fn winding(&self) -> WindingEngine {
        WindingEngine::new(Arc::clone(&self.shared))
    }

    pub fn numbering(&self) -> NumberingService {
        NumberingService::new(Arc::clone(&self.shared))
    }

    pub fn reports(&self) -> Reports {
        Reports::new(Arc::clone(&self.shared))
    }
}
