use std::sync::Arc;

use crate::audit::AuditEvent;
use crate::auth::{Caller, Permission};
use crate::error::{DispatchError, DispatchResult};
use crate::locks::acquire;
use crate::metrics::{record_rejection, ENTRIES_ENQUEUED, ENTRIES_FINISHED, ENTRIES_STARTED};
use crate::plant::Shared;

use super::{DispatchEntry, EntryFields, EntryFilter, NewEntry};

/// Upper bound for a single machine's live queue listing.
const QUEUE_LISTING_LIMIT: i64 = 1000;

/// Machine Dispatch Queue.
///
/// Every mutation holds the machine's lock for the duration of the store
/// transaction, so status derivation and the queue change are one unit
/// per machine.
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<Shared>,
}

impl DispatchQueue {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Append a manual entry to the tail of a machine's queue. Refused only
    /// when the machine is disabled or in maintenance.
    pub fn enqueue(
        &self,
        caller: &Caller,
        machine_id: &str,
        fields: EntryFields,
    ) -> DispatchResult<DispatchEntry> {
        self.enqueue_inner(caller, machine_id, fields)
            .inspect_err(record_rejection)
    }

    fn enqueue_inner(
        &self,
        caller: &Caller,
        machine_id: &str,
        fields: EntryFields,
    ) -> DispatchResult<DispatchEntry> {
        caller.require(Permission::Enqueue)?;
        if fields.client.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "client is required".to_string(),
            ));
        }
        if fields.quantity.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "quantity is required".to_string(),
            ));
        }

        let lock = self.shared.machine_lock(machine_id)?;
        let _guard = acquire(&lock);

        let entry = self
            .shared
            .store
            .insert_entry(NewEntry::manual(machine_id, fields, &caller.username))?;

        ENTRIES_ENQUEUED.with_label_values(&["manual"]).inc();
        tracing::info!(
            entry_id = %entry.id,
            machine_id = %machine_id,
            by = %caller.username,
            "Entry enqueued"
        );
        self.shared.emit(AuditEvent::EntryEnqueued {
            entry_id: entry.id.clone(),
            machine_id: machine_id.to_string(),
            created_by: caller.username.clone(),
            ticket_id: None,
        });

        Ok(entry)
    }

    /// Pending and active entries of one machine, oldest first.
    pub fn list_queue(&self, machine_id: &str) -> DispatchResult<Vec<DispatchEntry>> {
        if self.shared.store.get_machine(machine_id)?.is_none() {
            return Err(DispatchError::not_found("machine", machine_id));
        }
        self.shared.store.list_entries(
            &EntryFilter::open()
                .with_machine(machine_id)
                .with_limit(QUEUE_LISTING_LIMIT),
        )
    }

    pub fn list_entries(&self, filter: &EntryFilter) -> DispatchResult<Vec<DispatchEntry>> {
        self.shared.store.list_entries(filter)
    }

    pub fn count_entries(&self, filter: &EntryFilter) -> DispatchResult<i64> {
        self.shared.store.count_entries(filter)
    }

    pub fn get_entry(&self, id: &str) -> DispatchResult<DispatchEntry> {
        self.shared
            .store
            .get_entry(id)?
            .ok_or_else(|| DispatchError::not_found("dispatch entry", id))
    }

    /// pending -> active.
    pub fn start(&self, caller: &Caller, entry_id: &str) -> DispatchResult<DispatchEntry> {
        self.start_inner(caller, entry_id)
            .inspect_err(record_rejection)
    }

    fn start_inner(&self, caller: &Caller, entry_id: &str) -> DispatchResult<DispatchEntry> {
        caller.require(Permission::OperateQueue)?;
        let machine_id = self.get_entry(entry_id)?.machine_id;

        let lock = self.shared.machine_locks.get(&machine_id);
        let _guard = acquire(&lock);

        let entry = self.shared.store.start_entry(entry_id, &caller.username)?;

        ENTRIES_STARTED.inc();
        tracing::info!(
            entry_id = %entry_id,
            machine_id = %machine_id,
            by = %caller.username,
            "Entry started"
        );
        self.shared.emit(AuditEvent::EntryStarted {
            entry_id: entry_id.to_string(),
            machine_id,
            started_by: caller.username.clone(),
        });

        Ok(entry)
    }

    /// active -> finished. The final report is mandatory.
    pub fn finish(
        &self,
        caller: &Caller,
        entry_id: &str,
        release_note: Option<String>,
        final_report: &str,
    ) -> DispatchResult<DispatchEntry> {
        self.finish_inner(caller, entry_id, release_note, final_report)
            .inspect_err(record_rejection)
    }

    fn finish_inner(
        &self,
        caller: &Caller,
        entry_id: &str,
        release_note: Option<String>,
        final_report: &str,
    ) -> DispatchResult<DispatchEntry> {
        caller.require(Permission::OperateQueue)?;
        let machine_id = self.get_entry(entry_id)?.machine_id;
        if final_report.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "final report is required".to_string(),
            ));
        }

        let lock = self.shared.machine_locks.get(&machine_id);
        let _guard = acquire(&lock);

        let release_note = release_note.filter(|n| !n.trim().is_empty());
        let entry = self.shared.store.finish_entry(
            entry_id,
            release_note,
            final_report.trim().to_string(),
            &caller.username,
        )?;

        ENTRIES_FINISHED.inc();
        tracing::info!(
            entry_id = %entry_id,
            machine_id = %machine_id,
            by = %caller.username,
            "Entry finished"
        );
        self.shared.emit(AuditEvent::EntryFinished {
            entry_id: entry_id.to_string(),
            machine_id,
            finished_by: caller.username.clone(),
        });

        Ok(entry)
    }
}
