use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of plant record an audit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Machine,
    Maintenance,
    Entry,
    Order,
    Ticket,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 5] = [
        SubjectKind::Machine,
        SubjectKind::Maintenance,
        SubjectKind::Entry,
        SubjectKind::Order,
        SubjectKind::Ticket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Machine => "machine",
            SubjectKind::Maintenance => "maintenance",
            SubjectKind::Entry => "entry",
            SubjectKind::Order => "order",
            SubjectKind::Ticket => "ticket",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown audit subject: {}", s))
    }
}

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Fleet
    MachineActivationChanged {
        machine_id: String,
        active: bool,
        changed_by: String,
    },

    // Maintenance
    MaintenanceOpened {
        record_id: String,
        machine_id: String,
        reason: String,
        opened_by: String,
    },
    MaintenanceClosed {
        record_id: String,
        machine_id: String,
        closed_by: String,
    },

    // Dispatch queue
    EntryEnqueued {
        entry_id: String,
        machine_id: String,
        created_by: String,
        /// Winding ticket the entry was fanned out from, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket_id: Option<String>,
    },
    EntryStarted {
        entry_id: String,
        machine_id: String,
        started_by: String,
    },
    EntryFinished {
        entry_id: String,
        machine_id: String,
        finished_by: String,
    },

    // Production orders
    OrderCreated {
        order_id: String,
        number: u64,
        client: String,
        created_by: String,
    },
    OrderDraftSaved {
        order_id: String,
        allocations: usize,
        edited_by: String,
    },
    OrderMarkedInProduction {
        order_id: String,
        number: u64,
    },
    OrderFinished {
        order_id: String,
        number: u64,
        finished_by: String,
    },

    // Winding tickets
    TicketLaunched {
        ticket_id: String,
        os_number: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
        launched_by: String,
    },
    TicketAllocationsSet {
        ticket_id: String,
        machine_ids: Vec<String>,
        set_by: String,
    },
    TicketAdvanced {
        ticket_id: String,
        from_state: String,
        to_state: String,
        advanced_by: String,
    },
    TicketFinalized {
        ticket_id: String,
        /// Dispatch entries created by the fan-out (empty for the legacy finish).
        entry_ids: Vec<String>,
        finalized_by: String,
    },
    TicketDeleted {
        ticket_id: String,
        deleted_by: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::MachineActivationChanged { .. } => "machine_activation_changed",
            Self::MaintenanceOpened { .. } => "maintenance_opened",
            Self::MaintenanceClosed { .. } => "maintenance_closed",
            Self::EntryEnqueued { .. } => "entry_enqueued",
            Self::EntryStarted { .. } => "entry_started",
            Self::EntryFinished { .. } => "entry_finished",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderDraftSaved { .. } => "order_draft_saved",
            Self::OrderMarkedInProduction { .. } => "order_marked_in_production",
            Self::OrderFinished { .. } => "order_finished",
            Self::TicketLaunched { .. } => "ticket_launched",
            Self::TicketAllocationsSet { .. } => "ticket_allocations_set",
            Self::TicketAdvanced { .. } => "ticket_advanced",
            Self::TicketFinalized { .. } => "ticket_finalized",
            Self::TicketDeleted { .. } => "ticket_deleted",
        }
    }

    /// The record the event is about.
    pub fn subject(&self) -> Option<(SubjectKind, &str)> {
        match self {
            Self::MachineActivationChanged { machine_id, .. } => {
                Some((SubjectKind::Machine, machine_id))
            }
            Self::MaintenanceOpened { record_id, .. }
            | Self::MaintenanceClosed { record_id, .. } => {
                Some((SubjectKind::Maintenance, record_id))
            }
            Self::EntryEnqueued { entry_id, .. }
            | Self::EntryStarted { entry_id, .. }
            | Self::EntryFinished { entry_id, .. } => Some((SubjectKind::Entry, entry_id)),
            Self::OrderCreated { order_id, .. }
            | Self::OrderDraftSaved { order_id, .. }
            | Self::OrderMarkedInProduction { order_id, .. }
            | Self::OrderFinished { order_id, .. } => Some((SubjectKind::Order, order_id)),
            Self::TicketLaunched { ticket_id, .. }
            | Self::TicketAllocationsSet { ticket_id, .. }
            | Self::TicketAdvanced { ticket_id, .. }
            | Self::TicketFinalized { ticket_id, .. }
            | Self::TicketDeleted { ticket_id, .. } => Some((SubjectKind::Ticket, ticket_id)),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// The machine whose floor trail the event belongs to, if it touched
    /// exactly one.
    pub fn machine_id(&self) -> Option<&str> {
        match self {
            Self::MachineActivationChanged { machine_id, .. }
            | Self::MaintenanceOpened { machine_id, .. }
            | Self::MaintenanceClosed { machine_id, .. }
            | Self::EntryEnqueued { machine_id, .. }
            | Self::EntryStarted { machine_id, .. }
            | Self::EntryFinished { machine_id, .. } => Some(machine_id),
            _ => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::MachineActivationChanged { changed_by, .. } => Some(changed_by),
            Self::MaintenanceOpened { opened_by, .. } => Some(opened_by),
            Self::MaintenanceClosed { closed_by, .. } => Some(closed_by),
            Self::EntryEnqueued { created_by, .. } | Self::OrderCreated { created_by, .. } => {
                Some(created_by)
            }
            Self::EntryStarted { started_by, .. } => Some(started_by),
            Self::EntryFinished { finished_by, .. } => Some(finished_by),
            Self::OrderDraftSaved { edited_by, .. } => Some(edited_by),
            Self::OrderFinished { finished_by, .. } => Some(finished_by),
            Self::TicketLaunched { launched_by, .. } => Some(launched_by),
            Self::TicketAllocationsSet { set_by, .. } => Some(set_by),
            Self::TicketAdvanced { advanced_by, .. } => Some(advanced_by),
            Self::TicketFinalized { finalized_by, .. } => Some(finalized_by),
            Self::TicketDeleted { deleted_by, .. } => Some(deleted_by),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub subject_kind: Option<SubjectKind>,
    pub subject_id: Option<String>,
    pub machine_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
