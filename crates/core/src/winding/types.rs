//! Winding ticket types and the ticket state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchEntry, EntryFields};
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::{LayoutFamily, Machine, MachineRef};
use crate::quantity::Quantity;

/// A ticket fans out to at most this many machines.
pub const MAX_ALLOCATIONS: usize = 5;

/// Optional per-spindle load splits printed on the ticket.
pub const MAX_LOAD_FRACTIONS: usize = 5;

/// Linear lifecycle: pending -> awaiting_production -> in_production ->
/// finished. No skips, no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Pending,
    AwaitingProduction,
    InProduction,
    Finished,
}

impl TicketState {
    pub const ALL: [TicketState; 4] = [
        TicketState::Pending,
        TicketState::AwaitingProduction,
        TicketState::InProduction,
        TicketState::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Pending => "pending",
            TicketState::AwaitingProduction => "awaiting_production",
            TicketState::InProduction => "in_production",
            TicketState::Finished => "finished",
        }
    }

    /// The only state this one may move to, if any.
    pub fn successor(&self) -> Option<TicketState> {
        match self {
            TicketState::Pending => Some(TicketState::AwaitingProduction),
            TicketState::AwaitingProduction => Some(TicketState::InProduction),
            TicketState::InProduction => Some(TicketState::Finished),
            TicketState::Finished => None,
        }
    }

    /// Check a step taken through `advance`. Reaching finished goes through
    /// finalize or the legacy finish instead.
    pub fn check_advance(&self, target: TicketState) -> DispatchResult<()> {
        let allowed = target != TicketState::Finished && self.successor() == Some(target);
        if allowed {
            Ok(())
        } else {
            Err(DispatchError::InvalidTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown ticket state: {}", s))
    }
}

/// Free-text fields printed on a winding ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    /// Machine named on a standalone ticket.
    #[serde(default)]
    pub machine_label: String,
    #[serde(default)]
    pub raw_material: String,
    #[serde(default)]
    pub thread_count: String,
    #[serde(default)]
    pub load: String,
    #[serde(default)]
    pub load_fractions: Vec<String>,
    #[serde(default)]
    pub note: String,
}

impl TicketDetails {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.load_fractions.len() > MAX_LOAD_FRACTIONS {
            return Err(DispatchError::PreconditionFailed(format!(
                "at most {} load fractions, got {}",
                MAX_LOAD_FRACTIONS,
                self.load_fractions.len()
            )));
        }
        Ok(())
    }
}

/// One machine a ticket's meters are split onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAllocation {
    pub machine_id: String,
    pub machine_code: String,
    pub layout: LayoutFamily,
    /// Unset until the operator types it; required to finalize.
    #[serde(default)]
    pub quantity: Option<Quantity>,
}

impl MachineAllocation {
    pub fn new(machine: &Machine, quantity: Option<Quantity>) -> Self {
        Self {
            machine_id: machine.id.clone(),
            machine_code: machine.code.clone(),
            layout: machine.layout,
            quantity,
        }
    }
}

/// Operator input for one allocation: a machine reference and a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(flatten)]
    pub machine: MachineRef,
    #[serde(default)]
    pub quantity: Option<Quantity>,
}

/// Fields an operator supplies to launch a ticket without an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneTicket {
    pub client: String,
    #[serde(default)]
    pub article: String,
    #[serde(default)]
    pub color: String,
    pub meters: Quantity,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub details: TicketDetails,
}

/// A bobbin-winding work ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindingTicket {
    pub id: String,
    pub os_number: u64,
    /// Originating production order. The order outlives the ticket.
    pub order_id: Option<String>,
    pub client: String,
    pub article: String,
    pub color: String,
    pub meters: Quantity,
    pub due_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub details: TicketDetails,
    pub state: TicketState,
    pub allocations: Vec<MachineAllocation>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WindingTicket {
    /// Sum of the quantities typed so far. Shown next to `meters`; the two
    /// are not required to match.
    pub fn allocated_total(&self) -> Quantity {
        self.allocations.iter().filter_map(|a| a.quantity).sum()
    }

    /// The ticket can be sent to its machines: in production, with at least
    /// one allocation and a quantity on every allocation.
    pub fn check_finalizable(&self) -> DispatchResult<()> {
        if self.state != TicketState::InProduction {
            return Err(DispatchError::InvalidState(format!(
                "ticket {} is {}; only in_production tickets can be sent to machines",
                self.os_number, self.state
            )));
        }
        if self.allocations.is_empty() {
            return Err(DispatchError::PreconditionFailed(format!(
                "ticket {} has no machine allocations",
                self.os_number
            )));
        }
        if let Some(missing) = self.allocations.iter().find(|a| a.quantity.is_none()) {
            return Err(DispatchError::PreconditionFailed(format!(
                "allocation on {} has no quantity",
                missing.machine_code
            )));
        }
        Ok(())
    }

    /// Entry fields for one allocation's dispatch entry.
    pub fn entry_fields(&self, allocation: &MachineAllocation) -> EntryFields {
        EntryFields {
            client: self.client.clone(),
            article: self.article.clone(),
            color: self.color.clone(),
            quantity: allocation.quantity.unwrap_or_default().to_string(),
            note: self.details.note.clone(),
        }
    }
}

/// Filter for listing tickets. Finished tickets are hidden unless asked
/// for; results are ordered by due date (undated last), then number.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Empty means every state allowed by `include_finished`.
    pub states: Vec<TicketState>,
    pub include_finished: bool,
    pub order_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: TicketState) -> Self {
        self.states = vec![state];
        if state == TicketState::Finished {
            self.include_finished = true;
        }
        self
    }

    pub fn including_finished(mut self) -> Self {
        self.include_finished = true;
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
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

/// Result of sending a ticket to its machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub ticket: WindingTicket,
    pub created_entries: Vec<DispatchEntry>,
}
