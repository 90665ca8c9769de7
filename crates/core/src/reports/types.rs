use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchEntry, EntryState};
use crate::fleet::{LayoutFamily, Machine};
use crate::history::StatusChange;
use crate::quantity::Quantity;
use crate::winding::{MachineAllocation, WindingTicket};

/// Rows of a bulk report. `truncated` is set when more rows matched than
/// the report cap allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRows<T> {
    pub rows: Vec<T>,
    pub truncated: bool,
}

impl<T> ReportRows<T> {
    /// Cap `rows`, which were read with a limit of `cap + 1`.
    pub fn capped(mut rows: Vec<T>, cap: usize) -> Self {
        let truncated = rows.len() > cap;
        rows.truncate(cap);
        Self { rows, truncated }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Dispatch entries per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCounts {
    pub pending: usize,
    pub active: usize,
    pub finished: usize,
}

impl EntryCounts {
    pub fn tally<'a>(entries: impl IntoIterator<Item = &'a DispatchEntry>) -> Self {
        entries
            .into_iter()
            .fold(Self::default(), |mut counts, entry| {
                match entry.state {
                    EntryState::Pending => counts.pending += 1,
                    EntryState::Active => counts.active += 1,
                    EntryState::Finished => counts.finished += 1,
                }
                counts
            })
    }

    pub fn total(&self) -> usize {
        self.pending + self.active + self.finished
    }
}

/// A ticket gathered back from the machines it was sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketProduction {
    pub ticket: WindingTicket,
    pub allocations: Vec<MachineAllocation>,
    pub entries: Vec<DispatchEntry>,
    pub allocated_total: Quantity,
    /// Sum of finished entries whose quantity parses.
    pub finished_total: Quantity,
    pub counts: EntryCounts,
    /// Every entry created from the ticket is finished.
    pub complete: bool,
}

impl TicketProduction {
    pub fn gather(ticket: WindingTicket, entries: Vec<DispatchEntry>) -> Self {
        let counts = EntryCounts::tally(&entries);
        let finished_total = entries
            .iter()
            .filter(|e| e.state == EntryState::Finished)
            .filter_map(|e| Quantity::parse(&e.quantity).ok())
            .sum();

        Self {
            allocations: ticket.allocations.clone(),
            allocated_total: ticket.allocated_total(),
            complete: !entries.is_empty() && counts.finished == counts.total(),
            finished_total,
            counts,
            entries,
            ticket,
        }
    }
}

/// Everything recorded for one floor layout: the plant export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutReport {
    pub layout: LayoutFamily,
    pub machines: Vec<Machine>,
    pub entries: Vec<DispatchEntry>,
    pub counts: EntryCounts,
    pub history: Vec<StatusChange>,
    /// Entries or history hit the report cap; counts cover the capped rows.
    pub truncated: bool,
}
