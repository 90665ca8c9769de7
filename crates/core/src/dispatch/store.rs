//! Dispatch entry storage trait and filter.

use crate::error::DispatchResult;
use crate::fleet::LayoutFamily;

use super::{DispatchEntry, EntryState, NewEntry};

/// Filter for querying dispatch entries. Results are always oldest first.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub machine_id: Option<String>,
    pub layout: Option<LayoutFamily>,
    /// Empty means any state.
    pub states: Vec<EntryState>,
    pub ticket_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    /// Pending and active entries: the machine's live queue.
    pub fn open() -> Self {
        Self::new().with_states([EntryState::Pending, EntryState::Active])
    }

    pub fn with_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutFamily) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_state(mut self, state: EntryState) -> Self {
        self.states = vec![state];
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = EntryState>) -> Self {
        self.states = states.into_iter().collect();
        self
    }

    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
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

/// Storage for dispatch entries.
///
/// Every write also records the machine's status change (if any) and bumps
/// the machine revision in the same transaction.
pub trait DispatchStore: Send + Sync {
    /// Append an entry to its machine's queue.
    fn insert_entry(&self, entry: NewEntry) -> DispatchResult<DispatchEntry>;

    fn get_entry(&self, id: &str) -> DispatchResult<Option<DispatchEntry>>;

    fn list_entries(&self, filter: &EntryFilter) -> DispatchResult<Vec<DispatchEntry>>;

    fn count_entries(&self, filter: &EntryFilter) -> DispatchResult<i64>;

    /// pending -> active. Fails `NotFound` if the entry is not pending and
    /// `Conflict` if the machine already has an active entry.
    fn start_entry(&self, id: &str, started_by: &str) -> DispatchResult<DispatchEntry>;

    /// active -> finished. Fails `Conflict` if the entry is not active.
    fn finish_entry(
        &self,
        id: &str,
        release_note: Option<String>,
        final_report: String,
        finished_by: &str,
    ) -> DispatchResult<DispatchEntry>;
}
