//! Winding ticket storage trait.

use crate::error::DispatchResult;

use super::{
    FinalizeOutcome, MachineAllocation, StandaloneTicket, TicketDetails, TicketFilter,
    TicketState, WindingTicket,
};

/// What a ticket launched from an order starts with besides the order's
/// own fields.
#[derive(Debug, Clone, Default)]
pub struct TicketSeed {
    pub details: TicketDetails,
    pub allocations: Vec<MachineAllocation>,
}

/// Result of a finalize as the store sees it.
#[derive(Debug, Clone)]
pub struct FinalizeRecord {
    pub outcome: FinalizeOutcome,
    /// The originating order moved to in_production during this call.
    pub order_marked: bool,
}

/// Storage for winding tickets.
///
/// State checks are repeated inside each transaction; the engine's own
/// checks only give earlier, friendlier errors.
pub trait WindingStore: Send + Sync {
    /// Create a pending ticket from an order and move the order to
    /// in_production, atomically. Returns whether the order changed.
    fn launch_from_order(
        &self,
        order_id: &str,
        seed: TicketSeed,
        created_by: &str,
    ) -> DispatchResult<(WindingTicket, bool)>;

    /// Create a pending ticket with a freshly drawn document number.
    fn launch_standalone(
        &self,
        input: &StandaloneTicket,
        created_by: &str,
    ) -> DispatchResult<WindingTicket>;

    fn get_ticket(&self, id: &str) -> DispatchResult<Option<WindingTicket>>;

    fn list_tickets(&self, filter: &TicketFilter) -> DispatchResult<Vec<WindingTicket>>;

    /// Overwrite the allocation list of a pending ticket.
    fn set_ticket_allocations(
        &self,
        id: &str,
        allocations: &[MachineAllocation],
    ) -> DispatchResult<WindingTicket>;

    /// One linear step. Returns the ticket and the state it left.
    fn advance_ticket(
        &self,
        id: &str,
        target: TicketState,
    ) -> DispatchResult<(WindingTicket, TicketState)>;

    /// Create one dispatch entry per allocation, finish the ticket and mark
    /// the order in production, all or nothing.
    fn finalize_ticket(
        &self,
        id: &str,
        finalized_by: &str,
        auto_start_idle: bool,
    ) -> DispatchResult<FinalizeRecord>;

    /// Finish an in-production ticket that has no allocations.
    fn finish_ticket_without_machines(&self, id: &str) -> DispatchResult<WindingTicket>;

    /// Remove a pending ticket. The originating order is left as is.
    fn delete_ticket(&self, id: &str) -> DispatchResult<WindingTicket>;
}
