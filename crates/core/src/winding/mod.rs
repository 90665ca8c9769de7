//! Winding Ticket Engine.
//!
//! A ticket is launched from a production order (or standalone), split
//! across up to [`MAX_ALLOCATIONS`] machines while pending, walked through
//! its linear lifecycle and finally sent to the machines: one dispatch
//! entry per allocation, created in a single transaction.

mod engine;
mod sqlite_store;
mod store;
mod types;

pub use engine::WindingEngine;
pub use store::{FinalizeRecord, TicketSeed, WindingStore};
pub use types::{
    AllocationRequest, FinalizeOutcome, MachineAllocation, StandaloneTicket, TicketDetails,
    TicketFilter, TicketState, WindingTicket, MAX_ALLOCATIONS, MAX_LOAD_FRACTIONS,
};
