//! Production Order Ledger: numbered customer work orders.

mod ledger;
pub(crate) mod sqlite_store;
mod store;
mod types;

pub use ledger::ProductionLedger;
pub use store::{OrderFilter, OrderStore};
pub use types::{DraftAllocation, OrderFields, OrderState, ProductionOrder, TicketDraft};
