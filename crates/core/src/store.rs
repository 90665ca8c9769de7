//! The persistence collaborator as a single trait object.

use crate::dispatch::DispatchStore;
use crate::fleet::MachineStore;
use crate::history::HistoryStore;
use crate::maintenance::MaintenanceStore;
use crate::numbering::NumberingStore;
use crate::production::OrderStore;
use crate::winding::WindingStore;

/// Every store the plant services need. Implemented by [`crate::SqliteStore`].
pub trait Store:
    MachineStore
    + MaintenanceStore
    + DispatchStore
    + OrderStore
    + WindingStore
    + HistoryStore
    + NumberingStore
{
}

impl<T> Store for T where
    T: MachineStore
        + MaintenanceStore
        + DispatchStore
        + OrderStore
        + WindingStore
        + HistoryStore
        + NumberingStore
{
}
