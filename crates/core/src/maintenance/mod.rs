//! Maintenance Interlock: windows during which a machine is out of dispatch.

mod interlock;
mod sqlite_store;
mod store;
mod types;

pub use interlock::MaintenanceInterlock;
pub use store::{MaintenanceFilter, MaintenanceStore};
pub use types::{MaintenanceRecord, MaintenanceState};
