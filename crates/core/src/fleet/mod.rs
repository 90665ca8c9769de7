//! Machine Registry: the fixed fleet of the two floor layouts.

mod catalog;
mod registry;
pub(crate) mod sqlite_store;
mod store;
mod types;

pub use catalog::{builtin_layout_a, builtin_layout_b, FleetCatalog};
pub use registry::{MachineRegistry, MachineRef};
pub use store::MachineStore;
pub use types::{machine_id, LayoutFamily, Machine, MachineListing, NewMachine};
