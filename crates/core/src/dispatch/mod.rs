//! Machine Dispatch Queue: per-machine work queues and status derivation.

mod queue;
pub(crate) mod sqlite_store;
mod status;
mod store;
mod types;

pub use queue::DispatchQueue;
pub(crate) use sqlite_store::insert_entry_tx;
pub use status::{derive_status, MachineStatus, StatusInputs};
pub use store::{DispatchStore, EntryFilter};
pub use types::{DispatchEntry, EntryFields, EntryState, NewEntry};
