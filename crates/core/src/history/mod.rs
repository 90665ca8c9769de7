//! Machine status history, written alongside every machine mutation.

mod sqlite_store;
mod types;

pub(crate) use sqlite_store::touch_machine;
pub use types::{ChangeCause, HistoryFilter, StatusChange};

use crate::error::DispatchResult;

/// Read access to recorded status changes, newest first.
pub trait HistoryStore: Send + Sync {
    fn list_history(&self, filter: &HistoryFilter) -> DispatchResult<Vec<StatusChange>>;
}
