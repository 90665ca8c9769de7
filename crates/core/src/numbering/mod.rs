//! Numbering Service: the process-wide document number series.
//!
//! Production orders and standalone winding tickets draw from the same
//! series. Numbers are persisted in the `counters` table, so a restart
//! resumes after the highest number issued. A draw happens inside the
//! caller's transaction: if the surrounding write fails, the counter is
//! not advanced.

mod service;
pub(crate) mod sqlite_store;

pub use service::NumberingService;
pub(crate) use sqlite_store::draw_number;

use crate::error::DispatchResult;

/// Counter name of the document series.
pub const DOCUMENT_SERIES: &str = "document_number";

/// Used when the series is drawn before it was ever seeded.
pub const DEFAULT_START_AFTER: u64 = 1000;

pub trait NumberingStore: Send + Sync {
    /// Create the series at `start_after` unless it already exists.
    /// Returns true when the series was created.
    fn seed_series(&self, series: &str, start_after: u64) -> DispatchResult<bool>;

    /// Issue the next number of the series.
    fn next_number(&self, series: &str) -> DispatchResult<u64>;

    /// Highest number issued so far (the seed value if none was issued).
    fn current_number(&self, series: &str) -> DispatchResult<Option<u64>>;
}
