//! Read-only fan-in views for the reporting collaborator.
//!
//! Nothing here mutates plant state.

mod service;
mod types;

pub use service::Reports;
pub use types::{EntryCounts, LayoutReport, ReportRows, TicketProduction};
