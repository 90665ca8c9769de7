//! HTTP surface for the dispatch core: routing, auth middleware, handlers
//! and Prometheus exposition.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
