//! Machine dispatch core for a textile production floor.
//!
//! Machines, their queues and maintenance windows, production orders and
//! the winding tickets that fan an order out across up to five machines.
//! [`Plant`] is the entry point; every component is reached through it.

pub mod audit;
pub mod auth;
pub mod config;
mod db;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod history;
mod locks;
pub mod maintenance;
pub mod metrics;
pub mod numbering;
mod plant;
pub mod production;
pub mod quantity;
pub mod reports;
mod store;
pub mod winding;

pub use audit::{
    create_audit_system, AuditEvent, AuditFilter, AuditHandle, AuditRecord, AuditStore,
    SqliteAuditStore, SubjectKind,
};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Caller, Identity,
    NoneAuthenticator, Permission, Role, TokenAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use db::SqliteStore;
pub use dispatch::{DispatchEntry, EntryFields, EntryFilter, EntryState, MachineStatus};
pub use error::{DispatchError, DispatchResult};
pub use fleet::{FleetCatalog, LayoutFamily, Machine, MachineListing, MachineRef};
pub use maintenance::{MaintenanceFilter, MaintenanceRecord, MaintenanceState};
pub use plant::{Plant, PlantOptions};
pub use production::{OrderFields, OrderFilter, OrderState, ProductionOrder};
pub use quantity::Quantity;
pub use store::Store;
pub use winding::{
    AllocationRequest, FinalizeOutcome, StandaloneTicket, TicketDetails, TicketFilter,
    TicketState, WindingTicket,
};
