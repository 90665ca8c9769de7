//! Machine storage trait.

use crate::error::DispatchResult;

use super::{LayoutFamily, Machine, NewMachine};

pub trait MachineStore: Send + Sync {
    /// Insert the fleet. Existing machines are left untouched.
    fn provision_machines(&self, machines: &[NewMachine]) -> DispatchResult<usize>;

    fn count_machines(&self) -> DispatchResult<i64>;

    /// A machine with its status derived from current queue and
    /// maintenance state.
    fn get_machine(&self, id: &str) -> DispatchResult<Option<Machine>>;

    /// Machines with the given code (case-insensitive), optionally limited
    /// to one layout.
    fn find_machines_by_code(
        &self,
        code: &str,
        layout: Option<LayoutFamily>,
    ) -> DispatchResult<Vec<Machine>>;

    /// Machines in floor-plan order; all layouts when `layout` is `None`.
    fn list_machines(&self, layout: Option<LayoutFamily>) -> DispatchResult<Vec<Machine>>;

    /// Toggle the active flag, recording the status change.
    fn set_machine_active(
        &self,
        id: &str,
        active: bool,
        changed_by: &str,
    ) -> DispatchResult<Machine>;
}
