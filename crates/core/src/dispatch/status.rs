//! Machine status derivation.
//!
//! Status is never stored. It is a pure function of the machine's active
//! flag, whether it has an open maintenance record, and its queue contents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Derived machine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Free,
    Queued,
    InProduction,
    Maintenance,
    Disabled,
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 5] = [
        MachineStatus::Free,
        MachineStatus::Queued,
        MachineStatus::InProduction,
        MachineStatus::Maintenance,
        MachineStatus::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Free => "free",
            MachineStatus::Queued => "queued",
            MachineStatus::InProduction => "in_production",
            MachineStatus::Maintenance => "maintenance",
            MachineStatus::Disabled => "disabled",
        }
    }

    /// Whether new dispatch entries may be appended to the machine's queue.
    /// Only disabled and maintenance machines refuse work; a machine in
    /// production accepts entries queued behind the active one.
    pub fn accepts_entries(&self) -> bool {
        !matches!(self, MachineStatus::Disabled | MachineStatus::Maintenance)
    }

    /// Whether a pending entry may be started on the machine.
    pub fn can_start_entries(&self) -> bool {
        self.accepts_entries()
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown machine status: {}", s))
    }
}

/// The inputs status is derived from: the active flag, an open
/// maintenance window, and the unfinished queue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub active: bool,
    pub open_maintenance: bool,
    pub active_entries: u32,
    pub pending_entries: u32,
}

/// Derive status in strict precedence order:
/// disabled > maintenance > in_production > queued > free.
pub fn derive_status(inputs: &StatusInputs) -> MachineStatus {
    if !inputs.active {
        MachineStatus::Disabled
    } else if inputs.open_maintenance {
        MachineStatus::Maintenance
    } else if inputs.active_entries > 0 {
        MachineStatus::InProduction
    } else if inputs.pending_entries > 0 {
        MachineStatus::Queued
    } else {
        MachineStatus::Free
    }
}
