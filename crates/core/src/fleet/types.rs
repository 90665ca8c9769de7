//! Machine and fleet layout types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::MachineStatus;

/// The two physical floor layouts. Layout A houses the 16-spindle
/// machines, layout B the 32-spindle ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutFamily {
    #[serde(alias = "A", alias = "16_fusos")]
    A,
    #[serde(alias = "B", alias = "32_fusos")]
    B,
}

impl LayoutFamily {
    pub const ALL: [LayoutFamily; 2] = [LayoutFamily::A, LayoutFamily::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutFamily::A => "a",
            LayoutFamily::B => "b",
        }
    }

    pub fn spindles(&self) -> u32 {
        match self {
            LayoutFamily::A => 16,
            LayoutFamily::B => 32,
        }
    }
}

impl fmt::Display for LayoutFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "a" | "A" | "16_fusos" => Ok(LayoutFamily::A),
            "b" | "B" | "32_fusos" => Ok(LayoutFamily::B),
            other => Err(format!("unknown layout family: {}", other)),
        }
    }
}

/// Deterministic machine id, e.g. `a-CD1`.
pub fn machine_id(layout: LayoutFamily, code: &str) -> String {
    format!("{}-{}", layout.as_str(), code)
}

/// A physical machine with its derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub code: String,
    pub layout: LayoutFamily,
    /// Ordinal within the layout's floor plan.
    pub position: u32,
    pub active: bool,
    pub status: MachineStatus,
    /// Bumped on every change that touches this machine.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

/// A machine to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMachine {
    pub layout: LayoutFamily,
    pub code: String,
    pub position: u32,
}

impl NewMachine {
    pub fn id(&self) -> String {
        machine_id(self.layout, &self.code)
    }
}

/// Machines of one layout plus a version that grows whenever any of them
/// changes, so pollers can detect staleness.
#[derive(Debug, Clone, Serialize)]
pub struct MachineListing {
    /// `None` when the listing covers the whole fleet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutFamily>,
    pub version: i64,
    pub machines: Vec<Machine>,
}
