use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fleet::MachineRef;
use crate::quantity::Quantity;
use crate::winding::TicketDetails;

/// pending -> in_production -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    InProduction,
    Finished,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::InProduction => "in_production",
            OrderState::Finished => "finished",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderState::Pending),
            "in_production" => Ok(OrderState::InProduction),
            "finished" => Ok(OrderState::Finished),
            other => Err(format!("unknown order state: {}", other)),
        }
    }
}

/// What an operator submits to open an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    pub client: String,
    pub article: String,
    pub color: String,
    pub meters: Quantity,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub note: String,
}

/// A machine choice saved on an order before any ticket exists. The
/// quantity stays as typed; it is only parsed when a ticket is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAllocation {
    #[serde(flatten)]
    pub machine: MachineRef,
    #[serde(default)]
    pub quantity: String,
}

/// Work in progress on an order's future winding ticket, shared by every
/// operator looking at the order. Last writer wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    #[serde(flatten)]
    pub details: TicketDetails,
    #[serde(default)]
    pub allocations: Vec<DraftAllocation>,
    pub edited_by: String,
    pub edited_at: DateTime<Utc>,
}

/// A customer work order (OS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: String,
    pub number: u64,
    pub client: String,
    pub article: String,
    pub color: String,
    pub meters: Quantity,
    pub due_date: NaiveDate,
    pub note: String,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<TicketDraft>,
}
