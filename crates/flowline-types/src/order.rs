//! Demo order entity mutated by registered actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of the demo order: pending -> validated -> charged -> shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Validated,
    Charged,
    Shipped,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Validated => "validated",
            OrderStatus::Charged => "charged",
            OrderStatus::Shipped => "shipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "validated" => Some(OrderStatus::Validated),
            "charged" => Some(OrderStatus::Charged),
            "shipped" => Some(OrderStatus::Shipped),
            _ => None,
        }
    }
}

/// An order mutated by action functions inside the step-completion
/// transaction. Shared weakly by runs: a run only holds a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
