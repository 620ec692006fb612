//! Warehouse movement ledger records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of stock-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Goods received into stock
    Entry,
    /// Goods leaving stock (dispatch, loan departure)
    Exit,
    /// Write-off recorded against stock (loss or damage)
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
            MovementKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(MovementKind::Entry),
            "exit" => Some(MovementKind::Exit),
            "adjustment" => Some(MovementKind::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable audit record of one stock-affecting event.
///
/// Movements are append-only: they are written in the same transaction as
/// the lot change they document and are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub id: Uuid,
    /// Insertion sequence; breaks timestamp ties during replay
    pub seq: i64,
    pub occurred_at: DateTime<Utc>,
    /// The user who performed the operation
    pub user_id: Uuid,
    pub kind: MovementKind,
    /// Always positive; the direction is implied by `kind`
    pub quantity: i64,
    /// Free-text reference ("Goods receipt - lot …", "Loan to …")
    pub reference: Option<String>,
    pub item_id: Option<Uuid>,
    /// Unit cost snapshot at the time of the event
    pub unit_cost: Option<Decimal>,
}
