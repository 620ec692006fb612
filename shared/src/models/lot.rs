//! Inventory lots and FIFO allocation
//!
//! A lot is one discrete receipt of stock with its own remaining-quantity
//! counter and unit cost. Withdrawals deplete lots oldest receipt first;
//! ties on the receipt timestamp fall back to the lot's insertion sequence
//! so the consumption order is total and deterministic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One discrete receipt of stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    /// Insertion sequence assigned by storage; FIFO tie-break
    pub seq: i64,
    pub item_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub location_id: Uuid,
    pub branch_id: Uuid,
    /// Quantity received when the lot was created; immutable
    pub quantity_received: i64,
    /// Quantity still on hand; only the allocation step decrements it
    pub quantity_remaining: i64,
    pub unit_cost: Decimal,
    pub received_at: DateTime<Utc>,
}

impl Lot {
    /// A fully consumed lot is retained for audit, never deleted
    pub fn is_depleted(&self) -> bool {
        self.quantity_remaining == 0
    }
}

/// Quantity taken from a single lot by one allocation.
///
/// Carries the lot's unit cost so callers can attribute cost per lot
/// instead of falling back to the item's average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotTake {
    pub lot_id: Uuid,
    pub quantity: i64,
    pub unit_cost: Decimal,
}

/// Failure modes of the allocation planner
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    #[error("quantity must be greater than zero")]
    InvalidQuantity,

    #[error("insufficient stock: requested {requested}, available {available}")]
    Insufficient { available: i64, requested: i64 },
}

/// Plan a FIFO withdrawal of `requested` units across `lots`.
///
/// Lots with no remaining quantity are skipped; the rest are consumed in
/// ascending `(received_at, seq)` order. The plan is all-or-nothing: if the
/// total available falls short, no partial plan is produced and the error
/// carries both sides of the shortfall.
///
/// Planning is side-effect free. The storage layer applies the returned
/// takes to the lot rows inside the same transaction that records the
/// corresponding movement.
pub fn plan_fifo(lots: &[Lot], requested: i64) -> Result<Vec<LotTake>, AllocationError> {
    if requested <= 0 {
        return Err(AllocationError::InvalidQuantity);
    }

    let mut open: Vec<&Lot> = lots.iter().filter(|l| l.quantity_remaining > 0).collect();
    open.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then_with(|| a.seq.cmp(&b.seq))
    });

    let available: i64 = open.iter().map(|l| l.quantity_remaining).sum();
    if available < requested {
        return Err(AllocationError::Insufficient {
            available,
            requested,
        });
    }

    let mut takes = Vec::new();
    let mut pending = requested;

    for lot in open {
        if pending == 0 {
            break;
        }

        let take = lot.quantity_remaining.min(pending);
        takes.push(LotTake {
            lot_id: lot.id,
            quantity: take,
            unit_cost: lot.unit_cost,
        });
        pending -= take;
    }

    Ok(takes)
}
