//! Kardex: chronological replay of an item's movement history
//!
//! The replay is a pure read-side derivation. It never mutates state and
//! produces identical rows for identical input, so it can be re-run at any
//! time to audit the live lot balances against the movement ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Movement, MovementKind};

/// One line of the kardex trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KardexRow {
    pub occurred_at: DateTime<Utc>,
    pub reference: Option<String>,
    /// Quantity entering stock, when the movement was an entry
    pub entry: Option<i64>,
    /// Quantity leaving stock (exits and adjustment write-offs)
    pub exit: Option<i64>,
    /// Running balance after this movement
    pub balance: i64,
    /// Unit cost snapshot carried on the movement, if any
    pub unit_cost: Option<Decimal>,
    /// Balance valued at the most recent known unit cost
    pub balance_value: Decimal,
}

/// Replay `movements` into a running balance and valuation trail.
///
/// Movements are ordered by `(occurred_at, seq)` regardless of input order.
/// Entries add to the balance; exits subtract. Adjustments also subtract:
/// the ledger uses them for write-offs (losses, damage), so the loss
/// convention applies throughout. Rows without a cost snapshot carry the
/// last known unit cost forward; before any cost is seen the balance is
/// valued at zero.
pub fn replay(movements: &[Movement]) -> Vec<KardexRow> {
    let mut ordered: Vec<&Movement> = movements.iter().collect();
    ordered.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| a.seq.cmp(&b.seq))
    });

    let mut balance: i64 = 0;
    let mut last_cost = Decimal::ZERO;
    let mut rows = Vec::with_capacity(ordered.len());

    for movement in ordered {
        let (entry, exit) = match movement.kind {
            MovementKind::Entry => {
                balance += movement.quantity;
                (Some(movement.quantity), None)
            }
            MovementKind::Exit | MovementKind::Adjustment => {
                balance -= movement.quantity;
                (None, Some(movement.quantity))
            }
        };

        if let Some(cost) = movement.unit_cost {
            last_cost = cost;
        }

        rows.push(KardexRow {
            occurred_at: movement.occurred_at,
            reference: movement.reference.clone(),
            entry,
            exit,
            balance,
            unit_cost: movement.unit_cost,
            balance_value: Decimal::from(balance) * last_cost,
        });
    }

    rows
}
