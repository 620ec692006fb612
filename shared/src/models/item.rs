//! Item master data

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product or fixed asset tracked by the warehouse.
///
/// Owned by the master-data side of the system; the stock core only reads
/// item identity and cost/price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Unique stock keeping unit (e.g., "PROD-001")
    pub sku: String,
    pub name: String,
    /// Threshold below which the item is reported as low on stock
    pub min_stock: i64,
    pub sale_price: Decimal,
    /// Weighted-average unit cost maintained on the item record
    pub average_cost: Decimal,
    /// Marks the item as a loanable fixed asset (tools, laptops, equipment)
    pub is_loanable: bool,
}

impl Item {
    /// Whether the given on-hand total has fallen below the minimum
    pub fn is_below_min(&self, on_hand: i64) -> bool {
        on_hand < self.min_stock
    }
}
