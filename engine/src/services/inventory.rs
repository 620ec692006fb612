//! Stock receiving, FIFO consumption, and stock queries
//!
//! The inventory service owns the lot store. Lots are created by goods
//! receipts (and by good-condition loan returns) and decremented only by
//! [`InventoryService::consume_fifo`]. Both sides always run inside a
//! transaction that also appends the movement documenting the change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{plan_fifo, Item, Lot, LotTake, MovementKind};
use crate::services::ledger::{LedgerService, NewMovement};
use shared::validation::{validate_quantity, validate_unit_cost};

/// Inventory service for lot creation and FIFO stock consumption
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

/// Input for receiving goods into a new lot
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveLot {
    pub item_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub location_id: Uuid,
    pub branch_id: Uuid,
    pub quantity: i64,
    pub unit_cost: Decimal,
    /// Audit reference; defaults to a goods-receipt note with the lot id
    pub reference: Option<String>,
}

/// One line of a dispatch requisition
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchItem {
    pub item_id: Uuid,
    pub quantity: i64,
}

/// Input for dispatching stock out of the warehouse
#[derive(Debug, Clone, Deserialize)]
pub struct Dispatch {
    pub items: Vec<DispatchItem>,
    pub branch_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub reference: Option<String>,
}

/// One processed dispatch line with its per-lot cost attribution
#[derive(Debug, Clone, Serialize)]
pub struct DispatchLine {
    pub item_id: Uuid,
    pub quantity: i64,
    pub consumed: Vec<LotTake>,
    pub movement_id: Uuid,
}

/// Stock on hand for one item at one branch
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockOnHand {
    pub item_id: Uuid,
    pub sku: String,
    pub item_name: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub on_hand: i64,
}

/// Item whose on-hand total fell below its configured minimum
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LowStockItem {
    pub item_id: Uuid,
    pub sku: String,
    pub item_name: String,
    pub min_stock: i64,
    pub on_hand: i64,
}

/// Row for lot queries
#[derive(Debug, FromRow)]
struct LotRow {
    id: Uuid,
    seq: i64,
    item_id: Uuid,
    supplier_id: Option<Uuid>,
    location_id: Uuid,
    branch_id: Uuid,
    quantity_received: i64,
    quantity_remaining: i64,
    unit_cost: Decimal,
    received_at: DateTime<Utc>,
}

/// Row for item lookups
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    sku: String,
    name: String,
    min_stock: i64,
    sale_price: Decimal,
    average_cost: Decimal,
    is_loanable: bool,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            sku: row.sku,
            name: row.name,
            min_stock: row.min_stock,
            sale_price: row.sale_price,
            average_cost: row.average_cost,
            is_loanable: row.is_loanable,
        }
    }
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Lot {
            id: row.id,
            seq: row.seq,
            item_id: row.item_id,
            supplier_id: row.supplier_id,
            location_id: row.location_id,
            branch_id: row.branch_id,
            quantity_received: row.quantity_received,
            quantity_remaining: row.quantity_remaining,
            unit_cost: row.unit_cost,
            received_at: row.received_at,
        }
    }
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive goods: create a lot and its entry movement in one
    /// transaction
    pub async fn receive_lot(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        input: ReceiveLot,
    ) -> AppResult<Lot> {
        validate_quantity(input.quantity).map_err(|_| AppError::InvalidQuantity)?;
        validate_unit_cost(input.unit_cost)
            .map_err(|msg| AppError::Validation(msg.to_string()))?;

        let mut tx = self.db.begin().await?;

        let item_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(input.item_id)
                .fetch_one(&mut *tx)
                .await?;

        if !item_exists {
            return Err(AppError::ItemNotFound(input.item_id.to_string()));
        }

        let lot: Lot = sqlx::query_as::<_, LotRow>(
            r#"
            INSERT INTO lots (item_id, supplier_id, location_id, branch_id,
                              quantity_received, quantity_remaining, unit_cost, received_at)
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7)
            RETURNING id, seq, item_id, supplier_id, location_id, branch_id,
                      quantity_received, quantity_remaining, unit_cost, received_at
            "#,
        )
        .bind(input.item_id)
        .bind(input.supplier_id)
        .bind(input.location_id)
        .bind(input.branch_id)
        .bind(input.quantity)
        .bind(input.unit_cost)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .into();

        let reference = input
            .reference
            .unwrap_or_else(|| format!("Goods receipt - lot {}", lot.id));

        LedgerService::append(
            &mut tx,
            NewMovement {
                occurred_at: now,
                user_id: actor_id,
                kind: MovementKind::Entry,
                quantity: input.quantity,
                reference: Some(reference),
                item_id: Some(input.item_id),
                unit_cost: Some(input.unit_cost),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lot = %lot.id, item = %lot.item_id, quantity = lot.quantity_received, "goods received");

        Ok(lot)
    }

    /// Consume `quantity` units of an item, oldest lots first.
    ///
    /// Runs inside the caller's transaction so the decrement commits or
    /// rolls back together with the movement that documents it. The
    /// matching lot rows are locked (`FOR UPDATE`) before the availability
    /// check, which serializes concurrent consumers of the same item and
    /// keeps the check-then-decrement sequence race free; other items
    /// touch disjoint rows and do not contend.
    ///
    /// Returns the per-lot takes, each carrying the lot's unit cost, so
    /// callers can attribute cost at lot granularity. No movement is
    /// written here; that is the caller's responsibility within the same
    /// transaction.
    pub async fn consume_fifo(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        quantity: i64,
        branch_id: Option<Uuid>,
        location_id: Option<Uuid>,
    ) -> AppResult<Vec<LotTake>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, seq, item_id, supplier_id, location_id, branch_id,
                   quantity_received, quantity_remaining, unit_cost, received_at
            FROM lots
            WHERE item_id = $1
              AND quantity_remaining > 0
              AND ($2::uuid IS NULL OR branch_id = $2)
              AND ($3::uuid IS NULL OR location_id = $3)
            ORDER BY received_at, seq
            FOR UPDATE
            "#,
        )
        .bind(item_id)
        .bind(branch_id)
        .bind(location_id)
        .fetch_all(&mut **tx)
        .await?;

        let lots: Vec<Lot> = rows.into_iter().map(Lot::from).collect();
        let takes = plan_fifo(&lots, quantity)?;

        for take in &takes {
            sqlx::query("UPDATE lots SET quantity_remaining = quantity_remaining - $1 WHERE id = $2")
                .bind(take.quantity)
                .bind(take.lot_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(takes)
    }

    /// Dispatch stock out of the warehouse (a requisition).
    ///
    /// All lines run in one transaction; a failure on any line rolls the
    /// whole requisition back. Each line consumes FIFO and appends an exit
    /// movement valued at the item's average cost.
    pub async fn dispatch(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        input: Dispatch,
    ) -> AppResult<Vec<DispatchLine>> {
        if input.items.is_empty() {
            return Err(AppError::Validation(
                "Dispatch requires at least one item".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let mut lines = Vec::with_capacity(input.items.len());

        for line in &input.items {
            let (item_name, average_cost) = sqlx::query_as::<_, (String, Decimal)>(
                "SELECT name, average_cost FROM items WHERE id = $1",
            )
            .bind(line.item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::ItemNotFound(line.item_id.to_string()))?;

            let consumed = self
                .consume_fifo(&mut tx, line.item_id, line.quantity, input.branch_id, input.location_id)
                .await?;

            let reference = match &input.reference {
                Some(text) => format!("{} - {}", text, item_name),
                None => format!("Requisition - {}", item_name),
            };

            let movement = LedgerService::append(
                &mut tx,
                NewMovement {
                    occurred_at: now,
                    user_id: actor_id,
                    kind: MovementKind::Exit,
                    quantity: line.quantity,
                    reference: Some(reference),
                    item_id: Some(line.item_id),
                    unit_cost: Some(average_cost),
                },
            )
            .await?;

            lines.push(DispatchLine {
                item_id: line.item_id,
                quantity: line.quantity,
                consumed,
                movement_id: movement.id,
            });
        }

        tx.commit().await?;

        tracing::info!(actor = %actor_id, lines = lines.len(), "requisition dispatched");

        Ok(lines)
    }

    /// Item master record, as the core reads it (identity, costs, the
    /// loanable flag)
    pub async fn get_item(&self, item_id: Uuid) -> AppResult<Item> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, sku, name, min_stock, sale_price, average_cost, is_loanable
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::ItemNotFound(item_id.to_string()))?;

        Ok(row.into())
    }

    /// Total units on hand for an item, optionally scoped to a branch
    pub async fn available_stock(&self, item_id: Uuid, branch_id: Option<Uuid>) -> AppResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(quantity_remaining), 0)::BIGINT
            FROM lots
            WHERE item_id = $1
              AND ($2::uuid IS NULL OR branch_id = $2)
            "#,
        )
        .bind(item_id)
        .bind(branch_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total)
    }

    /// All lots for an item in FIFO order, depleted ones included
    pub async fn lots_for_item(&self, item_id: Uuid) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, seq, item_id, supplier_id, location_id, branch_id,
                   quantity_received, quantity_remaining, unit_cost, received_at
            FROM lots
            WHERE item_id = $1
            ORDER BY received_at, seq
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Lot::from).collect())
    }

    /// Stock grouped per item and branch, only positive balances
    pub async fn stock_on_hand(&self, branch_id: Option<Uuid>) -> AppResult<Vec<StockOnHand>> {
        let rows = sqlx::query_as::<_, StockOnHand>(
            r#"
            SELECT l.item_id, i.sku, i.name AS item_name,
                   l.branch_id, b.name AS branch_name,
                   SUM(l.quantity_remaining)::BIGINT AS on_hand
            FROM lots l
            JOIN items i ON i.id = l.item_id
            JOIN branches b ON b.id = l.branch_id
            WHERE l.quantity_remaining > 0
              AND ($1::uuid IS NULL OR l.branch_id = $1)
            GROUP BY l.item_id, i.sku, i.name, l.branch_id, b.name
            ORDER BY i.name, b.name
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Items whose on-hand total is below their minimum-stock threshold
    pub async fn low_stock_items(&self) -> AppResult<Vec<LowStockItem>> {
        let rows = sqlx::query_as::<_, LowStockItem>(
            r#"
            SELECT i.id AS item_id, i.sku, i.name AS item_name, i.min_stock,
                   COALESCE(SUM(l.quantity_remaining), 0)::BIGINT AS on_hand
            FROM items i
            LEFT JOIN lots l ON l.item_id = i.id
            GROUP BY i.id, i.sku, i.name, i.min_stock
            HAVING COALESCE(SUM(l.quantity_remaining), 0) < i.min_stock
            ORDER BY i.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Total value of the stock on hand (remaining quantity times the
    /// lot's unit cost)
    pub async fn total_inventory_value(&self) -> AppResult<Decimal> {
        let value = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(quantity_remaining * unit_cost), 0) FROM lots",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(value)
    }
}
