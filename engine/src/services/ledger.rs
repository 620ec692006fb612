//! Append-only movement ledger
//!
//! Every stock-affecting event is documented by exactly one movement,
//! written in the same transaction as the lot change it describes. The
//! ledger itself never validates lot state; it trusts its callers to have
//! performed the corresponding stock mutation in the same unit of work.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Movement, MovementKind};
use shared::types::DateRange;

/// Ledger service for appending and querying movements
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for appending one movement
#[derive(Debug, Clone, Deserialize)]
pub struct NewMovement {
    pub occurred_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference: Option<String>,
    pub item_id: Option<Uuid>,
    pub unit_cost: Option<Decimal>,
}

/// Filter for ledger queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<Uuid>,
    pub kind: Option<MovementKind>,
    pub range: Option<DateRange>,
}

/// Entry/exit quantity totals for one calendar month
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyFlow {
    pub year: i32,
    pub month: i32,
    pub entries: i64,
    pub exits: i64,
}

/// Row for movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    seq: i64,
    occurred_at: DateTime<Utc>,
    user_id: Uuid,
    kind: String,
    quantity: i64,
    reference: Option<String>,
    item_id: Option<Uuid>,
    unit_cost: Option<Decimal>,
}

impl MovementRow {
    fn into_movement(self) -> AppResult<Movement> {
        let kind = MovementKind::parse(&self.kind)
            .ok_or_else(|| AppError::Internal(anyhow!("unknown movement kind '{}'", self.kind)))?;

        Ok(Movement {
            id: self.id,
            seq: self.seq,
            occurred_at: self.occurred_at,
            user_id: self.user_id,
            kind,
            quantity: self.quantity,
            reference: self.reference,
            item_id: self.item_id,
            unit_cost: self.unit_cost,
        })
    }
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append one movement inside the caller's transaction.
    ///
    /// The assigned insertion sequence (`seq`) breaks timestamp ties and
    /// gives the replay a deterministic total order.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        movement: NewMovement,
    ) -> AppResult<Movement> {
        shared::validation::validate_quantity(movement.quantity)
            .map_err(|_| AppError::InvalidQuantity)?;

        let row = sqlx::query_as::<_, MovementRow>(
            r#"
            INSERT INTO movements (occurred_at, user_id, kind, quantity, reference, item_id, unit_cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, seq, occurred_at, user_id, kind, quantity, reference, item_id, unit_cost
            "#,
        )
        .bind(movement.occurred_at)
        .bind(movement.user_id)
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(&movement.reference)
        .bind(movement.item_id)
        .bind(movement.unit_cost)
        .fetch_one(&mut **tx)
        .await?;

        row.into_movement()
    }

    /// Record a standalone movement (e.g., a manual loss adjustment) in its
    /// own transaction
    pub async fn record(&self, movement: NewMovement) -> AppResult<Movement> {
        let mut tx = self.db.begin().await?;
        let stored = Self::append(&mut tx, movement).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// List movements matching `filter`, newest first
    pub async fn list(&self, filter: MovementFilter) -> AppResult<Vec<Movement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, seq, occurred_at, user_id, kind, quantity, reference, item_id, unit_cost
            FROM movements
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::timestamptz IS NULL OR occurred_at >= $3)
              AND ($4::timestamptz IS NULL OR occurred_at <= $4)
            ORDER BY occurred_at DESC, seq DESC
            "#,
        )
        .bind(filter.item_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.range.map(|r| r.start))
        .bind(filter.range.map(|r| r.end))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    /// Movements for one item in replay order (oldest first, insertion
    /// sequence breaking ties)
    pub async fn for_item(&self, item_id: Uuid) -> AppResult<Vec<Movement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, seq, occurred_at, user_id, kind, quantity, reference, item_id, unit_cost
            FROM movements
            WHERE item_id = $1
            ORDER BY occurred_at, seq
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    /// Entry/exit quantity totals per calendar month since `since`
    pub async fn monthly_flow(&self, since: DateTime<Utc>) -> AppResult<Vec<MonthlyFlow>> {
        let rows = sqlx::query_as::<_, MonthlyFlow>(
            r#"
            SELECT EXTRACT(YEAR FROM occurred_at)::INT4 AS year,
                   EXTRACT(MONTH FROM occurred_at)::INT4 AS month,
                   COALESCE(SUM(quantity) FILTER (WHERE kind = 'entry'), 0)::BIGINT AS entries,
                   COALESCE(SUM(quantity) FILTER (WHERE kind = 'exit'), 0)::BIGINT AS exits
            FROM movements
            WHERE occurred_at >= $1
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}
