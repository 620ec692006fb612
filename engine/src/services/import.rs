//! Bulk stock import
//!
//! The import pipeline parses and pre-validates spreadsheet rows
//! elsewhere; this service takes the validated rows and feeds each one
//! through the same receive-lot transaction as manual receiving. Rows
//! commit independently: a bad row is reported in the batch result and
//! never rolls back rows that already landed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::inventory::{InventoryService, ReceiveLot};

/// Import service
#[derive(Clone)]
pub struct ImportService {
    db: PgPool,
    inventory: InventoryService,
}

/// One validated import row
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ImportRow {
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    #[validate(length(min = 1, max = 20))]
    pub location_code: String,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub supplier_id: Option<Uuid>,
}

/// Failure of a single row, reported without aborting the batch
#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub row_index: usize,
    pub error: String,
}

/// Outcome of one import batch
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub received: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportService {
    /// Create a new ImportService instance
    pub fn new(db: PgPool) -> Self {
        Self {
            inventory: InventoryService::new(db.clone()),
            db,
        }
    }

    /// Import rows into `branch_id`, one transaction per row.
    ///
    /// Business-rule failures (unknown SKU or location, bad quantity) are
    /// collected per row; an infrastructure failure aborts the batch
    /// since every remaining row would fail the same way.
    pub async fn import(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        branch_id: Uuid,
        rows: Vec<ImportRow>,
    ) -> AppResult<ImportReport> {
        let mut received = 0;
        let mut failures = Vec::new();

        for (row_index, row) in rows.into_iter().enumerate() {
            match self.import_row(actor_id, now, branch_id, &row).await {
                Ok(()) => received += 1,
                Err(AppError::Storage(err)) => return Err(AppError::Storage(err)),
                Err(err) => failures.push(ImportFailure {
                    row_index,
                    error: err.to_string(),
                }),
            }
        }

        tracing::info!(received, failed = failures.len(), "import batch finished");

        Ok(ImportReport { received, failures })
    }

    async fn import_row(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        branch_id: Uuid,
        row: &ImportRow,
    ) -> AppResult<()> {
        row.validate()?;
        shared::validation::validate_sku(&row.sku)
            .map_err(|msg| AppError::Validation(msg.to_string()))?;

        let item_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM items WHERE sku = $1")
            .bind(&row.sku)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::ItemNotFound(row.sku.clone()))?;

        let location_id =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM locations WHERE code = $1")
                .bind(&row.location_code)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("location {}", row.location_code)))?;

        self.inventory
            .receive_lot(
                actor_id,
                now,
                ReceiveLot {
                    item_id,
                    supplier_id: row.supplier_id,
                    location_id,
                    branch_id,
                    quantity: row.quantity,
                    unit_cost: row.unit_cost,
                    reference: Some(format!("Bulk import - {}", row.sku)),
                },
            )
            .await?;

        Ok(())
    }
}
