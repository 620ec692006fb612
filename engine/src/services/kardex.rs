//! Kardex balance reconstruction
//!
//! Read-side only: fetches an item's movements in replay order and folds
//! them into a running balance and valuation trail. Never mutates state.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{replay, KardexRow};
use crate::services::ledger::LedgerService;

/// Kardex service
#[derive(Clone)]
pub struct KardexService {
    db: PgPool,
    ledger: LedgerService,
}

impl KardexService {
    /// Create a new KardexService instance
    pub fn new(db: PgPool) -> Self {
        Self {
            ledger: LedgerService::new(db.clone()),
            db,
        }
    }

    /// Replay an item's movement history into kardex rows.
    ///
    /// The result is deterministic and idempotent: the same ledger always
    /// produces the same rows, and the final balance can be audited
    /// against the live sum of the item's lot remainders.
    pub async fn replay_item(&self, item_id: Uuid) -> AppResult<Vec<KardexRow>> {
        let item_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(item_id)
                .fetch_one(&self.db)
                .await?;

        if !item_exists {
            return Err(AppError::ItemNotFound(item_id.to_string()));
        }

        let movements = self.ledger.for_item(item_id).await?;

        Ok(replay(&movements))
    }
}
