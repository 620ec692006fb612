//! Fixed-asset loan lifecycle
//!
//! A loan is a stock withdrawal with deferred return semantics: creating
//! one consumes stock FIFO and logs the exit, and each partial return
//! either replenishes stock with a fresh lot (good condition) or writes
//! the quantity off as a loss (damaged or lost). The Active -> Returned
//! transition itself lives in `shared::models::loan`; this service
//! persists its effects.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Loan, LoanError, LoanStatus, MovementKind, ReturnCondition};
use crate::services::inventory::InventoryService;
use crate::services::ledger::{LedgerService, NewMovement};

/// Loan service for lending stock and registering returns
#[derive(Clone)]
pub struct LoanService {
    db: PgPool,
    inventory: InventoryService,
    default_term_days: i64,
}

/// Input for creating a loan
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLoan {
    pub item_id: Uuid,
    /// Name of the person borrowing the goods
    #[validate(length(min = 1, max = 100))]
    pub requester: String,
    #[validate(length(max = 100))]
    pub department: Option<String>,
    pub quantity: i64,
    /// Expected-return deadline; defaults to the configured loan term
    pub due_at: Option<DateTime<Utc>>,
}

/// Input for registering a (possibly partial) return
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReturnLoan {
    pub quantity: i64,
    pub condition: ReturnCondition,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Loan list filters, matching the monitor views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanFilter {
    Active,
    Overdue,
    Returned,
    All,
}

/// Counts for the loan monitor
#[derive(Debug, Clone, Copy, Serialize, FromRow)]
pub struct LoanStats {
    pub active: i64,
    pub overdue: i64,
    pub returned: i64,
}

/// Row for loan queries
#[derive(Debug, FromRow)]
struct LoanRow {
    id: Uuid,
    item_id: Uuid,
    requester: String,
    department: Option<String>,
    quantity: i64,
    quantity_returned: i64,
    status: String,
    lent_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    comments: Option<String>,
    registered_by: Option<Uuid>,
}

impl LoanRow {
    fn into_loan(self) -> AppResult<Loan> {
        let status = LoanStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(anyhow!("unknown loan status '{}'", self.status)))?;

        Ok(Loan {
            id: self.id,
            item_id: self.item_id,
            requester: self.requester,
            department: self.department,
            quantity: self.quantity,
            quantity_returned: self.quantity_returned,
            status,
            lent_at: self.lent_at,
            due_at: self.due_at,
            returned_at: self.returned_at,
            comments: self.comments,
            registered_by: self.registered_by,
        })
    }
}

impl LoanService {
    /// Create a new LoanService instance.
    ///
    /// `default_term_days` is applied when a loan is created without an
    /// explicit deadline (see `LoanConfig`).
    pub fn new(db: PgPool, default_term_days: i64) -> Self {
        Self {
            inventory: InventoryService::new(db.clone()),
            db,
            default_term_days,
        }
    }

    /// Create a loan: consume the quantity FIFO, log the exit movement,
    /// and persist the loan as Active, all in one transaction
    pub async fn create(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        input: CreateLoan,
    ) -> AppResult<Loan> {
        input.validate()?;
        shared::validation::validate_quantity(input.quantity)
            .map_err(|_| AppError::InvalidQuantity)?;

        let due_at = input
            .due_at
            .unwrap_or_else(|| now + Duration::days(self.default_term_days));

        let mut tx = self.db.begin().await?;

        let (item_name, average_cost) = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT name, average_cost FROM items WHERE id = $1",
        )
        .bind(input.item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::ItemNotFound(input.item_id.to_string()))?;

        // Loans draw from the whole warehouse; no branch scoping
        self.inventory
            .consume_fifo(&mut tx, input.item_id, input.quantity, None, None)
            .await?;

        LedgerService::append(
            &mut tx,
            NewMovement {
                occurred_at: now,
                user_id: actor_id,
                kind: MovementKind::Exit,
                quantity: input.quantity,
                reference: Some(format!("Loan to {} - {}", input.requester, item_name)),
                item_id: Some(input.item_id),
                unit_cost: Some(average_cost),
            },
        )
        .await?;

        let loan = sqlx::query_as::<_, LoanRow>(
            r#"
            INSERT INTO loans (item_id, requester, department, quantity, status,
                               lent_at, due_at, registered_by)
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7)
            RETURNING id, item_id, requester, department, quantity, quantity_returned,
                      status, lent_at, due_at, returned_at, comments, registered_by
            "#,
        )
        .bind(input.item_id)
        .bind(&input.requester)
        .bind(&input.department)
        .bind(input.quantity)
        .bind(now)
        .bind(due_at)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?
        .into_loan()?;

        tx.commit().await?;

        tracing::info!(loan = %loan.id, item = %loan.item_id, due = %loan.due_at, "loan registered");

        Ok(loan)
    }

    /// Register a partial or final return against a loan.
    ///
    /// Good-condition quantity goes back on the shelf as a fresh lot at
    /// the item's current average cost; damaged or lost quantity is
    /// written off with an adjustment movement and never replenished.
    pub async fn return_partial(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
        loan_id: Uuid,
        input: ReturnLoan,
    ) -> AppResult<Loan> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        // Lock the loan row so concurrent returns serialize
        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT id, item_id, requester, department, quantity, quantity_returned,
                   status, lent_at, due_at, returned_at, comments, registered_by
            FROM loans
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::LoanNotFound(loan_id))?;

        let mut loan = row.into_loan()?;

        let outcome = loan
            .register_return(input.quantity, input.condition, input.notes.as_deref(), now)
            .map_err(|err| match err {
                LoanError::InvalidQuantity => AppError::InvalidQuantity,
                LoanError::AlreadyClosed => AppError::LoanAlreadyClosed(loan_id),
                LoanError::OverReturn {
                    requested,
                    outstanding,
                } => AppError::OverReturn {
                    requested,
                    outstanding,
                },
            })?;

        let average_cost =
            sqlx::query_scalar::<_, Decimal>("SELECT average_cost FROM items WHERE id = $1")
                .bind(loan.item_id)
                .fetch_one(&mut *tx)
                .await?;

        if outcome.replenish {
            let (location_id, branch_id) = Self::default_location_and_branch(&mut tx).await?;

            sqlx::query(
                r#"
                INSERT INTO lots (item_id, location_id, branch_id,
                                  quantity_received, quantity_remaining, unit_cost, received_at)
                VALUES ($1, $2, $3, $4, $4, $5, $6)
                "#,
            )
            .bind(loan.item_id)
            .bind(location_id)
            .bind(branch_id)
            .bind(input.quantity)
            .bind(average_cost)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            LedgerService::append(
                &mut tx,
                NewMovement {
                    occurred_at: now,
                    user_id: actor_id,
                    kind: MovementKind::Entry,
                    quantity: input.quantity,
                    reference: Some(format!("Loan {} return - {}", loan.id, loan.requester)),
                    item_id: Some(loan.item_id),
                    unit_cost: Some(average_cost),
                },
            )
            .await?;
        } else {
            LedgerService::append(
                &mut tx,
                NewMovement {
                    occurred_at: now,
                    user_id: actor_id,
                    kind: MovementKind::Adjustment,
                    quantity: input.quantity,
                    reference: Some(format!(
                        "Loss ({}) - loan {} return from {}",
                        input.condition.as_str(),
                        loan.id,
                        loan.requester
                    )),
                    item_id: Some(loan.item_id),
                    unit_cost: Some(average_cost),
                },
            )
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE loans
            SET quantity_returned = $1, status = $2, returned_at = $3, comments = $4
            WHERE id = $5
            "#,
        )
        .bind(loan.quantity_returned)
        .bind(loan.status.as_str())
        .bind(loan.returned_at)
        .bind(&loan.comments)
        .bind(loan.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan = %loan.id,
            returned = loan.quantity_returned,
            closed = outcome.closed,
            "loan return registered"
        );

        Ok(loan)
    }

    /// Fetch one loan
    pub async fn get(&self, loan_id: Uuid) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT id, item_id, requester, department, quantity, quantity_returned,
                   status, lent_at, due_at, returned_at, comments, registered_by
            FROM loans
            WHERE id = $1
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::LoanNotFound(loan_id))?
        .into_loan()
    }

    /// List loans for the monitor: active ones first, most urgent
    /// deadline first
    pub async fn list(&self, filter: LoanFilter, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT id, item_id, requester, department, quantity, quantity_returned,
                   status, lent_at, due_at, returned_at, comments, registered_by
            FROM loans
            WHERE CASE $1::text
                      WHEN 'active' THEN status = 'active'
                      WHEN 'overdue' THEN status = 'active' AND due_at < $2
                      WHEN 'returned' THEN status = 'returned'
                      ELSE TRUE
                  END
            ORDER BY (status = 'active') DESC, due_at
            "#,
        )
        .bind(match filter {
            LoanFilter::Active => "active",
            LoanFilter::Overdue => "overdue",
            LoanFilter::Returned => "returned",
            LoanFilter::All => "all",
        })
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(LoanRow::into_loan).collect()
    }

    /// Active/overdue/returned counts for the loan monitor
    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<LoanStats> {
        let stats = sqlx::query_as::<_, LoanStats>(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'active') AS active,
                   COUNT(*) FILTER (WHERE status = 'active' AND due_at < $1) AS overdue,
                   COUNT(*) FILTER (WHERE status = 'returned') AS returned
            FROM loans
            "#,
        )
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }

    /// First-registered location and branch, used to shelve returned goods
    async fn default_location_and_branch(
        tx: &mut Transaction<'_, Postgres>,
    ) -> AppResult<(Uuid, Uuid)> {
        let location_id =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM locations ORDER BY created_at, id LIMIT 1")
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::NotFound("default location".to_string()))?;

        let branch_id =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM branches ORDER BY created_at, id LIMIT 1")
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::NotFound("default branch".to_string()))?;

        Ok((location_id, branch_id))
    }
}
