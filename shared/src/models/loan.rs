//! Fixed-asset loans
//!
//! A loan withdraws loanable stock with an expected-return deadline and is
//! closed by one or more partial returns. Each returned portion is either
//! put back into stock (good condition) or written off (damaged or lost).
//! Overdue state is derived from the current time, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Loan lifecycle: Active until every lent unit is accounted for, then
/// Returned. Returned is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LoanStatus::Active),
            "returned" => Some(LoanStatus::Returned),
            _ => None,
        }
    }
}

/// Condition the borrower returned the goods in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCondition {
    Good,
    Damaged,
    Lost,
}

impl ReturnCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnCondition::Good => "good",
            ReturnCondition::Damaged => "damaged",
            ReturnCondition::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "good" => Some(ReturnCondition::Good),
            "damaged" => Some(ReturnCondition::Damaged),
            "lost" => Some(ReturnCondition::Lost),
            _ => None,
        }
    }

    /// Only goods returned in good condition go back into stock
    pub fn replenishes(&self) -> bool {
        matches!(self, ReturnCondition::Good)
    }
}

/// An outstanding or closed lending of loanable stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub item_id: Uuid,
    /// Name of the person the goods were lent to
    pub requester: String,
    pub department: Option<String>,
    /// Units lent; immutable once the loan is created
    pub quantity: i64,
    /// Units returned so far, across all conditions
    pub quantity_returned: i64,
    pub status: LoanStatus,
    pub lent_at: DateTime<Utc>,
    /// Deadline for returning the goods
    pub due_at: DateTime<Utc>,
    /// Set when the loan transitions to Returned
    pub returned_at: Option<DateTime<Utc>>,
    /// Accumulated return notes
    pub comments: Option<String>,
    pub registered_by: Option<Uuid>,
}

/// What the storage layer must do after a successful return registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnOutcome {
    /// Create a replacement lot for the returned quantity
    pub replenish: bool,
    /// The loan reached full return and transitioned to Returned
    pub closed: bool,
}

/// Failure modes of the loan return transition
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoanError {
    #[error("quantity must be greater than zero")]
    InvalidQuantity,

    #[error("loan is already closed")]
    AlreadyClosed,

    #[error("return of {requested} exceeds the outstanding balance {outstanding}")]
    OverReturn { requested: i64, outstanding: i64 },
}

impl Loan {
    /// Units still out with the borrower
    pub fn outstanding(&self) -> i64 {
        self.quantity - self.quantity_returned
    }

    /// Active and past its expected-return deadline
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Active && now > self.due_at
    }

    /// Whole days past the deadline; negative while time remains.
    /// Zero once the loan is closed.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        match self.status {
            LoanStatus::Active => (now - self.due_at).num_days(),
            LoanStatus::Returned => 0,
        }
    }

    /// Whole days until the deadline; negative once overdue.
    /// Zero once the loan is closed.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.status {
            LoanStatus::Active => (self.due_at - now).num_days(),
            LoanStatus::Returned => 0,
        }
    }

    /// Register a (possibly partial) return against this loan.
    ///
    /// On success the loan's returned counter, comments, and status are
    /// updated in place and the outcome tells the caller whether to
    /// replenish stock and whether the loan just closed. On failure the
    /// loan is untouched.
    pub fn register_return(
        &mut self,
        quantity: i64,
        condition: ReturnCondition,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, LoanError> {
        if self.status == LoanStatus::Returned {
            return Err(LoanError::AlreadyClosed);
        }
        if quantity <= 0 {
            return Err(LoanError::InvalidQuantity);
        }

        let outstanding = self.outstanding();
        if quantity > outstanding {
            return Err(LoanError::OverReturn {
                requested: quantity,
                outstanding,
            });
        }

        self.quantity_returned += quantity;
        self.append_return_note(quantity, condition, notes);

        let closed = self.quantity_returned == self.quantity;
        if closed {
            self.status = LoanStatus::Returned;
            self.returned_at = Some(now);
        }

        Ok(ReturnOutcome {
            replenish: condition.replenishes(),
            closed,
        })
    }

    fn append_return_note(
        &mut self,
        quantity: i64,
        condition: ReturnCondition,
        notes: Option<&str>,
    ) {
        let detail = notes.map(str::trim).filter(|n| !n.is_empty());
        let entry = match detail {
            Some(text) => format!("Return ({}) x{}: {}", condition.as_str(), quantity, text),
            None => format!("Return ({}) x{}", condition.as_str(), quantity),
        };

        self.comments = Some(match self.comments.take() {
            Some(existing) if !existing.is_empty() => format!("{} | {}", existing, entry),
            _ => entry,
        });
    }
}
