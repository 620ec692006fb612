//! Error handling for the warehouse stock engine

use shared::models::AllocationError;
use thiserror::Error;
use uuid::Uuid;

/// Engine error types
#[derive(Error, Debug)]
pub enum AppError {
    // Business rule violations; each aborts its unit of work with no
    // partial application
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Loan {0} not found")]
    LoanNotFound(Uuid),

    #[error("Loan {0} is already closed")]
    LoanAlreadyClosed(Uuid),

    #[error("Return of {requested} exceeds the outstanding balance {outstanding}")]
    OverReturn { requested: i64, outstanding: i64 },

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Database errors; surfaced after the transaction rolls back, never
    // retried here
    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidQuantity => AppError::InvalidQuantity,
            AllocationError::Insufficient {
                available,
                requested,
            } => AppError::InsufficientStock {
                available,
                requested,
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias for engine operations
pub type AppResult<T> = Result<T, AppError>;
