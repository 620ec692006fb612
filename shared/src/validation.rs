//! Validation utilities for warehouse inputs

use rust_decimal::Decimal;

/// Validate that a stock quantity is strictly positive
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Validate that a unit cost is not negative
pub fn validate_unit_cost(cost: Decimal) -> Result<(), &'static str> {
    if cost < Decimal::ZERO {
        return Err("Unit cost cannot be negative");
    }
    Ok(())
}

/// Validate a stock keeping unit: non-empty, no surrounding whitespace,
/// at most 50 characters
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.is_empty() {
        return Err("SKU cannot be empty");
    }
    if sku.trim() != sku {
        return Err("SKU cannot have surrounding whitespace");
    }
    if sku.len() > 50 {
        return Err("SKU cannot exceed 50 characters");
    }
    Ok(())
}
