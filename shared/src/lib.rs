//! Shared types and domain logic for the warehouse stock platform
//!
//! This crate contains the database-free core of the system: the domain
//! models (items, lots, movements, loans), the FIFO allocation planner, the
//! kardex replay, and validation helpers. The storage engine applies the
//! decisions made here inside its transactions.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
