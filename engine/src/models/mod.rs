//! Database models for the warehouse stock engine
//!
//! Re-exports the domain models from the shared crate.

pub use shared::models::*;
