//! Warehouse stock engine
//!
//! Storage-backed core for tracking physical stock across a warehouse:
//! receipt lots consumed in first-in-first-out order, an append-only
//! movement ledger, fixed-asset loans with partial returns, and the kardex
//! balance replay.
//!
//! Callers (HTTP controllers, import pipelines) drive the services in
//! [`services`]; every state-mutating operation runs inside a single
//! database transaction covering both the lot change and the movement that
//! documents it. The acting user and the current time are always explicit
//! parameters; the engine never reads ambient session state or the wall
//! clock.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
