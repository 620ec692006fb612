//! Business logic services for the warehouse stock engine

pub mod import;
pub mod inventory;
pub mod kardex;
pub mod ledger;
pub mod loans;

pub use import::ImportService;
pub use inventory::InventoryService;
pub use kardex::KardexService;
pub use ledger::LedgerService;
pub use loans::LoanService;
