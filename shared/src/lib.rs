//! Shared types and models for the marketplace stock ledger
//!
//! This crate holds the storage-agnostic half of the system: stock
//! arithmetic, composite offer expansion, line item sum types and payment
//! status interpretation. The backend wires these to PostgreSQL and HTTP.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
