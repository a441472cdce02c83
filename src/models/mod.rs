//! Core data model: contracts, clauses, and the shared enums.
//!
//! These types travel the whole pipeline:
//! Scanner → Ingestor → Parser → Validator → Store → Review → Bridge.

pub mod clause;
pub mod contract;
pub mod enums;

pub use clause::*;
pub use contract::*;
pub use enums::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid {field} value: '{value}'")]
    InvalidEnum { field: String, value: String },
}
