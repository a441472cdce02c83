//! Solver port: the framed binary interface to the external LP engine,
//! plus the product-group model descriptors the wire format is sized by.

pub mod frame;
pub mod model;
pub mod port;

pub use frame::{MonteCarloResult, SolveResult};
pub use model::{AppliedBound, ModelCatalog, ProductGroupModel, VariableSample, Variables};
pub use port::{MonteCarloOutcome, SolveOutcome, SolverConfig, SolverPort};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver unavailable: {0}")]
    Unavailable(String),

    #[error("solver subprocess crashed")]
    Crashed,

    #[error("solver timed out")]
    Timeout,

    #[error("solver protocol error: {0}")]
    Protocol(String),
}
