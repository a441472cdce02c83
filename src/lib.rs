//! Ballast: trading-desk contract ingestion and solve gating.
//!
//! Turns a fleet of physical commodity contracts into solver
//! constraints and keeps the two in lockstep: a content-addressed
//! scanner detects remote changes without downloads, a deterministic
//! parser lifts structured clauses out of legal text (with an LLM
//! second opinion on the side), a template registry gates extraction
//! completeness through role-based review, and a readiness-gated
//! pipeline projects the approved book onto LP variable bounds and a
//! penalty schedule before every solve. Every solve leaves an
//! immutable audit; every mutation reaches an append-only hash-chained
//! log.

pub mod bridge;
pub mod config;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod readiness;
pub mod registry;
pub mod review; // trader → legal → operations state machine
pub mod scanner;
pub mod solve;
pub mod solver;
pub mod store;

pub use bridge::ConstraintBridge;
pub use pipeline::ingest::Ingestor;
pub use pipeline::parsing::ClauseParser;
pub use pipeline::validation::TemplateValidator;
pub use readiness::ReadinessGate;
pub use registry::TemplateRegistry;
pub use review::ReviewWorkflow;
pub use solve::SolvePipeline;
pub use store::ContractStore;
