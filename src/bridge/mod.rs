//! Constraint bridge: approved contracts → solver inputs.
//!
//! Two separate artefacts, never merged: variable bounds (tightening
//! the feasible region) and the penalty schedule (objective cost
//! adjustments), plus the open-book aggregate. The bridge mutates
//! nothing; it reads the active set and returns new values. Live
//! projections require the readiness gate; what-if mode is a separate
//! entry point excluded from live trading paths.

pub mod book;
pub mod bounds;
pub mod penalties;

pub use book::OpenBook;
pub use penalties::PenaltyScheduleEntry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::readiness::{ReadinessGate, ReadinessReport};
use crate::solver::model::{AppliedBound, ModelCatalog, Variables};
use crate::store::ContractStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("product group '{0}' has no solver model")]
    UnknownProductGroup(String),

    #[error("readiness gate blocked the projection: {}", issues.join("; "))]
    NotReady { issues: Vec<String> },
}

/// Everything the bridge hands the solve pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOutput {
    pub variables: Variables,
    pub applied_bounds: Vec<AppliedBound>,
    pub penalty_schedule: Vec<PenaltyScheduleEntry>,
    pub open_book: OpenBook,
    /// The gate report backing a live projection; absent in what-if.
    pub readiness: Option<ReadinessReport>,
}

/// The bridge facade.
pub struct ConstraintBridge {
    store: Arc<ContractStore>,
    gate: Arc<ReadinessGate>,
    catalog: ModelCatalog,
}

impl ConstraintBridge {
    pub fn new(store: Arc<ContractStore>, gate: Arc<ReadinessGate>, catalog: ModelCatalog) -> Self {
        Self {
            store,
            gate,
            catalog,
        }
    }

    /// Live projection: refuses unless the readiness gate passes.
    pub fn project_live(
        &self,
        product_group: &str,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> Result<BridgeOutput, BridgeError> {
        let report = self.gate.check(product_group, variables, now);
        if !report.ready {
            return Err(BridgeError::NotReady {
                issues: report.issues.iter().map(|i| i.message.clone()).collect(),
            });
        }
        let mut output = self.project(product_group, variables, now)?;
        output.readiness = Some(report);
        Ok(output)
    }

    /// What-if projection for sandbox work: no gate, same math. Not
    /// wired into the live solve path.
    pub fn project_what_if(
        &self,
        product_group: &str,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> Result<BridgeOutput, BridgeError> {
        self.project(product_group, variables, now)
    }

    fn project(
        &self,
        product_group: &str,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> Result<BridgeOutput, BridgeError> {
        let model = self
            .catalog
            .get(product_group)
            .ok_or_else(|| BridgeError::UnknownProductGroup(product_group.to_string()))?;

        let active = self
            .store
            .list_active_set(product_group, now.date_naive());

        let (projected, applied_bounds) = bounds::project(model, &active, variables);
        let penalty_schedule = penalties::penalty_schedule(&active);
        let open_book = book::aggregate(&active, &penalty_schedule);

        tracing::debug!(
            product_group,
            active_contracts = active.len(),
            bounds_applied = applied_bounds.len(),
            penalties = penalty_schedule.len(),
            "bridge projection complete"
        );

        Ok(BridgeOutput {
            variables: projected,
            applied_bounds,
            penalty_schedule,
            open_book,
            readiness: None,
        })
    }
}
