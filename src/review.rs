//! Review workflow: the role-gated state machine over contract versions.
//!
//! Traders submit drafts, legal approves or rejects, operations runs
//! SAP revalidation at any state. Transitions are synchronous and
//! uncancellable; the store commits each one atomically, including the
//! supersede of a previously approved version on approval.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::models::{ReviewStatus, ReviewerRole};
use crate::pipeline::validation::{TemplateValidator, ValidationError};
use crate::store::{ContractStore, StoreError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("role {role} may not {action}")]
    RoleNotPermitted {
        role: ReviewerRole,
        action: &'static str,
    },

    /// Submission refused: the listed required clauses are missing.
    #[error("submission blocked; missing required clauses: {missing:?}")]
    BlocksSubmission { missing: Vec<String> },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An authenticated reviewer identity as the workflow sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer {
    pub id: String,
    pub role: ReviewerRole,
}

impl Reviewer {
    pub fn new(id: impl Into<String>, role: ReviewerRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// The workflow facade. Holds the store and the validator that gates
/// submission completeness.
pub struct ReviewWorkflow {
    store: Arc<ContractStore>,
    validator: TemplateValidator,
}

impl ReviewWorkflow {
    pub fn new(store: Arc<ContractStore>, validator: TemplateValidator) -> Self {
        Self { store, validator }
    }

    /// Trader submits a draft for review. Refused while required
    /// clauses are missing; the caller gets the list to resolve.
    pub fn submit(&self, contract_id: &str, reviewer: &Reviewer) -> Result<(), ReviewError> {
        if reviewer.role != ReviewerRole::Trader {
            return Err(ReviewError::RoleNotPermitted {
                role: reviewer.role,
                action: "submit for review",
            });
        }

        let contract = self
            .store
            .get(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;

        let report = self.validator.validate(&contract)?;
        if report.blocks_submission {
            let missing: Vec<String> = report
                .missing_required()
                .iter()
                .map(|f| f.clause_type.clone())
                .collect();
            tracing::warn!(contract_id, ?missing, "submission blocked");
            return Err(ReviewError::BlocksSubmission { missing });
        }

        self.store.apply_review_transition(
            contract_id,
            ReviewStatus::PendingReview,
            &reviewer.id,
            None,
            Utc::now(),
        )?;
        Ok(())
    }

    /// Legal approves. The previously approved version of the same
    /// canonical key is superseded in the same committed operation.
    pub fn approve(
        &self,
        contract_id: &str,
        reviewer: &Reviewer,
        notes: Option<String>,
    ) -> Result<(), ReviewError> {
        if reviewer.role != ReviewerRole::Legal {
            return Err(ReviewError::RoleNotPermitted {
                role: reviewer.role,
                action: "approve",
            });
        }
        self.store.apply_review_transition(
            contract_id,
            ReviewStatus::Approved,
            &reviewer.id,
            notes,
            Utc::now(),
        )?;
        tracing::info!(contract_id, reviewer = %reviewer.id, "contract approved");
        Ok(())
    }

    /// Legal rejects; terminal. Re-ingestion starts a fresh draft at
    /// the next version.
    pub fn reject(
        &self,
        contract_id: &str,
        reviewer: &Reviewer,
        notes: Option<String>,
    ) -> Result<(), ReviewError> {
        if reviewer.role != ReviewerRole::Legal {
            return Err(ReviewError::RoleNotPermitted {
                role: reviewer.role,
                action: "reject",
            });
        }
        self.store.apply_review_transition(
            contract_id,
            ReviewStatus::Rejected,
            &reviewer.id,
            notes,
            Utc::now(),
        )?;
        tracing::info!(contract_id, reviewer = %reviewer.id, "contract rejected");
        Ok(())
    }

    /// Operations records the result of an SAP revalidation. Allowed
    /// at any review state.
    pub fn record_sap_validation(
        &self,
        contract_id: &str,
        reviewer: &Reviewer,
        validated: bool,
        discrepancies: Vec<String>,
    ) -> Result<(), ReviewError> {
        if reviewer.role != ReviewerRole::Operations {
            return Err(ReviewError::RoleNotPermitted {
                role: reviewer.role,
                action: "record SAP validation",
            });
        }
        self.store
            .set_sap_validation(contract_id, validated, discrepancies)?;
        Ok(())
    }
}
