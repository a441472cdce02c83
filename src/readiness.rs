//! Readiness gate: four-level precondition for live solves.
//!
//! Extraction (validator-clean active set), review (nothing awaiting a
//! decision), activation (SAP-validated, positioned, unexpired), and
//! data freshness (every variable source within its staleness
//! threshold). Always returns the full report; `ready` is simply the
//! absence of issues.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ReviewStatus;
use crate::pipeline::validation::TemplateValidator;
use crate::solver::model::Variables;
use crate::store::ContractStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    Extraction,
    Review,
    Activation,
    Freshness,
}

impl CheckLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Review => "review",
            Self::Activation => "activation",
            Self::Freshness => "freshness",
        }
    }
}

/// One failing check with a message a trader can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessIssue {
    pub level: CheckLevel,
    pub message: String,
}

/// The gate's full answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub product_group: String,
    pub ready: bool,
    pub issues: Vec<ReadinessIssue>,
    pub active_contracts: usize,
    pub pending_contracts: usize,
    pub checked_at: DateTime<Utc>,
}

/// Staleness thresholds for upstream variable sources.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub default_max_age: Duration,
    pub per_variable: BTreeMap<String, Duration>,
}

impl FreshnessPolicy {
    pub fn max_age_for(&self, variable: &str) -> Duration {
        self.per_variable
            .get(variable)
            .copied()
            .unwrap_or(self.default_max_age)
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            default_max_age: Duration::hours(6),
            per_variable: BTreeMap::new(),
        }
    }
}

/// The gate itself.
pub struct ReadinessGate {
    store: Arc<ContractStore>,
    validator: TemplateValidator,
    freshness: FreshnessPolicy,
}

impl ReadinessGate {
    pub fn new(
        store: Arc<ContractStore>,
        validator: TemplateValidator,
        freshness: FreshnessPolicy,
    ) -> Self {
        Self {
            store,
            validator,
            freshness,
        }
    }

    pub fn check(
        &self,
        product_group: &str,
        variables: &Variables,
        now: DateTime<Utc>,
    ) -> ReadinessReport {
        let today = now.date_naive();
        let mut issues: Vec<ReadinessIssue> = Vec::new();

        let all = self.store.list_by_product_group(product_group);
        let active = self.store.list_active_set(product_group, today);

        // Level 1: extraction completeness of the active set.
        for contract in &active {
            match self.validator.validate(contract) {
                Ok(report) => {
                    let missing = report.missing_required().len();
                    if missing > 0 {
                        issues.push(ReadinessIssue {
                            level: CheckLevel::Extraction,
                            message: format!(
                                "extraction: contract {} ({}) missing {missing} required clause(s)",
                                contract.contract_id, contract.counterparty
                            ),
                        });
                    }
                }
                Err(e) => issues.push(ReadinessIssue {
                    level: CheckLevel::Extraction,
                    message: format!(
                        "extraction: contract {} could not be validated: {e}",
                        contract.contract_id
                    ),
                }),
            }
        }

        // Level 2: nothing awaiting review.
        let pending = all
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ReviewStatus::PendingReview | ReviewStatus::Draft
                )
            })
            .count();
        if pending > 0 {
            issues.push(ReadinessIssue {
                level: CheckLevel::Review,
                message: format!("review: {pending} contract(s) pending"),
            });
        }

        // Level 3: activation of everything approved.
        for contract in all.iter().filter(|c| c.status == ReviewStatus::Approved) {
            if !contract.sap_validated {
                issues.push(ReadinessIssue {
                    level: CheckLevel::Activation,
                    message: format!(
                        "activation: contract {} not SAP-validated",
                        contract.contract_id
                    ),
                });
            }
            if contract.open_position.is_none() {
                issues.push(ReadinessIssue {
                    level: CheckLevel::Activation,
                    message: format!(
                        "activation: contract {} has no open position",
                        contract.contract_id
                    ),
                });
            }
            match contract.expiry_date {
                Some(expiry) if expiry > today => {}
                Some(expiry) => issues.push(ReadinessIssue {
                    level: CheckLevel::Activation,
                    message: format!(
                        "activation: contract {} expired {expiry}",
                        contract.contract_id
                    ),
                }),
                None => issues.push(ReadinessIssue {
                    level: CheckLevel::Activation,
                    message: format!(
                        "activation: contract {} has no expiry date",
                        contract.contract_id
                    ),
                }),
            }
        }

        // Level 4: variable source freshness.
        for (key, sample) in variables.iter() {
            let age_ms = now.timestamp_millis() - sample.updated_at_ms;
            let max_age = self.freshness.max_age_for(key);
            if age_ms > max_age.num_milliseconds() {
                issues.push(ReadinessIssue {
                    level: CheckLevel::Freshness,
                    message: format!(
                        "freshness: variable {key} last updated {}s ago (limit {}s)",
                        age_ms / 1000,
                        max_age.num_seconds()
                    ),
                });
            }
        }

        let ready = issues.is_empty();
        if !ready {
            tracing::warn!(
                product_group,
                issue_count = issues.len(),
                "readiness gate not ready"
            );
        }

        ReadinessReport {
            product_group: product_group.to_string(),
            ready,
            issues,
            active_contracts: active.len(),
            pending_contracts: pending,
            checked_at: now,
        }
    }
}
