//! Template validation: completeness and sanity of an extraction
//! against the contract's template.
//!
//! Produces findings, never mutations. Missing required clauses block
//! submission for review; everything else is advisory.

pub mod ranges;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BoundOperator, Confidence, Contract};
use crate::registry::{RegistryError, RequirementLevel, TemplateRegistry};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("contract has no incoterm; template lookup impossible")]
    MissingIncoterm,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingRequired,
    MissingExpected,
    LowConfidence,
    ValueSuspicious,
    Conflict,
}

/// One validation finding, human-readable and machine-sortable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub clause_type: String,
    pub parameter: Option<String>,
    pub message: String,
}

/// Outcome of validating one contract against its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub required_total: usize,
    pub required_met: usize,
    pub completeness_pct: f64,
    /// True when at least one required clause is missing.
    pub blocks_submission: bool,
}

impl ValidationReport {
    pub fn missing_required(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::MissingRequired)
            .collect()
    }

    pub fn conflicts(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Conflict)
            .collect()
    }
}

/// Validates contracts against their (contract type, incoterm) template.
#[derive(Clone)]
pub struct TemplateValidator {
    registry: TemplateRegistry,
    /// When set, low-confidence clauses do not satisfy requirements.
    strict_confidence: bool,
}

impl TemplateValidator {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            strict_confidence: false,
        }
    }

    pub fn strict_confidence(mut self, strict: bool) -> Self {
        self.strict_confidence = strict;
        self
    }

    pub fn validate(&self, contract: &Contract) -> Result<ValidationReport, ValidationError> {
        let incoterm = contract.incoterm.ok_or(ValidationError::MissingIncoterm)?;
        let snapshot = self.registry.snapshot();
        let template = snapshot.get_template(contract.template_type, incoterm)?;

        let mut findings: Vec<Finding> = Vec::new();
        let mut required_total = 0usize;
        let mut required_met = 0usize;

        // Completeness against the template.
        for requirement in &template.requirements {
            let satisfied = contract.clauses.iter().any(|clause| {
                if clause.clause_id != requirement.clause_type {
                    return false;
                }
                if self.strict_confidence && clause.confidence == Confidence::Low {
                    return false;
                }
                match &requirement.parameter_class {
                    None => true,
                    Some(class) => clause
                        .parameter
                        .as_deref()
                        .map(|p| {
                            snapshot
                                .parameter_class_members(class)
                                .iter()
                                .any(|m| m == p)
                        })
                        .unwrap_or(false),
                }
            });

            match requirement.level {
                RequirementLevel::Required => {
                    required_total += 1;
                    if satisfied {
                        required_met += 1;
                    } else {
                        findings.push(Finding {
                            kind: FindingKind::MissingRequired,
                            clause_type: requirement.clause_type.clone(),
                            parameter: requirement.parameter_class.clone(),
                            message: format!(
                                "required clause {} not found: {}",
                                requirement.clause_type, requirement.description
                            ),
                        });
                    }
                }
                RequirementLevel::Expected if !satisfied => {
                    findings.push(Finding {
                        kind: FindingKind::MissingExpected,
                        clause_type: requirement.clause_type.clone(),
                        parameter: requirement.parameter_class.clone(),
                        message: format!(
                            "expected clause {} not found: {}",
                            requirement.clause_type, requirement.description
                        ),
                    });
                }
                _ => {}
            }
        }

        // Per-clause confidence and value sanity.
        for clause in &contract.clauses {
            if clause.confidence == Confidence::Low {
                findings.push(Finding {
                    kind: FindingKind::LowConfidence,
                    clause_type: clause.clause_id.clone(),
                    parameter: clause.parameter.clone(),
                    message: format!(
                        "{} at {} parsed with low confidence",
                        clause.clause_id, clause.section_ref
                    ),
                });
            }

            if let (Some(parameter), Some(value)) = (&clause.parameter, clause.value) {
                if ranges::is_suspicious(parameter, value) {
                    findings.push(Finding {
                        kind: FindingKind::ValueSuspicious,
                        clause_type: clause.clause_id.clone(),
                        parameter: Some(parameter.clone()),
                        message: format!(
                            "{parameter} = {value} is far outside the plausible range"
                        ),
                    });
                }
            }
        }

        findings.extend(detect_conflicts(contract));

        let completeness_pct = if required_total == 0 {
            100.0
        } else {
            required_met as f64 / required_total as f64 * 100.0
        };
        let blocks_submission = required_met < required_total;

        if blocks_submission {
            tracing::warn!(
                contract_id = %contract.contract_id,
                missing = required_total - required_met,
                "validation blocks submission"
            );
        }

        Ok(ValidationReport {
            findings,
            required_total,
            required_met,
            completeness_pct,
            blocks_submission,
        })
    }
}

/// A parameter with a floor above its ceiling is a conflict: the
/// feasible interval is empty. Between-bounds contribute both ends.
fn detect_conflicts(contract: &Contract) -> Vec<Finding> {
    let mut floors: BTreeMap<&str, f64> = BTreeMap::new();
    let mut ceilings: BTreeMap<&str, f64> = BTreeMap::new();

    for clause in &contract.clauses {
        let (Some(parameter), Some(operator), Some(value)) =
            (&clause.parameter, clause.operator, clause.value)
        else {
            continue;
        };
        match operator {
            BoundOperator::Gte => {
                floors
                    .entry(parameter)
                    .and_modify(|f| *f = f.max(value))
                    .or_insert(value);
            }
            BoundOperator::Lte => {
                ceilings
                    .entry(parameter)
                    .and_modify(|c| *c = c.min(value))
                    .or_insert(value);
            }
            BoundOperator::Between => {
                floors
                    .entry(parameter)
                    .and_modify(|f| *f = f.max(value))
                    .or_insert(value);
                if let Some(upper) = clause.value_upper {
                    ceilings
                        .entry(parameter)
                        .and_modify(|c| *c = c.min(upper))
                        .or_insert(upper);
                }
            }
            BoundOperator::Eq => {}
        }
    }

    floors
        .iter()
        .filter_map(|(parameter, floor)| {
            let ceiling = ceilings.get(parameter)?;
            (floor > ceiling).then(|| Finding {
                kind: FindingKind::Conflict,
                clause_type: String::new(),
                parameter: Some(parameter.to_string()),
                message: format!(
                    "{parameter}: floor {floor} exceeds ceiling {ceiling}; feasible interval is empty"
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clause, Confidence, SectionRef};
    use crate::pipeline::parsing::ClauseParser;

    fn contract_with_clauses(clauses: Vec<Clause>) -> Contract {
        let mut contract = crate::store::test_support::contract("Koch Fertilizer", "ammonia");
        contract.clauses = clauses;
        contract
    }

    fn bound(id: &str, order: u32, parameter: &str, op: BoundOperator, value: f64) -> Clause {
        let mut c = Clause::bare(
            id,
            "commercial",
            SectionRef::new(order, format!("Section {order}")),
            format!("{id} text"),
            Confidence::High,
        );
        c.parameter = Some(parameter.into());
        c.operator = Some(op);
        c.value = Some(value);
        c.unit = Some("mt".into());
        c
    }

    fn validator() -> TemplateValidator {
        TemplateValidator::new(TemplateRegistry::seeded())
    }

    const FOB_PURCHASE: &str = "\
1. Product and Specifications
Anhydrous ammonia, minimum 99.5 percent purity.

2. Quantity Tolerance
40,000 MT +/- 10 percent at seller's option.

3. Delivery Term
FOB Donaldsonville, Incoterms 2020.

4. Delivery Period
Laycan 10-20 March 2026.

5. Price
US$ 335/MT FOB Donaldsonville.

6. Payment
Net 30 days from bill of lading date by telegraphic transfer.";

    #[test]
    fn complete_purchase_fob_passes_required() {
        let parsed = ClauseParser::new(TemplateRegistry::seeded()).parse(FOB_PURCHASE);
        let contract = contract_with_clauses(parsed.clauses);

        let report = validator().validate(&contract).unwrap();
        assert_eq!(report.required_met, report.required_total);
        assert_eq!(report.completeness_pct, 100.0);
        assert!(!report.blocks_submission);
        assert!(report.missing_required().is_empty());
    }

    #[test]
    fn missing_price_blocks_submission() {
        let parsed = ClauseParser::new(TemplateRegistry::seeded()).parse(FOB_PURCHASE);
        let clauses: Vec<Clause> = parsed
            .clauses
            .into_iter()
            .filter(|c| c.clause_id != "PRICE")
            .collect();
        let contract = contract_with_clauses(clauses);

        let report = validator().validate(&contract).unwrap();
        assert!(report.blocks_submission);
        assert!(report
            .missing_required()
            .iter()
            .any(|f| f.clause_type == "PRICE"));
        assert!(report.completeness_pct < 100.0);
    }

    #[test]
    fn parameter_class_must_match() {
        // A PRICE clause whose parameter is not in the "price" class
        // does not satisfy the price requirement.
        let mut clause = bound("PRICE", 5, "laytime_hours", BoundOperator::Eq, 72.0);
        clause.unit = Some("hours".into());
        let contract = contract_with_clauses(vec![clause]);

        let report = validator().validate(&contract).unwrap();
        assert!(report
            .missing_required()
            .iter()
            .any(|f| f.clause_type == "PRICE"));
    }

    #[test]
    fn suspicious_value_flagged_not_fatal() {
        let mut clause = bound("PRICE", 5, "price_usd_ton", BoundOperator::Eq, 335_000.0);
        clause.unit = Some("$/ton".into());
        let contract = contract_with_clauses(vec![clause]);

        let report = validator().validate(&contract).unwrap();
        let suspicious: Vec<&Finding> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::ValueSuspicious)
            .collect();
        assert_eq!(suspicious.len(), 1);
        // The price requirement itself is still met.
        assert!(!report
            .missing_required()
            .iter()
            .any(|f| f.clause_type == "PRICE"));
    }

    #[test]
    fn conflicting_bounds_flagged() {
        let contract = contract_with_clauses(vec![
            bound("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 5_000.0),
            bound("QUANTITY_TOLERANCE", 3, "inv_don", BoundOperator::Lte, 3_000.0),
        ]);

        let report = validator().validate(&contract).unwrap();
        let conflicts = report.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].parameter.as_deref(), Some("inv_don"));
    }

    #[test]
    fn compatible_bounds_no_conflict() {
        let contract = contract_with_clauses(vec![
            bound("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 2_000.0),
            bound("QUANTITY_TOLERANCE", 3, "inv_don", BoundOperator::Lte, 3_000.0),
        ]);
        let report = validator().validate(&contract).unwrap();
        assert!(report.conflicts().is_empty());
    }

    #[test]
    fn between_bound_participates_in_conflicts() {
        let mut between = bound("LAYTIME", 4, "laytime_hours", BoundOperator::Between, 36.0);
        between.value_upper = Some(72.0);
        let contract = contract_with_clauses(vec![
            between,
            bound("LAYTIME", 6, "laytime_hours", BoundOperator::Gte, 100.0),
        ]);

        let report = validator().validate(&contract).unwrap();
        assert_eq!(report.conflicts().len(), 1);
    }

    #[test]
    fn low_confidence_counts_by_default() {
        let mut clause = Clause::bare(
            "PRICE",
            "commercial",
            SectionRef::new(5, "Section 5"),
            "Price to be agreed",
            Confidence::Low,
        );
        clause.parameter = Some("price_usd_ton".into());
        let contract = contract_with_clauses(vec![clause]);

        let report = validator().validate(&contract).unwrap();
        assert!(
            !report
                .missing_required()
                .iter()
                .any(|f| f.clause_type == "PRICE"),
            "low-confidence clause should satisfy the requirement by default"
        );
        // But its confidence is surfaced.
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::LowConfidence && f.clause_type == "PRICE"));
    }

    #[test]
    fn strict_mode_excludes_low_confidence() {
        let mut clause = Clause::bare(
            "PRICE",
            "commercial",
            SectionRef::new(5, "Section 5"),
            "Price to be agreed",
            Confidence::Low,
        );
        clause.parameter = Some("price_usd_ton".into());
        let contract = contract_with_clauses(vec![clause]);

        let report = validator()
            .strict_confidence(true)
            .validate(&contract)
            .unwrap();
        assert!(report
            .missing_required()
            .iter()
            .any(|f| f.clause_type == "PRICE"));
    }

    #[test]
    fn missing_incoterm_is_an_error() {
        let mut contract = contract_with_clauses(vec![]);
        contract.incoterm = None;
        let err = validator().validate(&contract).unwrap_err();
        assert_eq!(err, ValidationError::MissingIncoterm);
    }

    #[test]
    fn unknown_template_is_an_error() {
        let mut contract = contract_with_clauses(vec![]);
        contract.incoterm = Some(crate::models::Incoterm::Exw);
        let err = validator().validate(&contract).unwrap_err();
        assert!(matches!(err, ValidationError::Registry(_)));
    }
}
