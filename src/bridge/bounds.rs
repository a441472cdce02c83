//! Bound projection: approved clauses tighten solver variables.
//!
//! Tighten-only: a floor can only raise a value, a ceiling can only
//! lower it, a range clamps into itself. Penalty, force majeure, and
//! delivery-window clauses never become bounds regardless of shape.
//! When a parameter's floor exceeds its ceiling the validator has
//! already flagged a conflict; here exactly one side is applied (an
//! exact clause when present, otherwise the later-ingested one) and the
//! decision is recorded on the applied list.

use std::collections::BTreeMap;

use crate::models::{BoundOperator, Clause, Contract};
use crate::solver::model::{AppliedBound, ProductGroupModel, Variables};

/// Clause ids that never project onto solver variables.
const NEVER_BOUND: &[&str] = &[
    "DELIVERY_PERIOD",
    "FORCE_MAJEURE",
    "DEFAULT_AND_REMEDIES",
    "PENALTY_VOLUME_SHORTFALL",
    "PENALTY_LATE_DELIVERY",
    "DEMURRAGE",
];

struct Candidate<'a> {
    contract: &'a Contract,
    clause: &'a Clause,
}

/// Project the active set's clauses onto the variable values. Returns
/// the tightened variables and the applied-bounds record; the inputs
/// are untouched.
pub fn project(
    model: &ProductGroupModel,
    contracts: &[Contract],
    variables: &Variables,
) -> (Variables, Vec<AppliedBound>) {
    let mut out = variables.clone();
    let mut applied: Vec<AppliedBound> = Vec::new();

    // Candidate clauses grouped per parameter.
    let mut by_parameter: BTreeMap<&str, Vec<Candidate<'_>>> = BTreeMap::new();
    for contract in contracts {
        for clause in &contract.clauses {
            if !clause.is_bound_shaped() {
                continue;
            }
            if NEVER_BOUND.contains(&clause.clause_id.as_str()) {
                continue;
            }
            let Some(parameter) = clause.parameter.as_deref() else {
                continue;
            };
            if !model.contains_variable(parameter) {
                continue;
            }
            by_parameter
                .entry(parameter)
                .or_default()
                .push(Candidate { contract, clause });
        }
    }

    for (parameter, mut candidates) in by_parameter {
        // Deterministic application order: version, then section.
        candidates.sort_by(|a, b| {
            a.contract
                .version
                .cmp(&b.contract.version)
                .then(a.clause.section_ref.cmp(&b.clause.section_ref))
        });

        if let Some((winner, note)) = resolve_conflict(&candidates) {
            apply_one(&mut out, parameter, winner, Some(note), &mut applied);
            continue;
        }

        for candidate in &candidates {
            apply_one(&mut out, parameter, candidate, None, &mut applied);
        }
    }

    (out, applied)
}

/// Detect an empty feasible interval among the candidates. When found,
/// pick the single clause to honour: an exact bound when one exists,
/// otherwise the last candidate in application order (the
/// later-ingested clause).
fn resolve_conflict<'c, 'a>(
    candidates: &'c [Candidate<'a>],
) -> Option<(&'c Candidate<'a>, String)> {
    let mut floor: Option<f64> = None;
    let mut ceiling: Option<f64> = None;

    for candidate in candidates {
        let value = candidate.clause.value?;
        match candidate.clause.operator? {
            BoundOperator::Gte => floor = Some(floor.map_or(value, |f: f64| f.max(value))),
            BoundOperator::Lte => ceiling = Some(ceiling.map_or(value, |c: f64| c.min(value))),
            BoundOperator::Between => {
                floor = Some(floor.map_or(value, |f: f64| f.max(value)));
                if let Some(upper) = candidate.clause.value_upper {
                    ceiling = Some(ceiling.map_or(upper, |c: f64| c.min(upper)));
                }
            }
            BoundOperator::Eq => {}
        }
    }

    let (f, c) = (floor?, ceiling?);
    if f <= c {
        return None;
    }

    let winner = candidates
        .iter()
        .find(|cand| cand.clause.operator == Some(BoundOperator::Eq))
        .or_else(|| candidates.last())?;

    let note = format!(
        "conflicting bounds on this parameter (floor {f} > ceiling {c}); \
         applied {} from contract version {} only",
        winner.clause.operator.map(|o| o.as_str()).unwrap_or("?"),
        winner.contract.version
    );
    tracing::warn!(%note, "bound conflict resolved");
    Some((winner, note))
}

fn apply_one(
    variables: &mut Variables,
    parameter: &str,
    candidate: &Candidate<'_>,
    note: Option<String>,
    applied: &mut Vec<AppliedBound>,
) {
    let Some(current) = variables.value(parameter) else {
        // The frame knows the parameter but this solve carries no
        // sample for it; nothing to tighten.
        return;
    };
    let Some(value) = candidate.clause.value else {
        return;
    };
    let Some(operator) = candidate.clause.operator else {
        return;
    };

    let next = match operator {
        BoundOperator::Gte => current.max(value),
        BoundOperator::Lte => current.min(value),
        BoundOperator::Eq => value,
        BoundOperator::Between => {
            let upper = candidate.clause.value_upper.unwrap_or(value);
            current.max(value).min(upper)
        }
    };
    variables.clamp_value(parameter, next);

    applied.push(AppliedBound {
        parameter: parameter.to_string(),
        operator,
        value,
        value_upper: candidate.clause.value_upper,
        contract_id: candidate.contract.contract_id.clone(),
        contract_version: candidate.contract.version,
        section_ref: candidate.clause.section_ref.clone(),
        note,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, SectionRef};
    use crate::solver::model::ammonia_model;
    use crate::store::test_support;

    fn bound_clause(id: &str, order: u32, parameter: &str, op: BoundOperator, value: f64) -> Clause {
        let mut c = Clause::bare(
            id,
            "commercial",
            SectionRef::new(order, format!("Section {order}")),
            format!("{id} at {value}"),
            Confidence::High,
        );
        c.parameter = Some(parameter.into());
        c.operator = Some(op);
        c.value = Some(value);
        c.unit = Some("mt".into());
        c
    }

    fn contract_with(version: u32, clauses: Vec<Clause>) -> Contract {
        let mut c = test_support::contract("Koch Fertilizer", "ammonia");
        c.version = version;
        c.clauses = clauses;
        c
    }

    fn base_variables() -> Variables {
        let mut v = Variables::new();
        v.set("inv_don", 10_000.0, 1000);
        v.set("price_usd_ton", 335.0, 1000);
        v.set("laytime_hours", 96.0, 1000);
        v
    }

    #[test]
    fn floor_raises_value() {
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 12_000.0)],
        )];
        let (out, applied) = project(&ammonia_model(), &contracts, &base_variables());
        assert_eq!(out.value("inv_don"), Some(12_000.0));
        assert_eq!(applied.len(), 1);
        assert!(applied[0].note.is_none());
    }

    #[test]
    fn floor_below_current_is_noop_but_recorded() {
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 5_000.0)],
        )];
        let (out, applied) = project(&ammonia_model(), &contracts, &base_variables());
        // Tighten-only: the floor is already satisfied.
        assert_eq!(out.value("inv_don"), Some(10_000.0));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn ceiling_lowers_value() {
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Lte, 8_000.0)],
        )];
        let (out, _) = project(&ammonia_model(), &contracts, &base_variables());
        assert_eq!(out.value("inv_don"), Some(8_000.0));
    }

    #[test]
    fn exact_sets_value() {
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("PRICE", 5, "price_usd_ton", BoundOperator::Eq, 350.0)],
        )];
        let (out, _) = project(&ammonia_model(), &contracts, &base_variables());
        assert_eq!(out.value("price_usd_ton"), Some(350.0));
    }

    #[test]
    fn between_clamps_into_range() {
        let mut clause = bound_clause("LAYTIME", 8, "laytime_hours", BoundOperator::Between, 36.0);
        clause.value_upper = Some(72.0);
        let contracts = vec![contract_with(1, vec![clause])];
        let (out, _) = project(&ammonia_model(), &contracts, &base_variables());
        // 96 clamps down to the range top.
        assert_eq!(out.value("laytime_hours"), Some(72.0));
    }

    #[test]
    fn tightening_never_loosens() {
        let before = base_variables();
        let contracts = vec![contract_with(
            1,
            vec![
                bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 11_000.0),
                bound_clause("QUANTITY_TOLERANCE", 3, "inv_don", BoundOperator::Lte, 14_000.0),
            ],
        )];
        let (after, _) = project(&ammonia_model(), &contracts, &before);

        let v_before = before.value("inv_don").unwrap();
        let v_after = after.value("inv_don").unwrap();
        // A floor was applied: result is >= the input.
        assert!(v_after >= v_before);
        // And the ceiling holds.
        assert!(v_after <= 14_000.0);
    }

    #[test]
    fn penalty_and_window_clauses_never_bound() {
        let mut demurrage =
            bound_clause("DEMURRAGE", 8, "demurrage_usd_day", BoundOperator::Eq, 15_000.0);
        demurrage.penalty_per_unit = Some(15_000.0);
        let window = bound_clause("DELIVERY_PERIOD", 4, "inv_don", BoundOperator::Gte, 99_000.0);
        let contracts = vec![contract_with(1, vec![demurrage, window])];

        let mut variables = base_variables();
        variables.set("demurrage_usd_day", 12_000.0, 1000);
        let (out, applied) = project(&ammonia_model(), &contracts, &variables);

        assert!(applied.is_empty());
        assert_eq!(out.value("demurrage_usd_day"), Some(12_000.0));
        assert_eq!(out.value("inv_don"), Some(10_000.0));
    }

    #[test]
    fn unknown_parameter_ignored() {
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("PRICE", 5, "not_in_frame", BoundOperator::Eq, 1.0)],
        )];
        let (out, applied) = project(&ammonia_model(), &contracts, &base_variables());
        assert!(applied.is_empty());
        assert_eq!(out, base_variables());
    }

    #[test]
    fn conflict_prefers_exact_clause() {
        let contracts = vec![
            contract_with(
                1,
                vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 5_000.0)],
            ),
            contract_with(
                2,
                vec![
                    bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Lte, 3_000.0),
                    bound_clause("QUANTITY_TOLERANCE", 3, "inv_don", BoundOperator::Eq, 4_000.0),
                ],
            ),
        ];
        let (out, applied) = project(&ammonia_model(), &contracts, &base_variables());
        assert_eq!(out.value("inv_don"), Some(4_000.0));
        assert_eq!(applied.len(), 1);
        assert!(applied[0].note.as_deref().unwrap().contains("conflicting"));
        assert_eq!(applied[0].operator, BoundOperator::Eq);
    }

    #[test]
    fn conflict_without_exact_prefers_later_ingested() {
        // Version 1 says >= 5000; version 2 says <= 3000. Empty interval,
        // no exact clause: the later version wins and the decision is
        // recorded.
        let contracts = vec![
            contract_with(
                1,
                vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 5_000.0)],
            ),
            contract_with(
                2,
                vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Lte, 3_000.0)],
            ),
        ];
        let (out, applied) = project(&ammonia_model(), &contracts, &base_variables());
        assert_eq!(out.value("inv_don"), Some(3_000.0));
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].contract_version, 2);
        assert!(applied[0].note.is_some());
    }

    #[test]
    fn inputs_are_untouched() {
        let variables = base_variables();
        let contracts = vec![contract_with(
            1,
            vec![bound_clause("QUANTITY_TOLERANCE", 2, "inv_don", BoundOperator::Gte, 12_000.0)],
        )];
        let _ = project(&ammonia_model(), &contracts, &variables);
        assert_eq!(variables.value("inv_don"), Some(10_000.0));
    }
}
