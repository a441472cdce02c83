//! Clause deduplication.
//!
//! Clauses are grouped by (parameter, operator, value, clause id); the
//! highest-confidence member of each group survives, ties broken by the
//! lowest section order.

use std::collections::BTreeMap;

use crate::models::Clause;

/// Grouping key. Values are compared by bit pattern so equal floats
/// group together without an ordering on f64.
fn group_key(clause: &Clause) -> (Option<String>, Option<&'static str>, Option<u64>, String) {
    (
        clause.parameter.clone(),
        clause.operator.map(|op| op.as_str()),
        clause.value.map(f64::to_bits),
        clause.clause_id.clone(),
    )
}

/// Deduplicate, keeping the best clause per group, and return the
/// survivors ordered by section position.
pub fn dedupe(clauses: Vec<Clause>) -> Vec<Clause> {
    let mut best: BTreeMap<_, Clause> = BTreeMap::new();

    for clause in clauses {
        let key = group_key(&clause);
        match best.get(&key) {
            Some(existing) => {
                let wins = clause.confidence.rank() > existing.confidence.rank()
                    || (clause.confidence.rank() == existing.confidence.rank()
                        && clause.section_ref < existing.section_ref);
                if wins {
                    best.insert(key, clause);
                }
            }
            None => {
                best.insert(key, clause);
            }
        }
    }

    let mut survivors: Vec<Clause> = best.into_values().collect();
    survivors.sort_by(|a, b| a.section_ref.cmp(&b.section_ref));
    survivors
}
