//! Family auto-detection and the penalty second pass.

use crate::models::{Clause, SectionRef};
use crate::registry::RegistrySnapshot;

use super::matchers::MatchOutcome;
use super::normalize::Paragraph;

/// Minimum anchor hits before a family classification is trusted.
const DETECTION_THRESHOLD: usize = 3;

/// Score each registered family by counting anchor occurrences across
/// the whole document. The winner needs at least the threshold and a
/// strict lead over the runner-up; anything else is `None`.
pub fn detect_family(registry: &RegistrySnapshot, text: &str) -> Option<String> {
    let lower = text.to_lowercase();

    let mut scores: Vec<(&str, usize)> = registry
        .family_signatures()
        .values()
        .map(|sig| {
            let score: usize = sig
                .detect_anchors
                .iter()
                .map(|anchor| lower.matches(anchor.as_str()).count())
                .sum();
            (sig.family_id.as_str(), score)
        })
        .collect();

    scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let (winner, best) = scores.first().copied()?;
    let runner_up = scores.get(1).map(|(_, s)| *s).unwrap_or(0);

    if best >= DETECTION_THRESHOLD && best > runner_up {
        tracing::debug!(family_id = winner, score = best, "family detected");
        Some(winner.to_string())
    } else {
        tracing::debug!(best, runner_up, "family detection inconclusive");
        None
    }
}

/// Second pass over DEFAULT_AND_REMEDIES clauses: embedded penalty
/// sub-clauses are lifted out as separate clauses so the penalty
/// schedule can read them. Skips sub-clauses already present from the
/// first pass (same clause id at any section).
pub fn expand_penalty_subclauses(clauses: &[Clause]) -> Vec<Clause> {
    let mut extra = Vec::new();

    for clause in clauses.iter().filter(|c| c.clause_id == "DEFAULT_AND_REMEDIES") {
        let paragraph = Paragraph {
            section_ref: SectionRef::new(
                clause.section_ref.order,
                clause.section_ref.label.clone(),
            ),
            text: clause.source_text.clone(),
        };
        let lower = paragraph.text.to_lowercase();

        for (sub_id, matcher) in [
            (
                "PENALTY_VOLUME_SHORTFALL",
                super::matchers::match_paragraph_as_shortfall as fn(&Paragraph, &str) -> MatchOutcome,
            ),
            (
                "PENALTY_LATE_DELIVERY",
                super::matchers::match_paragraph_as_late_delivery,
            ),
        ] {
            let already_present = clauses.iter().any(|c| c.clause_id == sub_id);
            if already_present {
                continue;
            }
            if let MatchOutcome::Match { clause: sub, .. } = matcher(&paragraph, &lower) {
                tracing::debug!(
                    clause_id = sub_id,
                    section = %sub.section_ref,
                    "penalty sub-clause lifted from default/remedies"
                );
                extra.push(*sub);
            }
        }
    }

    extra
}
