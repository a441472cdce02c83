//! Anchor-based clause matchers.
//!
//! A fixed pipeline, most specific first: demurrage matches before the
//! generic default/remedies catch, the shortfall penalty before the
//! generic penalty language, and so on. Each matcher is a pure function
//! of the paragraph; the first matcher that claims a paragraph wins and
//! the rest never see it.

use std::collections::BTreeMap;

use crate::models::{BoundOperator, Clause, Confidence, FieldValue, Period};
use crate::registry::RegistrySnapshot;

use super::normalize::Paragraph;
use super::numeric;

/// Outcome of applying one matcher to one paragraph.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// The paragraph is this clause. An attached warning means numeric
    /// extraction was degraded but the anchor match was unambiguous.
    Match {
        clause: Box<Clause>,
        warning: Option<String>,
    },
    /// Not this clause; try the next matcher.
    Skip,
    /// Looked like this clause but is unusable; surfaced for review.
    Warn(String),
}

impl MatchOutcome {
    fn matched(clause: Clause) -> Self {
        Self::Match {
            clause: Box::new(clause),
            warning: None,
        }
    }

    fn degraded(clause: Clause, warning: impl Into<String>) -> Self {
        Self::Match {
            clause: Box::new(clause),
            warning: Some(warning.into()),
        }
    }
}

fn contains_any(lower: &str, anchors: &[&str]) -> Option<String> {
    anchors
        .iter()
        .find(|a| lower.contains(*a))
        .map(|a| a.to_string())
}

/// Build a bound-shaped clause with the shared bookkeeping filled in.
#[allow(clippy::too_many_arguments)]
fn bound_clause(
    clause_id: &str,
    category: &str,
    paragraph: &Paragraph,
    anchor: String,
    parameter: &str,
    operator: BoundOperator,
    value: f64,
    unit: &str,
    confidence: Confidence,
) -> Clause {
    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), FieldValue::Number(value));
    fields.insert("unit".to_string(), FieldValue::Keyword(unit.to_string()));
    Clause {
        clause_id: clause_id.to_string(),
        category: category.to_string(),
        extracted_fields: fields,
        source_text: paragraph.text.clone(),
        section_ref: paragraph.section_ref.clone(),
        anchors_matched: vec![anchor],
        confidence,
        parameter: Some(parameter.to_string()),
        operator: Some(operator),
        value: Some(value),
        value_upper: None,
        unit: Some(unit.to_string()),
        penalty_per_unit: None,
        penalty_cap: None,
        period: None,
    }
}

/// Numeric clause skeleton: anchor present, extract number + unit, grade
/// confidence by how much had to be defaulted.
#[allow(clippy::too_many_arguments)]
fn numeric_clause(
    clause_id: &str,
    category: &str,
    paragraph: &Paragraph,
    lower: &str,
    anchor: String,
    parameter: &str,
    default_unit: &str,
    default_operator: BoundOperator,
) -> MatchOutcome {
    // A merged heading number must never read as the clause value.
    let body = numeric::strip_heading(lower);

    if let Some((lo, hi)) = numeric::between_range(body) {
        let unit = numeric::detect_unit(body).unwrap_or(default_unit);
        let mut clause = bound_clause(
            clause_id,
            category,
            paragraph,
            anchor,
            parameter,
            BoundOperator::Between,
            lo,
            unit,
            Confidence::High,
        );
        clause.value_upper = Some(hi);
        clause.period = numeric::detect_period(body);
        return MatchOutcome::matched(clause);
    }

    let Some(value) = numeric::first_number(body) else {
        // Unambiguous anchor but no usable number: keep a low-confidence
        // clause and warn.
        let mut clause = Clause::bare(
            clause_id,
            category,
            paragraph.section_ref.clone(),
            paragraph.text.clone(),
            Confidence::Low,
        );
        clause.anchors_matched = vec![anchor];
        clause.parameter = Some(parameter.to_string());
        return MatchOutcome::degraded(
            clause,
            format!(
                "{}: clause text matched but no numeric value could be extracted",
                paragraph.section_ref.label
            ),
        );
    };

    let unit = numeric::detect_unit(body);
    let operator = numeric::detect_operator(body);
    let confidence = if unit.is_some() {
        // An operator default to an exact bound is still a clean read.
        Confidence::High
    } else {
        Confidence::Medium
    };

    let mut clause = bound_clause(
        clause_id,
        category,
        paragraph,
        anchor,
        parameter,
        operator.unwrap_or(default_operator),
        value,
        unit.unwrap_or(default_unit),
        confidence,
    );
    clause.period = numeric::detect_period(body);
    MatchOutcome::matched(clause)
}

// ── Specific matchers, in pipeline order ─────────────────────────────

/// A paragraph carrying default/remedies framing belongs to the
/// DEFAULT_AND_REMEDIES clause; its embedded penalty language is lifted
/// out by the dedicated second pass instead of being claimed here.
fn in_remedies_context(lower: &str) -> bool {
    lower.contains("default and remedies") || lower.contains("event of default")
}

fn match_penalty_volume_shortfall(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    if in_remedies_context(lower) {
        return MatchOutcome::Skip;
    }
    extract_shortfall_penalty(paragraph, lower)
}

fn extract_shortfall_penalty(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &["shortfall", "take or pay", "deficiency payment", "failure to lift"],
    ) else {
        return MatchOutcome::Skip;
    };
    penalty_rate_clause(
        "PENALTY_VOLUME_SHORTFALL",
        paragraph,
        lower,
        anchor,
        "shortfall_penalty_usd_ton",
        "$/ton",
    )
}

fn match_penalty_late_delivery(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    if in_remedies_context(lower) {
        return MatchOutcome::Skip;
    }
    extract_late_delivery_penalty(paragraph, lower)
}

fn extract_late_delivery_penalty(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &["late delivery", "delay in delivery", "liquidated damages for delay"],
    ) else {
        return MatchOutcome::Skip;
    };
    penalty_rate_clause(
        "PENALTY_LATE_DELIVERY",
        paragraph,
        lower,
        anchor,
        "late_delivery_penalty_usd_day",
        "$/day",
    )
}

/// Build a penalty clause with the rate scoped to the text after its
/// anchor, so a remedies body quoting several penalties gives each
/// sub-clause its own figure. The rate lands in `penalty_per_unit`; an
/// explicit cap ("capped at US$ 500,000") is picked up from anywhere in
/// the paragraph.
fn penalty_rate_clause(
    clause_id: &str,
    paragraph: &Paragraph,
    lower: &str,
    anchor: String,
    parameter: &str,
    default_unit: &str,
) -> MatchOutcome {
    let body = numeric::strip_heading(lower);
    let segment = numeric::after(body, &anchor);

    let Some(rate) = numeric::first_number(segment) else {
        let mut clause = Clause::bare(
            clause_id,
            "penalty",
            paragraph.section_ref.clone(),
            paragraph.text.clone(),
            Confidence::Low,
        );
        clause.anchors_matched = vec![anchor];
        clause.parameter = Some(parameter.to_string());
        return MatchOutcome::degraded(
            clause,
            format!(
                "{}: penalty clause matched but no rate could be extracted",
                paragraph.section_ref.label
            ),
        );
    };

    let unit = numeric::detect_unit(segment);
    let confidence = if unit.is_some() {
        Confidence::High
    } else {
        Confidence::Medium
    };
    let mut clause = bound_clause(
        clause_id,
        "penalty",
        paragraph,
        anchor,
        parameter,
        BoundOperator::Eq,
        rate,
        unit.unwrap_or(default_unit),
        confidence,
    );
    clause.penalty_per_unit = Some(rate);
    if let Some(pos) = lower.find("capped at").or_else(|| lower.find("cap of")) {
        clause.penalty_cap = numeric::first_number(&lower[pos..]);
    }
    clause.period = numeric::detect_period(body);
    MatchOutcome::matched(clause)
}

fn match_demurrage(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(lower, &["demurrage", "despatch", "dispatch money"]) else {
        return MatchOutcome::Skip;
    };

    let outcome = numeric_clause(
        "DEMURRAGE",
        "operations",
        paragraph,
        lower,
        anchor,
        "demurrage_usd_day",
        "$/day",
        BoundOperator::Eq,
    );
    // Demurrage is both a rate clause and a penalty input.
    match outcome {
        MatchOutcome::Match { mut clause, warning } => {
            clause.penalty_per_unit = clause.value;
            MatchOutcome::Match { clause, warning }
        }
        other => other,
    }
}

fn match_laytime(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(lower, &["laytime", "lay time", "time allowed"]) else {
        return MatchOutcome::Skip;
    };
    numeric_clause(
        "LAYTIME",
        "operations",
        paragraph,
        lower,
        anchor,
        "laytime_hours",
        "hours",
        BoundOperator::Eq,
    )
}

fn match_loading_rate(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &["loading rate", "load rate", "discharge rate", "discharging rate"],
    ) else {
        return MatchOutcome::Skip;
    };
    let parameter = if anchor.contains("discharg") {
        "discharge_rate_mt_day"
    } else {
        "loading_rate_mt_day"
    };
    numeric_clause(
        "LOADING_RATE",
        "operations",
        paragraph,
        lower,
        anchor,
        parameter,
        "mt/day",
        BoundOperator::Gte,
    )
}

fn match_quantity_tolerance(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &["quantity tolerance", "more or less", "+/-", "plus or minus"],
    ) else {
        return MatchOutcome::Skip;
    };

    // The tolerance figure sits just before the percent marker; the
    // cargo size earlier in the sentence must not be mistaken for it.
    let body = numeric::strip_heading(lower);
    let pct = numeric::number_before(body, "percent")
        .or_else(|| numeric::number_before(body, "%"));
    if let Some(value) = pct {
        let mut clause = bound_clause(
            "QUANTITY_TOLERANCE",
            "commercial",
            paragraph,
            anchor,
            "quantity_tolerance_pct",
            BoundOperator::Lte,
            value,
            "%",
            Confidence::High,
        );
        if let Some(cargo) = numeric::first_number(body).filter(|v| *v != value) {
            clause
                .extracted_fields
                .insert("cargo_size_mt".to_string(), FieldValue::Number(cargo));
        }
        clause.period = numeric::detect_period(lower);
        return MatchOutcome::matched(clause);
    }

    numeric_clause(
        "QUANTITY_TOLERANCE",
        "commercial",
        paragraph,
        lower,
        anchor,
        "quantity_tolerance_pct",
        "%",
        BoundOperator::Lte,
    )
}

fn match_price(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(lower, &["price basis", "contract price", "price"]) else {
        return MatchOutcome::Skip;
    };
    numeric_clause(
        "PRICE",
        "commercial",
        paragraph,
        lower,
        anchor,
        "price_usd_ton",
        "$/ton",
        BoundOperator::Eq,
    )
}

fn match_payment(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    // "deficiency payment" and friends in a remedies body are penalty
    // language, not payment terms.
    if in_remedies_context(lower) {
        return MatchOutcome::Skip;
    }
    let Some(anchor) = contains_any(
        lower,
        &[
            "payment",
            "letter of credit",
            "telegraphic transfer",
            "cash against documents",
        ],
    ) else {
        return MatchOutcome::Skip;
    };
    numeric_clause(
        "PAYMENT",
        "commercial",
        paragraph,
        lower,
        anchor,
        "payment_days",
        "days",
        BoundOperator::Lte,
    )
}

fn match_delivery_period(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &["delivery period", "shipment period", "delivery window", "laycan"],
    ) else {
        return MatchOutcome::Skip;
    };
    // Delivery windows are never variable bounds; keep the text only.
    let mut clause = Clause::bare(
        "DELIVERY_PERIOD",
        "delivery",
        paragraph.section_ref.clone(),
        paragraph.text.clone(),
        Confidence::High,
    );
    clause.anchors_matched = vec![anchor];
    clause.extracted_fields.insert(
        "window".to_string(),
        FieldValue::Text(paragraph.text.clone()),
    );
    clause.period = numeric::detect_period(lower);
    MatchOutcome::matched(clause)
}

fn match_incoterms(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(lower, &["incoterms", "delivery term", "trade term"]) else {
        return MatchOutcome::Skip;
    };
    let mut clause = Clause::bare(
        "INCOTERMS",
        "commercial",
        paragraph.section_ref.clone(),
        paragraph.text.clone(),
        Confidence::High,
    );
    clause.anchors_matched = vec![anchor];
    const CODES: &[&str] = &["fob", "cfr", "cif", "dap", "ddp", "fca", "exw"];
    if let Some(code) = CODES.iter().find(|c| lower.contains(*c)) {
        clause.extracted_fields.insert(
            "incoterm".to_string(),
            FieldValue::Keyword(code.to_uppercase()),
        );
    } else {
        clause.confidence = Confidence::Medium;
    }
    MatchOutcome::matched(clause)
}

fn match_default_and_remedies(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    let Some(anchor) = contains_any(
        lower,
        &[
            "default and remedies",
            "event of default",
            "failure to perform",
            "remedies",
            "penalty",
        ],
    ) else {
        return MatchOutcome::Skip;
    };
    let mut clause = Clause::bare(
        "DEFAULT_AND_REMEDIES",
        "penalty",
        paragraph.section_ref.clone(),
        paragraph.text.clone(),
        Confidence::High,
    );
    clause.anchors_matched = vec![anchor];
    clause.period = numeric::detect_period(lower);
    MatchOutcome::matched(clause)
}

/// Penalty extraction re-exported for the second pass over
/// DEFAULT_AND_REMEDIES bodies. These skip the remedies-context
/// deferral the first-pass matchers apply.
pub fn match_paragraph_as_shortfall(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    extract_shortfall_penalty(paragraph, lower)
}

pub fn match_paragraph_as_late_delivery(paragraph: &Paragraph, lower: &str) -> MatchOutcome {
    extract_late_delivery_penalty(paragraph, lower)
}

/// Clause ids the specific matchers own; the generic fallback skips them.
const SPECIFIC_IDS: &[&str] = &[
    "PENALTY_VOLUME_SHORTFALL",
    "PENALTY_LATE_DELIVERY",
    "DEMURRAGE",
    "LAYTIME",
    "LOADING_RATE",
    "QUANTITY_TOLERANCE",
    "PRICE",
    "PAYMENT",
    "DELIVERY_PERIOD",
    "INCOTERMS",
    "DEFAULT_AND_REMEDIES",
];

type SpecificMatcher = fn(&Paragraph, &str) -> MatchOutcome;

/// The ordered pipeline. Penalty clauses and rate clauses come before
/// the generic default/remedies language they would otherwise fall into.
const PIPELINE: &[SpecificMatcher] = &[
    match_penalty_volume_shortfall,
    match_penalty_late_delivery,
    match_demurrage,
    match_laytime,
    match_loading_rate,
    match_quantity_tolerance,
    match_price,
    match_payment,
    match_delivery_period,
    match_incoterms,
    match_default_and_remedies,
];

/// Run the full matcher pipeline over one paragraph. The first match
/// wins; registry-only clauses (anchor presence, no numerics) are tried
/// after every specific matcher has passed.
pub fn match_paragraph(registry: &RegistrySnapshot, paragraph: &Paragraph) -> MatchOutcome {
    let lower = paragraph.text.to_lowercase();

    for matcher in PIPELINE {
        match matcher(paragraph, &lower) {
            MatchOutcome::Skip => continue,
            other => return other,
        }
    }

    // Generic anchor matchers for everything else in the registry,
    // including clauses registered at runtime.
    for (clause_id, def) in registry.canonical_clauses() {
        if SPECIFIC_IDS.contains(&clause_id.as_str()) {
            continue;
        }
        if let Some(anchor) = def.anchors.iter().find(|a| lower.contains(a.as_str())) {
            let mut clause = Clause::bare(
                clause_id,
                &def.category,
                paragraph.section_ref.clone(),
                paragraph.text.clone(),
                Confidence::High,
            );
            clause.anchors_matched = vec![anchor.clone()];
            return MatchOutcome::matched(clause);
        }
    }

    MatchOutcome::Skip
}
