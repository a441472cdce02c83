//! Clause model: one recognised provision lifted out of contract text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{BoundOperator, Confidence, Period};

/// Where in the document a clause was found. Ordering follows document
/// order, not the label text, so "Section 10" sorts after "Section 9".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionRef {
    /// Position of the paragraph in the normalised document.
    pub order: u32,
    /// Display label, e.g. "Section 5" or "¶ 12".
    pub label: String,
}

impl SectionRef {
    pub fn new(order: u32, label: impl Into<String>) -> Self {
        Self {
            order,
            label: label.into(),
        }
    }
}

impl std::fmt::Display for SectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// A typed extracted field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// A value drawn from a closed vocabulary (e.g. an incoterm code).
    Keyword(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Keyword(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

/// One recognised provision. `extracted_fields` is immutable once the
/// containing contract version is persisted; changing a field means
/// ingesting a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Canonical short code from the registry (e.g. "PRICE", "DEMURRAGE").
    pub clause_id: String,
    pub category: String,
    pub extracted_fields: BTreeMap<String, FieldValue>,
    pub source_text: String,
    pub section_ref: SectionRef,
    pub anchors_matched: Vec<String>,
    pub confidence: Confidence,

    // Bound-shaped fields, present when the clause constrains a solver
    // variable or carries a penalty rate.
    pub parameter: Option<String>,
    pub operator: Option<BoundOperator>,
    pub value: Option<f64>,
    pub value_upper: Option<f64>,
    pub unit: Option<String>,
    pub penalty_per_unit: Option<f64>,
    pub penalty_cap: Option<f64>,
    pub period: Option<Period>,
}

impl Clause {
    /// Minimal clause for a matched anchor with no extracted bound.
    pub fn bare(
        clause_id: impl Into<String>,
        category: impl Into<String>,
        section_ref: SectionRef,
        source_text: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            clause_id: clause_id.into(),
            category: category.into(),
            extracted_fields: BTreeMap::new(),
            source_text: source_text.into(),
            section_ref,
            anchors_matched: Vec::new(),
            confidence,
            parameter: None,
            operator: None,
            value: None,
            value_upper: None,
            unit: None,
            penalty_per_unit: None,
            penalty_cap: None,
            period: None,
        }
    }

    /// True when this clause carries a complete variable bound.
    pub fn is_bound_shaped(&self) -> bool {
        self.parameter.is_some() && self.operator.is_some() && self.value.is_some()
    }

    /// A value without a unit is an extraction defect; the parser must
    /// never emit one.
    pub fn unit_invariant_holds(&self) -> bool {
        self.value.is_none() || self.unit.is_some()
    }
}
