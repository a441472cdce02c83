//! Deterministic clause parser.
//!
//! Normalise → segment → match → penalty second pass → dedupe. The
//! whole pass is a pure function of the input text and the registry
//! snapshot taken at entry, so a registration published mid-batch never
//! changes results within the batch.

pub mod dedupe;
pub mod family;
pub mod matchers;
pub mod normalize;
pub mod numeric;

pub use matchers::MatchOutcome;
pub use normalize::Paragraph;

use serde::{Deserialize, Serialize};

use crate::models::{Clause, SectionRef};
use crate::registry::TemplateRegistry;

/// A paragraph the parser could not turn into a usable clause,
/// preserved for human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub section_ref: SectionRef,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.section_ref.label, self.reason)
    }
}

/// Everything one parse produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub clauses: Vec<Clause>,
    pub warnings: Vec<ParseWarning>,
    pub family_id: Option<String>,
}

/// The deterministic parser. Cheap to construct per batch; holds the
/// registry handle and snapshots it once per `parse` call.
#[derive(Clone)]
pub struct ClauseParser {
    registry: TemplateRegistry,
}

impl ClauseParser {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    /// Parse normalised document text into clauses and warnings, both
    /// ordered by section position.
    pub fn parse(&self, text: &str) -> ParseOutput {
        let snapshot = self.registry.snapshot();

        let normalized = normalize::normalize(text);
        let paragraphs = normalize::segment(&normalized);

        let mut clauses: Vec<Clause> = Vec::new();
        let mut warnings: Vec<ParseWarning> = Vec::new();

        for paragraph in &paragraphs {
            match matchers::match_paragraph(&snapshot, paragraph) {
                MatchOutcome::Match { clause, warning } => {
                    if let Some(reason) = warning {
                        warnings.push(ParseWarning {
                            section_ref: paragraph.section_ref.clone(),
                            reason,
                        });
                    }
                    clauses.push(*clause);
                }
                MatchOutcome::Warn(reason) => {
                    warnings.push(ParseWarning {
                        section_ref: paragraph.section_ref.clone(),
                        reason,
                    });
                }
                MatchOutcome::Skip => {}
            }
        }

        let extra = family::expand_penalty_subclauses(&clauses);
        clauses.extend(extra);

        let clauses = dedupe::dedupe(clauses);
        warnings.sort_by(|a, b| a.section_ref.cmp(&b.section_ref));

        let family_id = family::detect_family(&snapshot, &normalized);

        tracing::debug!(
            clause_count = clauses.len(),
            warning_count = warnings.len(),
            family_id = family_id.as_deref().unwrap_or("none"),
            "parse complete"
        );

        ParseOutput {
            clauses,
            warnings,
            family_id,
        }
    }
}
