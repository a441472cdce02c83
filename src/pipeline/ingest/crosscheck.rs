//! Cross-check between the deterministic parse and the LLM second pass.
//!
//! The deterministic parser stays authoritative; this report is what an
//! operator reads to decide whether a disagreement warrants a closer
//! look at the document.

use serde::{Deserialize, Serialize};

use crate::models::Clause;

use super::llm::LlmExtraction;

/// A clause id where both passes found a value but disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMismatch {
    pub clause_id: String,
    pub deterministic: f64,
    pub llm: f64,
}

/// The structured diff stored on the contract version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosscheckReport {
    /// Clause ids both passes agree on.
    pub matched: Vec<String>,
    /// Found deterministically, absent from the LLM output.
    pub only_deterministic: Vec<String>,
    /// Reported by the LLM, not matched deterministically.
    pub only_llm: Vec<String>,
    pub value_mismatches: Vec<ValueMismatch>,
    /// Family ids when the two passes disagree.
    pub family_disagreement: Option<(Option<String>, Option<String>)>,
}

impl CrosscheckReport {
    pub fn is_clean(&self) -> bool {
        self.only_deterministic.is_empty()
            && self.only_llm.is_empty()
            && self.value_mismatches.is_empty()
            && self.family_disagreement.is_none()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Diff the two passes by clause id; values compare with a small
/// relative tolerance so formatting noise does not read as conflict.
pub fn crosscheck(
    deterministic: &[Clause],
    deterministic_family: Option<&str>,
    llm: &LlmExtraction,
) -> CrosscheckReport {
    let mut report = CrosscheckReport::default();

    for clause in deterministic {
        match llm.clauses.iter().find(|l| l.clause_id == clause.clause_id) {
            None => report.only_deterministic.push(clause.clause_id.clone()),
            Some(llm_clause) => {
                report.matched.push(clause.clause_id.clone());
                if let (Some(det), Some(model)) = (clause.value, llm_clause.value) {
                    let scale = det.abs().max(1.0);
                    if (det - model).abs() / scale > 1e-6 {
                        report.value_mismatches.push(ValueMismatch {
                            clause_id: clause.clause_id.clone(),
                            deterministic: det,
                            llm: model,
                        });
                    }
                }
            }
        }
    }

    for llm_clause in &llm.clauses {
        if !deterministic
            .iter()
            .any(|c| c.clause_id == llm_clause.clause_id)
        {
            report.only_llm.push(llm_clause.clause_id.clone());
        }
    }

    let llm_family = llm.family_id.as_deref();
    if deterministic_family != llm_family {
        report.family_disagreement = Some((
            deterministic_family.map(|s| s.to_string()),
            llm_family.map(|s| s.to_string()),
        ));
    }

    if !report.is_clean() {
        tracing::debug!(
            only_deterministic = report.only_deterministic.len(),
            only_llm = report.only_llm.len(),
            mismatches = report.value_mismatches.len(),
            "cross-check found disagreements"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, SectionRef};
    use crate::pipeline::ingest::llm::LlmClause;

    fn det_clause(id: &str, value: Option<f64>) -> Clause {
        let mut c = Clause::bare(
            id,
            "commercial",
            SectionRef::new(5, "Section 5"),
            "text",
            Confidence::High,
        );
        c.value = value;
        if value.is_some() {
            c.unit = Some("$/ton".into());
        }
        c
    }

    fn llm_clause(id: &str, value: Option<f64>) -> LlmClause {
        LlmClause {
            clause_id: id.into(),
            parameter: None,
            operator: None,
            value,
            unit: None,
            section_ref: None,
            confidence: None,
        }
    }

    #[test]
    fn agreement_is_clean() {
        let det = vec![det_clause("PRICE", Some(335.0))];
        let llm = LlmExtraction {
            clauses: vec![llm_clause("PRICE", Some(335.0))],
            family_id: Some("vessel_purchase_fob".into()),
        };
        let report = crosscheck(&det, Some("vessel_purchase_fob"), &llm);
        assert!(report.is_clean());
        assert_eq!(report.matched, vec!["PRICE"]);
    }

    #[test]
    fn value_disagreement_reported() {
        let det = vec![det_clause("PRICE", Some(335.0))];
        let llm = LlmExtraction {
            clauses: vec![llm_clause("PRICE", Some(353.0))],
            family_id: None,
        };
        let report = crosscheck(&det, None, &llm);
        assert_eq!(report.value_mismatches.len(), 1);
        assert_eq!(report.value_mismatches[0].deterministic, 335.0);
        assert_eq!(report.value_mismatches[0].llm, 353.0);
    }

    #[test]
    fn one_sided_findings_reported() {
        let det = vec![det_clause("PRICE", Some(335.0)), det_clause("PAYMENT", Some(30.0))];
        let llm = LlmExtraction {
            clauses: vec![llm_clause("PRICE", Some(335.0)), llm_clause("SANCTIONS", None)],
            family_id: None,
        };
        let report = crosscheck(&det, None, &llm);
        assert_eq!(report.only_deterministic, vec!["PAYMENT"]);
        assert_eq!(report.only_llm, vec!["SANCTIONS"]);
    }

    #[test]
    fn family_disagreement_captured() {
        let report = crosscheck(
            &[],
            Some("vessel_purchase_fob"),
            &LlmExtraction {
                clauses: vec![],
                family_id: Some("lt_purchase_fob".into()),
            },
        );
        assert_eq!(
            report.family_disagreement,
            Some((
                Some("vessel_purchase_fob".to_string()),
                Some("lt_purchase_fob".to_string())
            ))
        );
    }

    #[test]
    fn tiny_float_noise_not_a_mismatch() {
        let det = vec![det_clause("PRICE", Some(335.0))];
        let llm = LlmExtraction {
            clauses: vec![llm_clause("PRICE", Some(335.0000001))],
            family_id: None,
        };
        let report = crosscheck(&det, None, &llm);
        assert!(report.value_mismatches.is_empty());
    }
}
