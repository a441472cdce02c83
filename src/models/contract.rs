//! Contract model: one versioned agreement with a counterparty, from
//! source-file provenance through review state to parsed clauses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::clause::Clause;
use super::enums::{
    CounterpartyType, Incoterm, ReviewStatus, SourceFormat, TemplateType, TermType,
    VerificationStatus,
};

/// The identity under which contract versions chain: at most one
/// approved contract may exist per canonical key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub counterparty: String,
    pub product_group: String,
}

impl CanonicalKey {
    pub fn new(counterparty: &str, product_group: &str) -> Self {
        Self {
            counterparty: normalize_counterparty(counterparty),
            product_group: product_group.trim().to_ascii_lowercase(),
        }
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.counterparty, self.product_group)
    }
}

/// Normalise a counterparty name for identity purposes: lowercase,
/// punctuation stripped, whitespace collapsed, common legal suffixes
/// dropped ("Koch Fertilizer, LLC" and "KOCH FERTILIZER" chain together).
pub fn normalize_counterparty(name: &str) -> String {
    const LEGAL_SUFFIXES: &[&str] = &[
        "llc", "inc", "ltd", "gmbh", "sa", "ag", "bv", "plc", "corp", "co",
    ];

    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = words.last() {
        if words.len() > 1 && LEGAL_SUFFIXES.contains(last) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

/// Where the source file came from and how current we believe it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_file_name: String,
    pub source_format: SourceFormat,
    pub file_size_bytes: u64,
    /// SHA-256 over the raw source bytes, hex-lowercase.
    pub file_hash: String,
    /// `file_hash` of the immediately prior version for the same
    /// canonical key; empty for version 1.
    pub previous_hash: String,
    pub remote_item_id: Option<String>,
    pub remote_drive_id: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub verification_status: VerificationStatus,
}

/// One logical agreement with a counterparty, at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Stable opaque id for this version record.
    pub contract_id: String,
    /// Monotonic per canonical key; re-ingest always increments.
    pub version: u32,
    pub provenance: Provenance,

    // Classification
    pub template_type: TemplateType,
    pub incoterm: Option<Incoterm>,
    /// One of the registered family ids, when detection succeeded.
    pub family_id: Option<String>,
    pub term_type: TermType,
    /// Contracting entity on our side of the deal.
    pub company: Option<String>,

    // Commercial
    pub contract_number: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub counterparty: String,
    pub counterparty_type: CounterpartyType,
    pub product_group: String,
    /// Metric tons remaining on the book, when operations has set it.
    pub open_position: Option<f64>,

    // Review
    pub status: ReviewStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub sap_validated: bool,
    pub sap_discrepancies: Vec<String>,

    // Content
    pub clauses: Vec<Clause>,
    /// Parser warnings retained for the reviewer (section ref + reason).
    pub parse_warnings: Vec<String>,
    /// Structured diff against the LLM second pass, when one ran.
    pub llm_crosscheck: Option<serde_json::Value>,

    pub ingested_at: DateTime<Utc>,
}

impl Contract {
    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(&self.counterparty, &self.product_group)
    }

    /// Membership test for the active set: approved, unexpired,
    /// SAP-validated, with an open position on the book.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status == ReviewStatus::Approved
            && self.sap_validated
            && self.open_position.is_some()
            && self.expiry_date.map(|d| d > today).unwrap_or(false)
    }
}

/// Snapshot of a contract as used by one solve, embedded in the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub contract_id: String,
    pub version: u32,
    pub counterparty: String,
    pub file_hash: String,
}

impl From<&Contract> for ContractSnapshot {
    fn from(c: &Contract) -> Self {
        Self {
            contract_id: c.contract_id.clone(),
            version: c.version,
            counterparty: c.counterparty.clone(),
            file_hash: c.provenance.file_hash.clone(),
        }
    }
}
