//! Canonical clause inventory.
//!
//! Each entry names a provision the parser knows how to recognise, its
//! category, and the anchor phrases that identify it in contract text.
//! Anchors are matched lowercase. Specificity ordering lives in the
//! parser's matcher pipeline, not here.

use serde::{Deserialize, Serialize};

/// Definition of one canonical clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseDef {
    /// Short code, e.g. "PRICE" or "PENALTY_VOLUME_SHORTFALL".
    pub clause_id: String,
    /// Coarse grouping: commercial, delivery, operations, legal,
    /// penalty, environmental.
    pub category: String,
    /// Lowercase phrases whose presence marks a paragraph as this clause.
    pub anchors: Vec<String>,
}

impl ClauseDef {
    pub fn new(clause_id: &str, category: &str, anchors: &[&str]) -> Self {
        Self {
            clause_id: clause_id.to_string(),
            category: category.to_string(),
            anchors: anchors.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// The shipped inventory. 30 entries; the registry accepts more at
/// runtime.
pub fn seed_clauses() -> Vec<ClauseDef> {
    vec![
        ClauseDef::new(
            "INCOTERMS",
            "commercial",
            &["incoterms", "delivery term", "trade term"],
        ),
        ClauseDef::new(
            "PRODUCT_AND_SPECS",
            "commercial",
            &["product specification", "quality specification", "specifications", "anhydrous ammonia"],
        ),
        ClauseDef::new(
            "QUANTITY_TOLERANCE",
            "commercial",
            &["quantity tolerance", "more or less", "+/-", "plus or minus", "at seller's option", "at buyer's option"],
        ),
        ClauseDef::new("PRICE", "commercial", &["price", "price basis", "contract price"]),
        ClauseDef::new(
            "PAYMENT",
            "commercial",
            &["payment", "letter of credit", "telegraphic transfer", "net days", "cash against documents"],
        ),
        ClauseDef::new(
            "DELIVERY_PERIOD",
            "delivery",
            &["delivery period", "shipment period", "delivery window", "laycan"],
        ),
        ClauseDef::new(
            "LOADING_RATE",
            "operations",
            &["loading rate", "load rate", "discharge rate", "discharging rate"],
        ),
        ClauseDef::new(
            "DEMURRAGE",
            "operations",
            &["demurrage", "despatch", "dispatch money"],
        ),
        ClauseDef::new("LAYTIME", "operations", &["laytime", "lay time", "time allowed"]),
        ClauseDef::new(
            "WEIGHT_QUALITY",
            "operations",
            &["weight and quality", "independent surveyor", "draft survey", "sampling and analysis"],
        ),
        ClauseDef::new("INSURANCE", "legal", &["insurance", "insured value", "marine insurance"]),
        ClauseDef::new(
            "FORCE_MAJEURE",
            "legal",
            &["force majeure", "act of god", "beyond the reasonable control"],
        ),
        ClauseDef::new(
            "GOVERNING_LAW",
            "legal",
            &["governing law", "governed by", "construed in accordance"],
        ),
        ClauseDef::new(
            "ARBITRATION",
            "legal",
            &["arbitration", "arbitral tribunal", "lcia", "uncitral", "scma"],
        ),
        ClauseDef::new(
            "SANCTIONS",
            "legal",
            &["sanctions", "ofac", "restricted party", "export control"],
        ),
        ClauseDef::new("ASSIGNMENT", "legal", &["assignment", "assign this contract", "novation"]),
        ClauseDef::new(
            "TITLE_RISK",
            "legal",
            &["title and risk", "risk of loss", "title shall pass", "risk shall pass"],
        ),
        ClauseDef::new("NOTICES", "legal", &["notices", "notice shall be given", "written notice to"]),
        ClauseDef::new(
            "CONFIDENTIALITY",
            "legal",
            &["confidentiality", "confidential information", "non-disclosure"],
        ),
        ClauseDef::new(
            "TERMINATION",
            "legal",
            &["termination", "terminate this contract", "right to terminate"],
        ),
        ClauseDef::new(
            "DEFAULT_AND_REMEDIES",
            "penalty",
            &["default and remedies", "event of default", "remedies", "failure to perform"],
        ),
        ClauseDef::new(
            "TRADE_RULES",
            "legal",
            &["trade rules", "fertilizer trade rules", "gafta", "fosfa"],
        ),
        ClauseDef::new("ORIGIN", "commercial", &["origin", "country of origin", "product origin"]),
        ClauseDef::new(
            "DESTINATION",
            "delivery",
            &["destination", "discharge port", "port of discharge", "delivery point"],
        ),
        ClauseDef::new(
            "NOMINATION",
            "operations",
            &["nomination", "vessel nomination", "nominate the vessel"],
        ),
        ClauseDef::new(
            "SHIPPING_TERMS",
            "delivery",
            &["shipping terms", "freight", "charter party", "bill of lading"],
        ),
        ClauseDef::new(
            "VESSEL_APPROVAL",
            "operations",
            &["vessel approval", "vetting", "acceptable to terminal", "ship inspection"],
        ),
        ClauseDef::new(
            "ENVIRONMENTAL",
            "environmental",
            &["environmental", "emissions", "spill response", "marpol"],
        ),
        ClauseDef::new(
            "PENALTY_VOLUME_SHORTFALL",
            "penalty",
            &["shortfall", "take or pay", "deficiency payment", "failure to lift"],
        ),
        ClauseDef::new(
            "PENALTY_LATE_DELIVERY",
            "penalty",
            &["late delivery", "delay in delivery", "liquidated damages for delay"],
        ),
    ]
}
