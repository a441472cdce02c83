//! Family signatures: coarse contract archetypes used for
//! auto-classification of incoming documents.

use serde::{Deserialize, Serialize};

use crate::models::{Direction, Incoterm, TermType};

/// How the product physically moves under this family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Vessel,
    Barge,
    Rail,
    Truck,
    Multimodal,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vessel => "vessel",
            Self::Barge => "barge",
            Self::Rail => "rail",
            Self::Truck => "truck",
            Self::Multimodal => "multimodal",
        }
    }
}

/// Signature of one contract family. `detect_anchors` are lowercase
/// phrases counted across the whole document; the highest-scoring
/// family above the detection threshold wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySignature {
    pub family_id: String,
    pub direction: Direction,
    pub term_type: TermType,
    pub transport: Transport,
    pub default_incoterms: Vec<Incoterm>,
    pub detect_anchors: Vec<String>,
    pub expected_clause_ids: Vec<String>,
}

fn family(
    family_id: &str,
    direction: Direction,
    term_type: TermType,
    transport: Transport,
    default_incoterms: &[Incoterm],
    detect_anchors: &[&str],
    expected_clause_ids: &[&str],
) -> FamilySignature {
    FamilySignature {
        family_id: family_id.to_string(),
        direction,
        term_type,
        transport,
        default_incoterms: default_incoterms.to_vec(),
        detect_anchors: detect_anchors.iter().map(|s| s.to_string()).collect(),
        expected_clause_ids: expected_clause_ids.iter().map(|s| s.to_string()).collect(),
    }
}

/// The seven registered families.
pub fn seed_families() -> Vec<FamilySignature> {
    vec![
        family(
            "vessel_purchase_fob",
            Direction::Buy,
            TermType::Spot,
            Transport::Vessel,
            &[Incoterm::Fob],
            &["fob", "loading port", "laycan", "vessel nomination", "demurrage", "load port"],
            &[
                "INCOTERMS",
                "PRICE",
                "QUANTITY_TOLERANCE",
                "DELIVERY_PERIOD",
                "LOADING_RATE",
                "DEMURRAGE",
                "LAYTIME",
                "NOMINATION",
            ],
        ),
        family(
            "vessel_sale_cfr",
            Direction::Sell,
            TermType::Spot,
            Transport::Vessel,
            &[Incoterm::Cfr, Incoterm::Cif],
            &["cfr", "cif", "discharge port", "freight", "discharging rate", "destination"],
            &[
                "INCOTERMS",
                "PRICE",
                "QUANTITY_TOLERANCE",
                "DELIVERY_PERIOD",
                "DESTINATION",
                "DEMURRAGE",
                "SHIPPING_TERMS",
            ],
        ),
        family(
            "vessel_dap",
            Direction::Sell,
            TermType::Spot,
            Transport::Vessel,
            &[Incoterm::Dap, Incoterm::Ddp],
            &["dap", "delivered at place", "ddp", "delivered duty paid", "delivery point"],
            &["INCOTERMS", "PRICE", "DELIVERY_PERIOD", "DESTINATION", "TITLE_RISK"],
        ),
        family(
            "domestic_cpt",
            Direction::Sell,
            TermType::Spot,
            Transport::Truck,
            &[Incoterm::Fca, Incoterm::Dap],
            &["carriage paid to", "cpt", "truck", "road transport", "weighbridge"],
            &["INCOTERMS", "PRICE", "QUANTITY_TOLERANCE", "DELIVERY_PERIOD", "WEIGHT_QUALITY"],
        ),
        family(
            "domestic_multimodal",
            Direction::Sell,
            TermType::Spot,
            Transport::Multimodal,
            &[Incoterm::Fca, Incoterm::Dap],
            &["multimodal", "rail car", "railcar", "barge", "terminal transfer", "pipeline"],
            &["INCOTERMS", "PRICE", "DELIVERY_PERIOD", "WEIGHT_QUALITY", "TITLE_RISK"],
        ),
        family(
            "lt_sale_cfr",
            Direction::Sell,
            TermType::LongTerm,
            Transport::Vessel,
            &[Incoterm::Cfr],
            &["contract year", "annual quantity", "evergreen", "cfr", "quarterly nomination", "take or pay"],
            &[
                "INCOTERMS",
                "PRICE",
                "QUANTITY_TOLERANCE",
                "DELIVERY_PERIOD",
                "DESTINATION",
                "DEFAULT_AND_REMEDIES",
                "PENALTY_VOLUME_SHORTFALL",
            ],
        ),
        family(
            "lt_purchase_fob",
            Direction::Buy,
            TermType::LongTerm,
            Transport::Vessel,
            &[Incoterm::Fob],
            &["contract year", "annual quantity", "fob", "loading port", "supply obligation", "take or pay"],
            &[
                "INCOTERMS",
                "PRICE",
                "QUANTITY_TOLERANCE",
                "DELIVERY_PERIOD",
                "LOADING_RATE",
                "DEFAULT_AND_REMEDIES",
                "PENALTY_VOLUME_SHORTFALL",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_seven_families() {
        assert_eq!(seed_families().len(), 7);
    }

    #[test]
    fn family_ids_unique() {
        let families = seed_families();
        let mut ids: Vec<&str> = families.iter().map(|f| f.family_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), families.len());
    }

    #[test]
    fn long_term_families_expect_shortfall_penalty() {
        for f in seed_families() {
            if f.term_type == TermType::LongTerm {
                assert!(
                    f.expected_clause_ids
                        .contains(&"PENALTY_VOLUME_SHORTFALL".to_string()),
                    "{} should expect a shortfall penalty clause",
                    f.family_id
                );
            }
        }
    }

    #[test]
    fn every_family_has_detect_anchors() {
        for f in seed_families() {
            assert!(
                f.detect_anchors.len() >= 4,
                "{} has too few anchors for reliable detection",
                f.family_id
            );
        }
    }
}
