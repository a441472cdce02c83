//! Templates: the clause inventory a contract of a given
//! (contract type, incoterm) pair is expected to carry, with per-clause
//! requirement levels, plus the parameter-class catalogue that maps
//! requirement classes onto the concrete parameter keys the parser emits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Incoterm, TemplateType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementLevel {
    /// Absence blocks submission for review.
    Required,
    /// Absence is a finding, not a blocker.
    Expected,
    Optional,
}

/// One entry of a template's clause inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseRequirement {
    pub clause_type: String,
    /// When set, a satisfying clause must carry a parameter belonging
    /// to this class. When unset, presence of the clause type suffices.
    pub parameter_class: Option<String>,
    pub level: RequirementLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub contract_type: TemplateType,
    pub incoterm: Incoterm,
    pub requirements: Vec<ClauseRequirement>,
}

fn req(clause_type: &str, parameter_class: Option<&str>, level: RequirementLevel, description: &str) -> ClauseRequirement {
    ClauseRequirement {
        clause_type: clause_type.to_string(),
        parameter_class: parameter_class.map(|s| s.to_string()),
        level,
        description: description.to_string(),
    }
}

/// Core commercial requirements shared by every template.
fn commercial_core() -> Vec<ClauseRequirement> {
    use RequirementLevel::*;
    vec![
        req("INCOTERMS", None, Required, "Trade term governing delivery"),
        req("PRODUCT_AND_SPECS", None, Required, "Product and quality specification"),
        req("PRICE", Some("price"), Required, "Contract price with basis"),
        req(
            "QUANTITY_TOLERANCE",
            Some("tolerance"),
            Required,
            "Quantity and permitted tolerance",
        ),
        req("PAYMENT", Some("payment"), Required, "Payment terms"),
        req("DELIVERY_PERIOD", None, Required, "Delivery or shipment window"),
        req("FORCE_MAJEURE", None, Expected, "Force majeure provision"),
        req("GOVERNING_LAW", None, Expected, "Governing law"),
        req("ARBITRATION", None, Optional, "Dispute resolution forum"),
        req("SANCTIONS", None, Expected, "Sanctions compliance"),
        req("TITLE_RISK", None, Expected, "Title and risk transfer"),
    ]
}

/// Vessel-operations requirements used by waterborne templates. All
/// expected rather than required: the commercial core alone decides
/// whether a contract may enter review.
fn vessel_ops() -> Vec<ClauseRequirement> {
    use RequirementLevel::*;
    vec![
        req("LOADING_RATE", Some("loading"), Expected, "Load/discharge rate"),
        req("DEMURRAGE", Some("demurrage"), Expected, "Demurrage rate"),
        req("LAYTIME", Some("laytime"), Expected, "Laytime allowance"),
        req("NOMINATION", None, Expected, "Vessel nomination procedure"),
        req("VESSEL_APPROVAL", None, Optional, "Vessel vetting"),
        req("WEIGHT_QUALITY", None, Expected, "Weight and quality determination"),
    ]
}

fn template(
    contract_type: TemplateType,
    incoterm: Incoterm,
    extra: Vec<ClauseRequirement>,
) -> Template {
    let mut requirements = commercial_core();
    requirements.extend(extra);
    Template {
        contract_type,
        incoterm,
        requirements,
    }
}

/// The shipped templates. Long-term templates additionally require the
/// shortfall penalty machinery that the solver's penalty schedule reads.
pub fn seed_templates() -> Vec<Template> {
    use Incoterm::*;
    use RequirementLevel::*;
    use TemplateType::*;

    let lt_penalties = vec![
        req("DEFAULT_AND_REMEDIES", None, Expected, "Default and remedies"),
        req(
            "PENALTY_VOLUME_SHORTFALL",
            Some("penalty"),
            Expected,
            "Volume shortfall penalty rate",
        ),
        req(
            "PENALTY_LATE_DELIVERY",
            Some("penalty"),
            Optional,
            "Late delivery penalty rate",
        ),
    ];

    vec![
        // Long-term purchase, waterborne.
        template(Purchase, Fob, {
            let mut v = vessel_ops();
            v.extend(lt_penalties.clone());
            v
        }),
        template(Purchase, Cfr, {
            let mut v = vessel_ops();
            v.extend(lt_penalties.clone());
            v
        }),
        template(Purchase, Cif, {
            let mut v = vessel_ops();
            v.push(req("INSURANCE", None, Required, "Marine insurance"));
            v.extend(lt_penalties.clone());
            v
        }),
        // Long-term sale.
        template(Sale, Cfr, {
            let mut v = vessel_ops();
            v.push(req("DESTINATION", None, Required, "Discharge port"));
            v.extend(lt_penalties.clone());
            v
        }),
        template(Sale, Cif, {
            let mut v = vessel_ops();
            v.push(req("DESTINATION", None, Required, "Discharge port"));
            v.push(req("INSURANCE", None, Required, "Marine insurance"));
            v.extend(lt_penalties.clone());
            v
        }),
        template(Sale, Dap, vec![
            req("DESTINATION", None, Required, "Delivery point"),
            req("WEIGHT_QUALITY", None, Expected, "Weight and quality determination"),
        ]),
        // Spot purchase.
        template(SpotPurchase, Fob, vessel_ops()),
        template(SpotPurchase, Cfr, vessel_ops()),
        // Spot sale.
        template(SpotSale, Cfr, {
            let mut v = vessel_ops();
            v.push(req("DESTINATION", None, Required, "Discharge port"));
            v
        }),
        template(SpotSale, Dap, vec![
            req("DESTINATION", None, Required, "Delivery point"),
            req("WEIGHT_QUALITY", None, Expected, "Weight and quality determination"),
        ]),
        template(SpotSale, Fca, vec![
            req("WEIGHT_QUALITY", None, Expected, "Weight and quality determination"),
        ]),
    ]
}

/// Requirement classes → the concrete parameter keys the parser may
/// emit for them. The bridge never consults this table; it exists for
/// template validation only.
pub fn seed_parameter_classes() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("price", &["price_usd_ton"]),
        ("volume", &["cargo_size_mt", "annual_volume_mt", "monthly_volume_mt"]),
        ("tolerance", &["quantity_tolerance_pct"]),
        ("payment", &["payment_days"]),
        ("loading", &["loading_rate_mt_day", "discharge_rate_mt_day"]),
        ("demurrage", &["demurrage_usd_day"]),
        ("laytime", &["laytime_hours"]),
        (
            "penalty",
            &["shortfall_penalty_usd_ton", "late_delivery_penalty_usd_day"],
        ),
    ];

    entries
        .iter()
        .map(|(class, members)| {
            (
                class.to_string(),
                members.iter().map(|m| m.to_string()).collect(),
            )
        })
        .collect()
}
