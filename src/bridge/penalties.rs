//! Penalty schedule extraction.
//!
//! Penalties adjust the solver objective; they are not bounds and never
//! touch the variables block. One entry per (contract, penalty type)
//! where the named clause carries a rate.

use serde::{Deserialize, Serialize};

use crate::models::{Contract, Direction, Incoterm, PenaltyType};

/// One row of the penalty schedule consumed by the solver objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyScheduleEntry {
    pub counterparty: String,
    pub penalty_type: PenaltyType,
    pub rate_per_ton: f64,
    /// Open quantity on the book (MT).
    pub open_qty: f64,
    /// `rate_per_ton` x `open_qty`.
    pub max_exposure: f64,
    pub incoterm: Option<Incoterm>,
    pub direction: Direction,
}

/// Which clause feeds which penalty type.
const PENALTY_SOURCES: &[(PenaltyType, &str)] = &[
    (PenaltyType::VolumeShortfall, "PENALTY_VOLUME_SHORTFALL"),
    (PenaltyType::LateDelivery, "PENALTY_LATE_DELIVERY"),
    (PenaltyType::Demurrage, "DEMURRAGE"),
];

/// Extract the penalty schedule from the active set.
pub fn penalty_schedule(contracts: &[Contract]) -> Vec<PenaltyScheduleEntry> {
    let mut entries = Vec::new();

    for contract in contracts {
        let open_qty = contract.open_position.unwrap_or(0.0);
        for (penalty_type, clause_id) in PENALTY_SOURCES {
            let Some(rate) = contract
                .clauses
                .iter()
                .find(|c| c.clause_id == *clause_id)
                .and_then(|c| c.penalty_per_unit)
            else {
                continue;
            };

            entries.push(PenaltyScheduleEntry {
                counterparty: contract.counterparty.clone(),
                penalty_type: *penalty_type,
                rate_per_ton: rate,
                open_qty,
                max_exposure: rate * open_qty,
                incoterm: contract.incoterm,
                direction: contract.template_type.direction(),
            });
        }
    }

    entries
}
