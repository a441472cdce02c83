//! Open book aggregation across the active set.

use serde::{Deserialize, Serialize};

use crate::models::{Contract, Direction};

use super::penalties::PenaltyScheduleEntry;

/// Per-direction open quantities and total penalty exposure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenBook {
    pub total_purchase_obligation: f64,
    pub total_sale_obligation: f64,
    /// Purchases minus sales; positive means net long obligations.
    pub net_open_position: f64,
    pub total_penalty_exposure: f64,
}

/// Sum the active set's open quantities and the schedule's exposures.
pub fn aggregate(contracts: &[Contract], penalties: &[PenaltyScheduleEntry]) -> OpenBook {
    let mut book = OpenBook::default();

    for contract in contracts {
        let open = contract.open_position.unwrap_or(0.0);
        match contract.template_type.direction() {
            Direction::Buy => book.total_purchase_obligation += open,
            Direction::Sell => book.total_sale_obligation += open,
        }
    }

    book.net_open_position = book.total_purchase_obligation - book.total_sale_obligation;
    book.total_penalty_exposure = penalties.iter().map(|e| e.max_exposure).sum();
    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PenaltyType, TemplateType};
    use crate::store::test_support;

    #[test]
    fn directions_aggregate_separately() {
        let mut buy = test_support::contract_with_hash("Koch Fertilizer", "ammonia", "h1");
        buy.open_position = Some(40_000.0);
        let mut sell = test_support::contract_with_hash("Mosaic", "ammonia", "h2");
        sell.template_type = TemplateType::Sale;
        sell.open_position = Some(25_000.0);

        let book = aggregate(&[buy, sell], &[]);
        assert_eq!(book.total_purchase_obligation, 40_000.0);
        assert_eq!(book.total_sale_obligation, 25_000.0);
        assert_eq!(book.net_open_position, 15_000.0);
        assert_eq!(book.total_penalty_exposure, 0.0);
    }

    #[test]
    fn penalty_exposure_sums_schedule() {
        let entry = |exposure: f64| PenaltyScheduleEntry {
            counterparty: "Koch Fertilizer".into(),
            penalty_type: PenaltyType::VolumeShortfall,
            rate_per_ton: 25.0,
            open_qty: 1.0,
            max_exposure: exposure,
            incoterm: None,
            direction: crate::models::Direction::Buy,
        };
        let book = aggregate(&[], &[entry(1_000_000.0), entry(250_000.0)]);
        assert_eq!(book.total_penalty_exposure, 1_250_000.0);
    }

    #[test]
    fn empty_book_is_zero() {
        let book = aggregate(&[], &[]);
        assert_eq!(book, OpenBook::default());
    }
}
