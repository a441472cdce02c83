//! Product-group model descriptors.
//!
//! Each product group the desk trades has one frame: the ordered solver
//! variable keys (which is also the wire order of the variables block),
//! the route count, and the constraint count. The bridge resolves
//! clause parameters against this frame, so adding a product group
//! means adding a model here, not editing the bridge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::SectionRef;

/// One variable the model carries, with its bound sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableSample {
    pub value: f64,
    /// When the upstream source last refreshed this value (unix ms).
    pub updated_at_ms: i64,
}

/// Named variable values flowing into a solve, with source timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    values: BTreeMap<String, VariableSample>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: f64, updated_at_ms: i64) {
        self.values.insert(
            key.to_string(),
            VariableSample {
                value,
                updated_at_ms,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<VariableSample> {
        self.values.get(key).copied()
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).map(|s| s.value)
    }

    /// Replace the value, keeping the source timestamp.
    pub fn clamp_value(&mut self, key: &str, value: f64) {
        if let Some(sample) = self.values.get_mut(key) {
            sample.value = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableSample)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The frame for one product group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductGroupModel {
    pub product_group: String,
    /// Wire order of the variables block sent to the solver.
    pub variables: Vec<String>,
    pub route_count: usize,
    pub constraint_count: usize,
}

impl ProductGroupModel {
    pub fn contains_variable(&self, key: &str) -> bool {
        self.variables.iter().any(|v| v == key)
    }

    /// Variables in wire order, pulling values from the sample set;
    /// absent keys report their position for the caller to diagnose.
    pub fn ordered_values(&self, variables: &Variables) -> Result<Vec<f64>, String> {
        self.variables
            .iter()
            .map(|key| {
                variables
                    .value(key)
                    .ok_or_else(|| format!("variable '{key}' missing from solve input"))
            })
            .collect()
    }
}

/// Registry of product-group models.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, ProductGroupModel>,
}

impl ModelCatalog {
    /// Catalog with the shipped ammonia book.
    pub fn seeded() -> Self {
        let mut catalog = Self::default();
        catalog.insert(ammonia_model());
        catalog
    }

    pub fn insert(&mut self, model: ProductGroupModel) {
        self.models
            .insert(model.product_group.to_ascii_lowercase(), model);
    }

    pub fn get(&self, product_group: &str) -> Option<&ProductGroupModel> {
        self.models.get(&product_group.to_ascii_lowercase())
    }
}

/// The ammonia trading book's frame.
pub fn ammonia_model() -> ProductGroupModel {
    ProductGroupModel {
        product_group: "ammonia".to_string(),
        variables: [
            "price_usd_ton",
            "inv_don",
            "inv_tampa",
            "cargo_size_mt",
            "loading_rate_mt_day",
            "discharge_rate_mt_day",
            "demurrage_usd_day",
            "laytime_hours",
            "quantity_tolerance_pct",
            "payment_days",
            "barge_freight_usd_ton",
            "river_stage_ft",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        route_count: 4,
        constraint_count: 12,
    }
}

/// Where a bound applied to the solver input came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedBound {
    pub parameter: String,
    pub operator: crate::models::BoundOperator,
    pub value: f64,
    pub value_upper: Option<f64>,
    pub contract_id: String,
    pub contract_version: u32,
    pub section_ref: SectionRef,
    /// Set when a conflict forced a choice between clauses.
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ammonia_model_shape() {
        let model = ammonia_model();
        assert_eq!(model.product_group, "ammonia");
        assert!(model.contains_variable("inv_don"));
        assert!(model.contains_variable("price_usd_ton"));
        assert!(!model.contains_variable("shortfall_penalty_usd_ton"));
        assert_eq!(model.route_count, 4);
    }

    #[test]
    fn catalog_lookup_case_insensitive() {
        let catalog = ModelCatalog::seeded();
        assert!(catalog.get("ammonia").is_some());
        assert!(catalog.get("Ammonia").is_some());
        assert!(catalog.get("urea").is_none());
    }

    #[test]
    fn ordered_values_follow_wire_order() {
        let model = ammonia_model();
        let mut variables = Variables::new();
        for (i, key) in model.variables.iter().enumerate() {
            variables.set(key, i as f64, 0);
        }
        let values = model.ordered_values(&variables).unwrap();
        assert_eq!(values.len(), model.variables.len());
        assert_eq!(values[0], 0.0);
        assert_eq!(values[values.len() - 1], (values.len() - 1) as f64);
    }

    #[test]
    fn ordered_values_report_missing_key() {
        let model = ammonia_model();
        let variables = Variables::new();
        let err = model.ordered_values(&variables).unwrap_err();
        assert!(err.contains("price_usd_ton"));
    }

    #[test]
    fn clamp_value_keeps_timestamp() {
        let mut variables = Variables::new();
        variables.set("inv_don", 10_000.0, 1234);
        variables.clamp_value("inv_don", 5_000.0);
        let sample = variables.get("inv_don").unwrap();
        assert_eq!(sample.value, 5_000.0);
        assert_eq!(sample.updated_at_ms, 1234);
    }
}
