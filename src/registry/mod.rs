//! Template and family registry.
//!
//! Holds the canonical clause inventory, the family signatures, and the
//! per-(contract type, incoterm) templates. Seeded at construction;
//! supports dynamic registration at runtime.
//!
//! Readers never lock across work: they take an `Arc` snapshot and keep
//! using it for the whole parser batch, so a registration published
//! mid-batch becomes visible only at the next batch boundary. Writers
//! rebuild the snapshot and publish it atomically.

pub mod clauses;
pub mod families;
pub mod templates;

pub use clauses::ClauseDef;
pub use families::{FamilySignature, Transport};
pub use templates::{ClauseRequirement, RequirementLevel, Template};

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Incoterm, TemplateType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("clause '{0}' is already registered")]
    DuplicateClause(String),

    #[error("family '{0}' is already registered")]
    DuplicateFamily(String),

    #[error("no template registered for ({contract_type}, {incoterm})")]
    TemplateUnknown {
        contract_type: String,
        incoterm: String,
    },

    #[error("clause '{0}' referenced by template is not registered")]
    UnknownClauseRef(String),
}

/// Immutable registry state, shared by readers as one `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    clauses: BTreeMap<String, ClauseDef>,
    families: BTreeMap<String, FamilySignature>,
    templates: Vec<Template>,
    /// Requirement class → the concrete parameter keys the parser may emit.
    parameter_classes: BTreeMap<String, Vec<String>>,
}

impl RegistrySnapshot {
    pub fn canonical_clauses(&self) -> &BTreeMap<String, ClauseDef> {
        &self.clauses
    }

    pub fn family_signatures(&self) -> &BTreeMap<String, FamilySignature> {
        &self.families
    }

    pub fn clause(&self, clause_id: &str) -> Option<&ClauseDef> {
        self.clauses.get(clause_id)
    }

    pub fn get_template(
        &self,
        contract_type: TemplateType,
        incoterm: Incoterm,
    ) -> Result<&Template, RegistryError> {
        self.templates
            .iter()
            .find(|t| t.contract_type == contract_type && t.incoterm == incoterm)
            .ok_or_else(|| RegistryError::TemplateUnknown {
                contract_type: contract_type.to_string(),
                incoterm: incoterm.to_string(),
            })
    }

    pub fn required_clauses(
        &self,
        contract_type: TemplateType,
        incoterm: Incoterm,
    ) -> Result<Vec<&ClauseRequirement>, RegistryError> {
        Ok(self
            .get_template(contract_type, incoterm)?
            .requirements
            .iter()
            .filter(|r| r.level == RequirementLevel::Required)
            .collect())
    }

    /// The concrete parameter keys belonging to a requirement class.
    /// Unknown classes resolve to an empty slice.
    pub fn parameter_class_members(&self, parameter_class: &str) -> &[String] {
        self.parameter_classes
            .get(parameter_class)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Copy-on-write registry. Cheap to clone handles; writes are rare.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    inner: Arc<RwLock<Arc<RegistrySnapshot>>>,
}

impl TemplateRegistry {
    /// Registry seeded with the canonical clause inventory, the seven
    /// families, and the shipped templates.
    pub fn seeded() -> Self {
        let snapshot = RegistrySnapshot {
            clauses: clauses::seed_clauses()
                .into_iter()
                .map(|c| (c.clause_id.clone(), c))
                .collect(),
            families: families::seed_families()
                .into_iter()
                .map(|f| (f.family_id.clone(), f))
                .collect(),
            templates: templates::seed_templates(),
            parameter_classes: templates::seed_parameter_classes(),
        };
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Current published snapshot. Hold it for the whole batch.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Register a new clause definition; visible to readers that take a
    /// snapshot after this call returns.
    pub fn register_clause(&self, def: ClauseDef) -> Result<(), RegistryError> {
        self.publish(|next| {
            if next.clauses.contains_key(&def.clause_id) {
                return Err(RegistryError::DuplicateClause(def.clause_id.clone()));
            }
            tracing::info!(clause_id = %def.clause_id, "registering clause");
            next.clauses.insert(def.clause_id.clone(), def);
            Ok(())
        })
    }

    /// Register a new family signature.
    pub fn register_family(&self, sig: FamilySignature) -> Result<(), RegistryError> {
        self.publish(|next| {
            if next.families.contains_key(&sig.family_id) {
                return Err(RegistryError::DuplicateFamily(sig.family_id.clone()));
            }
            tracing::info!(family_id = %sig.family_id, "registering family");
            next.families.insert(sig.family_id.clone(), sig);
            Ok(())
        })
    }

    /// Register or extend a parameter class.
    pub fn register_parameter_class(&self, class: &str, members: Vec<String>) {
        let _ = self.publish(|next| {
            let entry = next
                .parameter_classes
                .entry(class.to_string())
                .or_default();
            for member in members {
                if !entry.contains(&member) {
                    entry.push(member);
                }
            }
            Ok(())
        });
    }

    fn publish<F>(&self, mutate: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        mutate(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TermType};

    #[test]
    fn seeded_registry_has_canonical_inventory() {
        let registry = TemplateRegistry::seeded();
        let snap = registry.snapshot();
        assert!(
            snap.canonical_clauses().len() >= 30,
            "expected at least 30 canonical clauses, got {}",
            snap.canonical_clauses().len()
        );
        assert_eq!(snap.family_signatures().len(), 7);
    }

    #[test]
    fn known_clause_ids_present() {
        let snap = TemplateRegistry::seeded().snapshot();
        for id in [
            "INCOTERMS",
            "PRICE",
            "QUANTITY_TOLERANCE",
            "DEMURRAGE",
            "LAYTIME",
            "PENALTY_VOLUME_SHORTFALL",
            "PENALTY_LATE_DELIVERY",
            "DEFAULT_AND_REMEDIES",
        ] {
            assert!(snap.clause(id).is_some(), "missing clause {id}");
        }
    }

    #[test]
    fn template_lookup_for_purchase_fob() {
        let snap = TemplateRegistry::seeded().snapshot();
        let template = snap
            .get_template(TemplateType::Purchase, Incoterm::Fob)
            .unwrap();
        assert!(!template.requirements.is_empty());
        let required = snap
            .required_clauses(TemplateType::Purchase, Incoterm::Fob)
            .unwrap();
        assert!(required.len() >= 6, "purchase/FOB should require 6+ clauses");
    }

    #[test]
    fn unknown_template_is_an_error() {
        let snap = TemplateRegistry::seeded().snapshot();
        let err = snap
            .get_template(TemplateType::SpotSale, Incoterm::Exw)
            .unwrap_err();
        assert!(matches!(err, RegistryError::TemplateUnknown { .. }));
    }

    #[test]
    fn parameter_class_members_resolve() {
        let snap = TemplateRegistry::seeded().snapshot();
        let members = snap.parameter_class_members("price");
        assert!(members.contains(&"price_usd_ton".to_string()));
        assert!(snap.parameter_class_members("nonexistent").is_empty());
    }

    #[test]
    fn registration_is_snapshot_isolated() {
        let registry = TemplateRegistry::seeded();
        let before = registry.snapshot();

        registry
            .register_clause(ClauseDef::new(
                "CARBON_INTENSITY",
                "environmental",
                &["carbon intensity", "emissions per ton"],
            ))
            .unwrap();

        // The pre-registration snapshot is unchanged; a fresh snapshot
        // sees the new clause.
        assert!(before.clause("CARBON_INTENSITY").is_none());
        assert!(registry.snapshot().clause("CARBON_INTENSITY").is_some());
    }

    #[test]
    fn duplicate_clause_rejected() {
        let registry = TemplateRegistry::seeded();
        let err = registry
            .register_clause(ClauseDef::new("PRICE", "commercial", &["price"]))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateClause("PRICE".into()));
    }

    #[test]
    fn duplicate_family_rejected() {
        let registry = TemplateRegistry::seeded();
        let sig = FamilySignature {
            family_id: "vessel_purchase_fob".into(),
            direction: Direction::Buy,
            term_type: TermType::LongTerm,
            transport: Transport::Vessel,
            default_incoterms: vec![Incoterm::Fob],
            detect_anchors: vec![],
            expected_clause_ids: vec![],
        };
        let err = registry.register_family(sig).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateFamily("vessel_purchase_fob".into())
        );
    }

    #[test]
    fn register_parameter_class_extends() {
        let registry = TemplateRegistry::seeded();
        registry.register_parameter_class("price", vec!["price_eur_ton".into()]);
        let snap = registry.snapshot();
        let members = snap.parameter_class_members("price");
        assert!(members.contains(&"price_usd_ton".to_string()));
        assert!(members.contains(&"price_eur_ton".to_string()));
    }
}
