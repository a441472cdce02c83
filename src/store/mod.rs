//! Versioned in-memory contract store.
//!
//! Single-writer, many-readers: every mutation funnels through the one
//! write lock, so version chaining and the single-active invariant
//! cannot race with themselves. Readers take snapshot clones. Change
//! events are emitted in mutation order while the write lock is held.

pub mod events;

pub use events::{ChangeEvent, ChangeFeed, ChangeKind, ChangeTopic};

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{CanonicalKey, Contract, ReviewStatus, VerificationStatus};
use crate::scanner::KnownFile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("contract '{0}' not found")]
    NotFound(String),

    #[error("illegal review transition {from} -> {to}")]
    InvalidTransition {
        from: ReviewStatus,
        to: ReviewStatus,
    },

    /// A broken internal invariant. Treated as fatal by the owner of
    /// the store; the supervisor restarts from the last durable state.
    #[error("store invariant violated: {0}")]
    InvariantViolated(String),
}

/// What `ingest` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new version was created.
    Created { contract_id: String, version: u32 },
    /// Identical content already ingested for this canonical key; the
    /// existing version was touched as verified instead.
    Unchanged { contract_id: String },
}

#[derive(Default)]
struct StoreState {
    contracts: HashMap<String, Contract>,
    /// Canonical key → contract ids in version order.
    by_canonical: HashMap<CanonicalKey, Vec<String>>,
    by_product_group: HashMap<String, Vec<String>>,
    by_remote_item: HashMap<String, String>,
    by_file_hash: HashMap<String, String>,
}

impl StoreState {
    fn index(&mut self, contract: &Contract) {
        let id = contract.contract_id.clone();
        self.by_canonical
            .entry(contract.canonical_key())
            .or_default()
            .push(id.clone());
        self.by_product_group
            .entry(contract.product_group.to_ascii_lowercase())
            .or_default()
            .push(id.clone());
        if let Some(item_id) = &contract.provenance.remote_item_id {
            self.by_remote_item.insert(item_id.clone(), id.clone());
        }
        self.by_file_hash
            .insert(contract.provenance.file_hash.clone(), id);
    }

    fn latest_in_chain(&self, key: &CanonicalKey) -> Option<&Contract> {
        self.by_canonical
            .get(key)?
            .last()
            .and_then(|id| self.contracts.get(id))
    }
}

/// The store. Cheap to share behind an `Arc`.
pub struct ContractStore {
    state: RwLock<StoreState>,
    feed: ChangeFeed,
}

impl ContractStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            feed: ChangeFeed::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Ingest a parsed contract draft. The store owns version numbering
    /// and the previous-hash chain; whatever the caller put there is
    /// overwritten. Identical content for the same canonical key is a
    /// verification touch, not a new version.
    pub fn ingest(&self, mut contract: Contract) -> Result<IngestOutcome, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let key = contract.canonical_key();

        if let Some(latest) = state.latest_in_chain(&key) {
            if latest.provenance.file_hash == contract.provenance.file_hash {
                let id = latest.contract_id.clone();
                let product_group = latest.product_group.clone();
                let now = Utc::now();
                let existing = state
                    .contracts
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                existing.provenance.last_verified_at = Some(now);
                existing.provenance.verification_status = VerificationStatus::Verified;
                self.feed.emit(
                    &id,
                    &product_group,
                    ChangeKind::VerificationChanged {
                        status: VerificationStatus::Verified,
                    },
                );
                tracing::debug!(contract_id = %id, "identical content re-ingested; verification touched");
                return Ok(IngestOutcome::Unchanged { contract_id: id });
            }

            contract.version = latest.version + 1;
            contract.provenance.previous_hash = latest.provenance.file_hash.clone();

            // A draft or pending predecessor is dead immediately; an
            // approved one stays live until this version is approved.
            let predecessor_id = latest.contract_id.clone();
            let predecessor_status = latest.status;
            if matches!(
                predecessor_status,
                ReviewStatus::Draft | ReviewStatus::PendingReview
            ) {
                let product_group = latest.product_group.clone();
                let predecessor = state
                    .contracts
                    .get_mut(&predecessor_id)
                    .ok_or_else(|| StoreError::NotFound(predecessor_id.clone()))?;
                predecessor.status = ReviewStatus::Superseded;
                self.feed.emit(
                    &predecessor_id,
                    &product_group,
                    ChangeKind::StatusChanged {
                        from: predecessor_status,
                        to: ReviewStatus::Superseded,
                    },
                );
            }
        } else {
            contract.version = 1;
            contract.provenance.previous_hash = String::new();
        }

        contract.status = ReviewStatus::Draft;
        let id = contract.contract_id.clone();
        let version = contract.version;
        let product_group = contract.product_group.clone();

        state.index(&contract);
        state.contracts.insert(id.clone(), contract);
        self.feed
            .emit(&id, &product_group, ChangeKind::Ingested { version });

        tracing::info!(contract_id = %id, version, "contract version ingested");
        Ok(IngestOutcome::Created {
            contract_id: id,
            version,
        })
    }

    pub fn get(&self, contract_id: &str) -> Option<Contract> {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contracts
            .get(contract_id)
            .cloned()
    }

    pub fn find_by_remote_item(&self, item_id: &str) -> Option<Contract> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .by_remote_item
            .get(item_id)
            .and_then(|id| state.contracts.get(id))
            .cloned()
    }

    pub fn find_by_file_hash(&self, file_hash: &str) -> Option<Contract> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .by_file_hash
            .get(file_hash)
            .and_then(|id| state.contracts.get(id))
            .cloned()
    }

    pub fn list_by_product_group(&self, product_group: &str) -> Vec<Contract> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .by_product_group
            .get(&product_group.to_ascii_lowercase())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.contracts.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Approved, unexpired, SAP-validated contracts with an open
    /// position: the set the bridge projects from.
    pub fn list_active_set(&self, product_group: &str, today: NaiveDate) -> Vec<Contract> {
        self.list_by_product_group(product_group)
            .into_iter()
            .filter(|c| c.is_active(today))
            .collect()
    }

    /// Everything the delta scan needs to ask about: the latest version
    /// of each canonical key that came from the remote store.
    pub fn known_files(&self) -> Vec<KnownFile> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .by_canonical
            .values()
            .filter_map(|ids| ids.last())
            .filter_map(|id| state.contracts.get(id))
            .filter_map(|c| {
                let item_id = c.provenance.remote_item_id.clone()?;
                let drive_id = c.provenance.remote_drive_id.clone()?;
                Some(KnownFile {
                    id: c.contract_id.clone(),
                    drive_id,
                    item_id,
                    hash: c.provenance.file_hash.clone(),
                })
            })
            .collect()
    }

    /// Update verification status and timestamp.
    pub fn update_verification(
        &self,
        contract_id: &str,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let contract = state
            .contracts
            .get_mut(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;
        contract.provenance.verification_status = status;
        contract.provenance.last_verified_at = Some(at);
        let product_group = contract.product_group.clone();
        self.feed.emit(
            contract_id,
            &product_group,
            ChangeKind::VerificationChanged { status },
        );
        Ok(())
    }

    /// Apply a review transition. Approval supersedes the currently
    /// approved version of the same canonical key in the same committed
    /// operation; readers never observe two approved versions.
    pub fn apply_review_transition(
        &self,
        contract_id: &str,
        to: ReviewStatus,
        reviewed_by: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());

        let contract = state
            .contracts
            .get(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;
        let from = contract.status;
        let key = contract.canonical_key();
        let product_group = contract.product_group.clone();

        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        if to == ReviewStatus::Approved {
            let chain = state.by_canonical.get(&key).cloned().unwrap_or_default();
            let approved: Vec<String> = chain
                .iter()
                .filter(|id| {
                    id.as_str() != contract_id
                        && state
                            .contracts
                            .get(*id)
                            .map(|c| c.status == ReviewStatus::Approved)
                            .unwrap_or(false)
                })
                .cloned()
                .collect();

            if approved.len() > 1 {
                return Err(StoreError::InvariantViolated(format!(
                    "canonical key {key} already has {} approved versions",
                    approved.len()
                )));
            }

            for old_id in approved {
                let old = state
                    .contracts
                    .get_mut(&old_id)
                    .ok_or_else(|| StoreError::NotFound(old_id.clone()))?;
                old.status = ReviewStatus::Superseded;
                self.feed.emit(
                    &old_id,
                    &product_group,
                    ChangeKind::StatusChanged {
                        from: ReviewStatus::Approved,
                        to: ReviewStatus::Superseded,
                    },
                );
                tracing::info!(
                    contract_id = %old_id,
                    successor = %contract_id,
                    "approved version superseded"
                );
            }
        }

        let contract = state
            .contracts
            .get_mut(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;
        contract.status = to;
        contract.reviewed_by = Some(reviewed_by.to_string());
        contract.reviewed_at = Some(at);
        if notes.is_some() {
            contract.review_notes = notes;
        }

        self.feed
            .emit(contract_id, &product_group, ChangeKind::StatusChanged { from, to });
        Ok(())
    }

    /// Record the outcome of an SAP revalidation.
    pub fn set_sap_validation(
        &self,
        contract_id: &str,
        validated: bool,
        discrepancies: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let contract = state
            .contracts
            .get_mut(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;
        contract.sap_validated = validated;
        contract.sap_discrepancies = discrepancies;
        Ok(())
    }

    /// Set the open position (metric tons remaining on the book).
    pub fn set_open_position(&self, contract_id: &str, mt: f64) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let contract = state
            .contracts
            .get_mut(contract_id)
            .ok_or_else(|| StoreError::NotFound(contract_id.to_string()))?;
        contract.open_position = Some(mt);
        Ok(())
    }

    /// All contracts, for persistence snapshots.
    pub fn all_contracts(&self) -> Vec<Contract> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<Contract> = state.contracts.values().cloned().collect();
        all.sort_by(|a, b| {
            a.contract_id
                .cmp(&b.contract_id)
                .then(a.version.cmp(&b.version))
        });
        all
    }

    /// Rebuild the store from a durable replay. Versions and statuses
    /// are trusted as recorded; indices are rebuilt.
    pub fn restore(&self, contracts: Vec<Contract>) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        *state = StoreState::default();
        let mut sorted = contracts;
        sorted.sort_by(|a, b| a.version.cmp(&b.version));
        for contract in sorted {
            state.index(&contract);
            state
                .contracts
                .insert(contract.contract_id.clone(), contract);
        }
        Ok(())
    }
}

impl Default for ContractStore {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{contract, contract_with_hash};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn approve_path(store: &ContractStore, id: &str) {
        store
            .apply_review_transition(id, ReviewStatus::PendingReview, "trader.a", None, Utc::now())
            .unwrap();
        store
            .apply_review_transition(id, ReviewStatus::Approved, "legal.b", None, Utc::now())
            .unwrap();
    }

    #[test]
    fn first_ingest_creates_version_one() {
        let store = ContractStore::new();
        let outcome = store.ingest(contract("Koch Fertilizer", "ammonia")).unwrap();

        let IngestOutcome::Created { contract_id, version } = outcome else {
            panic!("expected Created");
        };
        assert_eq!(version, 1);

        let stored = store.get(&contract_id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.provenance.previous_hash, "");
        assert_eq!(stored.status, ReviewStatus::Draft);
        assert_eq!(stored.provenance.file_hash, "a1b2");

        let listed = store.list_by_product_group("ammonia");
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn identical_content_is_verification_touch() {
        let store = ContractStore::new();
        let first = store.ingest(contract("Koch Fertilizer", "ammonia")).unwrap();
        let IngestOutcome::Created { contract_id, .. } = first else {
            panic!()
        };

        let again = store.ingest(contract("Koch Fertilizer", "ammonia")).unwrap();
        assert_eq!(
            again,
            IngestOutcome::Unchanged {
                contract_id: contract_id.clone()
            }
        );

        let stored = store.get(&contract_id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(
            stored.provenance.verification_status,
            VerificationStatus::Verified
        );
        assert!(stored.provenance.last_verified_at.is_some());
        assert_eq!(store.list_by_product_group("ammonia").len(), 1);
    }

    #[test]
    fn changed_content_chains_versions() {
        let store = ContractStore::new();
        store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "d3d3"))
            .unwrap();
        let outcome = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "efef"))
            .unwrap();

        let IngestOutcome::Created { contract_id, version } = outcome else {
            panic!()
        };
        assert_eq!(version, 2);
        let v2 = store.get(&contract_id).unwrap();
        assert_eq!(v2.provenance.previous_hash, "d3d3");
    }

    #[test]
    fn draft_predecessor_superseded_immediately() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id: v1, .. } = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "d3d3"))
            .unwrap()
        else {
            panic!()
        };
        store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "efef"))
            .unwrap();

        assert_eq!(store.get(&v1).unwrap().status, ReviewStatus::Superseded);
    }

    #[test]
    fn approved_predecessor_survives_until_successor_approved() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id: v1, .. } = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "d3d3"))
            .unwrap()
        else {
            panic!()
        };
        approve_path(&store, &v1);

        let IngestOutcome::Created { contract_id: v2, .. } = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "efef"))
            .unwrap()
        else {
            panic!()
        };

        // Version 1 remains approved while version 2 is in review.
        assert_eq!(store.get(&v1).unwrap().status, ReviewStatus::Approved);
        assert_eq!(store.get(&v2).unwrap().status, ReviewStatus::Draft);

        approve_path(&store, &v2);
        assert_eq!(store.get(&v1).unwrap().status, ReviewStatus::Superseded);
        assert_eq!(store.get(&v2).unwrap().status, ReviewStatus::Approved);
    }

    #[test]
    fn single_active_invariant_holds_per_canonical_key() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id: v1, .. } = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "h1"))
            .unwrap()
        else {
            panic!()
        };
        approve_path(&store, &v1);
        let IngestOutcome::Created { contract_id: v2, .. } = store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "h2"))
            .unwrap()
        else {
            panic!()
        };
        approve_path(&store, &v2);

        let approved: Vec<Contract> = store
            .list_by_product_group("ammonia")
            .into_iter()
            .filter(|c| c.status == ReviewStatus::Approved)
            .collect();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].contract_id, v2);
    }

    #[test]
    fn rejected_is_terminal() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id, .. } = store
            .ingest(contract("Koch Fertilizer", "ammonia"))
            .unwrap()
        else {
            panic!()
        };
        store
            .apply_review_transition(
                &contract_id,
                ReviewStatus::PendingReview,
                "trader.a",
                None,
                Utc::now(),
            )
            .unwrap();
        store
            .apply_review_transition(
                &contract_id,
                ReviewStatus::Rejected,
                "legal.b",
                Some("missing sanctions clause".into()),
                Utc::now(),
            )
            .unwrap();

        let err = store
            .apply_review_transition(
                &contract_id,
                ReviewStatus::PendingReview,
                "trader.a",
                None,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn active_set_requires_full_activation() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id, .. } = store
            .ingest(contract("Koch Fertilizer", "ammonia"))
            .unwrap()
        else {
            panic!()
        };

        assert!(store.list_active_set("ammonia", today()).is_empty());

        approve_path(&store, &contract_id);
        // Approved but not SAP-validated yet.
        assert!(store.list_active_set("ammonia", today()).is_empty());

        store
            .set_sap_validation(&contract_id, true, Vec::new())
            .unwrap();
        assert_eq!(store.list_active_set("ammonia", today()).len(), 1);
    }

    #[test]
    fn verification_update_and_known_files() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id, .. } = store
            .ingest(contract("Koch Fertilizer", "ammonia"))
            .unwrap()
        else {
            panic!()
        };

        let known = store.known_files();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].id, contract_id);
        assert_eq!(known[0].hash, "a1b2");

        store
            .update_verification(&contract_id, VerificationStatus::FileNotFound, Utc::now())
            .unwrap();
        assert_eq!(
            store.get(&contract_id).unwrap().provenance.verification_status,
            VerificationStatus::FileNotFound
        );
    }

    #[test]
    fn secondary_indices_resolve() {
        let store = ContractStore::new();
        let IngestOutcome::Created { contract_id, .. } = store
            .ingest(contract("Koch Fertilizer", "ammonia"))
            .unwrap()
        else {
            panic!()
        };

        assert_eq!(
            store
                .find_by_file_hash("a1b2")
                .map(|c| c.contract_id),
            Some(contract_id.clone())
        );
        assert_eq!(
            store
                .find_by_remote_item("item-a1b2")
                .map(|c| c.contract_id),
            Some(contract_id)
        );
        assert!(store.find_by_file_hash("zzzz").is_none());
    }

    #[tokio::test]
    async fn change_feed_reflects_mutation_order() {
        let store = ContractStore::new();
        let mut rx = store.subscribe();

        let IngestOutcome::Created { contract_id, .. } = store
            .ingest(contract("Koch Fertilizer", "ammonia"))
            .unwrap()
        else {
            panic!()
        };
        store
            .apply_review_transition(
                &contract_id,
                ReviewStatus::PendingReview,
                "trader.a",
                None,
                Utc::now(),
            )
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first.kind, ChangeKind::Ingested { version: 1 }));
        assert!(matches!(
            second.kind,
            ChangeKind::StatusChanged {
                from: ReviewStatus::Draft,
                to: ReviewStatus::PendingReview,
            }
        ));
    }

    #[test]
    fn different_counterparties_do_not_chain() {
        let store = ContractStore::new();
        store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "h1"))
            .unwrap();
        let outcome = store
            .ingest(contract_with_hash("Yara International", "ammonia", "h2"))
            .unwrap();
        let IngestOutcome::Created { version, .. } = outcome else {
            panic!()
        };
        assert_eq!(version, 1);
    }

    #[test]
    fn restore_rebuilds_state_and_indices() {
        let store = ContractStore::new();
        store
            .ingest(contract_with_hash("Koch Fertilizer", "ammonia", "h1"))
            .unwrap();
        store
            .ingest(contract_with_hash("Yara International", "ammonia", "h2"))
            .unwrap();
        let everything = store.all_contracts();

        let replica = ContractStore::new();
        replica.restore(everything.clone()).unwrap();

        assert_eq!(replica.all_contracts(), everything);
        assert!(replica.find_by_file_hash("h1").is_some());
        assert_eq!(replica.known_files().len(), 2);
    }
}
