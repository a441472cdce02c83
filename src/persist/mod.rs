//! Persistence adapter: write-through from the in-memory stores to the
//! append-only hash-chained log.
//!
//! Producers send full-record snapshots over a bounded channel and
//! await acceptance; when the channel is full they block, so a contract
//! mutation is durable before it becomes observable to new solves. A
//! dedicated writer thread drains the channel and fsyncs every frame.

pub mod wal;

pub use wal::{read_manifest, replay, verify_all, Manifest, WalWriter};

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::Contract;
use crate::solve::audit::AuditRecord;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("persist I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("durable log corrupt: {0}")]
    Corrupt(String),

    #[error("persist writer has shut down")]
    WriterGone,
}

/// One durable frame. Full snapshots, not deltas: replay keeps the
/// last record per contract id and every audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum PersistRecord {
    ContractUpserted { contract: Box<Contract> },
    AuditRecorded { audit: Box<AuditRecord> },
}

/// Producer handle. Clone freely.
#[derive(Clone)]
pub struct PersistAdapter {
    tx: mpsc::Sender<PersistRecord>,
}

impl PersistAdapter {
    /// Spawn the writer thread over `wal` with a bounded queue.
    pub fn spawn(mut wal: WalWriter, capacity: usize) -> (Self, std::thread::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PersistRecord>(capacity);

        let handle = std::thread::Builder::new()
            .name("persist-writer".into())
            .spawn(move || {
                while let Some(record) = rx.blocking_recv() {
                    let payload = match serde_json::to_vec(&record) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(error = %e, "unserialisable persist record dropped");
                            continue;
                        }
                    };
                    if let Err(e) = wal.append(&payload, Utc::now().date_naive()) {
                        // An unwritable log is fatal for durability;
                        // stop accepting rather than lying.
                        tracing::error!(error = %e, "durable log write failed; persist writer stopping");
                        break;
                    }
                }
            })
            .expect("spawn persist writer thread");

        (Self { tx }, handle)
    }

    /// Durably record a contract snapshot. Blocks (asynchronously) when
    /// the writer is behind.
    pub async fn record_contract(&self, contract: Contract) -> Result<(), PersistError> {
        self.tx
            .send(PersistRecord::ContractUpserted {
                contract: Box::new(contract),
            })
            .await
            .map_err(|_| PersistError::WriterGone)
    }

    /// Durably record an audit entry.
    pub async fn record_audit(&self, audit: AuditRecord) -> Result<(), PersistError> {
        self.tx
            .send(PersistRecord::AuditRecorded {
                audit: Box::new(audit),
            })
            .await
            .map_err(|_| PersistError::WriterGone)
    }
}

/// Replayed state, ready to hand to the stores.
#[derive(Debug, Default)]
pub struct RestoredState {
    pub contracts: Vec<Contract>,
    pub audits: Vec<AuditRecord>,
}

/// Replay the durable log into restorable state. Contracts collapse to
/// the last snapshot per contract id, in replay order; audits keep
/// every record.
pub fn restore(root: &Path) -> Result<RestoredState, PersistError> {
    let mut contracts: Vec<Contract> = Vec::new();
    let mut audits = Vec::new();

    for payload in replay(root)? {
        let record: PersistRecord = serde_json::from_slice(&payload)
            .map_err(|e| PersistError::Corrupt(format!("unparseable record: {e}")))?;
        match record {
            PersistRecord::ContractUpserted { contract } => {
                contracts.retain(|c| c.contract_id != contract.contract_id);
                contracts.push(*contract);
            }
            PersistRecord::AuditRecorded { audit } => audits.push(*audit),
        }
    }

    Ok(RestoredState { contracts, audits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{test_support, ContractStore};

    fn wal_in(dir: &Path) -> WalWriter {
        WalWriter::open(dir, Utc::now().date_naive()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn contract_snapshots_survive_restore() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 16);

        let contract = test_support::contract("Koch Fertilizer", "ammonia");
        adapter.record_contract(contract.clone()).await.unwrap();
        drop(adapter);
        handle.join().unwrap();

        let restored = restore(dir.path()).unwrap();
        assert_eq!(restored.contracts.len(), 1);
        assert_eq!(restored.contracts[0].contract_id, contract.contract_id);
        assert!(restored.audits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn later_snapshot_wins_per_contract() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 16);

        let mut contract = test_support::contract("Koch Fertilizer", "ammonia");
        adapter.record_contract(contract.clone()).await.unwrap();
        contract.open_position = Some(12_345.0);
        adapter.record_contract(contract.clone()).await.unwrap();
        drop(adapter);
        handle.join().unwrap();

        let restored = restore(dir.path()).unwrap();
        assert_eq!(restored.contracts.len(), 1);
        assert_eq!(restored.contracts[0].open_position, Some(12_345.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replay_reproduces_store_state() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 16);

        let store = ContractStore::new();
        store
            .ingest(test_support::contract_with_hash("Koch Fertilizer", "ammonia", "h1"))
            .unwrap();
        store
            .ingest(test_support::contract_with_hash("Yara International", "ammonia", "h2"))
            .unwrap();
        for contract in store.all_contracts() {
            adapter.record_contract(contract).await.unwrap();
        }
        drop(adapter);
        handle.join().unwrap();

        let restored = restore(dir.path()).unwrap();
        let replica = ContractStore::new();
        replica.restore(restored.contracts).unwrap();

        assert_eq!(replica.all_contracts(), store.all_contracts());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn audit_records_replay_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 16);

        use crate::solve::audit::test_support::record;
        adapter.record_audit(record("run-1", "trader.alice", 10)).await.unwrap();
        adapter.record_audit(record("run-2", "trader.alice", 20)).await.unwrap();
        drop(adapter);
        handle.join().unwrap();

        let restored = restore(dir.path()).unwrap();
        let ids: Vec<&str> = restored.audits.iter().map(|a| a.run_id.as_str()).collect();
        assert_eq!(ids, vec!["run-1", "run-2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn frames_verify_after_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 4);

        for i in 0..10 {
            let contract = test_support::contract_with_hash(
                "Koch Fertilizer",
                "ammonia",
                &format!("h{i}"),
            );
            adapter.record_contract(contract).await.unwrap();
        }
        drop(adapter);
        handle.join().unwrap();

        assert_eq!(verify_all(dir.path()).unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writer_drains_queue_before_exit() {
        let dir = tempfile::tempdir().unwrap();
        // Capacity 1 forces producers to wait on the writer repeatedly.
        let (adapter, handle) = PersistAdapter::spawn(wal_in(dir.path()), 1);

        for i in 0..5 {
            let contract = test_support::contract_with_hash(
                "Koch Fertilizer",
                "ammonia",
                &format!("q{i}"),
            );
            adapter.record_contract(contract).await.unwrap();
        }
        drop(adapter);
        handle.join().unwrap();

        // Every accepted record reached the log despite the tiny queue.
        assert_eq!(verify_all(dir.path()).unwrap(), 5);
    }
}
