//! Solve audit log.
//!
//! One immutable record per solve invocation, indexed four ways:
//! contract, trader, time range, product group. Records are appended in
//! completion order and never updated or deleted. Aggregation views sit
//! on top of the indices; none of them mutate.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ContractSnapshot;
use crate::solver::model::AppliedBound;

/// Who initiated the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Auto,
    Trader,
}

/// Terminal status of the solve phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Optimal,
    Infeasible,
    Error,
    Cancelled,
}

/// One variable as the solve saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVariable {
    pub key: String,
    pub value: f64,
    pub source_updated_at_ms: i64,
}

/// The immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: String,
    pub product_group: String,
    pub trader_id: String,
    pub kind: RunKind,

    pub contracts_used: Vec<ContractSnapshot>,
    pub variables: Vec<AuditVariable>,
    pub applied_bounds: Vec<AppliedBound>,

    pub result_status: ResultStatus,
    /// Solver result payload when one exists, serialised.
    pub result: Option<serde_json::Value>,

    pub contracts_stale: bool,
    pub stale_reason: Option<String>,
    pub readiness_issues: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub contracts_checked_at: DateTime<Utc>,
    pub ingestion_completed_at: DateTime<Utc>,
    pub solve_started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Phase timestamps must be monotone.
    pub fn timestamps_monotone(&self) -> bool {
        self.started_at <= self.contracts_checked_at
            && self.contracts_checked_at <= self.ingestion_completed_at
            && self.ingestion_completed_at <= self.solve_started_at
            && self.solve_started_at <= self.completed_at
    }
}

#[derive(Default)]
struct AuditIndices {
    records: Vec<AuditRecord>,
    by_contract: HashMap<String, Vec<usize>>,
    by_trader: HashMap<String, Vec<usize>>,
    by_product_group: HashMap<String, Vec<usize>>,
    by_run_id: HashMap<String, usize>,
}

/// The log. Append-only; queries return clones.
pub struct AuditLog {
    inner: RwLock<AuditIndices>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AuditIndices::default()),
        }
    }

    /// Append one record. Appends arrive in completion order; the log
    /// refuses regressions so time-range scans stay monotone.
    pub fn append(&self, record: AuditRecord) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());

        if let Some(last) = inner.records.last() {
            debug_assert!(
                last.completed_at <= record.completed_at,
                "audit appends must be monotone in completed_at"
            );
        }

        let idx = inner.records.len();
        for snapshot in &record.contracts_used {
            inner
                .by_contract
                .entry(snapshot.contract_id.clone())
                .or_default()
                .push(idx);
        }
        inner
            .by_trader
            .entry(record.trader_id.clone())
            .or_default()
            .push(idx);
        inner
            .by_product_group
            .entry(record.product_group.clone())
            .or_default()
            .push(idx);
        inner.by_run_id.insert(record.run_id.clone(), idx);
        inner.records.push(record);
    }

    pub fn get(&self, run_id: &str) -> Option<AuditRecord> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner
            .by_run_id
            .get(run_id)
            .and_then(|&i| inner.records.get(i))
            .cloned()
    }

    /// Every solve that used the given contract.
    pub fn for_contract(&self, contract_id: &str) -> Vec<AuditRecord> {
        self.select(|inner| inner.by_contract.get(contract_id).cloned())
    }

    pub fn for_trader(&self, trader_id: &str) -> Vec<AuditRecord> {
        self.select(|inner| inner.by_trader.get(trader_id).cloned())
    }

    pub fn for_product_group(&self, product_group: &str) -> Vec<AuditRecord> {
        self.select(|inner| inner.by_product_group.get(product_group).cloned())
    }

    pub fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditRecord> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner
            .records
            .iter()
            .filter(|r| r.completed_at >= from && r.completed_at < to)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<AuditRecord> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .records
            .clone()
    }

    fn select(&self, pick: impl Fn(&AuditIndices) -> Option<Vec<usize>>) -> Vec<AuditRecord> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        pick(&inner)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| inner.records.get(i))
            .cloned()
            .collect()
    }

    // ── Aggregation views ────────────────────────────────────────────

    /// A trader's solves in completion order: the decision chain a
    /// desk head reviews.
    pub fn trader_decision_chain(&self, trader_id: &str) -> Vec<AuditRecord> {
        // Index order is append order, already monotone.
        self.for_trader(trader_id)
    }

    /// Every solve of a product group in completion order.
    pub fn product_group_timeline(&self, product_group: &str) -> Vec<AuditRecord> {
        self.for_product_group(product_group)
    }

    /// Alignment between an automatic solve and a trader-edited one:
    /// the fraction of shared variables with equal values, weighted
    /// with agreement on the result status. 1.0 means the trader's
    /// path matched the automatic path exactly.
    pub fn compare_paths(&self, auto_run: &str, trader_run: &str) -> Option<f64> {
        let a = self.get(auto_run)?;
        let b = self.get(trader_run)?;

        let a_vars: HashMap<&str, f64> =
            a.variables.iter().map(|v| (v.key.as_str(), v.value)).collect();
        let shared: Vec<(&str, f64)> = b
            .variables
            .iter()
            .filter_map(|v| a_vars.get(v.key.as_str()).map(|&av| (v.key.as_str(), av - v.value)))
            .collect();

        if shared.is_empty() {
            return Some(if a.result_status == b.result_status {
                1.0
            } else {
                0.0
            });
        }

        let matching = shared
            .iter()
            .filter(|(_, delta)| delta.abs() < f64::EPSILON)
            .count();
        let variable_score = matching as f64 / shared.len() as f64;
        let status_score = if a.result_status == b.result_status {
            1.0
        } else {
            0.0
        };
        Some(variable_score * 0.8 + status_score * 0.2)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn record(run_id: &str, trader: &str, completed_offset_secs: i64) -> AuditRecord {
        let base: DateTime<Utc> = "2026-06-01T12:00:00Z".parse().unwrap();
        let completed = base + chrono::Duration::seconds(completed_offset_secs);
        AuditRecord {
            run_id: run_id.to_string(),
            product_group: "ammonia".into(),
            trader_id: trader.to_string(),
            kind: RunKind::Trader,
            contracts_used: vec![ContractSnapshot {
                contract_id: "c42".into(),
                version: 2,
                counterparty: "Koch Fertilizer".into(),
                file_hash: "efef".into(),
            }],
            variables: vec![AuditVariable {
                key: "inv_don".into(),
                value: 10_000.0,
                source_updated_at_ms: 0,
            }],
            applied_bounds: Vec::new(),
            result_status: ResultStatus::Optimal,
            result: None,
            contracts_stale: false,
            stale_reason: None,
            readiness_issues: Vec::new(),
            started_at: base,
            contracts_checked_at: base + chrono::Duration::seconds(1),
            ingestion_completed_at: base + chrono::Duration::seconds(2),
            solve_started_at: base + chrono::Duration::seconds(3),
            completed_at: completed.max(base + chrono::Duration::seconds(4)),
        }
    }
}
