//! Solve pipeline: freshness check → conditional ingest → projection →
//! solve → audit.
//!
//! Phases are strictly sequential. At most one solve runs per product
//! group; later requests for the same group queue. Cancellation is
//! cooperative and honoured only before the solve phase starts; an
//! in-flight ingest is never interrupted.

pub mod audit;

pub use audit::{AuditLog, AuditRecord, AuditVariable, ResultStatus, RunKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::bridge::{BridgeError, ConstraintBridge};
use crate::persist::PersistAdapter;
use crate::pipeline::ingest::Ingestor;
use crate::readiness::ReadinessGate;
use crate::solver::model::{ModelCatalog, Variables};
use crate::solver::{MonteCarloOutcome, SolveOutcome, SolverError, SolverPort};
use crate::store::ContractStore;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("product group '{0}' has no solver model")]
    UnknownProductGroup(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Options for one solve request.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub trader_id: String,
    pub kind: RunKind,
    /// Skip the contracts freshness check. The solve then runs as an
    /// explicitly stale-data solve and the audit says so.
    pub skip_contracts_check: bool,
    /// Run a monte-carlo sweep instead of a single solve.
    pub monte_carlo: Option<u32>,
}

impl SolveOptions {
    pub fn trader(trader_id: &str) -> Self {
        Self {
            trader_id: trader_id.to_string(),
            kind: RunKind::Trader,
            skip_contracts_check: false,
            monte_carlo: None,
        }
    }
}

/// Cooperative cancellation handle.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress events broadcast to the UI and any other observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Started {
        run_id: String,
        product_group: String,
    },
    Ingesting {
        run_id: String,
    },
    IngestDone {
        run_id: String,
    },
    ContractsStale {
        run_id: String,
        reason: String,
    },
    PipelineError {
        run_id: String,
        phase: &'static str,
        error: String,
    },
    SolveDone {
        run_id: String,
        contracts_stale: bool,
        result_status: ResultStatus,
    },
}

/// The pipeline. Share behind an `Arc`.
pub struct SolvePipeline {
    store: Arc<ContractStore>,
    ingestor: Option<Arc<Ingestor>>,
    gate: Arc<ReadinessGate>,
    bridge: Arc<ConstraintBridge>,
    port: Arc<SolverPort>,
    catalog: ModelCatalog,
    audit: Arc<AuditLog>,
    persist: Option<PersistAdapter>,
    events: broadcast::Sender<PipelineEvent>,
    group_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SolvePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ContractStore>,
        ingestor: Option<Arc<Ingestor>>,
        gate: Arc<ReadinessGate>,
        bridge: Arc<ConstraintBridge>,
        port: Arc<SolverPort>,
        catalog: ModelCatalog,
        audit: Arc<AuditLog>,
        persist: Option<PersistAdapter>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            ingestor,
            gate,
            bridge,
            port,
            catalog,
            audit,
            persist,
            events,
            group_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    fn group_lock(&self, product_group: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .group_locks
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        locks
            .entry(product_group.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one solve. Returns the audit record that was appended; the
    /// record is written even when the solver fails.
    pub async fn run(
        &self,
        product_group: &str,
        variables: Variables,
        options: SolveOptions,
        cancel: &CancelFlag,
    ) -> Result<AuditRecord, PipelineError> {
        let model = self
            .catalog
            .get(product_group)
            .ok_or_else(|| PipelineError::UnknownProductGroup(product_group.to_string()))?
            .clone();

        // One solve per product group at a time.
        let lock = self.group_lock(product_group);
        let _serial = lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        self.emit(PipelineEvent::Started {
            run_id: run_id.clone(),
            product_group: product_group.to_string(),
        });
        tracing::info!(run_id = %run_id, product_group, "solve pipeline started");

        // Phase: contracts freshness check and conditional ingest.
        let mut contracts_stale = false;
        let mut stale_reason: Option<String> = None;

        if options.skip_contracts_check {
            contracts_stale = true;
            stale_reason = Some("contracts check skipped by caller".to_string());
            self.emit(PipelineEvent::ContractsStale {
                run_id: run_id.clone(),
                reason: stale_reason.clone().unwrap_or_default(),
            });
        } else {
            match &self.ingestor {
                Some(ingestor) => {
                    self.emit(PipelineEvent::Ingesting {
                        run_id: run_id.clone(),
                    });
                    match ingestor.delta_scan().await {
                        Ok(summary) => {
                            self.emit(PipelineEvent::IngestDone {
                                run_id: run_id.clone(),
                            });
                            tracing::debug!(
                                run_id = %run_id,
                                changed = summary.changed,
                                unchanged = summary.unchanged,
                                "contracts check complete"
                            );
                        }
                        Err(e) => {
                            contracts_stale = true;
                            stale_reason = Some(e.to_string());
                            self.emit(PipelineEvent::ContractsStale {
                                run_id: run_id.clone(),
                                reason: e.to_string(),
                            });
                            tracing::warn!(
                                run_id = %run_id,
                                error = %e,
                                "contracts check failed; continuing with stale data"
                            );
                        }
                    }
                }
                None => {
                    contracts_stale = true;
                    stale_reason = Some("no scanner configured".to_string());
                    self.emit(PipelineEvent::ContractsStale {
                        run_id: run_id.clone(),
                        reason: "no scanner configured".to_string(),
                    });
                }
            }
        }
        let contracts_checked_at = Utc::now();
        let ingestion_completed_at = Utc::now();

        // Phase: readiness and projection. Readiness problems are
        // recorded, not fatal; the desk sees them alongside the result.
        let readiness = self.gate.check(product_group, &variables, Utc::now());
        let readiness_issues: Vec<String> =
            readiness.issues.iter().map(|i| i.message.clone()).collect();

        let projection = self
            .bridge
            .project_what_if(product_group, &variables, Utc::now())?;

        let contracts_used = self
            .store
            .list_active_set(product_group, Utc::now().date_naive())
            .iter()
            .map(crate::models::ContractSnapshot::from)
            .collect();

        let audit_variables: Vec<AuditVariable> = projection
            .variables
            .iter()
            .map(|(key, sample)| AuditVariable {
                key: key.clone(),
                value: sample.value,
                source_updated_at_ms: sample.updated_at_ms,
            })
            .collect();

        // Cancellation point: before the solve phase only.
        if cancel.is_cancelled() {
            let now = Utc::now();
            let record = AuditRecord {
                run_id: run_id.clone(),
                product_group: product_group.to_string(),
                trader_id: options.trader_id.clone(),
                kind: options.kind,
                contracts_used,
                variables: audit_variables,
                applied_bounds: projection.applied_bounds,
                result_status: ResultStatus::Cancelled,
                result: None,
                contracts_stale,
                stale_reason,
                readiness_issues,
                started_at,
                contracts_checked_at,
                ingestion_completed_at,
                solve_started_at: now,
                completed_at: now,
            };
            self.finish(record.clone()).await;
            self.emit(PipelineEvent::PipelineError {
                run_id,
                phase: "solve",
                error: "cancelled before solve phase".to_string(),
            });
            return Ok(record);
        }

        // Phase: solve.
        let solve_started_at = Utc::now();
        let (result_status, result) = match options.monte_carlo {
            None => match self.port.solve(&model, &projection.variables).await {
                Ok(SolveOutcome::Optimal(solved)) => (
                    ResultStatus::Optimal,
                    serde_json::to_value(&solved).ok(),
                ),
                Ok(SolveOutcome::Infeasible) => (ResultStatus::Infeasible, None),
                Ok(SolveOutcome::EngineError(message)) => {
                    (ResultStatus::Error, Some(serde_json::json!({ "error": message })))
                }
                Err(e) => self.solver_failure(&run_id, e),
            },
            Some(n_scenarios) => match self
                .port
                .monte_carlo(&model, &projection.variables, n_scenarios)
                .await
            {
                Ok(MonteCarloOutcome::Completed(stats)) => (
                    ResultStatus::Optimal,
                    serde_json::to_value(&stats).ok(),
                ),
                Ok(MonteCarloOutcome::Infeasible) => (ResultStatus::Infeasible, None),
                Ok(MonteCarloOutcome::EngineError(message)) => {
                    (ResultStatus::Error, Some(serde_json::json!({ "error": message })))
                }
                Err(e) => self.solver_failure(&run_id, e),
            },
        };
        let completed_at = Utc::now();

        let record = AuditRecord {
            run_id: run_id.clone(),
            product_group: product_group.to_string(),
            trader_id: options.trader_id,
            kind: options.kind,
            contracts_used,
            variables: audit_variables,
            applied_bounds: projection.applied_bounds,
            result_status,
            result,
            contracts_stale,
            stale_reason,
            readiness_issues,
            started_at,
            contracts_checked_at,
            ingestion_completed_at,
            solve_started_at,
            completed_at,
        };

        self.finish(record.clone()).await;
        self.emit(PipelineEvent::SolveDone {
            run_id: run_id.clone(),
            contracts_stale,
            result_status,
        });
        tracing::info!(
            run_id = %run_id,
            status = ?result_status,
            contracts_stale,
            "solve pipeline finished"
        );
        Ok(record)
    }

    fn solver_failure(
        &self,
        run_id: &str,
        error: SolverError,
    ) -> (ResultStatus, Option<serde_json::Value>) {
        self.emit(PipelineEvent::PipelineError {
            run_id: run_id.to_string(),
            phase: "solve",
            error: error.to_string(),
        });
        tracing::error!(run_id, error = %error, "solver invocation failed");
        (
            ResultStatus::Error,
            Some(serde_json::json!({ "error": error.to_string() })),
        )
    }

    /// Audit is appended in-memory and written through before the
    /// result is observable.
    async fn finish(&self, record: AuditRecord) {
        self.audit.append(record.clone());
        if let Some(persist) = &self.persist {
            if let Err(e) = persist.record_audit(record).await {
                tracing::error!(error = %e, "audit write-through failed");
            }
        }
    }
}
