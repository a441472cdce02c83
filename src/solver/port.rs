//! Solver subprocess port.
//!
//! One engine process over length-prefixed frames. Commands serialise
//! through a mutex (the pipeline already guarantees at most one solve
//! per product group); non-idempotent solver invocations are never
//! retried. A crashed engine is reported to the in-flight caller and a
//! replacement is spawned on the next command.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::frame::{self, MonteCarloResult, SolveResult};
use super::model::{ProductGroupModel, Variables};
use super::SolverError;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub solve_timeout: Duration,
    pub monte_carlo_timeout: Duration,
}

impl SolverConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            solve_timeout: Duration::from_secs(5),
            monte_carlo_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one solve invocation. Infeasibility is a result, not a
/// transport failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal(SolveResult),
    Infeasible,
    EngineError(String),
}

/// Outcome of one monte-carlo invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum MonteCarloOutcome {
    Completed(MonteCarloResult),
    Infeasible,
    EngineError(String),
}

struct EngineIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// The port. Share behind an `Arc`.
pub struct SolverPort {
    config: SolverConfig,
    state: Mutex<Option<EngineIo>>,
}

impl SolverPort {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    /// Run one LP solve.
    pub async fn solve(
        &self,
        model: &ProductGroupModel,
        variables: &Variables,
    ) -> Result<SolveOutcome, SolverError> {
        let values = model
            .ordered_values(variables)
            .map_err(SolverError::Protocol)?;
        let request = frame::encode_solve_request(model, &values);
        let (status, payload) = self.exchange(&request, self.config.solve_timeout).await?;

        match status {
            frame::STATUS_OPTIMAL => Ok(SolveOutcome::Optimal(frame::decode_solve_payload(
                &payload,
                model.route_count,
                model.constraint_count,
            )?)),
            frame::STATUS_INFEASIBLE => Ok(SolveOutcome::Infeasible),
            frame::STATUS_ERROR => Ok(SolveOutcome::EngineError(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            other => Err(SolverError::Protocol(format!(
                "unknown status byte {other}"
            ))),
        }
    }

    /// Run a monte-carlo sweep.
    pub async fn monte_carlo(
        &self,
        model: &ProductGroupModel,
        variables: &Variables,
        n_scenarios: u32,
    ) -> Result<MonteCarloOutcome, SolverError> {
        let values = model
            .ordered_values(variables)
            .map_err(SolverError::Protocol)?;
        let request = frame::encode_monte_carlo_request(model, &values, n_scenarios);
        let (status, payload) = self
            .exchange(&request, self.config.monte_carlo_timeout)
            .await?;

        match status {
            frame::STATUS_OPTIMAL => Ok(MonteCarloOutcome::Completed(
                frame::decode_monte_carlo_payload(&payload, model.variables.len())?,
            )),
            frame::STATUS_INFEASIBLE => Ok(MonteCarloOutcome::Infeasible),
            frame::STATUS_ERROR => Ok(MonteCarloOutcome::EngineError(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            other => Err(SolverError::Protocol(format!(
                "unknown status byte {other}"
            ))),
        }
    }

    /// Send one framed request and read one framed response under the
    /// deadline. Any transport failure kills the engine; the caller
    /// gets `Crashed` (or `Timeout`) and is never silently retried.
    async fn exchange(
        &self,
        body: &[u8],
        timeout: Duration,
    ) -> Result<(u8, Vec<u8>), SolverError> {
        let mut state = self.state.lock().await;
        self.ensure_engine(&mut state).await?;

        let framed = frame::frame(body);
        let write_ok = {
            let io = state.as_mut().expect("engine just ensured");
            io.stdin.write_all(&framed).await.is_ok() && io.stdin.flush().await.is_ok()
        };
        if !write_ok {
            Self::kill(&mut state);
            return Err(SolverError::Crashed);
        }

        let read = {
            let io = state.as_mut().expect("engine just ensured");
            tokio::time::timeout(timeout, async {
                let mut len_bytes = [0u8; 4];
                io.stdout
                    .read_exact(&mut len_bytes)
                    .await
                    .map_err(|_| SolverError::Crashed)?;
                let len = frame::check_frame_len(u32::from_be_bytes(len_bytes))?;
                let mut payload = vec![0u8; len];
                io.stdout
                    .read_exact(&mut payload)
                    .await
                    .map_err(|_| SolverError::Crashed)?;
                Ok::<Vec<u8>, SolverError>(payload)
            })
            .await
        };

        match read {
            Err(_) => {
                Self::kill(&mut state);
                Err(SolverError::Timeout)
            }
            Ok(Err(e)) => {
                Self::kill(&mut state);
                Err(e)
            }
            Ok(Ok(response)) => {
                let (&status, payload) = response
                    .split_first()
                    .ok_or_else(|| SolverError::Protocol("empty response frame".into()))?;
                Ok((status, payload.to_vec()))
            }
        }
    }

    async fn ensure_engine(&self, state: &mut Option<EngineIo>) -> Result<(), SolverError> {
        if state.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.config.binary)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SolverError::Unavailable(format!("{}: {e}", self.config.binary.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Unavailable("solver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SolverError::Unavailable("solver stdout unavailable".into()))?;

        tracing::info!(binary = %self.config.binary.display(), "solver engine spawned");
        *state = Some(EngineIo {
            child,
            stdin,
            stdout,
        });
        Ok(())
    }

    fn kill(state: &mut Option<EngineIo>) {
        if let Some(mut io) = state.take() {
            let _ = io.child.start_kill();
            tracing::error!("solver engine lost; will respawn on next command");
        }
    }
}
