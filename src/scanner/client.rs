//! Supervised scanner subprocess client.
//!
//! One outstanding command at a time: concurrent callers queue on an
//! async mutex and complete in FIFO order. On unexpected exit the
//! in-flight caller receives `ScannerError::Crashed` and the process is
//! respawned on the next command after a doubling backoff. Idempotent
//! commands are retried once across a crash; `fetch` never is.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::protocol::{
    self, DiffOutcome, FetchPayload, HashLocalPayload, KnownFile, RemoteItem, ScanPayload,
    ScannerCommand,
};
use super::token::TokenProvider;
use super::ScannerError;

/// Scanner subprocess configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Hard deadline per command.
    pub command_timeout: Duration,
    /// First restart delay after a crash; doubles per consecutive
    /// failure up to `max_backoff`, resets on success.
    pub restart_backoff: Duration,
    pub max_backoff: Duration,
}

impl ScannerConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            command_timeout: Duration::from_secs(120),
            restart_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Fetched file content with its verified hash.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// Hex-lowercase SHA-256 over `bytes`.
    pub sha256: String,
    pub bytes: Vec<u8>,
}

struct ProcessIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

struct MuxState {
    io: Option<ProcessIo>,
    consecutive_failures: u32,
}

/// Client for one scanner subprocess.
pub struct ScannerClient {
    config: ScannerConfig,
    tokens: Arc<TokenProvider>,
    state: Mutex<MuxState>,
}

impl ScannerClient {
    pub fn new(config: ScannerConfig, tokens: Arc<TokenProvider>) -> Self {
        Self {
            config,
            tokens,
            state: Mutex::new(MuxState {
                io: None,
                consecutive_failures: 0,
            }),
        }
    }

    /// List a remote folder, filtered to recognised extensions by the
    /// scanner side.
    pub async fn scan(
        &self,
        drive_id: &str,
        folder_path: &str,
    ) -> Result<Vec<RemoteItem>, ScannerError> {
        let token = self.tokens.token().await?;
        let payload: ScanPayload = self
            .command(ScannerCommand::Scan {
                token,
                drive_id: drive_id.to_string(),
                folder_path: folder_path.to_string(),
            })
            .await?;
        Ok(payload.items)
    }

    /// Classify known files as changed/unchanged/missing using only
    /// metadata requests.
    pub async fn diff_hashes(&self, known: Vec<KnownFile>) -> Result<DiffOutcome, ScannerError> {
        let token = self.tokens.token().await?;
        self.command(ScannerCommand::DiffHashes { token, known })
            .await
    }

    /// Fetch one file's content. The returned hash is recomputed over
    /// the decoded bytes and must agree with the scanner's.
    pub async fn fetch(
        &self,
        drive_id: &str,
        item_id: &str,
    ) -> Result<FetchedContent, ScannerError> {
        let token = self.tokens.token().await?;
        let payload: FetchPayload = self
            .command(ScannerCommand::Fetch {
                token,
                drive_id: drive_id.to_string(),
                item_id: item_id.to_string(),
            })
            .await?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.content_base64.as_bytes())
            .map_err(|e| ScannerError::FetchFailed(format!("content not base64: {e}")))?;

        if bytes.len() as u64 != payload.size {
            return Err(ScannerError::FetchFailed(format!(
                "size mismatch: reported {}, decoded {}",
                payload.size,
                bytes.len()
            )));
        }

        let sha256 = hex::encode(Sha256::digest(&bytes));
        if sha256 != payload.sha256.to_lowercase() {
            return Err(ScannerError::FetchFailed(
                "content hash does not match reported hash".to_string(),
            ));
        }

        Ok(FetchedContent { sha256, bytes })
    }

    /// Hash a local file through the scanner (test plumbing).
    pub async fn hash_local(&self, path: &str) -> Result<String, ScannerError> {
        let payload: HashLocalPayload = self
            .command(ScannerCommand::HashLocal {
                path: path.to_string(),
            })
            .await?;
        Ok(payload.sha256)
    }

    async fn command<T: serde::de::DeserializeOwned>(
        &self,
        cmd: ScannerCommand,
    ) -> Result<T, ScannerError> {
        let mut state = self.state.lock().await;

        match self.exchange(&mut state, &cmd).await {
            Ok(value) => Ok(value),
            Err(err @ (ScannerError::Crashed | ScannerError::Timeout { .. }))
                if cmd.is_idempotent() =>
            {
                tracing::warn!(
                    command = cmd.name(),
                    error = %err,
                    "scanner transport failure, retrying idempotent command"
                );
                self.exchange(&mut state, &cmd).await
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange<T: serde::de::DeserializeOwned>(
        &self,
        state: &mut MuxState,
        cmd: &ScannerCommand,
    ) -> Result<T, ScannerError> {
        self.ensure_process(state).await?;

        let mut line = serde_json::to_string(cmd)
            .map_err(|e| ScannerError::Protocol(format!("command serialisation: {e}")))?;
        line.push('\n');

        let write_ok = {
            let io = state.io.as_mut().expect("process just ensured");
            io.stdin.write_all(line.as_bytes()).await.is_ok() && io.stdin.flush().await.is_ok()
        };
        if !write_ok {
            self.mark_crashed(state);
            return Err(ScannerError::Crashed);
        }

        let mut response = String::new();
        let read = {
            let io = state.io.as_mut().expect("process just ensured");
            tokio::time::timeout(
                self.config.command_timeout,
                io.stdout.read_line(&mut response),
            )
            .await
        };

        match read {
            Err(_) => {
                // Deadline passed. The only way to cancel a scanner
                // command is to kill the subprocess.
                self.mark_crashed(state);
                Err(ScannerError::Timeout {
                    command: cmd.name(),
                })
            }
            Ok(Err(_)) | Ok(Ok(0)) => {
                self.mark_crashed(state);
                Err(ScannerError::Crashed)
            }
            Ok(Ok(_)) => {
                state.consecutive_failures = 0;
                protocol::parse_response(response.trim_end())
            }
        }
    }

    async fn ensure_process(&self, state: &mut MuxState) -> Result<(), ScannerError> {
        if state.io.is_some() {
            return Ok(());
        }

        if state.consecutive_failures > 0 {
            let exponent = state.consecutive_failures.saturating_sub(1).min(8);
            let backoff = self
                .config
                .restart_backoff
                .saturating_mul(2u32.saturating_pow(exponent))
                .min(self.config.max_backoff);
            tracing::info!(
                failures = state.consecutive_failures,
                backoff_ms = backoff.as_millis() as u64,
                "restarting scanner subprocess after backoff"
            );
            tokio::time::sleep(backoff).await;
        }

        let mut child = Command::new(&self.config.binary)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScannerError::Unavailable(format!("{}: {e}", self.config.binary.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScannerError::Unavailable("scanner stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| ScannerError::Unavailable("scanner stdout unavailable".into()))?;

        state.io = Some(ProcessIo {
            child,
            stdin,
            stdout,
        });
        Ok(())
    }

    fn mark_crashed(&self, state: &mut MuxState) {
        if let Some(mut io) = state.io.take() {
            // Best effort; the process may already be gone.
            let _ = io.child.start_kill();
        }
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        tracing::error!(
            failures = state.consecutive_failures,
            "scanner subprocess lost"
        );
    }
}
