//! Runtime settings, loaded from the environment.
//!
//! Secrets live here and only here; nothing below this module persists
//! a client secret, bearer token, or API key into contract records or
//! the durable log.

use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "ballast";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter for the embedding binary.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,warn")
}

/// Initialise tracing for an embedding binary or test harness.
/// `RUST_LOG` wins; otherwise the default filter applies.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .try_init();
}

/// Everything the backend needs to talk to the outside world.
#[derive(Debug, Clone)]
pub struct Settings {
    // Remote document store.
    pub remote_tenant_id: String,
    pub remote_client_id: String,
    pub remote_client_secret: String,
    pub remote_drive_id: String,

    // Subprocess binaries.
    pub scanner_binary: PathBuf,
    pub solver_binary: PathBuf,

    // LLM second pass.
    pub llm_endpoint: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub llm_concurrency: usize,

    // Durable log.
    pub persist_root: PathBuf,

    // Protocol deadlines.
    pub scanner_timeout: Duration,
    pub solver_solve_timeout: Duration,
    pub solver_monte_carlo_timeout: Duration,
    pub token_refresh_timeout: Duration,

    // Ingest pipelining.
    pub ingest_in_flight: usize,
}

impl Settings {
    /// Read settings from `BALLAST_*` environment variables, with the
    /// protocol defaults filled in.
    pub fn from_env() -> Self {
        Self {
            remote_tenant_id: env_string("BALLAST_REMOTE_TENANT_ID"),
            remote_client_id: env_string("BALLAST_REMOTE_CLIENT_ID"),
            remote_client_secret: env_string("BALLAST_REMOTE_CLIENT_SECRET"),
            remote_drive_id: env_string("BALLAST_REMOTE_DRIVE_ID"),
            scanner_binary: PathBuf::from(env_or("BALLAST_SCANNER_BIN", "doc-scanner")),
            solver_binary: PathBuf::from(env_or("BALLAST_SOLVER_BIN", "lp-engine")),
            llm_endpoint: std::env::var("BALLAST_LLM_ENDPOINT").ok(),
            llm_api_key: std::env::var("BALLAST_LLM_API_KEY").ok(),
            llm_model: env_or("BALLAST_LLM_MODEL", "gpt-4o"),
            llm_timeout: env_secs("BALLAST_LLM_TIMEOUT_SECS", 120),
            llm_concurrency: env_usize("BALLAST_LLM_CONCURRENCY", 3),
            persist_root: PathBuf::from(env_or("BALLAST_PERSIST_ROOT", "./ballast-log")),
            scanner_timeout: env_secs("BALLAST_SCANNER_TIMEOUT_SECS", 120),
            solver_solve_timeout: env_secs("BALLAST_SOLVER_SOLVE_TIMEOUT_SECS", 5),
            solver_monte_carlo_timeout: env_secs("BALLAST_SOLVER_MC_TIMEOUT_SECS", 30),
            token_refresh_timeout: env_secs("BALLAST_TOKEN_TIMEOUT_SECS", 10),
            ingest_in_flight: env_usize("BALLAST_INGEST_IN_FLIGHT", 4),
        }
    }

    /// True when a second-pass endpoint is configured.
    pub fn llm_enabled(&self) -> bool {
        self.llm_endpoint.is_some() && self.llm_api_key.is_some()
    }
}

fn env_string(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_deadlines() {
        let settings = Settings::from_env();
        assert_eq!(settings.solver_solve_timeout, Duration::from_secs(5));
        assert_eq!(settings.solver_monte_carlo_timeout, Duration::from_secs(30));
        assert_eq!(settings.scanner_timeout, Duration::from_secs(120));
        assert_eq!(settings.token_refresh_timeout, Duration::from_secs(10));
        assert_eq!(settings.ingest_in_flight, 4);
        assert_eq!(settings.llm_concurrency, 3);
    }

    #[test]
    fn llm_disabled_without_endpoint_and_key() {
        let mut settings = Settings::from_env();
        settings.llm_endpoint = None;
        settings.llm_api_key = None;
        assert!(!settings.llm_enabled());

        settings.llm_endpoint = Some("https://llm.example/v1".into());
        assert!(!settings.llm_enabled());

        settings.llm_api_key = Some("key".into());
        assert!(settings.llm_enabled());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
