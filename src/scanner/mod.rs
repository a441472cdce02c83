//! Remote document store scanner.
//!
//! The scanner itself is a separate long-running subprocess speaking
//! line-oriented JSON on stdin/stdout; this module owns the wrapper:
//! command multiplexing (one outstanding command, FIFO), supervision
//! with backoff restart, bearer token injection, and timeouts.

pub mod client;
pub mod protocol;
pub mod token;

pub use client::{FetchedContent, ScannerClient, ScannerConfig};
pub use protocol::{DiffEntry, DiffOutcome, KnownFile, RemoteItem};
pub use token::{BearerToken, TokenProvider, TokenSource};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    #[error("scanner subprocess crashed")]
    Crashed,

    #[error("token error: {0}")]
    Token(String),

    #[error("remote API error {status}: {detail}")]
    RemoteApi { status: u16, detail: String },

    #[error("scanner command failed: {error} ({detail})")]
    Command { error: String, detail: String },

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("scanner command '{command}' timed out")]
    Timeout { command: &'static str },

    #[error("protocol error: {0}")]
    Protocol(String),
}
