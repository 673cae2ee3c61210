//! Error types for guild-ledger

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a persistence backend.
///
/// Only the local variants ever reach a ledger caller: the durable store
/// swallows `Remote` after logging it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode domain {domain}: {source}")]
    Encode {
        domain: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Remote mirror unavailable: {0}")]
    Remote(#[from] RemoteError),
}

impl StoreError {
    /// True when the error concerns the authoritative local copy.
    pub fn is_local(&self) -> bool {
        !matches!(self, StoreError::Remote(_))
    }
}

/// Failures talking to the remote mirror.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed remote document: {0}")]
    Parse(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Errors from the command dispatcher handle.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher queue is closed")]
    Closed,

    #[error("Dispatcher dropped the reply")]
    NoReply,
}
