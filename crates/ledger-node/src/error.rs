use std::time::Duration;

use ledger_core::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("mining task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
