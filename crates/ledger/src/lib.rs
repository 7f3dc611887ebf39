//! Resume ledger: a durable map from file fingerprint to the server-side
//! upload resource that holds its bytes.
//!
//! The ledger sits on top of a [`KeyValueStore`]; callers pick the backing
//! store ([`JsonFileStore`] for a CLI, [`MemoryStore`] for tests or
//! ephemeral sessions, or their own implementation).

mod ledger;
mod store;

pub use ledger::{LEDGER_KEY_PREFIX, ResumeLedger};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, default_ledger_path};

/// Errors from ledger storage.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),
}
