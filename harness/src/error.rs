// harness/src/error.rs

use ethers::types::{Address, TxHash};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Artifact lookup failed for {name} ({path}): {reason}")]
    ArtifactLookup {
        path: String,
        name: String,
        reason: String,
    },
    #[error("Deployment of {contract} failed: {reason}")]
    Deployment { contract: String, reason: String },
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },
    #[error("Signer #{index} is not available ({available} signer(s) configured)")]
    MissingSigner { index: usize, available: usize },
    #[error("Signer {0:?} is not managed by this ledger")]
    UnknownSigner(Address),
    #[error("Event subscription failed: {0}")]
    Subscription(String),
    #[error("Failed to decode event log: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Provider error: {0}")]
    Provider(String),
}

impl HarnessError {
    pub fn lookup(path: impl Into<String>, name: impl Into<String>, reason: impl ToString) -> Self {
        HarnessError::ArtifactLookup {
            path: path.into(),
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn deployment(contract: impl Into<String>, reason: impl ToString) -> Self {
        HarnessError::Deployment {
            contract: contract.into(),
            reason: reason.to_string(),
        }
    }

    pub fn reverted(tx_hash: TxHash) -> Self {
        HarnessError::Transaction(format!("transaction {tx_hash:?} reverted (status 0)"))
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
