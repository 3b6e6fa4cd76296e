use forge_primitives::Hash;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Chain id mismatch: configured {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Other error: {0}")]
    Other(String),
}

/// Terminal failure of a single submission
#[derive(Error, Debug)]
pub enum TxError {
    #[error("transaction {hash} reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Reverted { hash: Hash, reason: Option<String> },

    #[error("transaction {hash} not confirmed after {attempts} polls ({elapsed:?})")]
    TimedOut {
        hash: Hash,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("node rejected transaction with nonce {nonce}: {reason}")]
    Rejected { nonce: u64, reason: String },

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl TxError {
    /// Hash of the broadcast transaction, if it got that far
    pub fn tx_hash(&self) -> Option<Hash> {
        match self {
            TxError::Reverted { hash, .. } | TxError::TimedOut { hash, .. } => Some(*hash),
            TxError::Rejected { .. } | TxError::Wallet(_) => None,
        }
    }
}
