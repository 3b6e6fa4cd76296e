use forge_primitives::AbiError;
use forge_wallet::{TxError, WalletError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("ledger read failed: {0}")]
    LedgerRead(#[from] WalletError),

    #[error("{action} for token {token_id} failed: {source}")]
    LedgerWriteFailed {
        action: &'static str,
        token_id: u64,
        #[source]
        source: TxError,
    },

    #[error("unexpected contract response: {0}")]
    Decode(#[from] AbiError),
}
