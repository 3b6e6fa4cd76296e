// forge/core/registry/src/attestation.rs

use crate::contracts;
use forge_primitives::{Address, Hash};
use forge_wallet::{Credentials, Receipt, TransactionManager, TxError};
use std::sync::Arc;
use tracing::info;

/// Binding for the result-attestation contract
pub struct AttestationContract {
    tx: Arc<TransactionManager>,
    contract: Address,
}

impl AttestationContract {
    pub fn new(tx: Arc<TransactionManager>, contract: Address) -> Self {
        Self { tx, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Commit `(topic, hash, accuracy, submitter)` and wait for a terminal receipt
    pub async fn submit_aggregated_result(
        &self,
        topic: &str,
        result_hash: Hash,
        accuracy: u8,
        submitter: Address,
        signer: &Credentials,
    ) -> Result<Receipt, TxError> {
        info!(topic, result_hash = %result_hash, accuracy, submitter = %submitter, "submitting aggregated result");
        let call = contracts::submit_aggregated_result(self.contract, topic, result_hash, accuracy, submitter);
        self.tx.submit(&call, signer).await
    }
}
