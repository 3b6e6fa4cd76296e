// forge/core/registry/src/context.rs

use crate::attestation::AttestationContract;
use crate::capability::CapabilityRegistry;
use crate::contracts::ContractAddresses;
use forge_wallet::{LedgerRpc, TransactionManager};
use std::sync::Arc;

/// Everything needed to talk to the deployed contracts.
///
/// Passed explicitly to whoever needs ledger access; there is no global client.
#[derive(Clone)]
pub struct LedgerContext {
    tx: Arc<TransactionManager>,
    contracts: ContractAddresses,
}

impl LedgerContext {
    pub fn new(tx: Arc<TransactionManager>, contracts: ContractAddresses) -> Self {
        Self { tx, contracts }
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        self.tx.rpc()
    }

    pub fn chain_id(&self) -> u64 {
        self.tx.chain_id()
    }

    pub fn contracts(&self) -> ContractAddresses {
        self.contracts
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.tx
    }

    pub fn capability_registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(self.tx.clone(), self.contracts.capability)
    }

    pub fn attestation_contract(&self) -> AttestationContract {
        AttestationContract::new(self.tx.clone(), self.contracts.attestation)
    }
}
