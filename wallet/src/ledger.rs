use crate::errors::WalletError;
use crate::gas::GasConfig;
use crate::manager::{PollConfig, TransactionManager};
use crate::rpc_client::{LedgerRpc, RpcClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Ledger connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 1337,
            request_timeout_secs: 30,
        }
    }
}

impl LedgerConfig {
    /// Open an HTTP client and confirm the node serves the configured chain
    pub async fn connect(&self) -> Result<Arc<dyn LedgerRpc>, WalletError> {
        let client = RpcClient::with_timeout(
            &self.rpc_url,
            Duration::from_secs(self.request_timeout_secs),
        )?;
        self.verify_chain(&client).await?;
        info!(url = %self.rpc_url, chain_id = self.chain_id, "connected to ledger");
        Ok(Arc::new(client))
    }

    pub async fn verify_chain(&self, rpc: &dyn LedgerRpc) -> Result<(), WalletError> {
        let actual = rpc.chain_id().await?;
        if actual != self.chain_id {
            return Err(WalletError::ChainIdMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub fn transaction_manager(
        &self,
        rpc: Arc<dyn LedgerRpc>,
        gas: &GasConfig,
        poll: &PollConfig,
    ) -> TransactionManager {
        TransactionManager::new(
            rpc,
            self.chain_id,
            Arc::new(gas.policy()),
            gas.limit_policy(),
            poll.clone(),
        )
    }
}
