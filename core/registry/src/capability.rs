// forge/core/registry/src/capability.rs

use crate::contracts;
use crate::error::RegistryError;
use forge_primitives::abi::{decode, ParamType};
use forge_primitives::{Address, Hash, Token};
use forge_wallet::{Credentials, Receipt, TransactionManager, WalletError};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of an idempotent ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    /// Ledger already in the requested state; nothing was sent
    Skipped,
    Committed(Receipt),
}

impl TxResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TxResult::Skipped)
    }
}

/// View of the on-chain access-control ledger.
///
/// Holds no grant state of its own: every query goes to the ledger, and all
/// writes go through the shared [`TransactionManager`].
pub struct CapabilityRegistry {
    tx: Arc<TransactionManager>,
    contract: Address,
}

impl CapabilityRegistry {
    pub fn new(tx: Arc<TransactionManager>, contract: Address) -> Self {
        Self { tx, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Current grant state. Re-read immediately before acting on it.
    pub async fn has_access(
        &self,
        token_id: u64,
        grantee: Address,
        resource: Hash,
    ) -> Result<bool, RegistryError> {
        let call = contracts::has_access(self.contract, token_id, grantee, resource);
        let output = self.tx.rpc().call(&call).await?;
        let granted = decode(&[ParamType::Bool], &output)?
            .pop()
            .and_then(Token::into_bool)
            .unwrap_or(false);
        debug!(token_id, grantee = %grantee, resource = %resource, granted, "access check");
        Ok(granted)
    }

    /// Owner of a token, or `None` if it has not been minted
    pub async fn owner_of(&self, token_id: u64) -> Result<Option<Address>, RegistryError> {
        let call = contracts::owner_of(self.contract, token_id);
        let output = match self.tx.rpc().call(&call).await {
            Ok(output) => output,
            // ERC-721 reverts for tokens that do not exist
            Err(WalletError::Reverted(reason)) => {
                debug!(token_id, %reason, "ownerOf reverted, treating token as unminted");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let owner = decode(&[ParamType::Address], &output)?
            .pop()
            .and_then(Token::into_address)
            .filter(|addr| !addr.is_zero());
        Ok(owner)
    }

    /// Mint `token_id` to `owner` unless it already belongs to `owner`
    pub async fn mint_if_absent(
        &self,
        token_id: u64,
        owner: Address,
        uri: &str,
        signer: &Credentials,
    ) -> Result<TxResult, RegistryError> {
        if self.owner_of(token_id).await? == Some(owner) {
            info!(token_id, owner = %owner, "identity token already minted");
            return Ok(TxResult::Skipped);
        }

        info!(token_id, owner = %owner, uri, "minting identity token");
        let call = contracts::mint(self.contract, owner, token_id, uri);
        let receipt = self
            .tx
            .submit(&call, signer)
            .await
            .map_err(|source| RegistryError::LedgerWriteFailed {
                action: "mint",
                token_id,
                source,
            })?;
        Ok(TxResult::Committed(receipt))
    }

    /// Grant `grantee` access to `resource` for `token_id`; `signer` must own the token
    pub async fn grant_access(
        &self,
        token_id: u64,
        grantee: Address,
        resource: Hash,
        signer: &Credentials,
    ) -> Result<TxResult, RegistryError> {
        if self.has_access(token_id, grantee, resource).await? {
            info!(token_id, grantee = %grantee, "access already granted");
            return Ok(TxResult::Skipped);
        }

        info!(token_id, grantee = %grantee, resource = %resource, "granting access");
        let call = contracts::grant_access(self.contract, token_id, grantee, resource);
        let receipt = self
            .tx
            .submit(&call, signer)
            .await
            .map_err(|source| RegistryError::LedgerWriteFailed {
                action: "grantAccess",
                token_id,
                source,
            })?;
        Ok(TxResult::Committed(receipt))
    }
}
