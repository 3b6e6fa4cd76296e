// forge/core/registry/src/devnet.rs

//! In-memory single-node ledger hosting the capability and attestation
//! contracts.
//!
//! Transactions are mined on broadcast; receipts become visible after a
//! configurable number of lookups. Faults can be injected per function
//! selector, and receipts or nonces can be made to misbehave, so every
//! terminal path of the transaction lifecycle can be driven locally.

use crate::contracts::{
    GRANT_ACCESS, HAS_ACCESS, MINT, OWNER_OF, REVOKE_ACCESS, SUBMIT_AGGREGATED_RESULT,
};
use async_trait::async_trait;
use forge_primitives::abi::{decode, encode, selector, split_selector, ParamType};
use forge_primitives::{Address, ContractCall, Hash, Token, U256};
use forge_wallet::{LedgerRpc, SignedTransaction, Transaction, TransactionReceipt, WalletError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const BASE_GAS: u64 = 21_000;
const STORAGE_WRITE_GAS: u64 = 20_000;
const DEFAULT_GAS_PRICE: u128 = 1_000_000_000;

/// An attestation as stored by the attestation contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationEntry {
    pub topic: String,
    pub result_hash: Hash,
    pub accuracy: u64,
    pub submitter: Address,
    /// Transaction sender
    pub sender: Address,
    pub block_number: u64,
}

#[derive(Debug, Clone, Default)]
struct ContractState {
    owners: HashMap<U256, Address>,
    uris: HashMap<U256, String>,
    grants: HashSet<(U256, Address, Hash)>,
    attestations: Vec<AttestationEntry>,
}

#[derive(Debug)]
struct StoredReceipt {
    receipt: TransactionReceipt,
    /// Lookups left before the receipt is reported
    hidden_for: u32,
}

#[derive(Debug, Default)]
struct Faults {
    reverts: HashMap<[u8; 4], String>,
    withhold_receipts: bool,
    confirmation_polls: u32,
    stale_nonces: bool,
    reject_broadcasts: u32,
}

#[derive(Debug, Default)]
struct DevnetState {
    contracts: ContractState,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<Hash, StoredReceipt>,
    sent: Vec<Transaction>,
    block_number: u64,
    faults: Faults,
}

/// Local ledger implementing [`LedgerRpc`]
pub struct Devnet {
    chain_id: u64,
    capability: Address,
    attestation: Address,
    gas_price: u128,
    state: Mutex<DevnetState>,
}

impl Devnet {
    pub fn new(chain_id: u64, capability: Address, attestation: Address) -> Self {
        Self {
            chain_id,
            capability,
            attestation,
            gas_price: DEFAULT_GAS_PRICE,
            state: Mutex::new(DevnetState::default()),
        }
    }

    pub fn capability_address(&self) -> Address {
        self.capability
    }

    pub fn attestation_address(&self) -> Address {
        self.attestation
    }

    /// Make every execution of `signature` revert with `reason`
    pub fn revert_function(&self, signature: &str, reason: &str) {
        self.state
            .lock()
            .faults
            .reverts
            .insert(selector(signature), reason.to_string());
    }

    /// Stop reporting receipts for all transactions
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().faults.withhold_receipts = withhold;
    }

    /// Number of receipt lookups that return nothing before a receipt shows up
    pub fn set_confirmation_polls(&self, polls: u32) {
        self.state.lock().faults.confirmation_polls = polls;
    }

    /// Report a pending nonce of zero regardless of history
    pub fn stale_nonces(&self, stale: bool) {
        self.state.lock().faults.stale_nonces = stale;
    }

    /// Refuse the next `count` broadcasts at the RPC layer
    pub fn reject_broadcasts(&self, count: u32) {
        self.state.lock().faults.reject_broadcasts = count;
    }

    /// Remove a grant directly, as if the owner had revoked it
    pub fn revoke_access(&self, token_id: u64, grantee: Address, resource: Hash) {
        self.state
            .lock()
            .contracts
            .grants
            .remove(&(U256::from(token_id), grantee, resource));
    }

    pub fn has_grant(&self, token_id: u64, grantee: Address, resource: Hash) -> bool {
        self.state
            .lock()
            .contracts
            .grants
            .contains(&(U256::from(token_id), grantee, resource))
    }

    pub fn token_uri(&self, token_id: u64) -> Option<String> {
        self.state.lock().contracts.uris.get(&U256::from(token_id)).cloned()
    }

    /// Every transaction accepted so far, reverted ones included
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().sent.clone()
    }

    pub fn attestations(&self) -> Vec<AttestationEntry> {
        self.state.lock().contracts.attestations.clone()
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    fn execute(
        &self,
        contracts: &mut ContractState,
        faults: &Faults,
        sender: Address,
        to: Address,
        data: &[u8],
        block_number: u64,
    ) -> Result<(Vec<u8>, u64), String> {
        let (sel, args) = split_selector(data).map_err(|e| e.to_string())?;
        if let Some(reason) = faults.reverts.get(&sel) {
            return Err(reason.clone());
        }

        if to == self.capability {
            execute_capability(contracts, sender, sel, args)
        } else if to == self.attestation {
            execute_attestation(contracts, sender, sel, args, block_number)
        } else {
            Err(format!("no contract at {}", to))
        }
    }
}

fn token_arg(tokens: &mut std::vec::IntoIter<Token>) -> Result<Token, String> {
    tokens.next().ok_or_else(|| "missing argument".to_string())
}

fn uint_arg(tokens: &mut std::vec::IntoIter<Token>) -> Result<U256, String> {
    token_arg(tokens)?
        .into_uint()
        .ok_or_else(|| "expected uint256".to_string())
}

fn address_arg(tokens: &mut std::vec::IntoIter<Token>) -> Result<Address, String> {
    token_arg(tokens)?
        .into_address()
        .ok_or_else(|| "expected address".to_string())
}

fn bytes32_arg(tokens: &mut std::vec::IntoIter<Token>) -> Result<Hash, String> {
    token_arg(tokens)?
        .into_fixed_bytes()
        .ok_or_else(|| "expected bytes32".to_string())
}

fn string_arg(tokens: &mut std::vec::IntoIter<Token>) -> Result<String, String> {
    token_arg(tokens)?
        .into_string()
        .ok_or_else(|| "expected string".to_string())
}

fn args(types: &[ParamType], data: &[u8]) -> Result<std::vec::IntoIter<Token>, String> {
    decode(types, data)
        .map(Vec::into_iter)
        .map_err(|e| e.to_string())
}

fn execute_capability(
    state: &mut ContractState,
    sender: Address,
    sel: [u8; 4],
    data: &[u8],
) -> Result<(Vec<u8>, u64), String> {
    let grant_types = [ParamType::Uint, ParamType::Address, ParamType::FixedBytes];

    if sel == selector(OWNER_OF) {
        let mut a = args(&[ParamType::Uint], data)?;
        let token_id = uint_arg(&mut a)?;
        let owner = state
            .owners
            .get(&token_id)
            .ok_or_else(|| "ERC721: invalid token ID".to_string())?;
        Ok((encode(&[Token::Address(*owner)]), 0))
    } else if sel == selector(MINT) {
        let mut a = args(&[ParamType::Address, ParamType::Uint, ParamType::String], data)?;
        let (to, token_id, uri) = (address_arg(&mut a)?, uint_arg(&mut a)?, string_arg(&mut a)?);
        if to.is_zero() {
            return Err("ERC721: mint to the zero address".to_string());
        }
        if state.owners.contains_key(&token_id) {
            return Err("ERC721: token already minted".to_string());
        }
        state.owners.insert(token_id, to);
        state.uris.insert(token_id, uri);
        Ok((Vec::new(), 2 * STORAGE_WRITE_GAS))
    } else if sel == selector(GRANT_ACCESS) || sel == selector(REVOKE_ACCESS) {
        let mut a = args(&grant_types, data)?;
        let (token_id, grantee, resource) =
            (uint_arg(&mut a)?, address_arg(&mut a)?, bytes32_arg(&mut a)?);
        let owner = state
            .owners
            .get(&token_id)
            .ok_or_else(|| "ERC721: invalid token ID".to_string())?;
        if *owner != sender {
            return Err("Not token owner".to_string());
        }
        if sel == selector(GRANT_ACCESS) {
            state.grants.insert((token_id, grantee, resource));
        } else {
            state.grants.remove(&(token_id, grantee, resource));
        }
        Ok((Vec::new(), STORAGE_WRITE_GAS))
    } else if sel == selector(HAS_ACCESS) {
        let mut a = args(&grant_types, data)?;
        let key = (uint_arg(&mut a)?, address_arg(&mut a)?, bytes32_arg(&mut a)?);
        Ok((encode(&[Token::Bool(state.grants.contains(&key))]), 0))
    } else {
        Err(format!("unknown selector 0x{}", hex::encode(sel)))
    }
}

fn execute_attestation(
    state: &mut ContractState,
    sender: Address,
    sel: [u8; 4],
    data: &[u8],
    block_number: u64,
) -> Result<(Vec<u8>, u64), String> {
    if sel != selector(SUBMIT_AGGREGATED_RESULT) {
        return Err(format!("unknown selector 0x{}", hex::encode(sel)));
    }

    let mut a = args(
        &[ParamType::String, ParamType::FixedBytes, ParamType::Uint, ParamType::Address],
        data,
    )?;
    let topic = string_arg(&mut a)?;
    let result_hash = bytes32_arg(&mut a)?;
    let accuracy = uint_arg(&mut a)?;
    let submitter = address_arg(&mut a)?;

    if topic.is_empty() {
        return Err("Empty research topic".to_string());
    }
    if accuracy > U256::from(100u8) {
        return Err("Accuracy out of range".to_string());
    }

    state.attestations.push(AttestationEntry {
        topic,
        result_hash,
        accuracy: accuracy.low_u64(),
        submitter,
        sender,
        block_number,
    });
    Ok((Vec::new(), 3 * STORAGE_WRITE_GAS))
}

#[async_trait]
impl LedgerRpc for Devnet {
    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain_id)
    }

    async fn call(&self, call: &ContractCall) -> Result<Vec<u8>, WalletError> {
        let state = self.state.lock();
        // Reads run against a scratch copy; nothing they do is kept
        let mut scratch = state.contracts.clone();
        trace!(function = %call.function, "devnet eth_call");
        self.execute(
            &mut scratch,
            &state.faults,
            Address::zero(),
            call.to,
            &call.data,
            state.block_number,
        )
        .map(|(output, _)| output)
        .map_err(WalletError::Reverted)
    }

    async fn gas_price(&self) -> Result<u128, WalletError> {
        Ok(self.gas_price)
    }

    async fn estimate_gas(&self, from: &Address, call: &ContractCall) -> Result<u64, WalletError> {
        let state = self.state.lock();
        let mut scratch = state.contracts.clone();
        self.execute(
            &mut scratch,
            &state.faults,
            *from,
            call.to,
            &call.data,
            state.block_number + 1,
        )
        .map(|(_, gas)| BASE_GAS + gas)
        .map_err(WalletError::Reverted)
    }

    async fn get_transaction_count(&self, address: &Address) -> Result<u64, WalletError> {
        let state = self.state.lock();
        if state.faults.stale_nonces {
            return Ok(0);
        }
        Ok(state.nonces.get(address).copied().unwrap_or(0))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, WalletError> {
        let signed = SignedTransaction::decode(raw)?;
        let tx = signed.transaction;
        let sender = tx.sender();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.faults.reject_broadcasts > 0 {
            state.faults.reject_broadcasts -= 1;
            return Err(WalletError::Rpc("-32000: txpool is full".to_string()));
        }
        if tx.chain_id != self.chain_id {
            return Err(WalletError::ChainIdMismatch {
                expected: self.chain_id,
                actual: tx.chain_id,
            });
        }
        let expected_nonce = state.nonces.get(&sender).copied().unwrap_or(0);
        if tx.nonce < expected_nonce {
            return Err(WalletError::Rpc(format!(
                "-32000: nonce too low: next nonce {}, tx nonce {}",
                expected_nonce, tx.nonce
            )));
        }
        if tx.nonce > expected_nonce {
            return Err(WalletError::Rpc(format!(
                "-32000: nonce gap: next nonce {}, tx nonce {}",
                expected_nonce, tx.nonce
            )));
        }
        let to = tx
            .to
            .ok_or_else(|| WalletError::Rpc("-32000: contract creation not supported".to_string()))?;

        state.nonces.insert(sender, expected_nonce + 1);
        state.block_number += 1;
        let block_number = state.block_number;

        // Writes land only if the whole call succeeds and fits the gas limit
        let mut next = state.contracts.clone();
        let outcome = self
            .execute(&mut next, &state.faults, sender, to, &tx.data, block_number)
            .and_then(|(_, gas)| {
                let used = BASE_GAS + gas;
                if used > tx.gas_limit {
                    Err("out of gas".to_string())
                } else {
                    Ok(used)
                }
            });

        let receipt = match outcome {
            Ok(gas_used) => {
                state.contracts = next;
                TransactionReceipt {
                    transaction_hash: signed.hash,
                    block_number,
                    status: true,
                    gas_used,
                    revert_reason: None,
                }
            }
            Err(reason) => TransactionReceipt {
                transaction_hash: signed.hash,
                block_number,
                status: false,
                gas_used: tx.gas_limit.min(BASE_GAS),
                revert_reason: Some(reason),
            },
        };
        debug!(
            hash = %signed.hash,
            from = %sender,
            nonce = tx.nonce,
            block = block_number,
            status = receipt.status,
            "devnet mined transaction"
        );

        let hidden_for = state.faults.confirmation_polls;
        state.receipts.insert(signed.hash, StoredReceipt { receipt, hidden_for });
        state.sent.push(tx);
        Ok(signed.hash)
    }

    async fn get_transaction_receipt(
        &self,
        hash: &Hash,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.faults.withhold_receipts {
            return Ok(None);
        }
        let Some(stored) = state.receipts.get_mut(hash) else {
            return Ok(None);
        };
        if stored.hidden_for > 0 {
            stored.hidden_for -= 1;
            return Ok(None);
        }
        Ok(Some(stored.receipt.clone()))
    }
}
