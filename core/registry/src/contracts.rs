// forge/core/registry/src/contracts.rs

//! Function signatures and call builders for the two deployed contracts.

use forge_primitives::{keccak256, Address, ContractCall, Hash, Token, U256};
use serde::{Deserialize, Serialize};

pub const OWNER_OF: &str = "ownerOf(uint256)";
pub const MINT: &str = "mint(address,uint256,string)";
pub const GRANT_ACCESS: &str = "grantAccess(uint256,address,bytes32)";
pub const HAS_ACCESS: &str = "hasAccess(uint256,address,bytes32)";
pub const REVOKE_ACCESS: &str = "revokeAccess(uint256,address,bytes32)";
pub const SUBMIT_AGGREGATED_RESULT: &str = "submitAggregatedResult(string,bytes32,uint256,address)";

/// On-chain resource type identifier: keccak256 of the UTF-8 name
pub fn resource_hash(name: &str) -> Hash {
    keccak256(name.as_bytes())
}

/// Deployed contract addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub capability: Address,
    pub attestation: Address,
}

pub fn owner_of(contract: Address, token_id: u64) -> ContractCall {
    ContractCall::new(contract, OWNER_OF, &[Token::Uint(U256::from(token_id))])
}

pub fn mint(contract: Address, to: Address, token_id: u64, uri: &str) -> ContractCall {
    ContractCall::new(
        contract,
        MINT,
        &[
            Token::Address(to),
            Token::Uint(U256::from(token_id)),
            Token::String(uri.to_string()),
        ],
    )
}

pub fn grant_access(contract: Address, token_id: u64, grantee: Address, resource: Hash) -> ContractCall {
    ContractCall::new(
        contract,
        GRANT_ACCESS,
        &[
            Token::Uint(U256::from(token_id)),
            Token::Address(grantee),
            Token::FixedBytes(resource),
        ],
    )
}

pub fn revoke_access(contract: Address, token_id: u64, grantee: Address, resource: Hash) -> ContractCall {
    ContractCall::new(
        contract,
        REVOKE_ACCESS,
        &[
            Token::Uint(U256::from(token_id)),
            Token::Address(grantee),
            Token::FixedBytes(resource),
        ],
    )
}

pub fn has_access(contract: Address, token_id: u64, grantee: Address, resource: Hash) -> ContractCall {
    ContractCall::new(
        contract,
        HAS_ACCESS,
        &[
            Token::Uint(U256::from(token_id)),
            Token::Address(grantee),
            Token::FixedBytes(resource),
        ],
    )
}

pub fn submit_aggregated_result(
    contract: Address,
    topic: &str,
    result_hash: Hash,
    accuracy: u8,
    submitter: Address,
) -> ContractCall {
    ContractCall::new(
        contract,
        SUBMIT_AGGREGATED_RESULT,
        &[
            Token::String(topic.to_string()),
            Token::FixedBytes(result_hash),
            Token::Uint(U256::from(accuracy)),
            Token::Address(submitter),
        ],
    )
}
