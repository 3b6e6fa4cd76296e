// forge/core/primitives/src/lib.rs

//! Shared ledger primitives: hashes, addresses and the contract-call codec.

pub mod abi;
pub mod types;

pub use abi::{AbiError, ContractCall, ParamType, Token};
pub use primitive_types::U256;
pub use types::{keccak256, Address, Hash, ParseError};
