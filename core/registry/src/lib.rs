// forge/core/registry/src/lib.rs

//! Bindings for the capability (identity token + access grant) contract and
//! the result attestation contract, plus an in-memory devnet hosting both.

pub mod attestation;
pub mod capability;
pub mod context;
pub mod contracts;
pub mod devnet;
pub mod error;

pub use attestation::AttestationContract;
pub use capability::{CapabilityRegistry, TxResult};
pub use context::LedgerContext;
pub use contracts::{resource_hash, ContractAddresses};
pub use devnet::{AttestationEntry, Devnet};
pub use error::RegistryError;
