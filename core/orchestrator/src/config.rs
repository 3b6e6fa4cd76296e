// forge/core/orchestrator/src/config.rs

use forge_federated::{FeatureSchema, TrainingConfig};
use forge_primitives::Address;
use forge_registry::ContractAddresses;
use forge_wallet::{GasConfig, LedgerConfig, PollConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_RPC_URL: &str = "FORGE_RPC_URL";
pub const ENV_CHAIN_ID: &str = "FORGE_CHAIN_ID";
pub const ENV_CAPABILITY_CONTRACT: &str = "FORGE_CAPABILITY_CONTRACT";
pub const ENV_ATTESTATION_CONTRACT: &str = "FORGE_ATTESTATION_CONTRACT";
pub const ENV_DATASET: &str = "FORGE_DATASET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Ledger endpoint plus the deployed contract addresses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    #[serde(flatten)]
    pub connection: LedgerConfig,

    pub capability_contract: Option<Address>,

    pub attestation_contract: Option<Address>,
}

/// What the round is about and which grant gates it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub topic: String,

    /// Identity token whose owner grants data access
    pub token_id: u64,

    /// Resource name; hashed with keccak256 on chain
    pub resource: String,

    /// Number of simulated participants
    pub partitions: usize,

    /// Metadata URI prefix; the token id is appended when minting
    pub token_uri_base: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            topic: "Drug Discovery - Disease X Prediction".to_string(),
            token_id: 101,
            resource: "drug_discovery_data".to_string(),
            partitions: 3,
            token_uri_base: "https://example.com/carv-id/".to_string(),
        }
    }
}

impl ResearchConfig {
    pub fn token_uri(&self) -> String {
        format!("{}{}", self.token_uri_base, self.token_id)
    }
}

/// Learner hyperparameters and the shared feature layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    #[serde(flatten)]
    pub learner: TrainingConfig,

    pub schema: FeatureSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,

    /// Share of rows sampled for evaluation
    pub holdout_fraction: f64,

    pub holdout_seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("anonymized_medical_data.csv"),
            holdout_fraction: 0.1,
            holdout_seed: 42,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub ledger: LedgerSection,
    pub gas: GasConfig,
    pub polling: PollConfig,
    pub research: ResearchConfig,
    pub training: TrainingSection,
    pub dataset: DatasetConfig,
}

impl OrchestratorConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Apply `FORGE_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.ledger.connection.rpc_url = url;
        }
        if let Some(value) = lookup(ENV_CHAIN_ID) {
            self.ledger.connection.chain_id = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_CHAIN_ID,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_CAPABILITY_CONTRACT) {
            let address = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_CAPABILITY_CONTRACT,
                value,
            })?;
            self.ledger.capability_contract = Some(address);
        }
        if let Some(value) = lookup(ENV_ATTESTATION_CONTRACT) {
            let address = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_ATTESTATION_CONTRACT,
                value,
            })?;
            self.ledger.attestation_contract = Some(address);
        }
        if let Some(path) = lookup(ENV_DATASET) {
            self.dataset.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check the settings a round cannot start without
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.research.partitions == 0 {
            return invalid("research.partitions must be at least 1");
        }
        if self.research.topic.trim().is_empty() {
            return invalid("research.topic must not be empty");
        }
        if !(self.dataset.holdout_fraction > 0.0 && self.dataset.holdout_fraction < 1.0) {
            return invalid("dataset.holdout_fraction must be between 0 and 1");
        }
        if self.polling.max_attempts == 0 {
            return invalid("polling.max_attempts must be at least 1");
        }
        if self.gas.base_fee_multiplier == 0 {
            return invalid("gas.base_fee_multiplier must be at least 1");
        }
        if self.training.learner.max_iter == 0 || !(self.training.learner.learning_rate > 0.0) {
            return invalid("training.max_iter and training.learning_rate must be positive");
        }
        if self.training.schema.width() == 0 {
            return invalid("training.schema must define at least one category");
        }
        self.contract_addresses().map(|_| ())
    }

    pub fn contract_addresses(&self) -> Result<ContractAddresses, ConfigError> {
        match (self.ledger.capability_contract, self.ledger.attestation_contract) {
            (Some(capability), Some(attestation)) => Ok(ContractAddresses {
                capability,
                attestation,
            }),
            (None, _) => Err(ConfigError::Invalid(format!(
                "ledger.capability_contract is not set (or {})",
                ENV_CAPABILITY_CONTRACT
            ))),
            (_, None) => Err(ConfigError::Invalid(format!(
                "ledger.attestation_contract is not set (or {})",
                ENV_ATTESTATION_CONTRACT
            ))),
        }
    }
}
