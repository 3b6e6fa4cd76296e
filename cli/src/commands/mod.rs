//forge/cli/src/commands/mod.rs
//
// Shared setup for subcommands: config loading, ledger connection, keys

pub mod access;
pub mod data;
pub mod provision;
pub mod run;

use anyhow::{Context, Result};
use forge_federated::synthetic;
use forge_federated::{CsvDataset, DatasetSource, InMemoryDataset};
use forge_orchestrator::{OrchestratorConfig, ResearchOrchestrator, RoundSettings};
use forge_primitives::Address;
use forge_registry::{Devnet, LedgerContext};
use forge_wallet::{Credentials, LedgerRpc};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const ENV_INFRA_KEY: &str = "FORGE_INFRA_KEY";
pub const ENV_AGENT_KEY: &str = "FORGE_AGENT_KEY";

/// Fixed keys and addresses for `--devnet`; never use these on a real ledger
const DEVNET_INFRA_SEED: [u8; 32] = [0x11; 32];
const DEVNET_AGENT_SEED: [u8; 32] = [0x22; 32];
const DEVNET_CAPABILITY: Address = Address([0xca; 20]);
const DEVNET_ATTESTATION: Address = Address([0xa7; 20]);
const DEVNET_ROWS: usize = 1_000;

/// Global flags every subcommand sees
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<std::path::PathBuf>,
    pub devnet: bool,
}

/// A loaded configuration bound to a ledger
pub struct Session {
    pub config: OrchestratorConfig,
    pub ctx: LedgerContext,
    pub devnet: Option<Arc<Devnet>>,
}

impl Session {
    pub async fn open(args: &GlobalArgs) -> Result<Self> {
        let mut config = load_config(args.config.as_deref())?;

        if args.devnet {
            config.ledger.capability_contract.get_or_insert(DEVNET_CAPABILITY);
            config.ledger.attestation_contract.get_or_insert(DEVNET_ATTESTATION);
        }
        config.validate()?;
        let contracts = config.contract_addresses()?;

        let (rpc, devnet): (Arc<dyn LedgerRpc>, _) = if args.devnet {
            let devnet = Arc::new(Devnet::new(
                config.ledger.connection.chain_id,
                contracts.capability,
                contracts.attestation,
            ));
            info!(chain_id = config.ledger.connection.chain_id, "using in-memory devnet");
            let rpc: Arc<dyn LedgerRpc> = devnet.clone();
            (rpc, Some(devnet))
        } else {
            let rpc = config
                .ledger
                .connection
                .connect()
                .await
                .with_context(|| format!("connecting to {}", config.ledger.connection.rpc_url))?;
            (rpc, None)
        };

        let tx = config
            .ledger
            .connection
            .transaction_manager(rpc, &config.gas, &config.polling);
        let ctx = LedgerContext::new(Arc::new(tx), contracts);

        Ok(Self { config, ctx, devnet })
    }

    pub fn infra_credentials(&self) -> Result<Credentials> {
        self.credentials("infra", ENV_INFRA_KEY, DEVNET_INFRA_SEED)
    }

    pub fn agent_credentials(&self) -> Result<Credentials> {
        self.credentials("agent", ENV_AGENT_KEY, DEVNET_AGENT_SEED)
    }

    fn credentials(&self, label: &str, var: &str, devnet_seed: [u8; 32]) -> Result<Credentials> {
        if self.devnet.is_some() && std::env::var(var).is_err() {
            return Ok(Credentials::from_seed(label, devnet_seed));
        }
        Credentials::from_env(label, var).with_context(|| format!("loading {} key", label))
    }

    /// The configured CSV; on a devnet a missing file falls back to synthetic rows
    pub fn dataset(&self) -> Arc<dyn DatasetSource> {
        let path = &self.config.dataset.path;
        if self.devnet.is_some() && !path.exists() {
            warn!(path = %path.display(), rows = DEVNET_ROWS, "dataset not found, using synthetic records");
            let records = synthetic::generate(DEVNET_ROWS, self.config.dataset.holdout_seed, &self.config.training.schema)
                .into_iter()
                .map(|row| row.record)
                .collect();
            return Arc::new(InMemoryDataset::new(records));
        }
        Arc::new(CsvDataset::new(path.clone()))
    }

    pub fn orchestrator(&self) -> Result<ResearchOrchestrator> {
        Ok(ResearchOrchestrator::new(
            self.ctx.clone(),
            self.dataset(),
            self.agent_credentials()?,
            RoundSettings::from_config(&self.config),
        ))
    }
}

/// Defaults, then the optional TOML file, then `FORGE_*` overrides
pub fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    let mut config = match path {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}
