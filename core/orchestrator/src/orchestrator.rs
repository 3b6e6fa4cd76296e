// forge/core/orchestrator/src/orchestrator.rs

//! The research round state machine.
//!
//! `Idle → Verifying → Training → Aggregating → Evaluating → Submitting → Done`,
//! with `Aborted` reachable from every stage. Nothing touches the ledger
//! before `Submitting` except the access read in `Verifying`.

use crate::config::OrchestratorConfig;
use crate::outcome::{AbortReason, ResultRecord, RoundOutcome, RoundState};
use chrono::Utc;
use forge_federated::{
    holdout_sample, split_partitions, Aggregator, DatasetSource, Evaluator, FeatureSchema, LocalModel, Record,
    TrainingConfig, TrainingOutcome, TrainingUnit,
};
use forge_primitives::Hash;
use forge_registry::{resource_hash, LedgerContext, RegistryError, TxResult};
use forge_wallet::Credentials;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Cooperative cancellation shared between a round and whoever may stop it
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-round parameters, derived from [`OrchestratorConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSettings {
    pub topic: String,
    pub token_id: u64,
    pub resource: String,
    pub token_uri: String,
    pub partitions: usize,
    pub holdout_fraction: f64,
    pub holdout_seed: u64,
    pub training: TrainingConfig,
    pub schema: FeatureSchema,
}

impl RoundSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            topic: config.research.topic.clone(),
            token_id: config.research.token_id,
            resource: config.research.resource.clone(),
            token_uri: config.research.token_uri(),
            partitions: config.research.partitions,
            holdout_fraction: config.dataset.holdout_fraction,
            holdout_seed: config.dataset.holdout_seed,
            training: config.training.learner.clone(),
            schema: config.training.schema.clone(),
        }
    }

    pub fn resource_hash(&self) -> Hash {
        resource_hash(&self.resource)
    }
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Ledger writes made while provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub mint: TxResult,
    pub grant: TxResult,
}

/// Runs research rounds for one agent
pub struct ResearchOrchestrator {
    ctx: LedgerContext,
    dataset: Arc<dyn DatasetSource>,
    agent: Credentials,
    settings: RoundSettings,
    cancel: CancellationFlag,
    state: RwLock<RoundState>,
}

impl ResearchOrchestrator {
    pub fn new(
        ctx: LedgerContext,
        dataset: Arc<dyn DatasetSource>,
        agent: Credentials,
        settings: RoundSettings,
    ) -> Self {
        Self {
            ctx,
            dataset,
            agent,
            settings,
            cancel: CancellationFlag::new(),
            state: RwLock::new(RoundState::Idle),
        }
    }

    pub fn settings(&self) -> &RoundSettings {
        &self.settings
    }

    /// Handle for stopping the round from elsewhere
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> RoundState {
        *self.state.read()
    }

    fn enter(&self, next: RoundState) {
        let mut state = self.state.write();
        let from = *state;
        info!(from = %from, to = %next, "round stage");
        *state = next;
    }

    fn abort(&self, stage: RoundState, reason: AbortReason) -> RoundOutcome {
        warn!(stage = %stage, outcome = reason.name(), %reason, "round aborted");
        *self.state.write() = RoundState::Aborted;
        RoundOutcome::Aborted { stage, reason }
    }

    /// Stage boundary: abort if cancelled while the current stage still allows it
    fn checkpoint(&self) -> Result<(), RoundOutcome> {
        let stage = self.state();
        if stage.is_cancellable() && self.cancel.is_cancelled() {
            return Err(self.abort(stage, AbortReason::Cancelled { stage }));
        }
        Ok(())
    }

    /// Mint the identity token to `owner` and grant the agent access.
    ///
    /// Both steps are skipped when the ledger already reflects them.
    pub async fn provision(&self, owner: &Credentials) -> Result<ProvisionReport, RegistryError> {
        let registry = self.ctx.capability_registry();
        let token_id = self.settings.token_id;
        info!(
            token_id,
            owner = %owner.address(),
            agent = %self.agent.address(),
            resource = %self.settings.resource,
            "provisioning access"
        );

        let mint = registry
            .mint_if_absent(token_id, owner.address(), &self.settings.token_uri, owner)
            .await?;
        let grant = registry
            .grant_access(token_id, self.agent.address(), self.settings.resource_hash(), owner)
            .await?;
        Ok(ProvisionReport { mint, grant })
    }

    /// Run one round to a terminal outcome
    pub async fn run(&self) -> RoundOutcome {
        let round_id = Uuid::new_v4();
        let span = info_span!("round", %round_id, topic = %self.settings.topic);
        async {
            let outcome = match self.run_stages().await {
                Ok(record) => {
                    self.enter(RoundState::Done);
                    RoundOutcome::Done(record)
                }
                Err(outcome) => outcome,
            };
            info!(outcome = outcome.name(), exit_code = outcome.exit_code(), "round finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self) -> Result<ResultRecord, RoundOutcome> {
        *self.state.write() = RoundState::Idle;

        self.checkpoint()?;
        self.enter(RoundState::Verifying);
        self.verify().await?;

        self.checkpoint()?;
        self.enter(RoundState::Training);
        let records = self.load_dataset().await?;
        let outcomes = self.train(&records).await;
        let participants = outcomes.len();

        self.checkpoint()?;
        self.enter(RoundState::Aggregating);
        let models: Vec<Option<LocalModel>> = outcomes.into_iter().map(|o| o.model).collect();
        let viable = models.iter().filter(|m| m.is_some()).count();
        let global = match Aggregator::new().aggregate(&models) {
            Ok(Some(global)) => global,
            Ok(None) => {
                return Err(self.abort(RoundState::Aggregating, AbortReason::NoViableModel { participants }))
            }
            Err(e) => return Err(self.abort(RoundState::Aggregating, AbortReason::SchemaMismatch(e))),
        };

        self.checkpoint()?;
        self.enter(RoundState::Evaluating);
        let holdout = holdout_sample(&records, self.settings.holdout_fraction, self.settings.holdout_seed);
        let accuracy = Evaluator::new().evaluate(Some(&global), &holdout, &self.settings.schema);
        info!(accuracy, holdout = holdout.len(), "global model evaluated");

        // Last chance to stop; once submitting, the round runs to completion
        self.checkpoint()?;
        self.enter(RoundState::Submitting);
        let content_hash = global.canonical_hash();
        let accuracy = round_accuracy(accuracy);
        let submitter = self.agent.address();

        let receipt = self
            .ctx
            .attestation_contract()
            .submit_aggregated_result(&self.settings.topic, content_hash, accuracy, submitter, &self.agent)
            .await
            .map_err(|e| {
                self.abort(
                    RoundState::Submitting,
                    AbortReason::AttestationFailed {
                        tx_hash: e.tx_hash(),
                        cause: e.to_string(),
                    },
                )
            })?;

        info!(
            content_hash = %content_hash,
            accuracy,
            tx_hash = %receipt.hash,
            block = receipt.block_number,
            "result attested"
        );
        Ok(ResultRecord {
            topic: self.settings.topic.clone(),
            content_hash,
            accuracy,
            submitter,
            tx_hash: receipt.hash,
            block_number: receipt.block_number,
            participants,
            viable,
            confirmed_at: Utc::now(),
        })
    }

    async fn verify(&self) -> Result<(), RoundOutcome> {
        let token_id = self.settings.token_id;
        let grantee = self.agent.address();
        let resource = self.settings.resource_hash();

        match self
            .ctx
            .capability_registry()
            .has_access(token_id, grantee, resource)
            .await
        {
            Ok(true) => {
                info!(token_id, grantee = %grantee, "access verified");
                Ok(())
            }
            Ok(false) => Err(self.abort(
                RoundState::Verifying,
                AbortReason::PermissionDenied {
                    token_id,
                    grantee,
                    resource,
                },
            )),
            Err(e) => Err(self.abort(
                RoundState::Verifying,
                AbortReason::LedgerUnavailable { cause: e.to_string() },
            )),
        }
    }

    /// Read the dataset on the blocking pool
    async fn load_dataset(&self) -> Result<Vec<Record>, RoundOutcome> {
        let dataset = self.dataset.clone();
        let loaded = tokio::task::spawn_blocking(move || dataset.load())
            .await
            .map_err(|e| format!("{}: load task failed: {}", self.dataset.describe(), e))
            .and_then(|r| r.map_err(|e| format!("{}: {}", self.dataset.describe(), e)));

        match loaded {
            Ok(records) => {
                info!(source = %self.dataset.describe(), rows = records.len(), "dataset loaded");
                Ok(records)
            }
            Err(cause) => Err(self.abort(RoundState::Training, AbortReason::DataUnavailable { cause })),
        }
    }

    /// Train every partition on the blocking pool and wait for all of them
    async fn train(&self, records: &[Record]) -> Vec<TrainingOutcome> {
        let partitions = split_partitions(records, self.settings.partitions);
        let schema = Arc::new(self.settings.schema.clone());

        let handles = partitions.into_iter().enumerate().map(|(id, partition)| {
            let unit = TrainingUnit::new(id, self.settings.training.clone());
            let schema = schema.clone();
            tokio::task::spawn_blocking(move || unit.train(&partition, &schema))
        });

        futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(id, joined)| {
                joined.unwrap_or_else(|e| {
                    warn!(unit = id, error = %e, "training task failed");
                    TrainingOutcome::absent()
                })
            })
            .collect()
    }
}

/// Round half up into 0..=100
pub fn round_accuracy(accuracy: f64) -> u8 {
    if !accuracy.is_finite() {
        return 0;
    }
    (accuracy + 0.5).floor().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_accuracy() {
        assert_eq!(round_accuracy(0.0), 0);
        assert_eq!(round_accuracy(66.49), 66);
        assert_eq!(round_accuracy(66.5), 67);
        assert_eq!(round_accuracy(99.7), 100);
        assert_eq!(round_accuracy(100.0), 100);
        assert_eq!(round_accuracy(-3.0), 0);
        assert_eq!(round_accuracy(f64::NAN), 0);
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = RoundSettings::default();
        assert_eq!(settings.token_uri, "https://example.com/carv-id/101");
        assert_eq!(settings.resource_hash(), resource_hash("drug_discovery_data"));
        assert_eq!(settings.partitions, 3);
    }
}
