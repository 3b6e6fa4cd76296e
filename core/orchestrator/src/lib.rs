// forge/core/orchestrator/src/lib.rs

//! Research round orchestration: verify the capability grant, train and
//! aggregate across participants, evaluate, and attest the result on chain.

pub mod config;
pub mod orchestrator;
pub mod outcome;

pub use config::{ConfigError, OrchestratorConfig};
pub use orchestrator::{round_accuracy, CancellationFlag, ProvisionReport, ResearchOrchestrator, RoundSettings};
pub use outcome::{
    AbortReason, ResultRecord, RoundOutcome, RoundState, EXIT_CONFIG, EXIT_LEDGER_UNAVAILABLE, EXIT_LEDGER_WRITE_FAILED,
};
