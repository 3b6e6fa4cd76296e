// forge/core/orchestrator/src/outcome.rs

use chrono::{DateTime, Utc};
use forge_federated::SchemaMismatch;
use forge_primitives::{Address, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a research round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    Verifying,
    Training,
    Aggregating,
    Evaluating,
    Submitting,
    Done,
    Aborted,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Done | RoundState::Aborted)
    }

    /// Cancellation is honored only before anything is sent to the ledger
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            RoundState::Idle
                | RoundState::Verifying
                | RoundState::Training
                | RoundState::Aggregating
                | RoundState::Evaluating
        )
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Idle => "idle",
            RoundState::Verifying => "verifying",
            RoundState::Training => "training",
            RoundState::Aggregating => "aggregating",
            RoundState::Evaluating => "evaluating",
            RoundState::Submitting => "submitting",
            RoundState::Done => "done",
            RoundState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why a round stopped before producing a result
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    PermissionDenied {
        token_id: u64,
        grantee: Address,
        resource: Hash,
    },
    /// The access check itself could not be performed
    LedgerUnavailable { cause: String },
    DataUnavailable { cause: String },
    NoViableModel { participants: usize },
    SchemaMismatch(SchemaMismatch),
    AttestationFailed {
        tx_hash: Option<Hash>,
        cause: String,
    },
    Cancelled { stage: RoundState },
}

impl AbortReason {
    pub fn name(&self) -> &'static str {
        match self {
            AbortReason::PermissionDenied { .. } => "PermissionDenied",
            AbortReason::LedgerUnavailable { .. } => "LedgerUnavailable",
            AbortReason::DataUnavailable { .. } => "DataUnavailable",
            AbortReason::NoViableModel { .. } => "NoViableModel",
            AbortReason::SchemaMismatch(_) => "SchemaMismatch",
            AbortReason::AttestationFailed { .. } => "AttestationFailed",
            AbortReason::Cancelled { .. } => "Cancelled",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::PermissionDenied {
                token_id,
                grantee,
                resource,
            } => write!(
                f,
                "{} has no grant on token {} for resource {}",
                grantee, token_id, resource
            ),
            AbortReason::LedgerUnavailable { cause } => write!(f, "access check failed: {}", cause),
            AbortReason::DataUnavailable { cause } => write!(f, "dataset unavailable: {}", cause),
            AbortReason::NoViableModel { participants } => {
                write!(f, "none of {} participants produced a model", participants)
            }
            AbortReason::SchemaMismatch(e) => write!(f, "local models disagree: {}", e),
            AbortReason::AttestationFailed {
                tx_hash: Some(hash),
                cause,
            } => write!(f, "attestation {} failed: {}", hash, cause),
            AbortReason::AttestationFailed { tx_hash: None, cause } => {
                write!(f, "attestation failed before broadcast: {}", cause)
            }
            AbortReason::Cancelled { stage } => write!(f, "cancelled during {}", stage),
        }
    }
}

/// The attested result of a completed round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub topic: String,
    pub content_hash: Hash,
    /// Rounded holdout accuracy, 0..=100
    pub accuracy: u8,
    pub submitter: Address,
    pub tx_hash: Hash,
    pub block_number: u64,
    pub participants: usize,
    pub viable: usize,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Done(ResultRecord),
    Aborted { stage: RoundState, reason: AbortReason },
}

impl RoundOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            RoundOutcome::Done(_) => "Done",
            RoundOutcome::Aborted { reason, .. } => reason.name(),
        }
    }

    pub fn result(&self) -> Option<&ResultRecord> {
        match self {
            RoundOutcome::Done(record) => Some(record),
            RoundOutcome::Aborted { .. } => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            RoundOutcome::Done(_) => None,
            RoundOutcome::Aborted { reason, .. } => Some(reason),
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RoundOutcome::Done(_) => 0,
            RoundOutcome::Aborted { reason, .. } => match reason {
                AbortReason::PermissionDenied { .. } => 2,
                AbortReason::NoViableModel { .. } => 3,
                AbortReason::SchemaMismatch(_) => 4,
                AbortReason::AttestationFailed { .. } => 5,
                AbortReason::DataUnavailable { .. } => 7,
                AbortReason::LedgerUnavailable { .. } => EXIT_LEDGER_UNAVAILABLE,
                AbortReason::Cancelled { .. } => 130,
            },
        }
    }
}

/// Exit code for a failed provisioning write
pub const EXIT_LEDGER_WRITE_FAILED: i32 = 6;

/// Exit code for configuration and usage errors
pub const EXIT_CONFIG: i32 = 1;

/// Exit code when the ledger cannot be reached or read
pub const EXIT_LEDGER_UNAVAILABLE: i32 = 8;

#[cfg(test)]
mod tests {
    use super::*;

    fn aborted(reason: AbortReason) -> RoundOutcome {
        RoundOutcome::Aborted {
            stage: RoundState::Verifying,
            reason,
        }
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let outcomes = [
            aborted(AbortReason::PermissionDenied {
                token_id: 1,
                grantee: Address::zero(),
                resource: Hash::default(),
            }),
            aborted(AbortReason::NoViableModel { participants: 3 }),
            aborted(AbortReason::SchemaMismatch(SchemaMismatch::Malformed { index: 0 })),
            aborted(AbortReason::AttestationFailed {
                tx_hash: None,
                cause: "x".into(),
            }),
            aborted(AbortReason::DataUnavailable { cause: "x".into() }),
            aborted(AbortReason::LedgerUnavailable { cause: "x".into() }),
            aborted(AbortReason::Cancelled {
                stage: RoundState::Training,
            }),
        ];
        let mut codes: Vec<i32> = outcomes.iter().map(RoundOutcome::exit_code).collect();
        codes.push(EXIT_CONFIG);
        codes.push(EXIT_LEDGER_WRITE_FAILED);
        codes.push(0);
        let len = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len);
    }

    #[test]
    fn test_cancellable_stages() {
        assert!(RoundState::Evaluating.is_cancellable());
        assert!(!RoundState::Submitting.is_cancellable());
        assert!(!RoundState::Done.is_cancellable());
        assert!(RoundState::Aborted.is_terminal());
    }

    #[test]
    fn test_reason_display_carries_detail() {
        let reason = AbortReason::NoViableModel { participants: 3 };
        assert_eq!(reason.to_string(), "none of 3 participants produced a model");
        let reason = AbortReason::AttestationFailed {
            tx_hash: Some(Hash::new([0xab; 32])),
            cause: "timed out".into(),
        };
        assert!(reason.to_string().contains("0xabab"));
    }
}
