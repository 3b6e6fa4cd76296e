// forge/core/registry/tests/registry_tests.rs
//
// Capability registry and attestation contract against the in-memory devnet:
// - Grant visibility and re-reads
// - Idempotent mint and grant
// - Write failures surfacing as LedgerWriteFailed

use forge_primitives::Address;
use forge_registry::*;
use forge_wallet::{Credentials, GasConfig, LedgerConfig, PollConfig, TxError};
use std::sync::Arc;

const TOKEN: u64 = 101;

struct Harness {
    devnet: Arc<Devnet>,
    ctx: LedgerContext,
    owner: Credentials,
    agent: Credentials,
}

fn harness() -> Harness {
    let devnet = Arc::new(Devnet::new(1337, Address([0xca; 20]), Address([0xa7; 20])));
    let poll = PollConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        timeout_secs: 5,
    };
    let tx = LedgerConfig::default().transaction_manager(devnet.clone(), &GasConfig::default(), &poll);
    let ctx = LedgerContext::new(
        Arc::new(tx),
        ContractAddresses {
            capability: devnet.capability_address(),
            attestation: devnet.attestation_address(),
        },
    );
    Harness {
        devnet,
        ctx,
        owner: Credentials::from_seed("infra", [1; 32]),
        agent: Credentials::from_seed("agent", [2; 32]),
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_visible_immediately_after_confirmation() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        let resource = resource_hash("drug_discovery_data");

        registry
            .mint_if_absent(TOKEN, h.owner.address(), "https://example.com/carv-id/101", &h.owner)
            .await
            .unwrap();
        assert!(!registry.has_access(TOKEN, h.agent.address(), resource).await.unwrap());

        let result = registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.owner)
            .await
            .unwrap();
        assert!(matches!(result, TxResult::Committed(_)));
        assert!(registry.has_access(TOKEN, h.agent.address(), resource).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_access_rereads_ledger() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        let resource = resource_hash("drug_discovery_data");

        registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap();
        registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.owner)
            .await
            .unwrap();
        assert!(registry.has_access(TOKEN, h.agent.address(), resource).await.unwrap());

        h.devnet.revoke_access(TOKEN, h.agent.address(), resource);
        assert!(!registry.has_access(TOKEN, h.agent.address(), resource).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_is_scoped_to_resource_and_grantee() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        let resource = resource_hash("drug_discovery_data");

        registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap();
        registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.owner)
            .await
            .unwrap();

        let other_resource = resource_hash("whale_data");
        assert!(!registry.has_access(TOKEN, h.agent.address(), other_resource).await.unwrap());
        assert!(!registry.has_access(TOKEN, h.owner.address(), resource).await.unwrap());
        assert!(!registry.has_access(TOKEN + 1, h.agent.address(), resource).await.unwrap());
    }

    #[tokio::test]
    async fn test_mint_and_grant_are_idempotent() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        let resource = resource_hash("drug_discovery_data");

        let first = registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap();
        assert!(!first.is_skipped());
        registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.owner)
            .await
            .unwrap();
        let sent = h.devnet.sent_transactions().len();

        let mint_again = registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap();
        let grant_again = registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.owner)
            .await
            .unwrap();

        assert_eq!(mint_again, TxResult::Skipped);
        assert_eq!(grant_again, TxResult::Skipped);
        assert_eq!(h.devnet.sent_transactions().len(), sent);
    }

    #[tokio::test]
    async fn test_owner_of_unminted_is_none() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        assert_eq!(registry.owner_of(TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_grant_by_non_owner_is_ledger_write_failure() {
        let h = harness();
        let registry = h.ctx.capability_registry();
        let resource = resource_hash("drug_discovery_data");

        registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap();
        let err = registry
            .grant_access(TOKEN, h.agent.address(), resource, &h.agent)
            .await
            .unwrap_err();

        match err {
            RegistryError::LedgerWriteFailed { action, token_id, source } => {
                assert_eq!(action, "grantAccess");
                assert_eq!(token_id, TOKEN);
                assert!(matches!(source, TxError::Reverted { ref reason, .. }
                    if reason.as_deref() == Some("Not token owner")));
                assert!(source.tx_hash().is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mint_timeout_carries_hash() {
        let h = harness();
        h.devnet.withhold_receipts(true);
        let registry = h.ctx.capability_registry();

        let err = registry
            .mint_if_absent(TOKEN, h.owner.address(), "", &h.owner)
            .await
            .unwrap_err();
        match err {
            RegistryError::LedgerWriteFailed { source: TxError::TimedOut { attempts, .. }, .. } => {
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

#[cfg(test)]
mod attestation_tests {
    use super::*;
    use forge_primitives::keccak256;

    #[tokio::test]
    async fn test_submit_records_attestation() {
        let h = harness();
        let attestation = h.ctx.attestation_contract();
        let hash = keccak256(b"{\"coef\":[[0.5]],\"intercept\":[0.1]}");

        let receipt = attestation
            .submit_aggregated_result("Drug Discovery - Disease X Prediction", hash, 87, h.agent.address(), &h.agent)
            .await
            .unwrap();
        assert_eq!(receipt.from, h.agent.address());
        assert_eq!(receipt.function, contracts::SUBMIT_AGGREGATED_RESULT);

        let entries = h.devnet.attestations();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].topic, "Drug Discovery - Disease X Prediction");
        assert_eq!(entries[0].result_hash, hash);
        assert_eq!(entries[0].accuracy, 87);
        assert_eq!(entries[0].submitter, h.agent.address());
        assert_eq!(entries[0].block_number, receipt.block_number);
    }

    #[tokio::test]
    async fn test_submit_revert_is_reported() {
        let h = harness();
        h.devnet.revert_function(contracts::SUBMIT_AGGREGATED_RESULT, "Submissions closed");
        let attestation = h.ctx.attestation_contract();

        let err = attestation
            .submit_aggregated_result("topic", keccak256(b"m"), 50, h.agent.address(), &h.agent)
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::Reverted { reason: Some(ref r), .. } if r == "Submissions closed"));
        assert!(h.devnet.attestations().is_empty());
    }
}
