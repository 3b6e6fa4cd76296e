//! Transaction lifecycle: nonce allocation, fee selection, signing,
//! broadcast and bounded confirmation polling.
//!
//! Each submission walks `Built → Signed → Submitted → {Confirmed | Reverted | TimedOut}`
//! exactly once. Nonce acquisition and broadcast are serialized per signer;
//! different signers proceed independently. Nothing here resubmits: a retry
//! is a fresh [`TransactionManager::submit`] call with a fresh nonce read.

use crate::credentials::Credentials;
use crate::errors::TxError;
use crate::gas::{FeeParams, GasLimitPolicy, GasPolicy};
use crate::rpc_client::{LedgerRpc, TransactionReceipt};
use crate::transaction::TransactionBuilder;
use dashmap::DashMap;
use forge_primitives::{Address, ContractCall, Hash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Lifecycle state of a pending transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Reverted,
    TimedOut,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Confirmed | TxState::Reverted | TxState::TimedOut)
    }

    fn can_advance_to(self, next: TxState) -> bool {
        matches!(
            (self, next),
            (TxState::Built, TxState::Signed)
                | (TxState::Signed, TxState::Submitted)
                | (TxState::Submitted, TxState::Confirmed)
                | (TxState::Submitted, TxState::Reverted)
                | (TxState::Submitted, TxState::TimedOut)
        )
    }
}

/// Receipt polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum number of receipt lookups per transaction
    pub max_attempts: u32,

    /// Delay before the second lookup; doubles after every miss
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay between lookups
    pub max_backoff_ms: u64,

    /// Overall wall-clock budget for confirmation
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 120,
        }
    }
}

impl PollConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Summary of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub hash: Hash,
    pub from: Address,
    pub function: String,
    pub nonce: u64,
    pub block_number: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub fees: FeeParams,
}

/// In-flight submission. Owned by the manager for the duration of `submit`.
#[derive(Debug)]
struct PendingTransaction {
    from: Address,
    function: String,
    nonce: u64,
    fees: FeeParams,
    gas_limit: u64,
    hash: Hash,
    state: TxState,
}

impl PendingTransaction {
    fn advance(&mut self, next: TxState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            from = %self.from,
            nonce = self.nonce,
            hash = %self.hash,
            "tx {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[derive(Debug, Default)]
struct SignerState {
    /// Highest nonce this manager has broadcast for the signer
    last_nonce: Option<u64>,
}

/// Turns contract calls into confirmed (or failed) ledger transactions
pub struct TransactionManager {
    rpc: Arc<dyn LedgerRpc>,
    chain_id: u64,
    gas_policy: Arc<dyn GasPolicy>,
    gas_limit: GasLimitPolicy,
    poll: PollConfig,
    signers: DashMap<Address, Arc<Mutex<SignerState>>>,
}

impl TransactionManager {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        chain_id: u64,
        gas_policy: Arc<dyn GasPolicy>,
        gas_limit: GasLimitPolicy,
        poll: PollConfig,
    ) -> Self {
        Self {
            rpc,
            chain_id,
            gas_policy,
            gas_limit,
            poll,
            signers: DashMap::new(),
        }
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign, broadcast and wait for a terminal receipt
    pub async fn submit(&self, call: &ContractCall, signer: &Credentials) -> Result<Receipt, TxError> {
        let pending = self.broadcast(call, signer).await?;
        let (from, nonce) = (pending.from, pending.nonce);
        let result = self.await_receipt(pending).await;
        if matches!(result, Err(TxError::TimedOut { .. })) {
            self.forget_nonce(from, nonce).await;
        }
        result
    }

    /// An unconfirmed nonce may have been dropped by the node; the next
    /// submission goes back to the node's pending count
    async fn forget_nonce(&self, from: Address, nonce: u64) {
        let lock = self.signer_lock(from);
        let mut signer_state = lock.lock().await;
        if signer_state.last_nonce.map_or(false, |last| last >= nonce) {
            debug!(from = %from, nonce, "dropping nonce high-water mark after timeout");
            signer_state.last_nonce = None;
        }
    }

    fn signer_lock(&self, address: Address) -> Arc<Mutex<SignerState>> {
        self.signers.entry(address).or_default().clone()
    }

    async fn broadcast(
        &self,
        call: &ContractCall,
        signer: &Credentials,
    ) -> Result<PendingTransaction, TxError> {
        let from = signer.address();
        let lock = self.signer_lock(from);
        let mut signer_state = lock.lock().await;

        let base_fee = self.rpc.gas_price().await?;
        let fees = self.gas_policy.fees(base_fee);

        let estimate = match self.rpc.estimate_gas(&from, call).await {
            Ok(gas) => Some(gas),
            Err(e) => {
                warn!(function = %call.function, error = %e, "gas estimation failed, using cap");
                None
            }
        };
        let gas_limit = self.gas_limit.limit(estimate);

        // The node may lag behind our own broadcasts; never go below our high-water mark
        let chain_nonce = self.rpc.get_transaction_count(&from).await?;
        let nonce = match signer_state.last_nonce {
            Some(last) if last >= chain_nonce => last + 1,
            _ => chain_nonce,
        };

        let mut pending = PendingTransaction {
            from,
            function: call.function.clone(),
            nonce,
            fees,
            gas_limit,
            hash: Hash::default(),
            state: TxState::Built,
        };
        debug!(
            signer = signer.label(),
            from = %from,
            nonce,
            gas_limit,
            max_fee = fees.max_fee_per_gas,
            policy = self.gas_policy.name(),
            "built {}",
            call.function
        );

        let signed = TransactionBuilder::new()
            .to(Some(call.to))
            .data(call.data.clone())
            .nonce(nonce)
            .gas_limit(gas_limit)
            .fees(fees.max_fee_per_gas, fees.max_priority_fee_per_gas)
            .chain_id(self.chain_id)
            .build_and_sign(signer)?;
        pending.hash = signed.hash;
        pending.advance(TxState::Signed);

        let hash = match self.rpc.send_raw_transaction(&signed.raw).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(from = %from, nonce, error = %e, "broadcast rejected");
                return Err(TxError::Rejected {
                    nonce,
                    reason: e.to_string(),
                });
            }
        };
        if hash != signed.hash {
            warn!(local = %signed.hash, node = %hash, "node reported a different tx hash");
            pending.hash = hash;
        }

        signer_state.last_nonce = Some(nonce);
        pending.advance(TxState::Submitted);
        info!(function = %call.function, from = %from, nonce, hash = %pending.hash, "transaction submitted");

        Ok(pending)
    }

    async fn await_receipt(&self, mut pending: PendingTransaction) -> Result<Receipt, TxError> {
        let started = Instant::now();
        let deadline = started + self.poll.timeout();
        let mut backoff = self.poll.initial_backoff();
        let mut attempts = 0u32;

        while attempts < self.poll.max_attempts {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let lookup =
                tokio::time::timeout(remaining, self.rpc.get_transaction_receipt(&pending.hash)).await;

            match lookup {
                Ok(Ok(Some(receipt))) => return Self::finish(pending, receipt),
                Ok(Ok(None)) => debug!(hash = %pending.hash, attempt = attempts, "receipt not yet available"),
                Ok(Err(e)) => warn!(hash = %pending.hash, attempt = attempts, error = %e, "receipt lookup failed"),
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if attempts >= self.poll.max_attempts || remaining.is_zero() {
                break;
            }
            tokio::time::sleep(backoff.min(remaining)).await;
            backoff = (backoff * 2).min(self.poll.max_backoff());
        }

        pending.advance(TxState::TimedOut);
        let elapsed = started.elapsed();
        warn!(hash = %pending.hash, attempts, ?elapsed, "transaction not confirmed in time");
        Err(TxError::TimedOut {
            hash: pending.hash,
            attempts,
            elapsed,
        })
    }

    fn finish(mut pending: PendingTransaction, receipt: TransactionReceipt) -> Result<Receipt, TxError> {
        if !receipt.status {
            pending.advance(TxState::Reverted);
            warn!(
                hash = %pending.hash,
                reason = receipt.revert_reason.as_deref().unwrap_or("none"),
                "transaction reverted"
            );
            return Err(TxError::Reverted {
                hash: pending.hash,
                reason: receipt.revert_reason,
            });
        }

        pending.advance(TxState::Confirmed);
        info!(hash = %pending.hash, block = receipt.block_number, "transaction confirmed");
        Ok(Receipt {
            hash: pending.hash,
            from: pending.from,
            function: pending.function,
            nonce: pending.nonce,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            gas_limit: pending.gas_limit,
            fees: pending.fees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WalletError;
    use crate::gas::MultiplierPolicy;
    use crate::transaction::{SignedTransaction, Transaction};
    use async_trait::async_trait;
    use forge_primitives::Token;
    use parking_lot::Mutex as SyncMutex;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Clone)]
    enum ReceiptMode {
        Confirm { after_polls: u32 },
        Revert(&'static str),
        Never,
    }

    struct MockLedger {
        sent: SyncMutex<Vec<Transaction>>,
        mode: ReceiptMode,
        stale_nonce: bool,
        reject_next: AtomicBool,
        /// Accept the next broadcast but never include it
        drop_next: AtomicBool,
        estimate_fails: bool,
        polls: AtomicU32,
    }

    impl MockLedger {
        fn new(mode: ReceiptMode) -> Self {
            Self {
                sent: SyncMutex::new(Vec::new()),
                mode,
                stale_nonce: false,
                reject_next: AtomicBool::new(false),
                drop_next: AtomicBool::new(false),
                estimate_fails: false,
                polls: AtomicU32::new(0),
            }
        }

        fn nonces(&self) -> Vec<u64> {
            self.sent.lock().iter().map(|tx| tx.nonce).collect()
        }
    }

    #[async_trait]
    impl LedgerRpc for MockLedger {
        async fn chain_id(&self) -> Result<u64, WalletError> {
            Ok(1337)
        }

        async fn call(&self, _call: &ContractCall) -> Result<Vec<u8>, WalletError> {
            Ok(Vec::new())
        }

        async fn gas_price(&self) -> Result<u128, WalletError> {
            Ok(7_000_000_000)
        }

        async fn estimate_gas(&self, _from: &Address, _call: &ContractCall) -> Result<u64, WalletError> {
            if self.estimate_fails {
                return Err(WalletError::Reverted("estimate".into()));
            }
            Ok(50_000)
        }

        async fn get_transaction_count(&self, address: &Address) -> Result<u64, WalletError> {
            // Give concurrent submitters a chance to interleave
            tokio::task::yield_now().await;
            if self.stale_nonce {
                return Ok(0);
            }
            let sent = self.sent.lock();
            Ok(sent.iter().filter(|tx| tx.sender() == *address).count() as u64)
        }

        async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, WalletError> {
            tokio::task::yield_now().await;
            if self.reject_next.swap(false, Ordering::SeqCst) {
                return Err(WalletError::Rpc("-32000: nonce too low".into()));
            }
            let signed = SignedTransaction::decode(raw)?;
            let expected = self
                .sent
                .lock()
                .iter()
                .filter(|tx| tx.sender() == signed.transaction.sender())
                .count() as u64;
            if !self.stale_nonce && signed.transaction.nonce != expected {
                return Err(WalletError::Rpc(format!(
                    "nonce gap: expected {} got {}",
                    expected, signed.transaction.nonce
                )));
            }
            if self.drop_next.swap(false, Ordering::SeqCst) {
                return Ok(signed.hash);
            }
            self.sent.lock().push(signed.transaction);
            Ok(signed.hash)
        }

        async fn get_transaction_receipt(
            &self,
            hash: &Hash,
        ) -> Result<Option<TransactionReceipt>, WalletError> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let receipt = |status: bool, reason: Option<&str>| TransactionReceipt {
                transaction_hash: *hash,
                block_number: 10,
                status,
                gas_used: 42_000,
                revert_reason: reason.map(str::to_string),
            };
            Ok(match &self.mode {
                ReceiptMode::Confirm { after_polls } if polls >= *after_polls => Some(receipt(true, None)),
                ReceiptMode::Confirm { .. } | ReceiptMode::Never => None,
                ReceiptMode::Revert(reason) => Some(receipt(false, Some(reason))),
            })
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            max_attempts: 4,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            timeout_secs: 5,
        }
    }

    fn manager(ledger: Arc<MockLedger>) -> TransactionManager {
        TransactionManager::new(
            ledger,
            1337,
            Arc::new(MultiplierPolicy::default()),
            GasLimitPolicy {
                headroom_percent: 20,
                cap: 2_000_000,
            },
            fast_poll(),
        )
    }

    fn call() -> ContractCall {
        ContractCall::new(
            Address([0xaa; 20]),
            "hasAccess(uint256,address,bytes32)",
            &[Token::Uint(101u64.into())],
        )
    }

    fn signer(seed: u8) -> Credentials {
        Credentials::from_seed("test", [seed; 32])
    }

    #[tokio::test]
    async fn test_submit_confirmed() {
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Confirm { after_polls: 2 }));
        let manager = manager(ledger.clone());
        let creds = signer(1);

        let receipt = manager.submit(&call(), &creds).await.unwrap();
        assert_eq!(receipt.nonce, 0);
        assert_eq!(receipt.from, creds.address());
        assert_eq!(receipt.block_number, 10);
        assert_eq!(receipt.gas_limit, 60_000);
        assert_eq!(receipt.fees.max_fee_per_gas, 15_000_000_000);
        assert_eq!(ledger.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_reverted_carries_reason() {
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Revert("Caller is not the owner")));
        let manager = manager(ledger);

        match manager.submit(&call(), &signer(1)).await {
            Err(TxError::Reverted { reason, .. }) => {
                assert_eq!(reason.as_deref(), Some("Caller is not the owner"))
            }
            other => panic!("expected revert, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_times_out_after_bounded_polls() {
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Never));
        let manager = manager(ledger.clone());

        let err = manager.submit(&call(), &signer(1)).await.unwrap_err();
        match err {
            TxError::TimedOut { attempts, hash, .. } => {
                assert_eq!(attempts, 4);
                assert_ne!(hash, Hash::default());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(ledger.polls.load(Ordering::SeqCst), 4);
        // Exactly one broadcast: no automatic resubmission
        assert_eq!(ledger.nonces(), vec![0]);
    }

    #[tokio::test]
    async fn test_rejected_broadcast_does_not_consume_nonce() {
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Confirm { after_polls: 1 }));
        ledger.reject_next.store(true, Ordering::SeqCst);
        let manager = manager(ledger.clone());
        let creds = signer(1);

        let err = manager.submit(&call(), &creds).await.unwrap_err();
        assert!(matches!(err, TxError::Rejected { nonce: 0, .. }));
        assert!(err.tx_hash().is_none());

        let receipt = manager.submit(&call(), &creds).await.unwrap();
        assert_eq!(receipt.nonce, 0);
    }

    #[tokio::test]
    async fn test_retry_after_timeout_uses_node_nonce() {
        // Receipts show up only from the fifth lookup, past the first submission's budget
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Confirm { after_polls: 5 }));
        ledger.drop_next.store(true, Ordering::SeqCst);
        let manager = manager(ledger.clone());
        let creds = signer(1);

        let err = manager.submit(&call(), &creds).await.unwrap_err();
        assert!(matches!(err, TxError::TimedOut { .. }));
        assert!(ledger.nonces().is_empty());

        let receipt = manager.submit(&call(), &creds).await.unwrap();
        assert_eq!(receipt.nonce, 0);
        assert_eq!(ledger.nonces(), vec![0]);
    }

    #[tokio::test]
    async fn test_lagging_node_nonce_is_not_reused() {
        let mut ledger = MockLedger::new(ReceiptMode::Confirm { after_polls: 1 });
        ledger.stale_nonce = true;
        let ledger = Arc::new(ledger);
        let manager = manager(ledger.clone());
        let creds = signer(1);

        manager.submit(&call(), &creds).await.unwrap();
        manager.submit(&call(), &creds).await.unwrap();
        assert_eq!(ledger.nonces(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failed_estimate_falls_back_to_cap() {
        let mut ledger = MockLedger::new(ReceiptMode::Confirm { after_polls: 1 });
        ledger.estimate_fails = true;
        let manager = manager(Arc::new(ledger));

        let receipt = manager.submit(&call(), &signer(1)).await.unwrap();
        assert_eq!(receipt.gas_limit, 2_000_000);
    }

    #[tokio::test]
    async fn test_signers_have_independent_nonces() {
        let ledger = Arc::new(MockLedger::new(ReceiptMode::Confirm { after_polls: 1 }));
        let manager = manager(ledger.clone());

        let a = manager.submit(&call(), &signer(1)).await.unwrap();
        let b = manager.submit(&call(), &signer(2)).await.unwrap();
        assert_eq!(a.nonce, 0);
        assert_eq!(b.nonce, 0);
    }

    #[test]
    fn test_state_transitions_are_one_way() {
        assert!(TxState::Built.can_advance_to(TxState::Signed));
        assert!(TxState::Submitted.can_advance_to(TxState::TimedOut));
        assert!(!TxState::Confirmed.can_advance_to(TxState::Submitted));
        assert!(!TxState::TimedOut.can_advance_to(TxState::Confirmed));
        assert!(!TxState::Built.can_advance_to(TxState::Submitted));
        assert!(TxState::Reverted.is_terminal());
        assert!(!TxState::Signed.is_terminal());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_concurrent_submissions_get_distinct_nonces(n in 1usize..12) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            let nonces = runtime.block_on(async {
                let ledger = Arc::new(MockLedger::new(ReceiptMode::Confirm { after_polls: 1 }));
                let manager = Arc::new(manager(ledger.clone()));
                let creds = signer(9);

                let tasks = (0..n).map(|_| {
                    let manager = manager.clone();
                    let creds = creds.clone();
                    tokio::spawn(async move { manager.submit(&call(), &creds).await })
                });
                for result in futures::future::join_all(tasks).await {
                    result.unwrap().unwrap();
                }
                ledger.nonces()
            });

            let distinct: HashSet<u64> = nonces.iter().copied().collect();
            prop_assert_eq!(nonces.len(), n);
            prop_assert_eq!(distinct.len(), n);
            prop_assert_eq!(distinct, (0..n as u64).collect::<HashSet<_>>());
        }
    }
}
