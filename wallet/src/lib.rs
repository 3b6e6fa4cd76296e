pub mod credentials;
pub mod errors;
pub mod gas;
pub mod ledger;
pub mod manager;
pub mod rpc_client;
pub mod transaction;

pub use credentials::Credentials;
pub use errors::{TxError, WalletError};
pub use gas::{FeeParams, FixedPolicy, GasConfig, GasLimitPolicy, GasPolicy, MultiplierPolicy};
pub use ledger::LedgerConfig;
pub use manager::{PollConfig, Receipt, TransactionManager, TxState};
pub use rpc_client::{LedgerRpc, RpcClient, TransactionReceipt};
pub use transaction::{SignedTransaction, Transaction, TransactionBuilder};
