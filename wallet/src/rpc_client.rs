use crate::errors::WalletError;
use async_trait::async_trait;
use forge_primitives::abi::decode_revert_reason;
use forge_primitives::{Address, ContractCall, Hash};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Receipt as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: Hash,
    pub block_number: u64,
    /// `true` when execution succeeded
    pub status: bool,
    pub gas_used: u64,
    pub revert_reason: Option<String>,
}

/// The ledger operations the orchestration pipeline consumes.
///
/// Implemented over JSON-RPC by [`RpcClient`]; tests and the local devnet
/// provide in-memory implementations.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// Read-only contract call. A revert surfaces as [`WalletError::Reverted`].
    async fn call(&self, call: &ContractCall) -> Result<Vec<u8>, WalletError>;

    /// Current base gas price in wei
    async fn gas_price(&self) -> Result<u128, WalletError>;

    async fn estimate_gas(&self, from: &Address, call: &ContractCall) -> Result<u64, WalletError>;

    /// Pending transaction count, i.e. the next usable nonce
    async fn get_transaction_count(&self, address: &Address) -> Result<u64, WalletError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, WalletError>;

    async fn get_transaction_receipt(
        &self,
        hash: &Hash,
    ) -> Result<Option<TransactionReceipt>, WalletError>;
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcError {
    /// Geth-style nodes use code 3 for execution reverts and put the payload in `data`
    fn into_wallet_error(self) -> WalletError {
        let is_revert = self.code == 3 || self.message.to_lowercase().contains("revert");
        if !is_revert {
            return WalletError::Rpc(format!("{}: {}", self.code, self.message));
        }
        let reason = self
            .data
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|d| hex::decode(d.trim_start_matches("0x")).ok())
            .and_then(|bytes| decode_revert_reason(&bytes))
            .unwrap_or(self.message);
        WalletError::Reverted(reason)
    }
}

/// RPC client for blockchain interaction
pub struct RpcClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl RpcClient {
    /// Create new RPC client
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Create a client whose individual HTTP requests give up after `timeout`
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Rpc(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make RPC call
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        trace!(method, id, "rpc request");

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?;

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(error.into_wallet_error());
        }

        Ok(rpc_response.result)
    }

    fn call_object(from: Option<&Address>, call: &ContractCall) -> Value {
        let mut object = json!({
            "to": call.to.to_hex(),
            "data": format!("0x{}", hex::encode(&call.data)),
        });
        if let Some(from) = from {
            object["from"] = json!(from.to_hex());
        }
        object
    }
}

#[async_trait]
impl LedgerRpc for RpcClient {
    async fn chain_id(&self) -> Result<u64, WalletError> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_quantity_u64(&result, "chain id")
    }

    async fn call(&self, call: &ContractCall) -> Result<Vec<u8>, WalletError> {
        let params = json!([Self::call_object(None, call), "latest"]);
        let result = self.request("eth_call", params).await?;
        let data = result
            .as_str()
            .ok_or_else(|| WalletError::Rpc("Invalid eth_call response".to_string()))?;
        Ok(hex::decode(data.trim_start_matches("0x"))?)
    }

    async fn gas_price(&self) -> Result<u128, WalletError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&result, "gas price")
    }

    async fn estimate_gas(&self, from: &Address, call: &ContractCall) -> Result<u64, WalletError> {
        let params = json!([Self::call_object(Some(from), call)]);
        let result = self.request("eth_estimateGas", params).await?;
        parse_quantity_u64(&result, "gas estimate")
    }

    async fn get_transaction_count(&self, address: &Address) -> Result<u64, WalletError> {
        let params = json!([address.to_hex(), "pending"]);
        let result = self.request("eth_getTransactionCount", params).await?;
        parse_quantity_u64(&result, "nonce")
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, WalletError> {
        let params = json!([format!("0x{}", hex::encode(raw))]);
        let result = self.request("eth_sendRawTransaction", params).await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| WalletError::Rpc("Invalid transaction hash response".to_string()))?;
        tx_hash
            .parse()
            .map_err(|e| WalletError::Rpc(format!("Failed to parse tx hash: {}", e)))
    }

    async fn get_transaction_receipt(
        &self,
        hash: &Hash,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        let params = json!([hash.to_hex()]);
        let result = self.request("eth_getTransactionReceipt", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(*hash, &result).map(Some)
    }
}

fn quantity_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, WalletError> {
    value
        .as_str()
        .map(|s| s.trim_start_matches("0x"))
        .ok_or_else(|| WalletError::Rpc(format!("Invalid {} response", what)))
}

fn parse_quantity_u64(value: &Value, what: &str) -> Result<u64, WalletError> {
    let s = quantity_str(value, what)?;
    u64::from_str_radix(s, 16)
        .map_err(|e| WalletError::Rpc(format!("Failed to parse {}: {}", what, e)))
}

fn parse_quantity_u128(value: &Value, what: &str) -> Result<u128, WalletError> {
    let s = quantity_str(value, what)?;
    u128::from_str_radix(s, 16)
        .map_err(|e| WalletError::Rpc(format!("Failed to parse {}: {}", what, e)))
}

/// Parse an `eth_getTransactionReceipt` result object
pub fn parse_receipt(hash: Hash, value: &Value) -> Result<TransactionReceipt, WalletError> {
    let status = parse_quantity_u64(&value["status"], "receipt status")? == 1;
    let block_number = parse_quantity_u64(&value["blockNumber"], "block number")?;
    let gas_used = match value.get("gasUsed") {
        Some(v) if !v.is_null() => parse_quantity_u64(v, "gas used")?,
        _ => 0,
    };

    // Some nodes return the raw revert payload, others a plain message
    let revert_reason = value
        .get("revertReason")
        .and_then(Value::as_str)
        .map(|raw| {
            hex::decode(raw.trim_start_matches("0x"))
                .ok()
                .and_then(|bytes| decode_revert_reason(&bytes))
                .unwrap_or_else(|| raw.to_string())
        });

    Ok(TransactionReceipt {
        transaction_hash: hash,
        block_number,
        status,
        gas_used,
        revert_reason,
    })
}
