//! EIP-1193 wallet and chain client over JSON-RPC/HTTP.
//!
//! Talks to any endpoint that signs on behalf of its accounts (a wallet
//! bridge or a dev node with unlocked accounts). Batch submissions use
//! EIP-5792 `wallet_sendCalls` and are tracked with `wallet_getCallsStatus`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{
    Address, Bytes, Call, ChainId, ConnectorChoice, ReceiptStatus, SubmissionHandle, TxHash,
};
use tracing::{debug, warn};

use crate::chain::{ChainClient, Connection, WalletProvider};
use crate::error::ClientError;

/// EIP-1193 "user rejected request".
const USER_REJECTED: i64 = 4001;
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

struct Inner {
    http: reqwest::Client,
    url: String,
    target: ChainId,
    poll: Duration,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct Eip1193Provider {
    inner: Arc<Inner>,
}

impl Eip1193Provider {
    /// `target` is the chain whose batch capability is probed on connect.
    pub fn new(url: impl Into<String>, target: ChainId, poll: Duration) -> Self {
        Eip1193Provider {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                url: url.into(),
                target,
                poll,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc request");
        let response: RpcResponse = self
            .inner
            .http
            .post(&self.inner.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(match err.code {
                USER_REJECTED => ClientError::Rejected(err.message),
                code => ClientError::Rpc {
                    code,
                    message: err.message,
                },
            });
        }
        Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?)
    }

    async fn batch_capability(&self, account: Address) -> bool {
        let params = json!([account, [self.inner.target.to_quantity()]]);
        match self.request::<Value>("wallet_getCapabilities", params).await {
            Ok(capabilities) => batch_supported(&capabilities, self.inner.target),
            Err(err) => {
                debug!(error = %err, "capability probe failed; assuming no batch support");
                false
            }
        }
    }

    async fn poll_once(&self, handle: &SubmissionHandle) -> Result<Option<ReceiptStatus>, ClientError> {
        match handle {
            SubmissionHandle::Transaction(hash) => {
                let receipt: Option<Value> = self.request("eth_getTransactionReceipt", json!([hash])).await?;
                Ok(receipt.map(|r| receipt_status(&r, Some(*hash))))
            }
            SubmissionHandle::Batch(id) => {
                let status: Value = self.request("wallet_getCallsStatus", json!([id])).await?;
                calls_status(&status)
            }
        }
    }
}

impl WalletProvider for Eip1193Provider {
    async fn connect(&self, connector: ConnectorChoice) -> Result<Connection, ClientError> {
        if connector != ConnectorChoice::Injected {
            return Err(ClientError::Unsupported("only the injected connector is available over JSON-RPC"));
        }
        // Already-authorized accounts skip the approval prompt.
        let mut accounts: Vec<Address> = self.request("eth_accounts", json!([])).await?;
        if accounts.is_empty() {
            accounts = self.request("eth_requestAccounts", json!([])).await?;
        }
        let address = accounts
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Unavailable("wallet returned no accounts".into()))?;
        let chain: String = self.request("eth_chainId", json!([])).await?;
        let chain_id = ChainId::from_quantity(&chain)?;
        let batch_supported = self.batch_capability(address).await;
        Ok(Connection {
            address,
            chain_id,
            batch_supported,
        })
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        match self
            .request::<Value>("wallet_revokePermissions", json!([{ "eth_accounts": {} }]))
            .await
        {
            Ok(_) => Ok(()),
            Err(ClientError::Rpc {
                code: METHOD_NOT_FOUND,
                ..
            }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl ChainClient for Eip1193Provider {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<(), ClientError> {
        self.request::<Value>("wallet_switchEthereumChain", json!([{ "chainId": chain.to_quantity() }]))
            .await
            .map(|_| ())
    }

    async fn write_contract(&self, from: Address, chain: ChainId, call: Call) -> Result<TxHash, ClientError> {
        let params = json!([{
            "from": from,
            "to": call.to,
            "value": call.value,
            "data": call.data,
            "chainId": chain.to_quantity(),
        }]);
        self.request("eth_sendTransaction", params).await
    }

    async fn send_batch(&self, from: Address, chain: ChainId, calls: Vec<Call>) -> Result<String, ClientError> {
        let calls: Vec<Value> = calls
            .iter()
            .map(|call| {
                json!({
                    "to": call.to,
                    "value": call.value,
                    "data": call.data,
                })
            })
            .collect();
        let params = json!([{
            "version": "2.0.0",
            "chainId": chain.to_quantity(),
            "from": from,
            "atomicRequired": true,
            "calls": calls,
        }]);
        let response: Value = self.request("wallet_sendCalls", params).await?;
        batch_id(&response)
    }

    async fn wait_for_receipt(&self, handle: SubmissionHandle) -> Result<ReceiptStatus, ClientError> {
        loop {
            match self.poll_once(&handle).await {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                // Nodes briefly forget fresh transactions; keep polling.
                Err(ClientError::Transport(err)) => warn!(error = %err, %handle, "receipt poll failed"),
                Err(err) => return Err(err),
            }
            tokio::time::sleep(self.inner.poll).await;
        }
    }
}

/// Read atomic batch support for `chain` out of a `wallet_getCapabilities`
/// answer. Accepts both the current `atomic.status` shape and the older
/// `atomicBatch.supported` flag.
pub fn batch_supported(capabilities: &Value, chain: ChainId) -> bool {
    let Some(entry) = capabilities.get(chain.to_quantity()) else {
        return false;
    };
    let atomic = entry
        .pointer("/atomic/status")
        .and_then(Value::as_str)
        .is_some_and(|status| status == "supported" || status == "ready");
    let legacy = entry
        .pointer("/atomicBatch/supported")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    atomic || legacy
}

fn batch_id(response: &Value) -> Result<String, ClientError> {
    match response {
        Value::String(id) => Ok(id.clone()),
        other => other
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ClientError::Decode(format!("wallet_sendCalls returned {other}"))),
    }
}

fn receipt_status(receipt: &Value, hash: Option<TxHash>) -> ReceiptStatus {
    let hash = hash.or_else(|| {
        receipt
            .get("transactionHash")
            .and_then(Value::as_str)
            .and_then(|h| h.parse().ok())
    });
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x0") => ReceiptStatus::Reverted(hash),
        _ => ReceiptStatus::Confirmed(hash),
    }
}

/// Decode `wallet_getCallsStatus`; `None` while still pending.
pub fn calls_status(status: &Value) -> Result<Option<ReceiptStatus>, ClientError> {
    let first_receipt = status.pointer("/receipts/0");
    let hash = first_receipt
        .and_then(|r| r.get("transactionHash"))
        .and_then(Value::as_str)
        .and_then(|h| h.parse().ok());
    let settled = |reverted: bool| {
        if reverted {
            ReceiptStatus::Reverted(hash)
        } else {
            first_receipt.map_or(ReceiptStatus::Confirmed(hash), |r| receipt_status(r, hash))
        }
    };
    match status.get("status") {
        Some(Value::Number(code)) => match code.as_u64() {
            Some(100) => Ok(None),
            Some(200) => Ok(Some(settled(false))),
            Some(400..=699) => Ok(Some(settled(true))),
            _ => Err(ClientError::Decode(format!("unknown calls status {code}"))),
        },
        Some(Value::String(code)) => match code.as_str() {
            "PENDING" => Ok(None),
            "CONFIRMED" => Ok(Some(settled(false))),
            _ => Err(ClientError::Decode(format!("unknown calls status {code}"))),
        },
        _ => Err(ClientError::Decode(format!("malformed calls status {status}"))),
    }
}
