//! Blockchain RPC endpoint: recent blockhash, raw broadcast and signature
//! status checks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::WalletError;

/// Outcome of one confirmation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationState {
    /// Not seen yet, or seen below the confirmed commitment.
    Pending,
    Confirmed,
    /// Landed but the chain reported an execution error.
    Failed(String),
}

#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    async fn latest_blockhash(&self) -> Result<[u8; 32], WalletError>;

    /// Submit signed wire bytes. Returns the signature the node reports.
    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, WalletError>;

    async fn confirm_transaction(&self, signature: &str) -> Result<ConfirmationState, WalletError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client over HTTP.
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Rpc(format!("http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcCallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "rpc request");
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcCallError::Transport(e.to_string()))?;
        let resp: RpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcCallError::Transport(format!("invalid response: {e}")))?;

        unwrap_response(resp)
    }
}

enum RpcCallError {
    Transport(String),
    Node { code: i64, message: String },
}

impl RpcCallError {
    fn into_rpc(self, method: &str) -> WalletError {
        match self {
            RpcCallError::Transport(msg) => WalletError::Rpc(format!("{method}: {msg}")),
            RpcCallError::Node { code, message } => {
                WalletError::Rpc(format!("{method}: {message} ({code})"))
            }
        }
    }

    fn into_broadcast(self) -> WalletError {
        match self {
            RpcCallError::Transport(msg) => WalletError::Broadcast(msg),
            RpcCallError::Node { code, message } => {
                WalletError::Broadcast(format!("{message} ({code})"))
            }
        }
    }
}

fn unwrap_response(resp: RpcResponse) -> Result<Value, RpcCallError> {
    if let Some(err) = resp.error {
        return Err(RpcCallError::Node {
            code: err.code,
            message: err.message,
        });
    }
    resp.result
        .ok_or_else(|| RpcCallError::Transport("response has neither result nor error".into()))
}

fn parse_blockhash(result: &Value) -> Result<[u8; 32], WalletError> {
    let encoded = result
        .pointer("/value/blockhash")
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::Rpc("getLatestBlockhash: missing blockhash".into()))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| WalletError::Rpc(format!("getLatestBlockhash: bad blockhash: {e}")))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        WalletError::Rpc(format!("getLatestBlockhash: blockhash is {} bytes", v.len()))
    })
}

fn parse_signature_status(result: &Value) -> Result<ConfirmationState, WalletError> {
    let entry = result
        .pointer("/value/0")
        .ok_or_else(|| WalletError::Rpc("getSignatureStatuses: missing value".into()))?;
    if entry.is_null() {
        return Ok(ConfirmationState::Pending);
    }
    match entry.get("err") {
        Some(err) if !err.is_null() => return Ok(ConfirmationState::Failed(err.to_string())),
        _ => {}
    }
    let state = match entry.get("confirmationStatus").and_then(Value::as_str) {
        Some("confirmed") | Some("finalized") => ConfirmationState::Confirmed,
        _ => ConfirmationState::Pending,
    };
    Ok(state)
}

#[async_trait]
impl RpcEndpoint for JsonRpcClient {
    async fn latest_blockhash(&self) -> Result<[u8; 32], WalletError> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await
            .map_err(|e| e.into_rpc("getLatestBlockhash"))?;
        parse_blockhash(&result)
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, WalletError> {
        let params = json!([BASE64.encode(wire), { "encoding": "base64" }]);
        let result = self
            .call("sendTransaction", params)
            .await
            .map_err(RpcCallError::into_broadcast)?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::Broadcast("node returned a non-string signature".into()))
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<ConfirmationState, WalletError> {
        let params = json!([[signature], { "searchTransactionHistory": true }]);
        let result = self
            .call("getSignatureStatuses", params)
            .await
            .map_err(|e| e.into_rpc("getSignatureStatuses"))?;
        parse_signature_status(&result)
    }
}
