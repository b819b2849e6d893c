//! Ethereum JSON-RPC backed implementation of the contract collaborators.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    abi::{decode_hex, encode_hex, ReadCall, ReadValue, WriteCall},
    domain::{Address, ConnectionStatus, ReceiptStatus, TxHash, TxReceipt},
    error::{ContractError, ErrorCode},
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{ConnectionProvider, ContractReader, ContractWriter, ReceiptWatcher};

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: Url,
    /// Account to submit from. When unset the node's first unlocked account
    /// is used.
    pub account: Option<Address>,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl RpcSettings {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            account: None,
            receipt_poll_interval: Duration::from_millis(1000),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("malformed {field} in rpc response: {value}")]
    Malformed { field: &'static str, value: String },
    #[error("no receipt for {hash} after {waited:?}")]
    ReceiptTimeout { hash: TxHash, waited: Duration },
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    status: Option<String>,
    block_number: Option<String>,
}

fn parse_quantity(field: &'static str, raw: &str) -> Result<u64, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|_| RpcError::Malformed {
        field,
        value: raw.to_string(),
    })
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt, RpcError> {
        let status = match self.status.as_deref() {
            Some(raw) => match parse_quantity("status", raw)? {
                1 => ReceiptStatus::Success,
                _ => ReceiptStatus::Reverted,
            },
            None => {
                return Err(RpcError::Malformed {
                    field: "status",
                    value: "null".to_string(),
                })
            }
        };
        let block_number = self
            .block_number
            .as_deref()
            .map(|raw| parse_quantity("blockNumber", raw))
            .transpose()?;
        Ok(TxReceipt {
            hash: self.transaction_hash,
            status,
            block_number,
        })
    }
}

pub struct JsonRpcProvider {
    http: Client,
    settings: RpcSettings,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(settings: RpcSettings) -> Self {
        Self {
            http: Client::new(),
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc: request");
        let reply = self
            .http
            .post(self.settings.url.clone())
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .with_context(|| format!("failed to reach rpc endpoint for {method}"))?;
        let status_error = reply.error_for_status_ref().err();
        let body = reply
            .bytes()
            .await
            .with_context(|| format!("failed to read rpc response for {method}"))?;

        // Nodes may attach a JSON-RPC error object to a non-2xx reply.
        let response = match (serde_json::from_slice::<RpcResponse>(&body), status_error) {
            (Ok(RpcResponse { error: Some(err), .. }), _) => {
                debug!(method, id, code = err.code, "rpc: node error");
                return Err(RpcError::Node {
                    code: err.code,
                    message: err.message,
                }
                .into());
            }
            (_, Some(status_error)) => {
                return Err(status_error)
                    .with_context(|| format!("rpc endpoint rejected {method}"))
            }
            (parsed, None) => {
                parsed.with_context(|| format!("invalid json-rpc response for {method}"))?
            }
        };
        serde_json::from_value(response.result)
            .with_context(|| format!("unexpected result shape for {method}"))
    }
}

#[async_trait]
impl ConnectionProvider for JsonRpcProvider {
    async fn connection_status(&self) -> Result<ConnectionStatus> {
        if let Some(account) = self.settings.account {
            return Ok(ConnectionStatus::Connected(account));
        }
        let accounts: Vec<Address> = self.call("eth_accounts", json!([])).await?;
        Ok(accounts
            .first()
            .copied()
            .map(ConnectionStatus::Connected)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContractReader for JsonRpcProvider {
    async fn read(&self, contract: Address, call: ReadCall) -> Result<ReadValue> {
        let raw: String = self
            .call(
                "eth_call",
                json!([{ "to": contract, "data": encode_hex(&call.encode()) }, "latest"]),
            )
            .await
            .with_context(|| format!("{} read failed", call.function_name()))?;
        let decoded = decode_hex(&raw)
            .and_then(|bytes| call.decode(&bytes))
            .map_err(|err| {
                ContractError::new(
                    ErrorCode::Decode,
                    format!("{} returned undecodable data: {err}", call.function_name()),
                )
            })?;
        Ok(decoded)
    }
}

#[async_trait]
impl ContractWriter for JsonRpcProvider {
    async fn write(&self, contract: Address, from: Address, call: WriteCall) -> Result<TxHash> {
        let params = json!([{
            "from": from,
            "to": contract,
            "data": encode_hex(&call.encode()),
        }]);
        match self.call("eth_sendTransaction", params).await {
            Ok(hash) => Ok(hash),
            Err(err) => match err.downcast::<RpcError>() {
                Ok(RpcError::Node { message, .. }) => {
                    Err(ContractError::new(ErrorCode::Rejected, message).into())
                }
                Ok(other) => Err(other.into()),
                Err(err) => Err(err),
            },
        }
    }
}

#[async_trait]
impl ReceiptWatcher for JsonRpcProvider {
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt> {
        let started = Instant::now();
        loop {
            let receipt: Option<RpcReceipt> = self
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt.into_receipt()?);
            }

            let waited = started.elapsed();
            if waited >= self.settings.receipt_timeout {
                return Err(RpcError::ReceiptTimeout { hash, waited }.into());
            }
            debug!(hash = %hash, "rpc: receipt not yet available");
            tokio::time::sleep(self.settings.receipt_poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
