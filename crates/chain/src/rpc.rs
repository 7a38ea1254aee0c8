// Path: crates/chain/src/rpc.rs

//! Minimal JSON-RPC 2.0 client with bounded transport-level retries.
//!
//! Transport blips (connect errors, request timeouts, HTTP 429/5xx) are
//! retried with a fixed delay up to the configured budget. Semantic errors
//! reported in the JSON-RPC `error` object are never retried here; they are
//! surfaced to the adapter, which decides what they mean.

use m2m_types::error::ChainError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{sleep, Duration};

/// Well-known error codes of the channel-registry RPC facade.
pub mod codes {
    /// A channel already exists for the requested (self, peer, token) triple.
    pub const CHANNEL_EXISTS: i64 = 1001;
    /// The funding account cannot cover the deposit plus gas.
    pub const INSUFFICIENT_FUNDS: i64 = 1002;
    /// The transaction was mined but reverted.
    pub const REVERTED: i64 = 1003;
    /// The submitted proof nonce is not newer than what the chain holds.
    pub const NONCE_CONFLICT: i64 = 1004;
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code; see [`codes`] for the facade's own range.
    pub code: i64,
    /// Human-readable diagnostic.
    pub message: String,
    /// Structured payload, when the code defines one.
    #[serde(default)]
    pub data: Option<Value>,
}

/// How a call failed: before reaching the server, or inside it.
#[derive(Debug)]
pub enum CallError {
    /// Transport-level failure after exhausting the retry budget.
    Transport(ChainError),
    /// The server answered with a JSON-RPC error object.
    Rpc(RpcErrorObject),
}

impl CallError {
    /// Default mapping into a [`ChainError`] for callers that do not
    /// special-case any facade code.
    pub fn into_chain_error(self) -> ChainError {
        match self {
            Self::Transport(e) => e,
            Self::Rpc(err) => map_rpc_error(err),
        }
    }
}

/// Maps a facade error object onto the chain error taxonomy.
pub fn map_rpc_error(err: RpcErrorObject) -> ChainError {
    match err.code {
        codes::INSUFFICIENT_FUNDS => ChainError::InsufficientFunds,
        codes::REVERTED => ChainError::Reverted(err.message),
        codes::NONCE_CONFLICT => {
            let on_chain = err
                .data
                .as_ref()
                .and_then(|d| d.get("onChain"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            ChainError::NonceConflict { on_chain }
        }
        _ => ChainError::Rpc(format!("RPC error {}: {}", err.code, err.message)),
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// A JSON-RPC endpoint plus the retry budget for reaching it.
pub struct RpcClient {
    url: String,
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Builds a client for `url` with a per-request `timeout`.
    pub fn new(
        url: String,
        timeout: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Rpc(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url,
            client,
            retry_attempts,
            retry_delay,
            next_id: AtomicU64::new(1),
        })
    }

    /// Calls `method`, deserializing the `result` member into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        self.call_raw(method, params)
            .await
            .map_err(CallError::into_chain_error)
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| ChainError::Rpc(format!("malformed '{}' result: {}", method, e)))
            })
    }

    /// Calls `method`, exposing JSON-RPC error objects to the caller.
    pub async fn call_raw(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let mut attempt = 0u32;
        loop {
            let outcome = self.client.post(&self.url).json(&request).send().await;
            let retryable: ChainError = match outcome {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS
                    || resp.status().is_server_error() =>
                {
                    ChainError::Rpc(format!("'{}' returned HTTP {}", method, resp.status()))
                }
                Ok(resp) => {
                    let body: Response = resp.json().await.map_err(|e| {
                        CallError::Transport(ChainError::Rpc(format!(
                            "malformed '{}' response: {}",
                            method, e
                        )))
                    })?;
                    if let Some(err) = body.error {
                        return Err(CallError::Rpc(err));
                    }
                    return Ok(body.result.unwrap_or(Value::Null));
                }
                Err(e) if e.is_timeout() => {
                    ChainError::Timeout(format!("'{}' timed out: {}", method, e))
                }
                Err(e) => ChainError::Rpc(format!("'{}' send failed: {}", method, e)),
            };

            attempt += 1;
            if attempt >= self.retry_attempts {
                return Err(CallError::Transport(retryable));
            }
            tracing::debug!(
                target: "chain",
                method,
                attempt,
                error = %retryable,
                "transient RPC failure, retrying"
            );
            sleep(self.retry_delay).await;
        }
    }
}

/// Parses an Ethereum JSON-RPC quantity (`"0x1a"`) into a `u64`.
pub fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Rpc(format!("quantity is not a string: {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Rpc(format!("quantity missing 0x prefix: {}", text)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Rpc(format!("bad quantity '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity(&Value::String("0x0".into())).unwrap(), 0);
        assert_eq!(parse_quantity(&Value::String("0x1a".into())).unwrap(), 26);
        assert!(parse_quantity(&Value::String("26".into())).is_err());
        assert!(parse_quantity(&Value::Null).is_err());
    }

    #[test]
    fn facade_error_mapping() {
        let err = RpcErrorObject {
            code: codes::NONCE_CONFLICT,
            message: "stale nonce".into(),
            data: Some(serde_json::json!({ "onChain": 7 })),
        };
        assert!(matches!(
            map_rpc_error(err),
            ChainError::NonceConflict { on_chain: 7 }
        ));

        let err = RpcErrorObject {
            code: codes::REVERTED,
            message: "bad proof".into(),
            data: None,
        };
        assert!(matches!(map_rpc_error(err), ChainError::Reverted(_)));

        let err = RpcErrorObject {
            code: -32000,
            message: "who knows".into(),
            data: None,
        };
        assert!(matches!(map_rpc_error(err), ChainError::Rpc(_)));
    }
}
