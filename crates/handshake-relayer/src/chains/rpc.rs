// JSON-RPC chain gateway client
// The gateway owns keys, signing, fees and broadcasting; this side speaks JSON-RPC 2.0 over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{Chain, ChainError, ChannelResponse, ConnectionResponse, Header, Height, Receipt};
use crate::config::{ChainConfig, ChainSpecificConfig};
use crate::relay::msgs::Msg;

const CODE_REJECTED: i64 = -32001;
const CODE_INCLUSION_TIMEOUT: i64 = -32002;
const CODE_INVALID_HEADER: i64 = -32003;
const CODE_NOT_FOUND: i64 = -32004;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<JsonRpcError> for ChainError {
    fn from(error: JsonRpcError) -> Self {
        match error.code {
            CODE_REJECTED => {
                let code = error
                    .data
                    .as_ref()
                    .and_then(|data| data.get("code"))
                    .and_then(Value::as_u64)
                    .unwrap_or(1) as u32;
                ChainError::Rejected {
                    code,
                    log: error.message,
                }
            }
            CODE_INCLUSION_TIMEOUT => ChainError::Timeout(error.message),
            CODE_INVALID_HEADER => ChainError::InvalidHeader(error.message),
            CODE_NOT_FOUND => ChainError::NotFound(error.message),
            code => ChainError::Rpc(format!("{} (code {})", error.message, code)),
        }
    }
}

/// Signing parameters forwarded with every transaction
#[derive(Debug, Clone)]
struct TxParams {
    key: String,
    memo: String,
    gas: u64,
    gas_adjustment: f64,
    gas_prices: String,
}

/// Chain reached through a JSON-RPC gateway
pub struct RpcChain {
    chain_id: String,
    rpc_endpoint: String,
    client: Client,
    tx: TxParams,
    next_id: AtomicU64,
}

impl RpcChain {
    /// Create a new gateway client from configuration
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        match &config.config {
            ChainSpecificConfig::Rpc {
                key,
                memo,
                gas,
                gas_adjustment,
                gas_prices,
                request_timeout_ms,
                ..
            } => {
                let client = Client::builder()
                    .timeout(Duration::from_millis(*request_timeout_ms))
                    .build()
                    .map_err(|e| ChainError::Rpc(format!("failed to build HTTP client: {}", e)))?;

                Ok(Self {
                    chain_id: config.chain_id.clone(),
                    rpc_endpoint: config.rpc_endpoint.clone(),
                    client,
                    tx: TxParams {
                        key: key.clone(),
                        memo: memo.clone(),
                        gas: *gas,
                        gas_adjustment: *gas_adjustment,
                        gas_prices: gas_prices.clone(),
                    },
                    next_id: AtomicU64::new(1),
                })
            }
            _ => Err(ChainError::Rpc(format!(
                "chain {} is not configured as an rpc chain",
                config.chain_id
            ))),
        }
    }

    pub fn rpc_endpoint(&self) -> &str {
        &self.rpc_endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("RPC {} #{} -> {}", method, id, self.rpc_endpoint);

        let response = self
            .client
            .post(&self.rpc_endpoint)
            .header("Content-Type", "application/json")
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Rpc(format!("{} timed out: {}", method, e))
                } else {
                    ChainError::Rpc(format!("{} failed: {}", method, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Rpc(format!("{} returned HTTP {}", method, status)));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{} response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(error.into());
        }
        let result = body
            .result
            .ok_or_else(|| ChainError::Decode(format!("{} response has no result", method)))?;
        serde_json::from_value(result).map_err(|e| ChainError::Decode(format!("{} result: {}", method, e)))
    }
}

#[async_trait]
impl Chain for RpcChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn latest_header(&self) -> Result<Header, ChainError> {
        self.call("ibc_latestHeader", json!({})).await
    }

    async fn accepts_header(&self, header: &Header) -> Result<(), ChainError> {
        let _: Value = self.call("ibc_verifyHeader", json!({ "header": header })).await?;
        Ok(())
    }

    async fn query_connection(
        &self,
        connection_id: &str,
        height: Height,
    ) -> Result<ConnectionResponse, ChainError> {
        self.call(
            "ibc_queryConnection",
            json!({ "connection_id": connection_id, "height": height }),
        )
        .await
    }

    async fn query_channel(
        &self,
        port_id: &str,
        channel_id: &str,
        height: Height,
    ) -> Result<ChannelResponse, ChainError> {
        self.call(
            "ibc_queryChannel",
            json!({ "port_id": port_id, "channel_id": channel_id, "height": height }),
        )
        .await
    }

    async fn submit(&self, msgs: &[Msg]) -> Result<Receipt, ChainError> {
        self.call(
            "ibc_submitTx",
            json!({
                "msgs": msgs,
                "signer": self.tx.key,
                "memo": self.tx.memo,
                "gas": self.tx.gas,
                "gas_adjustment": self.tx.gas_adjustment,
                "gas_prices": self.tx.gas_prices,
            }),
        )
        .await
    }

    async fn health_check(&self) -> Result<(), ChainError> {
        let _: Value = self.call("health", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let rejected: ChainError = JsonRpcError {
            code: CODE_REJECTED,
            message: "connection already exists".to_string(),
            data: Some(json!({ "code": 7 })),
        }
        .into();
        assert_eq!(
            rejected,
            ChainError::Rejected {
                code: 7,
                log: "connection already exists".to_string()
            }
        );

        let timeout: ChainError = JsonRpcError {
            code: CODE_INCLUSION_TIMEOUT,
            message: "not included".to_string(),
            data: None,
        }
        .into();
        assert!(matches!(timeout, ChainError::Timeout(_)));

        let other: ChainError = JsonRpcError {
            code: -32601,
            message: "method not found".to_string(),
            data: None,
        }
        .into();
        assert!(matches!(other, ChainError::Rpc(ref m) if m.contains("-32601")));
    }

    #[test]
    fn test_mock_config_is_not_an_rpc_chain() {
        let config = ChainConfig::mock("ibc-0");
        assert!(RpcChain::new(&config).is_err());
    }
}
