use super::rpc_errors::{RpcManagerError, RpcResult};
use super::RpcEngine;
use crate::config::RpcConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// JSON-RPC 2.0 engine over HTTP
#[derive(Debug)]
pub struct HttpRpcEngine {
    client: Client,
    endpoint: String,
    timeout_ms: u64,
    next_id: AtomicU64,
}

impl HttpRpcEngine {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RpcManagerError::Configuration(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout_ms: timeout.as_millis() as u64,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> RpcResult<Self> {
        Self::new(config.endpoint.clone(), Duration::from_millis(config.timeout_ms))
    }
}

#[async_trait]
impl RpcEngine for HttpRpcEngine {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params: &params,
        };

        debug!(endpoint = %self.endpoint, method = %method, id = id, "Sending RPC request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                RpcManagerError::from_reqwest_error(err, &self.endpoint, method, self.timeout_ms)
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RpcManagerError::RateLimitExceeded {
                endpoint: self.endpoint.clone(),
            });
        }
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, method = %method, status = %status, "RPC HTTP error");
            return Err(RpcManagerError::Transport {
                endpoint: self.endpoint.clone(),
                message: format!("HTTP status {}", status),
            });
        }

        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|err| RpcManagerError::decode(method, err))?;

        if let Some(error) = response.error {
            let message = match error.data {
                Some(data) => format!("{}: {}", error.message, data),
                None => error.message,
            };
            return Err(RpcManagerError::RpcResponse {
                method: method.to_string(),
                message,
                code: error.code,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_successful_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "jsonrpc": "2.0",
                "method": "chain_getBlockHash",
                "params": [0],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x01"}"#)
            .create_async()
            .await;

        let engine = HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = engine.call("chain_getBlockHash", json!([0])).await.unwrap();

        assert_eq!(result, json!("0x01"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rpc_error_mapped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":1010,"message":"Invalid Transaction","data":"Inability to pay some fees"}}"#,
            )
            .create_async()
            .await;

        let engine = HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = engine
            .call("author_submitExtrinsic", json!(["0x00"]))
            .await
            .unwrap_err();

        match err {
            RpcManagerError::RpcResponse { method, message, code } => {
                assert_eq!(method, "author_submitExtrinsic");
                assert_eq!(code, 1010);
                assert!(message.contains("Inability to pay some fees"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let engine = HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = engine.call("chain_getHeader", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcManagerError::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_null_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let engine = HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(engine.call("chain_getBlockHash", json!([99])).await.unwrap(), Value::Null);
    }
}
