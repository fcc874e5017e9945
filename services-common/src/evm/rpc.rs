use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::json;
use tracing::trace;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("rpc transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc node responded with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("rpc node returned error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("failed to decode rpc response: {0}")]
    Decode(String),
}

/// Block reference accepted by `eth_getLogs` / `eth_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    Latest,
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockTag::Number(number) => serializer.serialize_str(&format!("{number:#x}")),
            BlockTag::Latest => serializer.serialize_str("latest"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    /// Positional topic filter, `None` matches anything at that position.
    pub topics: Vec<Option<B256>>,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal Ethereum JSON-RPC client over HTTP.
pub struct EvmRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("rpc request {method} #{id} to {}", self.url);

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(RpcError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let decoded: RpcResponse<R> = serde_json::from_slice(&bytes).map_err(|err| {
            RpcError::Decode(format!(
                "{err}, raw body: {:?}",
                String::from_utf8_lossy(&bytes)
            ))
        })?;
        if let Some(error) = decoded.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        decoded
            .result
            .ok_or_else(|| RpcError::Decode(format!("no result for {method} #{id}")))
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let chain_id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(chain_id.to::<u64>())
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, RpcError> {
        self.request("eth_getLogs", json!([filter])).await
    }

    /// Executes a read-only call against the latest block and returns the raw return data.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        self.request(
            "eth_call",
            json!([{ "to": to, "data": data }, BlockTag::Latest]),
        )
        .await
    }
}
