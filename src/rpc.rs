//! JSON-RPC client for Flux/Zcash-family nodes
//!
//! Speaks the bitcoind-style JSON-RPC dialect (HTTP POST, optional basic
//! auth) and implements the chain-data collaborator traits on top of it.
//! Node error codes -5 (unknown block/tx) and -8 (height out of range) are
//! reported as [`IndexError::NotFound`]; everything else that goes wrong is
//! [`IndexError::Upstream`].

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::IndexError;
use crate::source::{ChainSource, TransactionSource};
use crate::types::{
    hash_hex, parse_hash, BlockHeader, BlockId, BlockRecord, RawTransaction, TransactionDetail,
};

/// RPC error code for an unknown block, transaction or address.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// RPC error code for an out-of-range parameter such as a future height.
const RPC_INVALID_PARAMETER: i64 = -8;

/// JSON-RPC client for a full node.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
}

impl RpcClient {
    /// Create a new RPC client without credentials.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            auth: None,
        }
    }

    /// Attach basic-auth credentials (`rpcuser` / `rpcpassword`).
    pub fn with_auth(mut self, user: String, password: String) -> Self {
        self.auth = Some((user, password));
        self
    }

    /// Make a JSON-RPC call and return its `result`.
    async fn call(&self, method: &str, params: Value) -> Result<Value, IndexError> {
        let request = json!({
            "jsonrpc": "1.0",
            "id": "tipindex",
            "method": method,
            "params": params
        });

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.map_err(|e| {
            IndexError::Upstream(format!("Failed to send RPC request '{}': {}", method, e))
        })?;

        // bitcoind-style nodes answer errors with HTTP 500 and a JSON body,
        // so the status alone says nothing.
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            IndexError::Upstream(format!(
                "Failed to parse RPC response for '{}' (HTTP {}): {}",
                method, status, e
            ))
        })?;

        parse_response(method, body)
    }

    fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, IndexError> {
        serde_json::from_value(value).map_err(|e| {
            IndexError::Upstream(format!("Failed to deserialize '{}' result: {}", method, e))
        })
    }

    /// Resolve a height to the main-chain block hash at that height.
    pub async fn get_block_hash(&self, height: u64) -> Result<B256, IndexError> {
        let result = self.call("getblockhash", json!([height])).await?;
        let hash = result.as_str().ok_or_else(|| {
            IndexError::Upstream("getblockhash result is not a string".to_string())
        })?;
        parse_hash(hash).map_err(|e| IndexError::Upstream(format!("{:#}", e)))
    }
}

/// Split a JSON-RPC response body into its result or a typed error.
fn parse_response(method: &str, mut body: Value) -> Result<Value, IndexError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(rpc_error(method, code, message));
    }

    match body.get_mut("result").map(Value::take) {
        Some(Value::Null) | None => Err(IndexError::NotFound(format!(
            "'{}' returned no result",
            method
        ))),
        Some(result) => Ok(result),
    }
}

fn rpc_error(method: &str, code: i64, message: &str) -> IndexError {
    match code {
        RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER => {
            IndexError::NotFound(format!("{}: {}", method, message))
        }
        _ => IndexError::Upstream(format!("RPC error {} from '{}': {}", code, method, message)),
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn get_block(&self, hash: &B256) -> Result<BlockRecord, IndexError> {
        let result = self.call("getblock", json!([hash_hex(hash), 1])).await?;
        Self::decode("getblock", result)
    }

    async fn get_block_header(&self, id: BlockId) -> Result<BlockHeader, IndexError> {
        let hash = match id {
            BlockId::Hash(hash) => hash,
            BlockId::Height(height) => self.get_block_hash(height).await?,
        };
        let result = self
            .call("getblockheader", json!([hash_hex(&hash), true]))
            .await?;
        Self::decode("getblockheader", result)
    }

    async fn get_json_block(&self, height: u64) -> Result<BlockRecord, IndexError> {
        // Zcash-family getblock takes a height as a decimal string.
        let result = self
            .call("getblock", json!([height.to_string(), 1]))
            .await?;
        Self::decode("getblock", result)
    }

    async fn get_block_hashes_by_timestamp(
        &self,
        high: u64,
        low: u64,
    ) -> Result<Vec<B256>, IndexError> {
        let result = self.call("getblockhashes", json!([high, low])).await?;
        let hashes: Vec<String> = Self::decode("getblockhashes", result)?;
        hashes
            .iter()
            .map(|hash| parse_hash(hash).map_err(|e| IndexError::Upstream(format!("{:#}", e))))
            .collect()
    }

    async fn current_tip_height(&self) -> Result<u64, IndexError> {
        let result = self.call("getblockcount", json!([])).await?;
        result.as_u64().ok_or_else(|| {
            IndexError::Upstream(format!("getblockcount returned non-integer: {}", result))
        })
    }
}

#[async_trait]
impl TransactionSource for RpcClient {
    async fn get_detailed_transaction(
        &self,
        txid: &B256,
    ) -> Result<TransactionDetail, IndexError> {
        let result = self
            .call("getrawtransaction", json!([hash_hex(txid), 1]))
            .await?;
        let raw: RawTransaction = Self::decode("getrawtransaction", result)?;
        Ok(raw.into())
    }
}
