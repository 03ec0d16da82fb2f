//! Chain-data types
//!
//! Blocks, headers and transactions as returned by the node's verbose
//! JSON-RPC calls. The indexer only ever reads these; it never mutates them.

use alloy_primitives::B256;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serializer};

/// Block as returned by `getblock <hash|height> 1`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockRecord {
    /// Block hash (hex string in JSON, no 0x prefix)
    #[serde(deserialize_with = "deserialize_hash")]
    pub hash: B256,

    /// Block height
    pub height: u64,

    /// Serialized block size in bytes
    pub size: u64,

    /// Block timestamp (Unix epoch seconds)
    pub time: u64,

    /// Transaction ids in block order; the first one is the coinbase
    #[serde(deserialize_with = "deserialize_hash_vec")]
    pub tx: Vec<B256>,

    /// Confirmations at fetch time, -1 when the block is off the main chain
    pub confirmations: i64,

    /// Block version
    #[serde(default)]
    pub version: i64,

    /// Merkle root (hex string)
    #[serde(rename = "merkleroot", default)]
    pub merkle_root: String,

    /// Nonce (hex string for Equihash chains)
    #[serde(default)]
    pub nonce: String,

    /// Compact difficulty target (hex string)
    #[serde(default)]
    pub bits: String,

    /// Difficulty as reported by the node
    #[serde(default)]
    pub difficulty: f64,

    /// Equihash solution (hex string)
    #[serde(default)]
    pub solution: Option<String>,

    /// Parent hash, absent for genesis
    #[serde(
        rename = "previousblockhash",
        default,
        deserialize_with = "deserialize_hash_opt"
    )]
    pub previous_hash: Option<B256>,
}

impl BlockRecord {
    /// The coinbase transaction id, if the block carries any transactions.
    pub fn coinbase_txid(&self) -> Option<&B256> {
        self.tx.first()
    }

    /// Returns `true` unless the node reports the block as orphaned.
    pub fn is_main_chain(&self) -> bool {
        self.confirmations != -1
    }
}

/// Block header as returned by `getblockheader <hash> true`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "deserialize_hash")]
    pub hash: B256,

    pub height: u64,

    /// Confirmations, -1 when the block is off the main chain
    pub confirmations: i64,

    /// Cumulative chain work (hex string)
    #[serde(rename = "chainwork", default)]
    pub chain_work: String,

    /// Next block on the main chain, absent at the tip
    #[serde(
        rename = "nextblockhash",
        default,
        deserialize_with = "deserialize_hash_opt"
    )]
    pub next_hash: Option<B256>,
}

/// Block identifier accepted by header lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Hash(B256),
    Height(u64),
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{}", hash_hex(hash)),
            Self::Height(height) => write!(f, "{}", height),
        }
    }
}

/// Raw verbose transaction as returned by `getrawtransaction <txid> 1`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(deserialize_with = "deserialize_hash")]
    pub txid: B256,

    #[serde(default)]
    pub vout: Vec<RawOutput>,
}

/// One output of a raw verbose transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    /// Output value in satoshis
    #[serde(rename = "valueSat")]
    pub value_sat: u64,

    /// Output index
    pub n: u32,

    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptPubKey {
    /// Decoded destination addresses (empty for non-standard scripts)
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// One transaction output, reduced to what attribution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Destination address, `None` for scripts without a decodable address
    pub address: Option<String>,
    /// Amount in satoshis
    pub satoshis: u64,
}

/// Detailed transaction: ordered outputs with their addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetail {
    pub txid: B256,
    pub outputs: Vec<TxOutput>,
}

impl From<RawTransaction> for TransactionDetail {
    fn from(raw: RawTransaction) -> Self {
        let mut vout = raw.vout;
        vout.sort_by_key(|o| o.n);
        Self {
            txid: raw.txid,
            outputs: vout
                .into_iter()
                .map(|o| TxOutput {
                    address: o.script_pub_key.addresses.into_iter().next(),
                    satoshis: o.value_sat,
                })
                .collect(),
        }
    }
}

// Hash encoding helpers

/// Render a hash the way the node prints it (lowercase hex, no 0x prefix).
pub fn hash_hex(hash: &B256) -> String {
    hex::encode(hash.as_slice())
}

/// Parse a 32-byte hash from hex, with or without a 0x prefix.
pub fn parse_hash(s: &str) -> Result<B256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex hash: {}", s))?;
    if bytes.len() != 32 {
        anyhow::bail!("Hash must be 32 bytes (64 hex chars), got {} bytes", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

fn decode_hash<E: serde::de::Error>(s: &str) -> Result<B256, E> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(E::custom)?;
    if bytes.len() != 32 {
        return Err(E::custom(format!(
            "Expected 32 bytes for hash, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Deserialize a hex string to B256.
fn deserialize_hash<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    decode_hash(&s)
}

/// Deserialize an optional hex string to B256.
fn deserialize_hash_opt<'de, D>(deserializer: D) -> Result<Option<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => decode_hash(&s).map(Some),
        _ => Ok(None),
    }
}

/// Deserialize a list of hex strings to B256 values.
fn deserialize_hash_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<String>::deserialize(deserializer)?;
    list.iter().map(|s| decode_hash(s)).collect()
}

/// Serialize a B256 as node-style hex.
pub fn serialize_hash<S>(hash: &B256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hash_hex(hash))
}

/// Serialize an optional B256 as node-style hex or null.
pub fn serialize_hash_opt<S>(hash: &Option<B256>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match hash {
        Some(hash) => serializer.serialize_str(&hash_hex(hash)),
        None => serializer.serialize_none(),
    }
}

/// Serialize a list of B256 values as node-style hex strings.
pub fn serialize_hash_vec<S>(hashes: &[B256], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(hashes.iter().map(hash_hex))
}
