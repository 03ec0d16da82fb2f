//! Key encoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! Height keys are big-endian so RocksDB iterates them in chain order.

/// Encode a checkpoint key.
///
/// Format: byte 'K' (0x4B) + index type (UTF-8 bytes)
pub fn encode_checkpoint_key(index_type: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + index_type.len());
    key.push(b'K');
    key.extend_from_slice(index_type.as_bytes());
    key
}

/// Encode a mined-blocks key.
///
/// Format: byte 'A' (0x41) + address (UTF-8 bytes)
pub fn encode_miner_key(address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + address.len());
    key.push(b'A');
    key.extend_from_slice(address.as_bytes());
    key
}

/// Decode a mined-blocks key back into its address.
pub fn decode_miner_key(key: &[u8]) -> Option<&str> {
    match key.split_first() {
        Some((b'A', rest)) => std::str::from_utf8(rest).ok(),
        _ => None,
    }
}

/// Encode a credit marker key.
///
/// Format: byte 'W' (0x57) + height (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_credit_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(b'W');
    key.extend_from_slice(&height.to_be_bytes());
    key
}
