//! JSON snapshot codec
//!
//! The JSON artifact is the snapshot itself, pretty-printed with camelCase
//! keys: `{ "metadata": {...}, "inventory": [...], "auditLogs": [...],
//! "users": [...], "settings": {...} }`. Optional sections are omitted when
//! out of scope.

use crate::error::{StockpileError, StockpileResult};

use super::DatasetSnapshot;

/// Encode a snapshot as pretty-printed JSON
pub fn encode_json(snapshot: &DatasetSnapshot) -> StockpileResult<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot)
        .map_err(|e| StockpileError::Codec(format!("Failed to serialize JSON snapshot: {}", e)))
}

/// Decode a snapshot from JSON bytes
pub fn decode_json(bytes: &[u8]) -> StockpileResult<DatasetSnapshot> {
    serde_json::from_slice(bytes)
        .map_err(|e| StockpileError::Codec(format!("Failed to parse JSON snapshot: {}", e)))
}
