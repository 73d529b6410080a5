//! Snapshot format codecs
//!
//! Serializes a dataset snapshot to CSV, JSON, or SQL-statement text and
//! parses it back. Round-trips are lossless for every supported format and
//! scope combination: `decode(encode(snapshot)) == snapshot`.

pub mod csv;
pub mod json;
pub mod sql;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditEntry;
use crate::config::Settings;
use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupFormat, BackupId, Item, User};

/// Snapshot-level metadata embedded in every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// ID of the backup record this artifact belongs to
    pub backup_id: BackupId,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Actor who initiated the backup
    pub created_by: String,
    /// Total dataset records across all sections
    pub record_count: u64,
    /// Whether the audit log section is present
    pub includes_audit: bool,
}

/// A point-in-time copy of the dataset sections covered by a backup scope
///
/// Inventory is always present; the optional sections mirror the scope
/// flags. `None` means the section was out of scope, which is distinct from
/// an in-scope section that happened to be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSnapshot {
    /// Snapshot metadata
    pub metadata: SnapshotMetadata,

    /// Inventory items
    pub inventory: Vec<Item>,

    /// Application audit log, when in scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_logs: Option<Vec<AuditEntry>>,

    /// Application users, when in scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,

    /// Application settings, when in scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

impl DatasetSnapshot {
    /// Total number of dataset records across all sections
    ///
    /// Settings count as a single record. This is the denominator of the
    /// merge-restore invariant (added + updated + skipped == record count).
    pub fn total_records(&self) -> u64 {
        let mut count = self.inventory.len() as u64;
        if let Some(audit) = &self.audit_logs {
            count += audit.len() as u64;
        }
        if let Some(users) = &self.users {
            count += users.len() as u64;
        }
        if self.settings.is_some() {
            count += 1;
        }
        count
    }

    /// Section names present in this snapshot, in encode order
    pub fn present_sections(&self) -> Vec<&'static str> {
        let mut sections = vec!["inventory"];
        if self.users.is_some() {
            sections.push("users");
        }
        if self.audit_logs.is_some() {
            sections.push("audit_logs");
        }
        if self.settings.is_some() {
            sections.push("settings");
        }
        sections
    }
}

/// Encode a snapshot in the given format
pub fn encode(snapshot: &DatasetSnapshot, format: BackupFormat) -> StockpileResult<Vec<u8>> {
    match format {
        BackupFormat::Csv => csv::encode_csv(snapshot),
        BackupFormat::Json => json::encode_json(snapshot),
        BackupFormat::Sql => sql::encode_sql(snapshot),
    }
}

/// Decode a snapshot from stored bytes in the given format
pub fn decode(bytes: &[u8], format: BackupFormat) -> StockpileResult<DatasetSnapshot> {
    match format {
        BackupFormat::Csv => csv::decode_csv(bytes),
        BackupFormat::Json => json::decode_json(bytes),
        BackupFormat::Sql => sql::decode_sql(bytes),
    }
}

/// Interpret stored bytes as UTF-8 text
pub(crate) fn artifact_text(bytes: &[u8]) -> StockpileResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| StockpileError::Codec(format!("Artifact is not valid UTF-8: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::{empty_snapshot, full_snapshot};
    use super::*;

    #[test]
    fn test_total_records() {
        let snapshot = full_snapshot();
        // 2 items + 1 audit entry + 1 user + settings
        assert_eq!(snapshot.total_records(), 5);

        assert_eq!(empty_snapshot().total_records(), 0);
    }

    #[test]
    fn test_present_sections() {
        assert_eq!(
            full_snapshot().present_sections(),
            vec!["inventory", "users", "audit_logs", "settings"]
        );
        assert_eq!(empty_snapshot().present_sections(), vec!["inventory"]);
    }

    #[test]
    fn test_round_trip_all_formats_full_scope() {
        let snapshot = full_snapshot();

        for format in BackupFormat::all() {
            let bytes = encode(&snapshot, format).unwrap();
            let decoded = decode(&bytes, format).unwrap();
            assert_eq!(decoded, snapshot, "round trip failed for {}", format);
        }
    }

    #[test]
    fn test_round_trip_all_formats_empty() {
        let snapshot = empty_snapshot();

        for format in BackupFormat::all() {
            let bytes = encode(&snapshot, format).unwrap();
            let decoded = decode(&bytes, format).unwrap();
            assert_eq!(decoded, snapshot, "round trip failed for {}", format);
        }
    }

    #[test]
    fn test_round_trip_large_dataset() {
        let mut snapshot = empty_snapshot();
        for i in 0..10_500 {
            snapshot.inventory.push(Item::with_stock(
                format!("SKU-{:05}", i),
                format!("Item {}", i),
                i,
                i * 3,
            ));
        }
        snapshot.metadata.record_count = snapshot.total_records();

        for format in BackupFormat::all() {
            let bytes = encode(&snapshot, format).unwrap();
            let decoded = decode(&bytes, format).unwrap();
            assert_eq!(
                decoded.inventory.len(),
                10_500,
                "large round trip failed for {}",
                format
            );
            assert_eq!(decoded, snapshot);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        for format in BackupFormat::all() {
            assert!(decode(b"definitely not a backup", format).is_err());
        }
    }
}
