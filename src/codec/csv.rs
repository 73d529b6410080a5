//! CSV snapshot codec
//!
//! Each dataset section is a header row plus data rows; sections are
//! introduced by a `# SECTION NAME` comment line. `# METADATA` and
//! `# INVENTORY` are always present; `# USERS`, `# AUDIT LOGS`, and
//! `# SETTINGS` appear when in scope (an in-scope empty section keeps its
//! marker, which is how scope presence survives the round trip). Settings
//! are flattened to key/JSON-value rows.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::audit::AuditEntry;
use crate::config::Settings;
use crate::error::{StockpileError, StockpileResult};
use crate::models::{Item, User};

use super::{artifact_text, DatasetSnapshot, SnapshotMetadata};

const METADATA_SECTION: &str = "METADATA";
const INVENTORY_SECTION: &str = "INVENTORY";
const USERS_SECTION: &str = "USERS";
const AUDIT_SECTION: &str = "AUDIT LOGS";
const SETTINGS_SECTION: &str = "SETTINGS";

/// Encode a snapshot as sectioned CSV
pub fn encode_csv(snapshot: &DatasetSnapshot) -> StockpileResult<Vec<u8>> {
    let mut out = String::new();

    out.push_str(&format!("# {}\n", METADATA_SECTION));
    out.push_str(&serialize_section(std::slice::from_ref(&snapshot.metadata))?);

    out.push_str(&format!("# {}\n", INVENTORY_SECTION));
    out.push_str(&serialize_section(&snapshot.inventory)?);

    if let Some(users) = &snapshot.users {
        out.push_str(&format!("# {}\n", USERS_SECTION));
        out.push_str(&serialize_section(users)?);
    }

    if let Some(audit_logs) = &snapshot.audit_logs {
        out.push_str(&format!("# {}\n", AUDIT_SECTION));
        out.push_str(&serialize_section(audit_logs)?);
    }

    if let Some(settings) = &snapshot.settings {
        out.push_str(&format!("# {}\n", SETTINGS_SECTION));
        out.push_str(&serialize_settings(settings)?);
    }

    Ok(out.into_bytes())
}

/// Decode a snapshot from sectioned CSV bytes
pub fn decode_csv(bytes: &[u8]) -> StockpileResult<DatasetSnapshot> {
    let text = artifact_text(bytes)?;

    let mut metadata: Option<SnapshotMetadata> = None;
    let mut inventory: Option<Vec<Item>> = None;
    let mut users: Option<Vec<User>> = None;
    let mut audit_logs: Option<Vec<AuditEntry>> = None;
    let mut settings: Option<Settings> = None;

    for (name, body) in split_sections(text) {
        match name.as_str() {
            METADATA_SECTION => {
                let rows: Vec<SnapshotMetadata> = parse_section(&body)?;
                metadata = rows.into_iter().next();
            }
            INVENTORY_SECTION => inventory = Some(parse_section(&body)?),
            USERS_SECTION => users = Some(parse_section(&body)?),
            AUDIT_SECTION => audit_logs = Some(parse_section(&body)?),
            SETTINGS_SECTION => settings = Some(parse_settings(&body)?),
            other => {
                return Err(StockpileError::Codec(format!(
                    "Unknown CSV section '{}'",
                    other
                )))
            }
        }
    }

    let metadata = metadata
        .ok_or_else(|| StockpileError::Codec("CSV artifact has no METADATA section".to_string()))?;
    let inventory = inventory.ok_or_else(|| {
        StockpileError::Codec("CSV artifact has no INVENTORY section".to_string())
    })?;

    Ok(DatasetSnapshot {
        metadata,
        inventory,
        audit_logs,
        users,
        settings,
    })
}

/// Serialize a slice of records as headered CSV
fn serialize_section<T: Serialize>(records: &[T]) -> StockpileResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for record in records {
        writer
            .serialize(record)
            .map_err(|e| StockpileError::Codec(format!("Failed to write CSV row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StockpileError::Codec(format!("Failed to flush CSV section: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|e| StockpileError::Codec(format!("CSV section is not valid UTF-8: {}", e)))
}

/// Parse a headered CSV section into records
fn parse_section<T: DeserializeOwned>(body: &str) -> StockpileResult<Vec<T>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut records = Vec::new();

    for row in reader.deserialize() {
        let record: T =
            row.map_err(|e| StockpileError::Codec(format!("Failed to parse CSV row: {}", e)))?;
        records.push(record);
    }

    Ok(records)
}

/// Serialize settings as key/JSON-value rows
fn serialize_settings(settings: &Settings) -> StockpileResult<String> {
    let value = serde_json::to_value(settings)
        .map_err(|e| StockpileError::Codec(format!("Failed to serialize settings: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| StockpileError::Codec("Settings did not serialize to an object".to_string()))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["key", "value"])
        .map_err(|e| StockpileError::Codec(format!("Failed to write CSV row: {}", e)))?;

    for (key, field) in object {
        let value = field.to_string();
        writer
            .write_record([key.as_str(), value.as_str()])
            .map_err(|e| StockpileError::Codec(format!("Failed to write CSV row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StockpileError::Codec(format!("Failed to flush CSV section: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|e| StockpileError::Codec(format!("CSV section is not valid UTF-8: {}", e)))
}

/// Parse settings from key/JSON-value rows
fn parse_settings(body: &str) -> StockpileResult<Settings> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut object = serde_json::Map::new();

    for row in reader.records() {
        let row =
            row.map_err(|e| StockpileError::Codec(format!("Failed to parse CSV row: {}", e)))?;
        let key = row
            .get(0)
            .ok_or_else(|| StockpileError::Codec("Settings row missing key".to_string()))?;
        let raw_value = row
            .get(1)
            .ok_or_else(|| StockpileError::Codec("Settings row missing value".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(raw_value).map_err(|e| {
            StockpileError::Codec(format!("Invalid settings value for '{}': {}", key, e))
        })?;
        object.insert(key.to_string(), value);
    }

    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| StockpileError::Codec(format!("Failed to rebuild settings: {}", e)))
}

/// Split sectioned CSV text into (section name, body) pairs
///
/// A `# ` line only starts a section when it is not inside a quoted CSV
/// field, so multi-line quoted values cannot smuggle in a fake section
/// marker.
fn split_sections(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut in_quotes = false;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);

        if !in_quotes && trimmed.starts_with("# ") {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some((trimmed[2..].to_string(), String::new()));
            continue;
        }

        if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
        }

        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
    }

    if let Some(section) = current.take() {
        sections.push(section);
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::{empty_snapshot, full_snapshot};
    use super::*;

    #[test]
    fn test_round_trip_full_scope() {
        let snapshot = full_snapshot();
        let bytes = encode_csv(&snapshot).unwrap();
        let decoded = decode_csv(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_round_trip_empty() {
        let snapshot = empty_snapshot();
        let bytes = encode_csv(&snapshot).unwrap();
        let decoded = decode_csv(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_section_markers_present() {
        let snapshot = full_snapshot();
        let text = String::from_utf8(encode_csv(&snapshot).unwrap()).unwrap();

        assert!(text.starts_with("# METADATA\n"));
        assert!(text.contains("\n# INVENTORY\n"));
        assert!(text.contains("\n# USERS\n"));
        assert!(text.contains("\n# AUDIT LOGS\n"));
        assert!(text.contains("\n# SETTINGS\n"));
    }

    #[test]
    fn test_out_of_scope_sections_absent() {
        let snapshot = empty_snapshot();
        let text = String::from_utf8(encode_csv(&snapshot).unwrap()).unwrap();

        assert!(!text.contains("# USERS"));
        assert!(!text.contains("# AUDIT LOGS"));
        assert!(!text.contains("# SETTINGS"));
    }

    #[test]
    fn test_empty_in_scope_section_keeps_marker() {
        let mut snapshot = empty_snapshot();
        snapshot.users = Some(Vec::new());
        snapshot.metadata.record_count = snapshot.total_records();

        let bytes = encode_csv(&snapshot).unwrap();
        let decoded = decode_csv(&bytes).unwrap();

        assert_eq!(decoded.users, Some(Vec::new()));
    }

    #[test]
    fn test_multiline_quoted_field_survives() {
        // full_snapshot has an item description with an embedded newline and
        // quotes; make sure splitting does not break on it
        let snapshot = full_snapshot();
        let bytes = encode_csv(&snapshot).unwrap();
        let decoded = decode_csv(&bytes).unwrap();

        let original = &snapshot.inventory[0];
        let restored = decoded
            .inventory
            .iter()
            .find(|i| i.sku == original.sku)
            .unwrap();
        assert_eq!(restored.description, original.description);
    }

    #[test]
    fn test_missing_metadata_fails() {
        let err = decode_csv(b"# INVENTORY\nid,sku\n").unwrap_err();
        assert!(matches!(err, StockpileError::Codec(_)));
    }

    #[test]
    fn test_unknown_section_fails() {
        let snapshot = empty_snapshot();
        let mut text = String::from_utf8(encode_csv(&snapshot).unwrap()).unwrap();
        text.push_str("# MYSTERY\na,b\n");

        let err = decode_csv(text.as_bytes()).unwrap_err();
        assert!(matches!(err, StockpileError::Codec(_)));
    }
}
