//! Audit entry data structures
//!
//! Defines the structure of audit log entries: who did what, to which entity
//! or backup artifact, and whether it worked. Entries are flat so every field
//! survives a CSV round-trip when the audit log is included in a backup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    SettingsUpdated,
    BackupCreated,
    BackupVerified,
    BackupRestored,
    BackupPruned,
    BackupDeleted,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemCreated => write!(f, "ITEM_CREATED"),
            Self::ItemUpdated => write!(f, "ITEM_UPDATED"),
            Self::ItemDeleted => write!(f, "ITEM_DELETED"),
            Self::UserCreated => write!(f, "USER_CREATED"),
            Self::UserUpdated => write!(f, "USER_UPDATED"),
            Self::UserDeleted => write!(f, "USER_DELETED"),
            Self::SettingsUpdated => write!(f, "SETTINGS_UPDATED"),
            Self::BackupCreated => write!(f, "BACKUP_CREATED"),
            Self::BackupVerified => write!(f, "BACKUP_VERIFIED"),
            Self::BackupRestored => write!(f, "BACKUP_RESTORED"),
            Self::BackupPruned => write!(f, "BACKUP_PRUNED"),
            Self::BackupDeleted => write!(f, "BACKUP_DELETED"),
        }
    }
}

/// Outcome of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Who performed the operation
    pub actor: String,

    /// What was done
    pub action: AuditAction,

    /// ID of the affected entity, if any
    ///
    /// Kept unconditionally in serialized form so CSV rows stay rectangular.
    #[serde(default)]
    pub entity_id: Option<String>,

    /// ID of the backup artifact involved, if any
    #[serde(default)]
    pub artifact_id: Option<String>,

    /// Whether the operation succeeded
    pub outcome: AuditOutcome,

    /// Free-form detail (error message, counts, ...)
    #[serde(default)]
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(actor: impl Into<String>, action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            entity_id: None,
            artifact_id: None,
            outcome,
            detail: None,
        }
    }

    /// Attach an entity id
    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach a backup artifact id
    pub fn with_artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    /// Attach free-form detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Identity key used to deduplicate entries during merge restores
    pub fn identity_key(&self) -> (DateTime<Utc>, String, AuditAction, Option<String>) {
        (
            self.timestamp,
            self.actor.clone(),
            self.action,
            self.entity_id.clone(),
        )
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.actor,
            self.action,
            self.outcome
        );

        if let Some(artifact) = &self.artifact_id {
            output.push_str(&format!(" artifact={}", artifact));
        }

        if let Some(entity) = &self.entity_id {
            output.push_str(&format!(" entity={}", entity));
        }

        if let Some(detail) = &self.detail {
            output.push_str(&format!("\n  {}", detail));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(AuditAction::BackupCreated.to_string(), "BACKUP_CREATED");
        assert_eq!(AuditAction::ItemDeleted.to_string(), "ITEM_DELETED");
    }

    #[test]
    fn test_entry_builder() {
        let entry = AuditEntry::new("kaylee", AuditAction::BackupCreated, AuditOutcome::Success)
            .with_artifact("bak-12345678")
            .with_detail("3 records");

        assert_eq!(entry.actor, "kaylee");
        assert_eq!(entry.artifact_id.as_deref(), Some("bak-12345678"));
        assert_eq!(entry.detail.as_deref(), Some("3 records"));
        assert!(entry.entity_id.is_none());
    }

    #[test]
    fn test_identity_key() {
        let a = AuditEntry::new("kaylee", AuditAction::ItemCreated, AuditOutcome::Success)
            .with_entity("itm-1");
        let mut b = a.clone();
        b.detail = Some("different detail".to_string());

        // Detail does not participate in identity
        assert_eq!(a.identity_key(), b.identity_key());

        b.actor = "other".to_string();
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_serialization() {
        let entry = AuditEntry::new("kaylee", AuditAction::BackupVerified, AuditOutcome::Failure)
            .with_artifact("bak-1")
            .with_detail("checksum mismatch");

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: AuditEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(entry, deserialized);
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::new("kaylee", AuditAction::BackupRestored, AuditOutcome::Success)
            .with_artifact("bak-12345678");

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("BACKUP_RESTORED"));
        assert!(formatted.contains("kaylee"));
        assert!(formatted.contains("bak-12345678"));
    }
}
