//! Backup record model and status state machine
//!
//! A `BackupRecord` is the durable metadata row for one backup artifact.
//! Status, file size, record count, checksum, and validation markers are
//! private; the transition methods are the only mutation path, so a record
//! can never claim to be COMPLETED without its size/count/checksum set, and
//! a CORRUPTED record can never leave that state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{StockpileError, StockpileResult};

use super::ids::BackupId;

/// How a backup came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Requested by an operator
    Manual,
    /// Created by the scheduler
    Automatic,
    /// Safety snapshot taken immediately before a restore, never user-initiated
    PreRestore,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
            Self::PreRestore => write!(f, "pre-restore"),
        }
    }
}

/// Serialization format of a backup artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    Csv,
    Json,
    Sql,
}

impl BackupFormat {
    /// File extension for artifacts in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Sql => "sql",
        }
    }

    /// Parse a format from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }

    /// All supported formats
    pub fn all() -> [BackupFormat; 3] {
        [Self::Csv, Self::Json, Self::Sql]
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Lifecycle status of a backup record
///
/// Legal transitions: `InProgress -> Completed`, `InProgress -> Failed`,
/// `Completed -> Corrupted`. `Failed` and `Corrupted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Creation started; size/count/checksum not yet known.
    /// A record stuck here after a crash is detectable by a health check.
    InProgress,
    /// Artifact written and checksummed
    Completed,
    /// Creation failed; artifact (if any) is kept for forensics only
    Failed,
    /// Verification found a checksum mismatch; never restorable
    Corrupted,
}

impl BackupStatus {
    /// Whether a record in this status may be used as a restore source
    pub fn is_restorable(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Corrupted)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Corrupted => write!(f, "corrupted"),
        }
    }
}

/// Which dataset sections a backup includes
///
/// Inventory is always included; the flags opt additional sections in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupScope {
    /// Include the application audit log
    #[serde(default)]
    pub include_audit_logs: bool,
    /// Include application users
    #[serde(default)]
    pub include_user_data: bool,
    /// Include application settings
    #[serde(default)]
    pub include_settings: bool,
}

impl BackupScope {
    /// Scope covering every section
    pub fn everything() -> Self {
        Self {
            include_audit_logs: true,
            include_user_data: true,
            include_settings: true,
        }
    }

    /// Section names covered by this scope, used as advisory lock keys
    pub fn sections(&self) -> Vec<&'static str> {
        let mut sections = vec!["inventory"];
        if self.include_audit_logs {
            sections.push("audit");
        }
        if self.include_user_data {
            sections.push("users");
        }
        if self.include_settings {
            sections.push("settings");
        }
        sections
    }
}

impl fmt::Display for BackupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sections().join("+"))
    }
}

/// Metadata row for one backup artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique identifier, immutable
    pub id: BackupId,

    /// Artifact filename (no directory component)
    pub filename: String,

    /// Full path to the artifact on the backup store
    pub storage_path: PathBuf,

    /// How the backup was initiated
    pub backup_type: BackupType,

    /// Artifact serialization format
    pub format: BackupFormat,

    /// Artifact size in bytes; zero until completion
    file_size: u64,

    /// Number of dataset records in the artifact; zero until completion
    record_count: u64,

    /// Lifecycle status
    status: BackupStatus,

    /// Hex sha256 digest over the stored bytes; set on completion
    checksum: Option<String>,

    /// Whether the artifact is an encrypted envelope
    pub encrypted: bool,

    /// Whether a verification run has fully passed
    validated: bool,

    /// When the last successful verification ran
    validated_at: Option<DateTime<Utc>>,

    /// Dataset sections included
    pub scope: BackupScope,

    /// Optional creation-time date filter (inclusive lower bound)
    pub date_range_from: Option<NaiveDate>,

    /// Optional creation-time date filter (inclusive upper bound)
    pub date_range_to: Option<NaiveDate>,

    /// Operator notes
    #[serde(default)]
    pub notes: String,

    /// Actor who initiated the backup
    pub created_by: String,

    /// When the record was inserted
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    /// Insert-time constructor: the durability anchor row
    ///
    /// Size, count, and checksum stay zero/unset until `complete`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_in_progress(
        id: BackupId,
        filename: String,
        storage_path: PathBuf,
        backup_type: BackupType,
        format: BackupFormat,
        encrypted: bool,
        scope: BackupScope,
        date_range_from: Option<NaiveDate>,
        date_range_to: Option<NaiveDate>,
        notes: String,
        created_by: String,
    ) -> Self {
        Self {
            id,
            filename,
            storage_path,
            backup_type,
            format,
            file_size: 0,
            record_count: 0,
            status: BackupStatus::InProgress,
            checksum: None,
            encrypted,
            validated: false,
            validated_at: None,
            scope,
            date_range_from,
            date_range_to,
            notes,
            created_by,
            created_at: Utc::now(),
        }
    }

    /// Current status
    pub fn status(&self) -> BackupStatus {
        self.status
    }

    /// Artifact size in bytes (zero while in progress)
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Dataset record count (zero while in progress)
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Recorded checksum, if completion has been reached
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Whether a verification run has fully passed
    pub fn validated(&self) -> bool {
        self.validated
    }

    /// Timestamp of the last successful verification
    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    /// Transition `InProgress -> Completed`, setting size, count, and
    /// checksum in the same step
    pub fn complete(
        &mut self,
        file_size: u64,
        record_count: u64,
        checksum: String,
    ) -> StockpileResult<()> {
        if self.status != BackupStatus::InProgress {
            return Err(self.illegal_transition(BackupStatus::Completed));
        }
        self.file_size = file_size;
        self.record_count = record_count;
        self.checksum = Some(checksum);
        self.status = BackupStatus::Completed;
        Ok(())
    }

    /// Transition `InProgress -> Failed`
    pub fn fail(&mut self) -> StockpileResult<()> {
        if self.status != BackupStatus::InProgress {
            return Err(self.illegal_transition(BackupStatus::Failed));
        }
        self.status = BackupStatus::Failed;
        Ok(())
    }

    /// Transition `Completed -> Corrupted` (terminal)
    ///
    /// Clears the validated marker: a corrupt artifact is not a valid one,
    /// whatever an earlier verification said.
    pub fn mark_corrupted(&mut self) -> StockpileResult<()> {
        if self.status != BackupStatus::Completed {
            return Err(self.illegal_transition(BackupStatus::Corrupted));
        }
        self.status = BackupStatus::Corrupted;
        self.validated = false;
        self.validated_at = None;
        Ok(())
    }

    /// Record a fully successful verification run
    pub fn mark_validated(&mut self, at: DateTime<Utc>) -> StockpileResult<()> {
        if self.status != BackupStatus::Completed {
            return Err(StockpileError::Conflict(format!(
                "backup {} cannot be marked validated in status {}",
                self.id, self.status
            )));
        }
        self.validated = true;
        self.validated_at = Some(at);
        Ok(())
    }

    /// Whether this record may be used as a restore source
    pub fn is_restorable(&self) -> bool {
        self.status.is_restorable()
    }

    fn illegal_transition(&self, to: BackupStatus) -> StockpileError {
        StockpileError::Conflict(format!(
            "illegal backup status transition {} -> {} for {}",
            self.status, to, self.id
        ))
    }
}

impl fmt::Display for BackupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {} {}]",
            self.filename, self.backup_type, self.format, self.status
        )
    }
}
