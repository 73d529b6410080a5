//! Backup creation service
//!
//! Orchestrates snapshot creation: reads the dataset, encodes it, optionally
//! encrypts, writes the artifact with its sidecar checksum, and drives the
//! record through its status transitions. The IN_PROGRESS anchor row is
//! persisted before any artifact work so a crash mid-backup leaves a
//! detectable stuck record rather than silence.

use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;

use crate::audit::{AuditAction, AuditEntry, AuditLogger, AuditOutcome};
use crate::codec::{self, DatasetSnapshot, SnapshotMetadata};
use crate::config::Settings;
use crate::crypto::{encrypt_with_passphrase, SecureString};
use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupFormat, BackupId, BackupRecord, BackupScope, BackupType};
use crate::storage::Storage;

use super::checksum::checksum_bytes;
use super::lock::{ScopeLockGuard, ScopeLocks};
use super::store::BackupStore;

/// Input for a backup creation request
#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Artifact format
    pub format: BackupFormat,
    /// Dataset sections to include
    pub scope: BackupScope,
    /// Whether to encrypt the artifact
    pub encrypt: bool,
    /// Passphrase; required when `encrypt` is set
    pub passphrase: Option<SecureString>,
    /// Inclusive lower bound on item/audit timestamps
    pub date_range_from: Option<NaiveDate>,
    /// Inclusive upper bound on item/audit timestamps
    pub date_range_to: Option<NaiveDate>,
    /// Operator notes
    pub notes: String,
    /// Actor identity for audit attribution
    pub created_by: String,
}

impl BackupRequest {
    /// Minimal request: inventory only, unencrypted
    pub fn new(format: BackupFormat, created_by: impl Into<String>) -> Self {
        Self {
            format,
            scope: BackupScope::default(),
            encrypt: false,
            passphrase: None,
            date_range_from: None,
            date_range_to: None,
            notes: String::new(),
            created_by: created_by.into(),
        }
    }
}

/// Result of the artifact-producing phase of a backup
struct ArtifactOutcome {
    file_size: u64,
    record_count: u64,
    checksum: String,
}

/// Creates backups and owns the artifact-producing pipeline
#[derive(Clone)]
pub struct BackupService {
    storage: Arc<Storage>,
    store: BackupStore,
    audit: Arc<AuditLogger>,
    locks: ScopeLocks,
}

impl BackupService {
    /// Create a new BackupService
    pub fn new(
        storage: Arc<Storage>,
        store: BackupStore,
        audit: Arc<AuditLogger>,
        locks: ScopeLocks,
    ) -> Self {
        Self {
            storage,
            store,
            audit,
            locks,
        }
    }

    /// The artifact store this service writes to
    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Create a manual backup synchronously
    pub fn create_backup(&self, request: BackupRequest) -> StockpileResult<BackupRecord> {
        self.create_with_lock(BackupType::Manual, request)
    }

    /// Create an automatic backup (scheduler entry point)
    pub fn create_automatic_backup(&self, request: BackupRequest) -> StockpileResult<BackupRecord> {
        self.create_with_lock(BackupType::Automatic, request)
    }

    /// Start a backup on a worker thread, returning the record id immediately
    ///
    /// The IN_PROGRESS anchor row is persisted before this returns; callers
    /// poll the record for COMPLETED or FAILED. The scope lock is held by the
    /// worker until it finishes.
    pub fn create_backup_detached(&self, request: BackupRequest) -> StockpileResult<BackupId> {
        validate_request(&request)?;
        let guard = self.locks.acquire("backup", &request.scope.sections())?;

        let record = self.insert_anchor_record(BackupType::Manual, &request)?;
        let id = record.id;

        let service = self.clone();
        thread::spawn(move || {
            let _guard: ScopeLockGuard = guard;
            if let Err(e) = service.run_pipeline(record, &request) {
                tracing::error!(backup_id = %id, "Detached backup failed: {}", e);
            }
        });

        Ok(id)
    }

    /// Create the mandatory pre-restore safety backup
    ///
    /// Only the restore path calls this, while already holding the scope
    /// lock, which is why no lock is acquired here. This is the sole way a
    /// PRE_RESTORE record comes to exist.
    pub(crate) fn create_pre_restore_backup(
        &self,
        format: BackupFormat,
        scope: BackupScope,
        created_by: &str,
    ) -> StockpileResult<BackupRecord> {
        let request = BackupRequest {
            format,
            scope,
            encrypt: false,
            passphrase: None,
            date_range_from: None,
            date_range_to: None,
            notes: "pre-restore safety backup".to_string(),
            created_by: created_by.to_string(),
        };
        self.create_unlocked(BackupType::PreRestore, request)
    }

    /// List all backup records, newest first
    pub fn list_backups(&self) -> StockpileResult<Vec<BackupRecord>> {
        self.storage.backups.get_all()
    }

    /// Get a backup record by id
    pub fn get_backup(&self, id: BackupId) -> StockpileResult<BackupRecord> {
        self.storage.backups.get_required(id)
    }

    /// Delete a backup record and its artifact
    pub fn delete_backup(&self, id: BackupId, actor: &str) -> StockpileResult<()> {
        let record = self.storage.backups.get_required(id)?;

        self.store.delete(&record.storage_path)?;
        self.storage.backups.delete_and_save(id)?;

        tracing::info!(backup_id = %id, "Deleted backup {}", record.filename);
        self.audit.log(
            &AuditEntry::new(actor, AuditAction::BackupDeleted, AuditOutcome::Success)
                .with_artifact(id.to_string()),
        )?;

        Ok(())
    }

    fn create_with_lock(
        &self,
        backup_type: BackupType,
        request: BackupRequest,
    ) -> StockpileResult<BackupRecord> {
        validate_request(&request)?;
        let _guard = self.locks.acquire("backup", &request.scope.sections())?;
        self.create_unlocked(backup_type, request)
    }

    fn create_unlocked(
        &self,
        backup_type: BackupType,
        request: BackupRequest,
    ) -> StockpileResult<BackupRecord> {
        validate_request(&request)?;
        let record = self.insert_anchor_record(backup_type, &request)?;
        self.run_pipeline(record, &request)
    }

    /// Insert the IN_PROGRESS durability anchor row
    fn insert_anchor_record(
        &self,
        backup_type: BackupType,
        request: &BackupRequest,
    ) -> StockpileResult<BackupRecord> {
        let id = BackupId::new();
        let mut record = BackupRecord::new_in_progress(
            id,
            String::new(),
            self.store.root().to_path_buf(),
            backup_type,
            request.format,
            request.encrypt,
            request.scope,
            request.date_range_from,
            request.date_range_to,
            request.notes.clone(),
            request.created_by.clone(),
        );

        let filename = self
            .store
            .artifact_filename(id, record.created_at, request.format);
        record.storage_path = self.store.artifact_path(&filename);
        record.filename = filename;

        self.storage.backups.upsert_and_save(record.clone())?;
        tracing::info!(backup_id = %id, "Backup started ({} {})", backup_type, request.format);

        Ok(record)
    }

    /// Run the artifact pipeline and drive the final status transition
    fn run_pipeline(
        &self,
        mut record: BackupRecord,
        request: &BackupRequest,
    ) -> StockpileResult<BackupRecord> {
        match self.perform_backup(&record, request) {
            Ok(outcome) => {
                record.complete(outcome.file_size, outcome.record_count, outcome.checksum)?;
                self.storage.backups.upsert_and_save(record.clone())?;

                tracing::info!(
                    backup_id = %record.id,
                    "Backup completed: {} ({} records, {} bytes)",
                    record.filename,
                    record.record_count(),
                    record.file_size()
                );
                self.audit.log(
                    &AuditEntry::new(
                        &record.created_by,
                        AuditAction::BackupCreated,
                        AuditOutcome::Success,
                    )
                    .with_artifact(record.id.to_string())
                    .with_detail(format!("{} records, format {}", record.record_count(), record.format)),
                )?;

                Ok(record)
            }
            Err(e) => {
                // A partially written artifact stays on disk for forensics;
                // the FAILED status keeps it out of every restore path.
                tracing::error!(backup_id = %record.id, "Backup failed: {}", e);

                record.fail()?;
                if let Err(persist_err) = self.storage.backups.upsert_and_save(record.clone()) {
                    tracing::warn!(
                        backup_id = %record.id,
                        "Could not persist FAILED status: {}",
                        persist_err
                    );
                }
                self.audit.log(
                    &AuditEntry::new(
                        &record.created_by,
                        AuditAction::BackupCreated,
                        AuditOutcome::Failure,
                    )
                    .with_artifact(record.id.to_string())
                    .with_detail(e.to_string()),
                )?;

                Err(e)
            }
        }
    }

    /// Read, encode, optionally encrypt, write, and checksum the artifact
    fn perform_backup(
        &self,
        record: &BackupRecord,
        request: &BackupRequest,
    ) -> StockpileResult<ArtifactOutcome> {
        let snapshot = self.collect_snapshot(record)?;
        let record_count = snapshot.total_records();

        let encoded = codec::encode(&snapshot, record.format)?;

        let stored = if record.encrypted {
            let passphrase = request.passphrase.as_ref().ok_or_else(|| {
                StockpileError::Validation("Encrypted backup requires a passphrase".to_string())
            })?;
            encrypt_with_passphrase(&encoded, passphrase.as_str())?
        } else {
            encoded
        };

        let path = self.store.write(&record.filename, &stored)?;

        // Checksum covers the stored bytes, post-encryption
        let digest = checksum_bytes(&stored);
        self.store.write_sidecar(&path, &digest)?;

        Ok(ArtifactOutcome {
            file_size: stored.len() as u64,
            record_count,
            checksum: digest,
        })
    }

    /// Take a consistent snapshot of the scoped dataset
    ///
    /// Repository data is read in one pass before any encoding starts; the
    /// date range filters items by `updated_at` and audit entries by their
    /// timestamp.
    fn collect_snapshot(&self, record: &BackupRecord) -> StockpileResult<DatasetSnapshot> {
        let in_range = |date: NaiveDate| {
            record.date_range_from.map_or(true, |from| date >= from)
                && record.date_range_to.map_or(true, |to| date <= to)
        };

        let inventory: Vec<_> = self
            .storage
            .items
            .get_all()?
            .into_iter()
            .filter(|i| in_range(i.updated_at.date_naive()))
            .collect();

        let users = if record.scope.include_user_data {
            Some(self.storage.users.get_all()?)
        } else {
            None
        };

        let audit_logs = if record.scope.include_audit_logs {
            let entries: Vec<_> = self
                .audit
                .read_all()?
                .into_iter()
                .filter(|e| in_range(e.timestamp.date_naive()))
                .collect();
            Some(entries)
        } else {
            None
        };

        let settings = if record.scope.include_settings {
            Some(Settings::load_or_create(self.storage.paths())?)
        } else {
            None
        };

        let mut snapshot = DatasetSnapshot {
            metadata: SnapshotMetadata {
                backup_id: record.id,
                created_at: record.created_at,
                created_by: record.created_by.clone(),
                record_count: 0,
                includes_audit: record.scope.include_audit_logs,
            },
            inventory,
            audit_logs,
            users,
            settings,
        };
        snapshot.metadata.record_count = snapshot.total_records();

        Ok(snapshot)
    }
}

/// Reject malformed requests before any work starts
fn validate_request(request: &BackupRequest) -> StockpileResult<()> {
    if request.encrypt {
        match &request.passphrase {
            Some(p) if !p.is_empty() => {}
            _ => {
                return Err(StockpileError::Validation(
                    "Encrypted backup requires a non-empty passphrase".to_string(),
                ))
            }
        }
    } else if request.passphrase.is_some() {
        return Err(StockpileError::Validation(
            "Passphrase provided but encryption not requested".to_string(),
        ));
    }

    if let (Some(from), Some(to)) = (request.date_range_from, request.date_range_to) {
        if from > to {
            return Err(StockpileError::Validation(format!(
                "Invalid date range: {} is after {}",
                from, to
            )));
        }
    }

    Ok(())
}
