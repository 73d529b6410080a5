//! Backup restoration service
//!
//! Applies a verified artifact back onto the live dataset. `Full` replaces
//! the scoped sections wholesale, `Merge` upserts by natural key, and
//! `Preview` computes the merge diff without writing anything. Mutating
//! modes take a mandatory PRE_RESTORE safety backup first and run inside a
//! rollback boundary: the dataset is never left half-updated.

use std::sync::Arc;
use std::time::Instant;

use crate::audit::{AuditAction, AuditEntry, AuditLogger, AuditOutcome};
use crate::codec::{self, DatasetSnapshot};
use crate::config::Settings;
use crate::crypto::{decrypt_with_passphrase, SecureString};
use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupId, BackupRecord};
use crate::storage::Storage;

use super::lock::ScopeLocks;
use super::service::BackupService;

/// How a restore applies the artifact to the live dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Replace the scoped dataset wholesale
    Full,
    /// Upsert by natural key, skipping identical records
    Merge,
    /// Compute the merge diff without mutating anything
    Preview,
}

impl RestoreMode {
    /// Parse a mode from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "merge" => Some(Self::Merge),
            "preview" => Some(Self::Preview),
            _ => None,
        }
    }

    /// Whether this mode writes to the live dataset
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Preview)
    }
}

impl std::fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Merge => write!(f, "merge"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// Options for a restore invocation
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Apply mode
    pub mode: RestoreMode,
    /// Decryption passphrase; required when the artifact is encrypted
    pub passphrase: Option<SecureString>,
    /// Explicit confirmation; required for mutating modes. The CLI collects
    /// this through a re-entered confirmation prompt.
    pub confirmed: bool,
    /// Actor identity for audit attribution
    pub actor: String,
}

impl RestoreOptions {
    /// Preview options (no confirmation needed)
    pub fn preview(actor: impl Into<String>) -> Self {
        Self {
            mode: RestoreMode::Preview,
            passphrase: None,
            confirmed: false,
            actor: actor.into(),
        }
    }
}

/// Outcome of one restore invocation; transient, never persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreSummary {
    /// Records newly inserted
    pub items_added: u64,
    /// Records that existed but differed and were overwritten
    pub items_updated: u64,
    /// Records identical to the live dataset
    pub items_skipped: u64,
    /// Non-fatal problems encountered
    pub errors: Vec<String>,
    /// Wall-clock duration of the restore
    pub duration_ms: u64,
    /// The mandatory safety backup taken before mutation, when one was made
    pub pre_restore_backup_id: Option<BackupId>,
}

impl RestoreSummary {
    /// Total records accounted for
    pub fn total(&self) -> u64 {
        self.items_added + self.items_updated + self.items_skipped
    }
}

/// Applies backup artifacts to the live dataset
#[derive(Clone)]
pub struct RestoreService {
    storage: Arc<Storage>,
    backup: BackupService,
    audit: Arc<AuditLogger>,
    locks: ScopeLocks,
}

impl RestoreService {
    /// Create a new RestoreService
    pub fn new(
        storage: Arc<Storage>,
        backup: BackupService,
        audit: Arc<AuditLogger>,
        locks: ScopeLocks,
    ) -> Self {
        Self {
            storage,
            backup,
            audit,
            locks,
        }
    }

    /// Restore a backup onto the live dataset
    pub fn restore(&self, id: BackupId, options: RestoreOptions) -> StockpileResult<RestoreSummary> {
        let record = self.storage.backups.get_required(id)?;

        match self.restore_inner(&record, &options) {
            Ok(summary) => {
                tracing::info!(
                    backup_id = %id,
                    "Restore ({}) finished: {} added, {} updated, {} skipped",
                    options.mode,
                    summary.items_added,
                    summary.items_updated,
                    summary.items_skipped
                );
                if options.mode.is_mutating() {
                    self.audit.log(
                        &AuditEntry::new(
                            &options.actor,
                            AuditAction::BackupRestored,
                            AuditOutcome::Success,
                        )
                        .with_artifact(id.to_string())
                        .with_detail(format!(
                            "mode {}: {} added, {} updated, {} skipped",
                            options.mode,
                            summary.items_added,
                            summary.items_updated,
                            summary.items_skipped
                        )),
                    )?;
                }
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(backup_id = %id, "Restore ({}) failed: {}", options.mode, e);
                if options.mode.is_mutating() {
                    self.audit.log(
                        &AuditEntry::new(
                            &options.actor,
                            AuditAction::BackupRestored,
                            AuditOutcome::Failure,
                        )
                        .with_artifact(id.to_string())
                        .with_detail(e.to_string()),
                    )?;
                }
                Err(e)
            }
        }
    }

    fn restore_inner(
        &self,
        record: &BackupRecord,
        options: &RestoreOptions,
    ) -> StockpileResult<RestoreSummary> {
        let started = Instant::now();

        // Fail closed: only COMPLETED records are restorable
        if !record.is_restorable() {
            return Err(StockpileError::Conflict(format!(
                "Backup {} is not restorable (status {})",
                record.id,
                record.status()
            )));
        }

        if record.encrypted && options.passphrase.is_none() {
            return Err(StockpileError::Validation(
                "Encrypted backup requires a passphrase to restore".to_string(),
            ));
        }

        if options.mode.is_mutating() && !options.confirmed {
            return Err(StockpileError::Validation(
                "Destructive restore requires explicit confirmation".to_string(),
            ));
        }

        let _guard = self
            .locks
            .acquire("restore", &record.scope.sections())?;

        // Mandatory safety snapshot before any mutation; created under the
        // restore's own scope lock. If it fails the restore never starts.
        let pre_restore_backup_id = if options.mode.is_mutating() {
            let pre = self
                .backup
                .create_pre_restore_backup(record.format, record.scope, &options.actor)
                .map_err(|e| {
                    StockpileError::Storage(format!(
                        "Pre-restore backup failed, aborting restore: {}",
                        e
                    ))
                })?;
            Some(pre.id)
        } else {
            None
        };

        // Decrypt and parse before touching the dataset
        let stored = self.backup.store().read(&record.storage_path)?;
        let plaintext = if record.encrypted {
            let passphrase = options.passphrase.as_ref().ok_or_else(|| {
                StockpileError::Validation(
                    "Encrypted backup requires a passphrase to restore".to_string(),
                )
            })?;
            decrypt_with_passphrase(&stored, passphrase.as_str())?
        } else {
            stored
        };
        let snapshot = codec::decode(&plaintext, record.format)?;

        let mut summary = match options.mode {
            RestoreMode::Full => self.apply_full(&snapshot, pre_restore_backup_id)?,
            RestoreMode::Merge => self.apply_merge(&snapshot, true, pre_restore_backup_id)?,
            RestoreMode::Preview => self.apply_merge(&snapshot, false, None)?,
        };

        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary.pre_restore_backup_id = pre_restore_backup_id;
        Ok(summary)
    }

    /// Replace the sections present in the artifact wholesale
    fn apply_full(
        &self,
        snapshot: &DatasetSnapshot,
        pre_restore_backup_id: Option<BackupId>,
    ) -> StockpileResult<RestoreSummary> {
        let before = self.capture_before_state(snapshot)?;

        let result = (|| -> StockpileResult<()> {
            self.storage.items.replace_all(snapshot.inventory.clone())?;
            self.storage.items.save()?;

            if let Some(users) = &snapshot.users {
                self.storage.users.replace_all(users.clone())?;
                self.storage.users.save()?;
            }

            if let Some(audit_logs) = &snapshot.audit_logs {
                self.audit.rewrite_all(audit_logs)?;
            }

            if let Some(settings) = &snapshot.settings {
                settings.save(self.storage.paths())?;
            }

            Ok(())
        })();

        if let Err(e) = result {
            self.rollback(&before, pre_restore_backup_id, e)?;
            unreachable!("rollback always returns an error");
        }

        Ok(RestoreSummary {
            items_added: snapshot.total_records(),
            ..Default::default()
        })
    }

    /// Merge the artifact into the live dataset, or just diff it
    fn apply_merge(
        &self,
        snapshot: &DatasetSnapshot,
        apply: bool,
        pre_restore_backup_id: Option<BackupId>,
    ) -> StockpileResult<RestoreSummary> {
        let mut summary = RestoreSummary::default();

        // Stage everything in memory first; writes happen only at commit
        let mut staged_items = Vec::new();
        for artifact_item in &snapshot.inventory {
            match self.storage.items.get_by_sku(&artifact_item.sku)? {
                None => {
                    summary.items_added += 1;
                    staged_items.push(artifact_item.clone());
                }
                Some(existing) if existing.content_eq(artifact_item) => {
                    summary.items_skipped += 1;
                }
                Some(existing) => {
                    summary.items_updated += 1;
                    // Keep the live row's identity; take the artifact's fields
                    let mut updated = artifact_item.clone();
                    updated.id = existing.id;
                    staged_items.push(updated);
                }
            }
        }

        let mut staged_users = Vec::new();
        if let Some(users) = &snapshot.users {
            for artifact_user in users {
                match self.storage.users.get_by_username(&artifact_user.username)? {
                    None => {
                        summary.items_added += 1;
                        staged_users.push(artifact_user.clone());
                    }
                    Some(existing) if existing.content_eq(artifact_user) => {
                        summary.items_skipped += 1;
                    }
                    Some(existing) => {
                        summary.items_updated += 1;
                        let mut updated = artifact_user.clone();
                        updated.id = existing.id;
                        staged_users.push(updated);
                    }
                }
            }
        }

        // Audit log merge is append-only: unseen entries are added,
        // already-present entries are skipped
        let mut staged_audit = Vec::new();
        if let Some(audit_logs) = &snapshot.audit_logs {
            let existing: std::collections::HashSet<_> = self
                .audit
                .read_all()?
                .iter()
                .map(|e| e.identity_key())
                .collect();

            for entry in audit_logs {
                if existing.contains(&entry.identity_key()) {
                    summary.items_skipped += 1;
                } else {
                    summary.items_added += 1;
                    staged_audit.push(entry.clone());
                }
            }
        }

        // Settings count as a single record
        let mut staged_settings = None;
        if let Some(artifact_settings) = &snapshot.settings {
            let current = Settings::load_or_create(self.storage.paths())?;
            if &current == artifact_settings {
                summary.items_skipped += 1;
            } else if self.storage.paths().settings_file().exists() {
                summary.items_updated += 1;
                staged_settings = Some(artifact_settings.clone());
            } else {
                summary.items_added += 1;
                staged_settings = Some(artifact_settings.clone());
            }
        }

        if !apply {
            return Ok(summary);
        }

        let before = self.capture_before_state(snapshot)?;

        let result = (|| -> StockpileResult<()> {
            for item in staged_items {
                self.storage.items.upsert(item)?;
            }
            self.storage.items.save()?;

            if snapshot.users.is_some() {
                for user in staged_users {
                    self.storage.users.upsert(user)?;
                }
                self.storage.users.save()?;
            }

            if !staged_audit.is_empty() {
                self.audit.log_batch(&staged_audit)?;
            }

            if let Some(settings) = &staged_settings {
                settings.save(self.storage.paths())?;
            }

            Ok(())
        })();

        if let Err(e) = result {
            self.rollback(&before, pre_restore_backup_id, e)?;
            unreachable!("rollback always returns an error");
        }

        Ok(summary)
    }

    /// Capture before-images of the sections the artifact will touch
    fn capture_before_state(&self, snapshot: &DatasetSnapshot) -> StockpileResult<BeforeState> {
        Ok(BeforeState {
            items: self.storage.items.get_all()?,
            users: if snapshot.users.is_some() {
                Some(self.storage.users.get_all()?)
            } else {
                None
            },
            audit_logs: if snapshot.audit_logs.is_some() {
                Some(self.audit.read_all()?)
            } else {
                None
            },
            settings: if snapshot.settings.is_some() {
                Some(Settings::load_or_create(self.storage.paths())?)
            } else {
                None
            },
        })
    }

    /// Undo a partially applied restore and surface a transaction error
    ///
    /// Always returns `Err`: either the wrapped cause after a clean
    /// rollback, or a harder error if the rollback itself failed.
    fn rollback(
        &self,
        before: &BeforeState,
        pre_restore_backup_id: Option<BackupId>,
        cause: StockpileError,
    ) -> StockpileResult<()> {
        let pre_restore_ref = pre_restore_backup_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());

        tracing::error!(
            "Restore mutation failed, rolling back (pre-restore backup: {}): {}",
            pre_restore_ref,
            cause
        );

        let undo = (|| -> StockpileResult<()> {
            self.storage.items.replace_all(before.items.clone())?;
            self.storage.items.save()?;

            if let Some(users) = &before.users {
                self.storage.users.replace_all(users.clone())?;
                self.storage.users.save()?;
            }

            if let Some(audit_logs) = &before.audit_logs {
                self.audit.rewrite_all(audit_logs)?;
            }

            if let Some(settings) = &before.settings {
                settings.save(self.storage.paths())?;
            }

            Ok(())
        })();

        match undo {
            Ok(()) => Err(StockpileError::Transaction(format!(
                "Restore rolled back (pre-restore backup: {}): {}",
                pre_restore_ref, cause
            ))),
            Err(rollback_err) => Err(StockpileError::Transaction(format!(
                "Restore failed AND rollback failed; recover from pre-restore backup {}: {} (rollback error: {})",
                pre_restore_ref, cause, rollback_err
            ))),
        }
    }
}

/// Before-images captured ahead of a mutating restore
struct BeforeState {
    items: Vec<crate::models::Item>,
    users: Option<Vec<crate::models::User>>,
    audit_logs: Option<Vec<AuditEntry>>,
    settings: Option<Settings>,
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_test_env, seed_items};
    use super::super::service::BackupRequest;
    use super::*;
    use crate::models::{BackupFormat, BackupScope, BackupStatus, BackupType, Item};

    fn confirmed(mode: RestoreMode) -> RestoreOptions {
        RestoreOptions {
            mode,
            passphrase: None,
            confirmed: true,
            actor: "tester".to_string(),
        }
    }

    #[test]
    fn test_rollback_restores_before_images() {
        use crate::codec::SnapshotMetadata;

        let env = create_test_env();
        seed_items(&env.storage, 2);
        let restore = env.restore_service();

        let snapshot = DatasetSnapshot {
            metadata: SnapshotMetadata {
                backup_id: BackupId::new(),
                created_at: chrono::Utc::now(),
                created_by: "tester".to_string(),
                record_count: 0,
                includes_audit: false,
            },
            inventory: Vec::new(),
            audit_logs: None,
            users: None,
            settings: None,
        };

        let before = restore.capture_before_state(&snapshot).unwrap();

        // Simulate a half-applied restore, then roll it back
        env.storage.items.replace_all(vec![Item::new("HALF", "Half applied")]).unwrap();
        env.storage.items.save().unwrap();

        let err = restore
            .rollback(&before, None, StockpileError::Storage("boom".to_string()))
            .unwrap_err();
        assert!(matches!(err, StockpileError::Transaction(_)));

        let items = env.storage.items.get_all().unwrap();
        assert_eq!(items.len(), 2);
        assert!(env.storage.items.get_by_sku("HALF").unwrap().is_none());
    }

    #[test]
    fn test_full_restore_replaces_dataset() {
        let env = create_test_env();
        seed_items(&env.storage, 3);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        // Mutate the live dataset after the backup
        env.storage.items.upsert(Item::new("EXTRA", "Extra item")).unwrap();
        env.storage.items.save().unwrap();
        assert_eq!(env.storage.items.count().unwrap(), 4);

        let restore = env.restore_service();
        let summary = restore.restore(record.id, confirmed(RestoreMode::Full)).unwrap();

        assert_eq!(summary.items_added, 3);
        assert_eq!(env.storage.items.count().unwrap(), 3);
        assert!(env.storage.items.get_by_sku("EXTRA").unwrap().is_none());
        assert!(summary.pre_restore_backup_id.is_some());
    }

    #[test]
    fn test_merge_restore_counts() {
        let env = create_test_env();
        seed_items(&env.storage, 3);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Csv, "tester"))
            .unwrap();

        // One row deleted (-> added on merge), one changed (-> updated),
        // one untouched (-> skipped)
        let gone = env.storage.items.get_by_sku("SKU-000").unwrap().unwrap();
        env.storage.items.delete(gone.id).unwrap();
        let mut changed = env.storage.items.get_by_sku("SKU-001").unwrap().unwrap();
        changed.quantity = 999;
        env.storage.items.upsert(changed).unwrap();
        env.storage.items.save().unwrap();

        let restore = env.restore_service();
        let summary = restore.restore(record.id, confirmed(RestoreMode::Merge)).unwrap();

        assert_eq!(summary.items_added, 1);
        assert_eq!(summary.items_updated, 1);
        assert_eq!(summary.items_skipped, 1);
        // Merge invariant: counts cover the whole artifact
        assert_eq!(summary.total(), record.record_count());

        // Updated row took the artifact's value
        let merged = env.storage.items.get_by_sku("SKU-001").unwrap().unwrap();
        assert_eq!(merged.quantity, 10);
    }

    #[test]
    fn test_merge_preserves_live_row_identity() {
        let env = create_test_env();
        seed_items(&env.storage, 1);

        let live = env.storage.items.get_by_sku("SKU-000").unwrap().unwrap();

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let mut changed = live.clone();
        changed.quantity = 5;
        env.storage.items.upsert(changed).unwrap();
        env.storage.items.save().unwrap();

        let restore = env.restore_service();
        restore.restore(record.id, confirmed(RestoreMode::Merge)).unwrap();

        let after = env.storage.items.get_by_sku("SKU-000").unwrap().unwrap();
        assert_eq!(after.id, live.id);
        assert_eq!(after.quantity, 10);
    }

    #[test]
    fn test_preview_mutates_nothing() {
        let env = create_test_env();
        seed_items(&env.storage, 2);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        env.storage.items.upsert(Item::new("EXTRA", "Extra")).unwrap();
        env.storage.items.save().unwrap();

        let restore = env.restore_service();
        let summary = restore
            .restore(record.id, RestoreOptions::preview("tester"))
            .unwrap();

        // Diff computed, nothing applied, no pre-restore backup
        assert_eq!(summary.items_skipped, 2);
        assert!(summary.pre_restore_backup_id.is_none());
        assert_eq!(env.storage.items.count().unwrap(), 3);
        assert_eq!(env.storage.backups.count().unwrap(), 1);
    }

    #[test]
    fn test_mutating_restore_creates_pre_restore_backup() {
        let env = create_test_env();
        seed_items(&env.storage, 1);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let restore = env.restore_service();
        let summary = restore.restore(record.id, confirmed(RestoreMode::Merge)).unwrap();

        let pre_id = summary.pre_restore_backup_id.unwrap();
        let pre = env.storage.backups.get_required(pre_id).unwrap();
        assert_eq!(pre.backup_type, BackupType::PreRestore);
        assert_eq!(pre.status(), BackupStatus::Completed);
    }

    #[test]
    fn test_restore_failed_record_rejected() {
        let env = create_test_env();
        seed_items(&env.storage, 1);

        // Simulate a creation that failed partway
        let mut failed = crate::models::BackupRecord::new_in_progress(
            crate::models::BackupId::new(),
            "backup-failed.json".to_string(),
            env.service.store().artifact_path("backup-failed.json"),
            BackupType::Manual,
            BackupFormat::Json,
            false,
            BackupScope::default(),
            None,
            None,
            String::new(),
            "tester".to_string(),
        );
        failed.fail().unwrap();
        env.storage.backups.upsert_and_save(failed.clone()).unwrap();

        let items_before = env.storage.items.get_all().unwrap();

        let restore = env.restore_service();
        for mode in [RestoreMode::Full, RestoreMode::Merge] {
            let err = restore.restore(failed.id, confirmed(mode)).unwrap_err();
            assert!(err.is_conflict(), "mode {} should fail closed", mode);
        }

        // Zero mutations
        assert_eq!(env.storage.items.get_all().unwrap(), items_before);
    }

    #[test]
    fn test_restore_corrupted_record_rejected() {
        let env = create_test_env();
        seed_items(&env.storage, 1);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let mut corrupted = env.storage.backups.get_required(record.id).unwrap();
        corrupted.mark_corrupted().unwrap();
        env.storage.backups.upsert_and_save(corrupted).unwrap();

        let restore = env.restore_service();
        for mode in [RestoreMode::Full, RestoreMode::Merge] {
            let err = restore.restore(record.id, confirmed(mode)).unwrap_err();
            assert!(err.is_conflict());
        }
    }

    #[test]
    fn test_unconfirmed_mutating_restore_rejected() {
        let env = create_test_env();

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let restore = env.restore_service();
        let mut options = confirmed(RestoreMode::Full);
        options.confirmed = false;

        assert!(restore.restore(record.id, options).unwrap_err().is_validation());
    }

    #[test]
    fn test_wrong_passphrase_fails_before_mutation() {
        let env = create_test_env();
        seed_items(&env.storage, 2);

        let mut request = BackupRequest::new(BackupFormat::Json, "tester");
        request.encrypt = true;
        request.passphrase = Some("p1".into());
        let record = env.service.create_backup(request).unwrap();

        // Change the dataset so a successful restore would be visible
        env.storage.items.upsert(Item::new("EXTRA", "Extra")).unwrap();
        env.storage.items.save().unwrap();
        let items_before = env.storage.items.get_all().unwrap();

        let restore = env.restore_service();
        let mut options = confirmed(RestoreMode::Full);
        options.passphrase = Some("p2".into());

        let err = restore.restore(record.id, options).unwrap_err();
        assert!(matches!(err, StockpileError::Encryption(_)));

        // Zero dataset mutations
        assert_eq!(env.storage.items.get_all().unwrap(), items_before);
    }

    #[test]
    fn test_missing_passphrase_rejected() {
        let env = create_test_env();

        let mut request = BackupRequest::new(BackupFormat::Json, "tester");
        request.encrypt = true;
        request.passphrase = Some("p1".into());
        let record = env.service.create_backup(request).unwrap();

        let restore = env.restore_service();
        let err = restore
            .restore(record.id, confirmed(RestoreMode::Full))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_full_restore_of_all_scopes() {
        let env = create_test_env();
        seed_items(&env.storage, 2);
        env.storage
            .users
            .upsert(crate::models::User::new("kaylee", crate::models::UserRole::Admin))
            .unwrap();
        env.storage.users.save().unwrap();

        let mut request = BackupRequest::new(BackupFormat::Sql, "tester");
        request.scope = BackupScope::everything();
        let record = env.service.create_backup(request).unwrap();

        // Wipe users, then restore
        env.storage.users.replace_all(Vec::new()).unwrap();
        env.storage.users.save().unwrap();

        let restore = env.restore_service();
        restore.restore(record.id, confirmed(RestoreMode::Full)).unwrap();

        assert_eq!(env.storage.users.count().unwrap(), 1);
    }
}
