//! Backup verification service
//!
//! Validates an existing artifact without ever mutating it: existence, size
//! sanity, checksum match against the record and sidecar, format
//! well-formedness (parse-only), and an optional restore dry run. A checksum
//! mismatch is the one check that writes anything: it flips the backing
//! record to CORRUPTED so the artifact can never be restored.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditAction, AuditEntry, AuditLogger, AuditOutcome};
use crate::codec;
use crate::crypto::{decrypt_with_passphrase, SecureString};
use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupId, BackupStatus};
use crate::storage::Storage;

use super::checksum;
use super::restore::{RestoreOptions, RestoreService};
use super::store::BackupStore;

/// Artifacts smaller than this are suspicious but not invalid
const SIZE_WARNING_THRESHOLD: u64 = 1024;

/// Options for a verification run
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Also run a restore dry run (Preview mode) against the live dataset.
    /// Opt-in because it costs a full decode plus diff.
    pub restore_test: bool,
    /// Passphrase for encrypted artifacts; required for the format and
    /// restore-test checks on those
    pub passphrase: Option<SecureString>,
    /// Actor identity for audit attribution
    pub actor: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            restore_test: false,
            passphrase: None,
            actor: "system".to_string(),
        }
    }
}

/// Individual check results, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationChecks {
    /// Artifact file present at its storage path
    pub existence: bool,
    /// Size is non-zero and matches the recorded file size
    pub completeness: bool,
    /// Recomputed digest matches the record and sidecar
    pub checksum_match: bool,
    /// Artifact decrypts (when applicable) and parses
    pub format_well_formed: bool,
    /// Outcome of the optional restore dry run; None when not requested
    pub restore_test_passed: Option<bool>,
}

/// Result of one verification run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether every executed check passed
    pub valid: bool,
    /// Per-check outcomes
    pub checks: ValidationChecks,
    /// Hard failures, in the order encountered
    pub errors: Vec<String>,
    /// Non-fatal observations (small artifact, missing sidecar, ...)
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }
}

/// Validates backup artifacts against their records
#[derive(Clone)]
pub struct VerificationService {
    storage: Arc<Storage>,
    store: BackupStore,
    audit: Arc<AuditLogger>,
    restore: RestoreService,
}

impl VerificationService {
    /// Create a new VerificationService
    pub fn new(
        storage: Arc<Storage>,
        store: BackupStore,
        audit: Arc<AuditLogger>,
        restore: RestoreService,
    ) -> Self {
        Self {
            storage,
            store,
            audit,
            restore,
        }
    }

    /// Verify an artifact, short-circuiting on the first hard failure
    ///
    /// On full success the record is marked validated; verification never
    /// touches the artifact bytes themselves, so repeated runs on an
    /// unchanged artifact produce the same report.
    pub fn verify(&self, id: BackupId, options: &VerifyOptions) -> StockpileResult<ValidationReport> {
        let record = self.storage.backups.get_required(id)?;

        // Only completed records describe a supposedly intact artifact
        if record.status() != BackupStatus::Completed {
            return Err(StockpileError::Conflict(format!(
                "Backup {} cannot be verified in status {}",
                record.id,
                record.status()
            )));
        }

        if record.encrypted && options.passphrase.is_none() {
            return Err(StockpileError::Validation(
                "Encrypted backup requires a passphrase to verify".to_string(),
            ));
        }

        let mut report = ValidationReport {
            valid: true,
            ..Default::default()
        };

        // 1. Existence
        report.checks.existence = self.store.exists(&record.storage_path);
        if !report.checks.existence {
            report.fail(format!(
                "Artifact missing: {}",
                record.storage_path.display()
            ));
            return self.finish(id, &options.actor, report);
        }

        // 2. Size sanity
        let size = self.store.size(&record.storage_path)?;
        if size == 0 {
            report.fail("Artifact is empty (0 bytes)");
            return self.finish(id, &options.actor, report);
        }
        if size != record.file_size() {
            report.checks.completeness = false;
            report.fail(format!(
                "Artifact size {} does not match recorded size {}",
                size,
                record.file_size()
            ));
            return self.finish(id, &options.actor, report);
        }
        report.checks.completeness = true;
        if size < SIZE_WARNING_THRESHOLD {
            report
                .warnings
                .push(format!("Artifact is unusually small ({} bytes)", size));
        }

        // 3. Checksum over stored bytes, against record and sidecar
        let stored = self.store.read(&record.storage_path)?;
        let digest = checksum::checksum_bytes(&stored);

        let recorded = record.checksum().unwrap_or_default().to_string();
        let sidecar = match checksum::read_sidecar(&record.storage_path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                report
                    .warnings
                    .push(format!("Sidecar unreadable, comparing record only: {}", e));
                None
            }
        };

        let matches_record = digest == recorded;
        let matches_sidecar = sidecar.as_deref().map_or(true, |s| s == digest);
        report.checks.checksum_match = matches_record && matches_sidecar;

        if !report.checks.checksum_match {
            report.fail(format!(
                "Checksum mismatch: computed {}, recorded {}",
                digest, recorded
            ));

            // The artifact is provably not what was written: terminal state
            let mut corrupted = record.clone();
            corrupted.mark_corrupted()?;
            self.storage.backups.upsert_and_save(corrupted)?;
            tracing::warn!(backup_id = %id, "Backup marked CORRUPTED after checksum mismatch");

            return self.finish(id, &options.actor, report);
        }

        // 4. Format well-formedness (decrypt + parse, apply nothing)
        let plaintext = if record.encrypted {
            let passphrase = options.passphrase.as_ref().ok_or_else(|| {
                StockpileError::Validation(
                    "Encrypted backup requires a passphrase to verify".to_string(),
                )
            })?;
            match decrypt_with_passphrase(&stored, passphrase.as_str()) {
                Ok(plaintext) => Some(plaintext),
                Err(e) => {
                    report.fail(format!("Decryption failed: {}", e));
                    return self.finish(id, &options.actor, report);
                }
            }
        } else {
            None
        };

        match codec::decode(plaintext.as_deref().unwrap_or(&stored), record.format) {
            Ok(_) => report.checks.format_well_formed = true,
            Err(e) => {
                report.fail(format!("Artifact does not parse as {}: {}", record.format, e));
                return self.finish(id, &options.actor, report);
            }
        }

        // 5. Optional restore dry run
        if options.restore_test {
            let mut preview = RestoreOptions::preview(options.actor.clone());
            preview.passphrase = options.passphrase.clone();

            match self.restore.restore(id, preview) {
                Ok(_) => report.checks.restore_test_passed = Some(true),
                Err(e) => {
                    report.checks.restore_test_passed = Some(false);
                    report.fail(format!("Restore dry run failed: {}", e));
                    return self.finish(id, &options.actor, report);
                }
            }
        }

        // Full success: mark the record validated
        let mut validated = record.clone();
        validated.mark_validated(Utc::now())?;
        self.storage.backups.upsert_and_save(validated)?;

        self.finish(id, &options.actor, report)
    }

    /// Emit the audit entry and return the report
    fn finish(
        &self,
        id: BackupId,
        actor: &str,
        report: ValidationReport,
    ) -> StockpileResult<ValidationReport> {
        let outcome = if report.valid {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };

        tracing::info!(
            backup_id = %id,
            "Verification finished: valid={} ({} errors, {} warnings)",
            report.valid,
            report.errors.len(),
            report.warnings.len()
        );

        let mut entry = AuditEntry::new(actor, AuditAction::BackupVerified, outcome)
            .with_artifact(id.to_string());
        if let Some(first_error) = report.errors.first() {
            entry = entry.with_detail(first_error.clone());
        }
        self.audit.log(&entry)?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::service::BackupRequest;
    use super::super::test_support::{create_test_env, seed_items};
    use super::*;
    use crate::models::BackupFormat;
    use std::fs;

    #[test]
    fn test_verify_valid_backup() {
        let env = create_test_env();
        seed_items(&env.storage, 3);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let verifier = env.verification_service();
        let report = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert!(report.valid);
        assert!(report.checks.existence);
        assert!(report.checks.completeness);
        assert!(report.checks.checksum_match);
        assert!(report.checks.format_well_formed);
        assert_eq!(report.checks.restore_test_passed, None);

        // Record is now validated
        let reloaded = env.storage.backups.get_required(record.id).unwrap();
        assert!(reloaded.validated());
        assert!(reloaded.validated_at().is_some());
    }

    #[test]
    fn test_corrupted_artifact_detected_and_marked() {
        let env = create_test_env();
        seed_items(&env.storage, 3);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Csv, "tester"))
            .unwrap();

        // Flip one byte of the stored artifact
        let mut bytes = fs::read(&record.storage_path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&record.storage_path, &bytes).unwrap();

        let verifier = env.verification_service();
        let report = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert!(!report.valid);
        assert!(!report.checks.checksum_match);
        assert!(!report.errors.is_empty());

        let reloaded = env.storage.backups.get_required(record.id).unwrap();
        assert_eq!(reloaded.status(), BackupStatus::Corrupted);
        assert!(!reloaded.validated());
    }

    #[test]
    fn test_missing_artifact_short_circuits() {
        let env = create_test_env();

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        fs::remove_file(&record.storage_path).unwrap();

        let verifier = env.verification_service();
        let report = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert!(!report.valid);
        assert!(!report.checks.existence);
        // Later checks never ran
        assert!(!report.checks.checksum_match);
        assert!(!report.checks.format_well_formed);

        // Existence failure is not corruption
        let reloaded = env.storage.backups.get_required(record.id).unwrap();
        assert_eq!(reloaded.status(), BackupStatus::Completed);
    }

    #[test]
    fn test_verification_is_idempotent() {
        let env = create_test_env();
        seed_items(&env.storage, 2);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let verifier = env.verification_service();
        let first = verifier.verify(record.id, &VerifyOptions::default()).unwrap();
        let second = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert_eq!(first, second);

        // Size and checksum unchanged by verification
        let reloaded = env.storage.backups.get_required(record.id).unwrap();
        assert_eq!(reloaded.file_size(), record.file_size());
        assert_eq!(reloaded.checksum(), record.checksum());
    }

    #[test]
    fn test_small_artifact_warns_but_passes() {
        let env = create_test_env();
        // No items: tiny artifact

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();
        assert!(record.file_size() < SIZE_WARNING_THRESHOLD);

        let verifier = env.verification_service();
        let report = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert!(report.valid);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_restore_test_opt_in() {
        let env = create_test_env();
        seed_items(&env.storage, 2);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        let verifier = env.verification_service();
        let options = VerifyOptions {
            restore_test: true,
            ..Default::default()
        };
        let report = verifier.verify(record.id, &options).unwrap();

        assert!(report.valid);
        assert_eq!(report.checks.restore_test_passed, Some(true));

        // Dry run must not create a pre-restore backup or mutate anything
        assert_eq!(env.storage.backups.count().unwrap(), 1);
        assert_eq!(env.storage.items.count().unwrap(), 2);
    }

    #[test]
    fn test_encrypted_verify_requires_passphrase() {
        let env = create_test_env();

        let mut request = BackupRequest::new(BackupFormat::Json, "tester");
        request.encrypt = true;
        request.passphrase = Some("secret".into());
        let record = env.service.create_backup(request).unwrap();

        let verifier = env.verification_service();
        let err = verifier.verify(record.id, &VerifyOptions::default()).unwrap_err();
        assert!(err.is_validation());

        let options = VerifyOptions {
            passphrase: Some("secret".into()),
            ..Default::default()
        };
        let report = verifier.verify(record.id, &options).unwrap();
        assert!(report.valid);
    }

    #[test]
    fn test_verify_in_progress_record_rejected() {
        let env = create_test_env();

        let record = crate::models::BackupRecord::new_in_progress(
            BackupId::new(),
            "backup-stuck.json".to_string(),
            env.service.store().artifact_path("backup-stuck.json"),
            crate::models::BackupType::Manual,
            BackupFormat::Json,
            false,
            crate::models::BackupScope::default(),
            None,
            None,
            String::new(),
            "tester".to_string(),
        );
        env.storage.backups.upsert_and_save(record.clone()).unwrap();

        let verifier = env.verification_service();
        let err = verifier.verify(record.id, &VerifyOptions::default()).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_truncated_artifact_fails_completeness() {
        let env = create_test_env();
        seed_items(&env.storage, 3);

        let record = env
            .service
            .create_backup(BackupRequest::new(BackupFormat::Json, "tester"))
            .unwrap();

        // Truncate the artifact
        let bytes = fs::read(&record.storage_path).unwrap();
        fs::write(&record.storage_path, &bytes[..bytes.len() / 2]).unwrap();

        let verifier = env.verification_service();
        let report = verifier.verify(record.id, &VerifyOptions::default()).unwrap();

        assert!(!report.valid);
        assert!(!report.checks.completeness);
    }
}
