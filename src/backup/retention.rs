//! Backup retention and rotation
//!
//! Classifies COMPLETED backups into daily/weekly/monthly tiers by creation
//! time and keeps the newest backup of each of the N most recent buckets per
//! tier; everything else is pruned (artifact, sidecar, and record).
//! PRE_RESTORE backups sit outside the rotation: they are kept
//! unconditionally for a fixed window and pruned after it, since they are
//! the last line of defense after a bad restore.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};

use crate::audit::{AuditAction, AuditEntry, AuditLogger, AuditOutcome};
use crate::config::RetentionPolicy;
use crate::error::StockpileResult;
use crate::models::{BackupId, BackupRecord, BackupStatus, BackupType};
use crate::storage::Storage;

use super::store::BackupStore;

/// How long PRE_RESTORE safety backups are kept, regardless of policy
pub const PRE_RESTORE_RETENTION_DAYS: i64 = 7;

/// Result of one retention pass
#[derive(Debug, Clone, Default)]
pub struct RetentionOutcome {
    /// Records that survived the pass
    pub kept: Vec<BackupId>,
    /// Records whose artifact and metadata were deleted
    pub pruned: Vec<BackupId>,
}

/// Applies the rotation policy to existing backups
#[derive(Clone)]
pub struct RetentionManager {
    storage: Arc<Storage>,
    store: BackupStore,
    audit: Arc<AuditLogger>,
}

impl RetentionManager {
    /// Create a new RetentionManager
    pub fn new(storage: Arc<Storage>, store: BackupStore, audit: Arc<AuditLogger>) -> Self {
        Self {
            storage,
            store,
            audit,
        }
    }

    /// Apply the policy, deleting everything outside the keep set
    ///
    /// Only COMPLETED records participate. IN_PROGRESS, FAILED, and
    /// CORRUPTED records are left untouched for forensics.
    pub fn apply_retention(
        &self,
        policy: &RetentionPolicy,
        actor: &str,
    ) -> StockpileResult<RetentionOutcome> {
        let now = Utc::now();
        let completed = self.storage.backups.get_by_status(BackupStatus::Completed)?;

        let (pre_restore, rotated): (Vec<_>, Vec<_>) = completed
            .into_iter()
            .partition(|r| r.backup_type == BackupType::PreRestore);

        let keep = rotation_keep_set(&rotated, policy);

        let mut outcome = RetentionOutcome::default();

        for record in rotated {
            if keep.contains(&record.id) {
                outcome.kept.push(record.id);
            } else {
                self.prune(&record, actor)?;
                outcome.pruned.push(record.id);
            }
        }

        for record in pre_restore {
            let age = now.signed_duration_since(record.created_at);
            if age <= Duration::days(PRE_RESTORE_RETENTION_DAYS) {
                outcome.kept.push(record.id);
            } else {
                self.prune(&record, actor)?;
                outcome.pruned.push(record.id);
            }
        }

        tracing::info!(
            "Retention pass: kept {}, pruned {}",
            outcome.kept.len(),
            outcome.pruned.len()
        );

        Ok(outcome)
    }

    /// Delete one record's artifact, sidecar, and metadata row
    fn prune(&self, record: &BackupRecord, actor: &str) -> StockpileResult<()> {
        self.store.delete(&record.storage_path)?;
        self.storage.backups.delete_and_save(record.id)?;

        tracing::info!(backup_id = %record.id, "Pruned backup {}", record.filename);
        self.audit.log(
            &AuditEntry::new(actor, AuditAction::BackupPruned, AuditOutcome::Success)
                .with_artifact(record.id.to_string())
                .with_detail(record.filename.clone()),
        )?;

        Ok(())
    }
}

/// Compute the ids kept by the daily/weekly/monthly rotation
///
/// Records must all be COMPLETED non-PRE_RESTORE. Per tier, records are
/// bucketed by calendar day, ISO week, and calendar month; the newest record
/// in each of the N most recent buckets is kept. The final keep set is the
/// union across tiers, so a backup serving as both this week's weekly and
/// this month's monthly is only stored once.
fn rotation_keep_set(records: &[BackupRecord], policy: &RetentionPolicy) -> HashSet<BackupId> {
    // Newest first
    let mut sorted: Vec<&BackupRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut keep = HashSet::new();

    keep.extend(tier_keep(&sorted, policy.daily_count, |r| {
        let date = r.created_at.date_naive();
        (date.year(), date.ordinal(), 0)
    }));
    keep.extend(tier_keep(&sorted, policy.weekly_count, |r| {
        let week = r.created_at.iso_week();
        (week.year(), week.week(), 1)
    }));
    keep.extend(tier_keep(&sorted, policy.monthly_count, |r| {
        (r.created_at.year(), r.created_at.month(), 2)
    }));

    keep
}

/// Keep the newest record of each of the first `count` distinct buckets
fn tier_keep<K: Eq + std::hash::Hash>(
    sorted_desc: &[&BackupRecord],
    count: u32,
    bucket: impl Fn(&BackupRecord) -> K,
) -> Vec<BackupId> {
    let mut seen_buckets = HashSet::new();
    let mut kept = Vec::new();

    for record in sorted_desc {
        let key = bucket(record);
        if seen_buckets.contains(&key) {
            continue;
        }
        if seen_buckets.len() as u32 >= count {
            continue;
        }
        seen_buckets.insert(key);
        kept.push(record.id);
    }

    kept
}
