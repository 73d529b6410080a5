//! Automatic backup scheduler
//!
//! Explicitly constructed from the backup service, the retention manager,
//! and the retention policy; holds no global state. An external timer (cron,
//! a service loop, `stockpile backup auto`) calls `run_pending` and the
//! scheduler decides whether a run is due, creates one automatic backup per
//! configured format, and applies retention afterwards.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use crate::backup::{BackupRequest, BackupService, RetentionManager};
use crate::config::RetentionPolicy;
use crate::error::StockpileResult;
use crate::models::{BackupRecord, BackupScope};

/// Actor recorded for scheduler-initiated operations
const SCHEDULER_ACTOR: &str = "scheduler";

/// Drives automatic backups and retention on a schedule
pub struct Scheduler {
    backup: BackupService,
    retention: RetentionManager,
    policy: RetentionPolicy,
}

impl Scheduler {
    /// Create a new Scheduler
    pub fn new(backup: BackupService, retention: RetentionManager, policy: RetentionPolicy) -> Self {
        Self {
            backup,
            retention,
            policy,
        }
    }

    /// The next scheduled run strictly after `after`
    ///
    /// Returns None when automatic backups are disabled.
    pub fn next_run(&self, after: DateTime<Utc>) -> StockpileResult<Option<DateTime<Utc>>> {
        if !self.policy.enabled {
            return Ok(None);
        }

        let (hour, minute) = self.policy.schedule_hour_minute()?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            crate::error::StockpileError::Validation(format!(
                "Invalid schedule time {:02}:{:02}",
                hour, minute
            ))
        })?;

        let candidate = Utc
            .from_utc_datetime(&after.date_naive().and_time(time));

        if candidate > after {
            Ok(Some(candidate))
        } else {
            Ok(Some(candidate + Duration::days(1)))
        }
    }

    /// Whether a run is due at `now`, given the last completed run
    pub fn is_due(
        &self,
        now: DateTime<Utc>,
        last_run: Option<DateTime<Utc>>,
    ) -> StockpileResult<bool> {
        let reference = match last_run {
            Some(last) => last,
            // Never run: due as soon as a scheduled time has passed today
            None => now - Duration::days(1),
        };

        match self.next_run(reference)? {
            Some(next) => Ok(next <= now),
            None => Ok(false),
        }
    }

    /// Run automatic backups and retention if a run is due
    ///
    /// Returns the created records; empty when nothing was due.
    pub fn run_pending(
        &self,
        now: DateTime<Utc>,
        last_run: Option<DateTime<Utc>>,
    ) -> StockpileResult<Vec<BackupRecord>> {
        if !self.is_due(now, last_run)? {
            return Ok(Vec::new());
        }
        self.run_now()
    }

    /// Unconditionally run one automatic backup per configured format,
    /// then apply retention
    pub fn run_now(&self) -> StockpileResult<Vec<BackupRecord>> {
        let mut records = Vec::new();

        for format in &self.policy.formats {
            let request = BackupRequest {
                format: *format,
                scope: BackupScope::everything(),
                encrypt: false,
                passphrase: None,
                date_range_from: None,
                date_range_to: None,
                notes: "scheduled automatic backup".to_string(),
                created_by: SCHEDULER_ACTOR.to_string(),
            };

            records.push(self.backup.create_automatic_backup(request)?);
        }

        let outcome = self.retention.apply_retention(&self.policy, SCHEDULER_ACTOR)?;
        tracing::info!(
            "Scheduled run created {} backup(s), pruned {}",
            records.len(),
            outcome.pruned.len()
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::test_support::{create_test_env, seed_items};
    use crate::models::{BackupFormat, BackupStatus, BackupType};

    fn scheduler_with(env: &crate::backup::test_support::TestEnv, policy: RetentionPolicy) -> Scheduler {
        Scheduler::new(env.service.clone(), env.retention_manager(), policy)
    }

    fn enabled_policy() -> RetentionPolicy {
        RetentionPolicy {
            enabled: true,
            schedule_time: "02:30".to_string(),
            formats: vec![BackupFormat::Json, BackupFormat::Csv],
            ..Default::default()
        }
    }

    #[test]
    fn test_next_run_same_day() {
        let env = create_test_env();
        let scheduler = scheduler_with(&env, enabled_policy());

        let after = "2026-08-07T01:00:00Z".parse().unwrap();
        let next = scheduler.next_run(after).unwrap().unwrap();
        assert_eq!(next, "2026-08-07T02:30:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        let env = create_test_env();
        let scheduler = scheduler_with(&env, enabled_policy());

        let after = "2026-08-07T03:00:00Z".parse().unwrap();
        let next = scheduler.next_run(after).unwrap().unwrap();
        assert_eq!(next, "2026-08-08T02:30:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_disabled_policy_never_runs() {
        let env = create_test_env();
        let policy = RetentionPolicy {
            enabled: false,
            ..enabled_policy()
        };
        let scheduler = scheduler_with(&env, policy);

        assert!(scheduler.next_run(Utc::now()).unwrap().is_none());
        let records = scheduler.run_pending(Utc::now(), None).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_is_due_after_schedule_time() {
        let env = create_test_env();
        let scheduler = scheduler_with(&env, enabled_policy());

        let now = "2026-08-07T03:00:00Z".parse().unwrap();
        let before_schedule = "2026-08-07T01:00:00Z".parse().unwrap();

        // Last run before today's slot, now past it: due
        assert!(scheduler.is_due(now, Some(before_schedule)).unwrap());

        // Last run after today's slot: not due
        let after_schedule = "2026-08-07T02:45:00Z".parse().unwrap();
        assert!(!scheduler.is_due(now, Some(after_schedule)).unwrap());
    }

    #[test]
    fn test_run_now_creates_one_backup_per_format() {
        let env = create_test_env();
        seed_items(&env.storage, 2);
        let scheduler = scheduler_with(&env, enabled_policy());

        let records = scheduler.run_now().unwrap();

        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.backup_type, BackupType::Automatic);
            assert_eq!(record.status(), BackupStatus::Completed);
            assert_eq!(record.created_by, "scheduler");
        }

        let formats: Vec<_> = records.iter().map(|r| r.format).collect();
        assert!(formats.contains(&BackupFormat::Json));
        assert!(formats.contains(&BackupFormat::Csv));
    }

    #[test]
    fn test_run_pending_respects_last_run() {
        let env = create_test_env();
        let scheduler = scheduler_with(&env, enabled_policy());

        let now = "2026-08-07T03:00:00Z".parse().unwrap();
        let just_ran = "2026-08-07T02:35:00Z".parse().unwrap();

        let records = scheduler.run_pending(now, Some(just_ran)).unwrap();
        assert!(records.is_empty());
        assert_eq!(env.storage.backups.count().unwrap(), 0);
    }
}
