//! CLI command handlers
//!
//! This module contains the implementation of CLI commands, bridging the
//! clap argument parsing with the backup engine and storage layer.

pub mod backup;
pub mod config;
pub mod item;

pub use backup::{handle_backup_command, BackupCommands};
pub use config::{handle_config_command, ConfigCommands};
pub use item::{handle_item_command, ItemCommands};

use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::backup::{
    BackupService, BackupStore, RestoreService, RetentionManager, ScopeLocks, VerificationService,
};
use crate::config::Settings;
use crate::error::StockpileResult;
use crate::scheduler::Scheduler;
use crate::storage::Storage;

/// The wired-up backup engine behind the CLI commands
pub struct Engine {
    pub storage: Arc<Storage>,
    pub audit: Arc<AuditLogger>,
    pub backup: BackupService,
    pub restore: RestoreService,
    pub verify: VerificationService,
    pub retention: RetentionManager,
}

impl Engine {
    /// Construct every service against one storage instance
    pub fn new(storage: Arc<Storage>, settings: &Settings) -> StockpileResult<Self> {
        let store = BackupStore::new(settings.retention.resolve_storage_dir(storage.paths()))?;
        let audit = Arc::new(AuditLogger::new(storage.paths().audit_log()));
        let locks = ScopeLocks::new();

        let backup = BackupService::new(
            Arc::clone(&storage),
            store.clone(),
            Arc::clone(&audit),
            locks.clone(),
        );
        let restore = RestoreService::new(
            Arc::clone(&storage),
            backup.clone(),
            Arc::clone(&audit),
            locks.clone(),
        );
        let verify = VerificationService::new(
            Arc::clone(&storage),
            store,
            Arc::clone(&audit),
            restore.clone(),
        );
        let retention = RetentionManager::new(
            Arc::clone(&storage),
            backup.store().clone(),
            Arc::clone(&audit),
        );

        Ok(Self {
            storage,
            audit,
            backup,
            restore,
            verify,
            retention,
        })
    }

    /// Build the scheduler for this engine
    pub fn scheduler(&self, settings: &Settings) -> Scheduler {
        Scheduler::new(
            self.backup.clone(),
            self.retention.clone(),
            settings.retention.clone(),
        )
    }
}

/// Resolve the acting identity: `$STOCKPILE_ACTOR`, then `$USER`, then the
/// configured fallback
pub fn current_actor(settings: &Settings) -> String {
    std::env::var("STOCKPILE_ACTOR")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| settings.default_actor.clone())
}

/// Format a file size in human-readable form
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a duration in human-readable form
pub(crate) fn format_age(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(chrono::Duration::seconds(30)), "30s");
        assert_eq!(format_age(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_age(chrono::Duration::hours(3)), "3h");
        assert_eq!(format_age(chrono::Duration::days(2)), "2d");
    }
}
