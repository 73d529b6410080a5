//! Backup engine for Stockpile
//!
//! The one subsystem with real durability depth: multi-format snapshot
//! creation, checksum-based integrity verification, optional encryption,
//! retention/rotation, and restore with full, merge, and preview semantics.
//!
//! # Architecture
//!
//! - `BackupStore`: named, timestamped artifact files with sidecar checksums
//! - `BackupService`: creation pipeline and record status transitions
//! - `VerificationService`: existence/size/checksum/format checks, optional
//!   restore dry run
//! - `RestoreService`: full/merge/preview application with a mandatory
//!   pre-restore safety backup and rollback on partial failure
//! - `RetentionManager`: daily/weekly/monthly rotation
//! - `ScopeLocks`: advisory per-section concurrency control

pub mod checksum;
pub mod lock;
pub mod restore;
pub mod retention;
pub mod service;
pub mod store;
pub mod verify;

pub use lock::{ScopeLockGuard, ScopeLocks};
pub use restore::{RestoreMode, RestoreOptions, RestoreService, RestoreSummary};
pub use retention::{RetentionManager, RetentionOutcome};
pub use service::{BackupRequest, BackupService};
pub use store::BackupStore;
pub use verify::{ValidationChecks, ValidationReport, VerificationService, VerifyOptions};

/// Test fixtures shared by the engine's test modules
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::audit::AuditLogger;
    use crate::config::StockpilePaths;
    use crate::models::Item;
    use crate::storage::Storage;

    use super::lock::ScopeLocks;
    use super::restore::RestoreService;
    use super::retention::RetentionManager;
    use super::service::BackupService;
    use super::store::BackupStore;
    use super::verify::VerificationService;

    /// A full engine wired against a temp directory
    pub struct TestEnv {
        pub storage: Arc<Storage>,
        pub service: BackupService,
        pub audit: Arc<AuditLogger>,
        pub locks: ScopeLocks,
        _temp: TempDir,
    }

    impl TestEnv {
        pub fn restore_service(&self) -> RestoreService {
            RestoreService::new(
                Arc::clone(&self.storage),
                self.service.clone(),
                Arc::clone(&self.audit),
                self.locks.clone(),
            )
        }

        pub fn verification_service(&self) -> VerificationService {
            VerificationService::new(
                Arc::clone(&self.storage),
                self.service.store().clone(),
                Arc::clone(&self.audit),
                self.restore_service(),
            )
        }

        pub fn retention_manager(&self) -> RetentionManager {
            RetentionManager::new(
                Arc::clone(&self.storage),
                self.service.store().clone(),
                Arc::clone(&self.audit),
            )
        }
    }

    pub fn create_test_env() -> TestEnv {
        let temp = TempDir::new().unwrap();
        let paths = StockpilePaths::with_base_dir(temp.path().to_path_buf());
        let storage = Arc::new(Storage::new(paths.clone()).unwrap());
        storage.load_all().unwrap();

        let store = BackupStore::new(paths.backup_dir()).unwrap();
        let audit = Arc::new(AuditLogger::new(paths.audit_log()));
        let locks = ScopeLocks::new();

        let service = BackupService::new(
            Arc::clone(&storage),
            store,
            Arc::clone(&audit),
            locks.clone(),
        );

        TestEnv {
            storage,
            service,
            audit,
            locks,
            _temp: temp,
        }
    }

    /// Seed `count` items with predictable SKUs (SKU-000, SKU-001, ...)
    pub fn seed_items(storage: &Storage, count: usize) {
        for i in 0..count {
            let item = Item::with_stock(format!("SKU-{:03}", i), format!("Item {}", i), 10, 100);
            storage.items.upsert(item).unwrap();
        }
        storage.items.save().unwrap();
    }
}
