//! Storage layer for Stockpile
//!
//! Provides JSON file storage with atomic writes and automatic directory
//! creation. The backup engine receives the coordinator behind an `Arc` so
//! creation can run on a worker thread.

pub mod backups;
pub mod file_io;
pub mod items;
pub mod users;

pub use backups::BackupRecordRepository;
pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use items::ItemRepository;
pub use users::UserRepository;

use crate::config::paths::StockpilePaths;
use crate::error::StockpileError;

/// Main storage coordinator that provides access to all repositories
pub struct Storage {
    paths: StockpilePaths,
    pub items: ItemRepository,
    pub users: UserRepository,
    pub backups: BackupRecordRepository,
}

impl Storage {
    /// Create a new Storage instance
    pub fn new(paths: StockpilePaths) -> Result<Self, StockpileError> {
        // Ensure directories exist
        paths.ensure_directories()?;

        Ok(Self {
            items: ItemRepository::new(paths.items_file()),
            users: UserRepository::new(paths.users_file()),
            backups: BackupRecordRepository::new(paths.backup_records_file()),
            paths,
        })
    }

    /// Get the paths configuration
    pub fn paths(&self) -> &StockpilePaths {
        &self.paths
    }

    /// Load all data from disk
    pub fn load_all(&self) -> Result<(), StockpileError> {
        self.items.load()?;
        self.users.load()?;
        self.backups.load()?;
        Ok(())
    }

    /// Save all data to disk
    pub fn save_all(&self) -> Result<(), StockpileError> {
        self.items.save()?;
        self.users.save()?;
        self.backups.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StockpilePaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::new(paths).unwrap();

        assert!(temp_dir.path().join("data").exists());
        assert!(temp_dir.path().join("backups").exists());
        assert_eq!(storage.items.count().unwrap(), 0);
    }

    #[test]
    fn test_load_and_save_all() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StockpilePaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::new(paths).unwrap();

        storage.load_all().unwrap();
        storage.save_all().unwrap();

        assert!(temp_dir.path().join("data").join("items.json").exists());
        assert!(temp_dir.path().join("data").join("users.json").exists());
        assert!(temp_dir.path().join("data").join("backups.json").exists());
    }
}
