//! Backup record repository for JSON storage
//!
//! Manages loading and saving backup metadata rows to backups.json. Status
//! transitions happen on the `BackupRecord` itself; this repository persists
//! the result. `upsert_and_save` is the single step that makes a transition
//! durable together with the fields it set.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::StockpileError;
use crate::models::{BackupId, BackupRecord, BackupStatus};

use super::file_io::{read_json, write_json_atomic};

/// Serializable backup record data structure
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct BackupRecordData {
    backups: Vec<BackupRecord>,
}

/// Repository for backup record persistence
pub struct BackupRecordRepository {
    path: PathBuf,
    data: RwLock<HashMap<BackupId, BackupRecord>>,
}

impl BackupRecordRepository {
    /// Create a new backup record repository
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Load records from disk
    pub fn load(&self) -> Result<(), StockpileError> {
        let file_data: BackupRecordData = read_json(&self.path)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for record in file_data.backups {
            data.insert(record.id, record);
        }

        Ok(())
    }

    /// Save records to disk
    pub fn save(&self) -> Result<(), StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let file_data = BackupRecordData {
            backups: data.values().cloned().collect(),
        };

        write_json_atomic(&self.path, &file_data)
    }

    /// Get a record by ID
    pub fn get(&self, id: BackupId) -> Result<Option<BackupRecord>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.get(&id).cloned())
    }

    /// Get a record by ID, or a not-found error
    pub fn get_required(&self, id: BackupId) -> Result<BackupRecord, StockpileError> {
        self.get(id)?
            .ok_or_else(|| StockpileError::backup_not_found(id.to_string()))
    }

    /// Get all records, newest first
    pub fn get_all(&self) -> Result<Vec<BackupRecord>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut records: Vec<_> = data.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Get all records with a given status, newest first
    pub fn get_by_status(&self, status: BackupStatus) -> Result<Vec<BackupRecord>, StockpileError> {
        let all = self.get_all()?;
        Ok(all.into_iter().filter(|r| r.status() == status).collect())
    }

    /// Insert or update a record in memory and persist the whole set
    ///
    /// Status transitions and the fields they set become durable in one
    /// atomic file replacement.
    pub fn upsert_and_save(&self, record: BackupRecord) -> Result<(), StockpileError> {
        {
            let mut data = self.data.write().map_err(|e| {
                StockpileError::Storage(format!("Failed to acquire write lock: {}", e))
            })?;
            data.insert(record.id, record);
        }
        self.save()
    }

    /// Delete a record and persist
    pub fn delete_and_save(&self, id: BackupId) -> Result<bool, StockpileError> {
        let removed = {
            let mut data = self.data.write().map_err(|e| {
                StockpileError::Storage(format!("Failed to acquire write lock: {}", e))
            })?;
            data.remove(&id).is_some()
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Count records
    pub fn count(&self) -> Result<usize, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.len())
    }
}
