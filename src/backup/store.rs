//! Backup artifact store
//!
//! Durable, named, timestamped storage of backup artifacts on the local
//! filesystem. Artifacts are written atomically under collision-free names
//! (`backup-{id}-{timestamp}.{ext}`), each with a sidecar checksum file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupFormat, BackupId};
use crate::storage::write_bytes_atomic;

use super::checksum;

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Create a store rooted at the given directory, creating it if needed
    pub fn new(root: PathBuf) -> StockpileResult<Self> {
        fs::create_dir_all(&root).map_err(|e| {
            StockpileError::Storage(format!(
                "Failed to create backup directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// The store's root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collision-free artifact filename: `backup-{id}-{timestamp}.{ext}`
    ///
    /// The timestamp is ISO 8601 UTC with the colons stripped so the name
    /// is valid on every filesystem.
    pub fn artifact_filename(
        &self,
        id: BackupId,
        created_at: DateTime<Utc>,
        format: BackupFormat,
    ) -> String {
        format!(
            "backup-{}-{}.{}",
            id.as_uuid(),
            created_at.format("%Y-%m-%dT%H%M%SZ"),
            format.extension()
        )
    }

    /// Full path for an artifact filename
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Write artifact bytes atomically, returning the artifact path
    pub fn write(&self, filename: &str, bytes: &[u8]) -> StockpileResult<PathBuf> {
        let path = self.artifact_path(filename);
        write_bytes_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Write the sidecar checksum file for a stored artifact
    pub fn write_sidecar(&self, path: &Path, digest: &str) -> StockpileResult<PathBuf> {
        checksum::write_sidecar(path, digest)
    }

    /// Read artifact bytes
    pub fn read(&self, path: &Path) -> StockpileResult<Vec<u8>> {
        if !path.exists() {
            return Err(StockpileError::artifact_not_found(
                path.display().to_string(),
            ));
        }
        fs::read(path).map_err(|e| {
            StockpileError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    /// Whether an artifact exists at the given path
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Size of an artifact in bytes
    pub fn size(&self, path: &Path) -> StockpileResult<u64> {
        let metadata = fs::metadata(path).map_err(|e| {
            StockpileError::Storage(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        Ok(metadata.len())
    }

    /// Delete an artifact and its sidecar, ignoring files already gone
    pub fn delete(&self, path: &Path) -> StockpileResult<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                StockpileError::Storage(format!("Failed to delete {}: {}", path.display(), e))
            })?;
        }

        let sidecar = checksum::sidecar_path(path);
        if sidecar.exists() {
            fs::remove_file(&sidecar).map_err(|e| {
                StockpileError::Storage(format!(
                    "Failed to delete sidecar {}: {}",
                    sidecar.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}
