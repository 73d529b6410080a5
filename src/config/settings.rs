//! User settings for Stockpile
//!
//! Manages application preferences, most importantly the backup retention
//! policy. Settings are loaded once at startup and mutated only through the
//! explicit `config set-retention` admin path.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StockpileError;
use crate::models::BackupFormat;

use super::paths::StockpilePaths;

/// Backup rotation and scheduling policy
///
/// Applied by the retention manager on each automatic run. Per-tier counts
/// are the number of distinct daily/weekly/monthly buckets whose newest
/// backup is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Whether automatic backups are enabled
    #[serde(default)]
    pub enabled: bool,

    /// Time of day ("HH:MM", UTC) for automatic backups
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,

    /// Number of daily backups to keep
    pub daily_count: u32,

    /// Number of weekly backups to keep
    pub weekly_count: u32,

    /// Number of monthly backups to keep
    pub monthly_count: u32,

    /// Formats produced by automatic backups
    #[serde(default = "default_formats")]
    pub formats: Vec<BackupFormat>,

    /// Backup storage root; the default backup directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

fn default_schedule_time() -> String {
    "02:00".to_string()
}

fn default_formats() -> Vec<BackupFormat> {
    vec![BackupFormat::Json]
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule_time: default_schedule_time(),
            daily_count: 7,
            weekly_count: 4,
            monthly_count: 12,
            formats: default_formats(),
            storage_dir: None,
        }
    }
}

impl RetentionPolicy {
    /// Parse the schedule time into (hour, minute)
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not a valid "HH:MM" time.
    pub fn schedule_hour_minute(&self) -> Result<(u32, u32), StockpileError> {
        let invalid = || {
            StockpileError::Validation(format!(
                "Invalid schedule time '{}', expected HH:MM",
                self.schedule_time
            ))
        };

        let (hh, mm) = self.schedule_time.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hh.parse().map_err(|_| invalid())?;
        let minute: u32 = mm.parse().map_err(|_| invalid())?;

        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Ok((hour, minute))
    }

    /// Resolve the backup storage root against the default paths
    pub fn resolve_storage_dir(&self, paths: &StockpilePaths) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| paths.backup_dir())
    }
}

/// User settings for Stockpile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Backup retention policy
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Actor name used when none is supplied and $USER is unset
    #[serde(default = "default_actor")]
    pub default_actor: String,

    /// Whether initial setup has been completed
    #[serde(default)]
    pub setup_completed: bool,
}

fn default_schema_version() -> u32 {
    1
}

fn default_actor() -> String {
    "system".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            retention: RetentionPolicy::default(),
            default_actor: default_actor(),
            setup_completed: false,
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &StockpilePaths) -> Result<Self, StockpileError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| StockpileError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                StockpileError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Create default settings
            let settings = Settings::default();
            // Don't save yet - let caller decide when to persist
            Ok(settings)
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &StockpilePaths) -> Result<(), StockpileError> {
        // Ensure the config directory exists
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| StockpileError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| StockpileError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
