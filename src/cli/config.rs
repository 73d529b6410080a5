//! Configuration CLI commands
//!
//! The admin path for inspecting paths and updating the retention policy.
//! Policy changes only happen here; the engine reads the policy, it never
//! writes it.

use clap::Subcommand;

use crate::audit::{AuditAction, AuditEntry, AuditOutcome};
use crate::config::{Settings, StockpilePaths};
use crate::error::{StockpileError, StockpileResult};
use crate::models::BackupFormat;

use super::{current_actor, Engine};

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration and paths
    Show,

    /// Update the backup retention policy
    SetRetention {
        /// Enable or disable automatic backups
        #[arg(long)]
        enabled: Option<bool>,

        /// Schedule time for automatic backups (HH:MM, UTC)
        #[arg(long)]
        time: Option<String>,

        /// Number of daily backups to keep
        #[arg(long)]
        daily: Option<u32>,

        /// Number of weekly backups to keep
        #[arg(long)]
        weekly: Option<u32>,

        /// Number of monthly backups to keep
        #[arg(long)]
        monthly: Option<u32>,

        /// Comma-separated formats for automatic backups (csv,json,sql)
        #[arg(long)]
        formats: Option<String>,
    },
}

/// Handle a config command
pub fn handle_config_command(
    engine: &Engine,
    paths: &StockpilePaths,
    settings: &mut Settings,
    cmd: ConfigCommands,
) -> StockpileResult<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("Stockpile Configuration");
            println!("=======================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Data directory:   {}", paths.data_dir().display());
            println!(
                "Backup directory: {}",
                settings.retention.resolve_storage_dir(paths).display()
            );
            println!("Audit log:        {}", paths.audit_log().display());
            println!();
            println!("Retention policy:");
            println!(
                "  automatic backups: {}",
                if settings.retention.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!("  schedule time:     {} UTC", settings.retention.schedule_time);
            println!("  daily backups:     {}", settings.retention.daily_count);
            println!("  weekly backups:    {}", settings.retention.weekly_count);
            println!("  monthly backups:   {}", settings.retention.monthly_count);
            println!(
                "  formats:           {}",
                settings
                    .retention
                    .formats
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        ConfigCommands::SetRetention {
            enabled,
            time,
            daily,
            weekly,
            monthly,
            formats,
        } => {
            let actor = current_actor(settings);

            if let Some(enabled) = enabled {
                settings.retention.enabled = enabled;
            }
            if let Some(time) = time {
                settings.retention.schedule_time = time;
                // Validate before persisting
                settings.retention.schedule_hour_minute()?;
            }
            if let Some(daily) = daily {
                settings.retention.daily_count = daily;
            }
            if let Some(weekly) = weekly {
                settings.retention.weekly_count = weekly;
            }
            if let Some(monthly) = monthly {
                settings.retention.monthly_count = monthly;
            }
            if let Some(formats) = formats {
                let parsed: Result<Vec<BackupFormat>, _> = formats
                    .split(',')
                    .map(|f| {
                        BackupFormat::parse(f.trim()).ok_or_else(|| {
                            StockpileError::Validation(format!("Unsupported format '{}'", f.trim()))
                        })
                    })
                    .collect();
                let parsed = parsed?;
                if parsed.is_empty() {
                    return Err(StockpileError::Validation(
                        "At least one format is required".to_string(),
                    ));
                }
                settings.retention.formats = parsed;
            }

            settings.save(paths)?;

            engine.audit.log(
                &AuditEntry::new(&actor, AuditAction::SettingsUpdated, AuditOutcome::Success)
                    .with_detail("retention policy updated"),
            )?;

            println!("Retention policy updated.");
        }
    }

    Ok(())
}
