//! Backup CLI commands
//!
//! Implements CLI commands for backup management: create, list, inspect,
//! verify, restore, prune, and the scheduler entry point.

use chrono::NaiveDate;
use clap::Subcommand;

use crate::backup::{BackupRequest, RestoreMode, RestoreOptions, VerifyOptions};
use crate::config::Settings;
use crate::crypto::SecureString;
use crate::error::{StockpileError, StockpileResult};
use crate::models::{BackupFormat, BackupId, BackupRecord, BackupScope, BackupStatus};

use super::{current_actor, format_age, format_size, Engine};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Artifact format: csv, json, or sql
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Include the audit log
        #[arg(long)]
        include_audit: bool,

        /// Include application users
        #[arg(long)]
        include_users: bool,

        /// Include application settings
        #[arg(long)]
        include_settings: bool,

        /// Include every dataset section
        #[arg(short, long)]
        all: bool,

        /// Encrypt the artifact (prompts for a passphrase)
        #[arg(short, long)]
        encrypt: bool,

        /// Only include records updated on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Only include records updated on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Operator notes stored on the record
        #[arg(short, long, default_value = "")]
        notes: String,

        /// Return immediately and finish on a background worker
        #[arg(long)]
        detach: bool,
    },

    /// List all backup records
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup id (or 'latest')
        backup: String,
    },

    /// Verify a backup's integrity
    Verify {
        /// Backup id (or 'latest')
        backup: String,

        /// Also run a restore dry run (slower)
        #[arg(long)]
        deep: bool,
    },

    /// Restore from a backup
    Restore {
        /// Backup id (or 'latest')
        backup: String,

        /// Restore mode: full, merge, or preview
        #[arg(short, long, default_value = "preview")]
        mode: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Delete old backups according to the retention policy
    Prune {
        /// Skip confirmation and delete
        #[arg(long)]
        force: bool,
    },

    /// Delete a single backup and its artifact
    Delete {
        /// Backup id
        backup: String,
    },

    /// Run scheduled automatic backups if due (cron entry point)
    Auto,
}

/// Handle a backup command
pub fn handle_backup_command(
    engine: &Engine,
    settings: &Settings,
    cmd: BackupCommands,
) -> StockpileResult<()> {
    let actor = current_actor(settings);

    match cmd {
        BackupCommands::Create {
            format,
            include_audit,
            include_users,
            include_settings,
            all,
            encrypt,
            from,
            to,
            notes,
            detach,
        } => {
            let format = BackupFormat::parse(&format).ok_or_else(|| {
                StockpileError::Validation(format!(
                    "Unsupported format '{}' (expected csv, json, or sql)",
                    format
                ))
            })?;

            let scope = if all {
                BackupScope::everything()
            } else {
                BackupScope {
                    include_audit_logs: include_audit,
                    include_user_data: include_users,
                    include_settings,
                }
            };

            let passphrase = if encrypt {
                Some(prompt_new_passphrase()?)
            } else {
                None
            };

            let request = BackupRequest {
                format,
                scope,
                encrypt,
                passphrase,
                date_range_from: parse_date_arg(from.as_deref())?,
                date_range_to: parse_date_arg(to.as_deref())?,
                notes,
                created_by: actor,
            };

            if detach {
                let id = engine.backup.create_backup_detached(request)?;
                println!("Backup {} started in the background.", id);
                println!("Check progress with: stockpile backup info {}", id);
            } else {
                println!("Creating backup...");
                let record = engine.backup.create_backup(request)?;
                println!("Backup created: {}", record.filename);
                println!(
                    "  {} records, {}, checksum {}",
                    record.record_count(),
                    format_size(record.file_size()),
                    record.checksum().unwrap_or("-")
                );
            }
        }

        BackupCommands::List { verbose } => {
            let records = engine.backup.list_backups()?;

            if records.is_empty() {
                println!("No backups found.");
                println!("Create one with: stockpile backup create");
                return Ok(());
            }

            println!("Backups");
            println!("=======");
            println!();

            for (i, record) in records.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(record.created_at);

                if verbose {
                    println!(
                        "{}. {} [{}]\n   Type: {}  Format: {}  Scope: {}\n   \
                         Created: {} by {}\n   Size: {}  Records: {}  Validated: {}\n",
                        i + 1,
                        record.id,
                        record.status(),
                        record.backup_type,
                        record.format,
                        record.scope,
                        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        record.created_by,
                        format_size(record.file_size()),
                        record.record_count(),
                        if record.validated() { "yes" } else { "no" },
                    );
                } else {
                    println!(
                        "  {}. {} [{}] {} ({} ago, {})",
                        i + 1,
                        record.id,
                        record.status(),
                        record.format,
                        format_age(age),
                        format_size(record.file_size()),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", records.len());
        }

        BackupCommands::Info { backup } => {
            let record = resolve_backup(engine, &backup)?;

            println!("Backup Details");
            println!("==============");
            println!("Id:        {}", record.id);
            println!("File:      {}", record.storage_path.display());
            println!("Status:    {}", record.status());
            println!("Type:      {}", record.backup_type);
            println!("Format:    {}", record.format);
            println!("Scope:     {}", record.scope);
            println!("Encrypted: {}", if record.encrypted { "yes" } else { "no" });
            println!("Size:      {}", format_size(record.file_size()));
            println!("Records:   {}", record.record_count());
            println!("Checksum:  {}", record.checksum().unwrap_or("-"));
            println!(
                "Created:   {} by {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.created_by
            );
            match record.validated_at() {
                Some(at) => println!("Validated: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Validated: never"),
            }
            if !record.notes.is_empty() {
                println!("Notes:     {}", record.notes);
            }
        }

        BackupCommands::Verify { backup, deep } => {
            let record = resolve_backup(engine, &backup)?;

            let passphrase = if record.encrypted {
                Some(prompt_passphrase("Passphrase: ")?)
            } else {
                None
            };

            println!("Verifying {}...", record.id);
            let report = engine.verify.verify(
                record.id,
                &VerifyOptions {
                    restore_test: deep,
                    passphrase,
                    actor,
                },
            )?;

            println!();
            println!("  existence:          {}", check_mark(report.checks.existence));
            println!("  completeness:       {}", check_mark(report.checks.completeness));
            println!("  checksum match:     {}", check_mark(report.checks.checksum_match));
            println!("  format well-formed: {}", check_mark(report.checks.format_well_formed));
            if let Some(passed) = report.checks.restore_test_passed {
                println!("  restore dry run:    {}", check_mark(passed));
            }

            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            for error in &report.errors {
                println!("  error: {}", error);
            }

            println!();
            if report.valid {
                println!("Backup is valid.");
            } else {
                println!("Backup FAILED verification.");
            }
        }

        BackupCommands::Restore {
            backup,
            mode,
            force,
        } => {
            let record = resolve_backup(engine, &backup)?;

            let mode = RestoreMode::parse(&mode).ok_or_else(|| {
                StockpileError::Validation(format!(
                    "Unsupported mode '{}' (expected full, merge, or preview)",
                    mode
                ))
            })?;

            if mode.is_mutating() && !force {
                println!("WARNING: a {} restore overwrites live data!", mode);
                println!("A pre-restore safety backup will be taken first.");
                println!("To proceed, run again with --force:");
                println!("  stockpile backup restore {} --mode {} --force", backup, mode);
                return Ok(());
            }

            let passphrase = if record.encrypted {
                Some(prompt_passphrase("Passphrase: ")?)
            } else {
                None
            };

            println!("Restoring {} ({} mode)...", record.id, mode);
            let summary = engine.restore.restore(
                record.id,
                RestoreOptions {
                    mode,
                    passphrase,
                    confirmed: force,
                    actor,
                },
            )?;

            println!();
            if mode == RestoreMode::Preview {
                println!("Preview (no changes applied):");
            } else {
                println!("Restore complete in {} ms:", summary.duration_ms);
            }
            println!("  added:   {}", summary.items_added);
            println!("  updated: {}", summary.items_updated);
            println!("  skipped: {}", summary.items_skipped);
            if let Some(pre) = summary.pre_restore_backup_id {
                println!("  pre-restore backup: {}", pre);
            }
            for error in &summary.errors {
                println!("  error: {}", error);
            }
        }

        BackupCommands::Prune { force } => {
            if !force {
                let records = engine.backup.list_backups()?;
                let completed = records
                    .iter()
                    .filter(|r| r.status() == BackupStatus::Completed)
                    .count();
                println!(
                    "Retention policy: {} daily, {} weekly, {} monthly",
                    settings.retention.daily_count,
                    settings.retention.weekly_count,
                    settings.retention.monthly_count
                );
                println!("You have {} completed backup(s).", completed);
                println!("To apply the policy and delete old backups, run again with --force:");
                println!("  stockpile backup prune --force");
                return Ok(());
            }

            let outcome = engine.retention.apply_retention(&settings.retention, &actor)?;
            println!(
                "Pruned {} backup(s), kept {}.",
                outcome.pruned.len(),
                outcome.kept.len()
            );
        }

        BackupCommands::Delete { backup } => {
            let record = resolve_backup(engine, &backup)?;
            engine.backup.delete_backup(record.id, &actor)?;
            println!("Deleted backup {}.", record.id);
        }

        BackupCommands::Auto => {
            let scheduler = engine.scheduler(settings);
            let last_run = engine
                .backup
                .list_backups()?
                .into_iter()
                .find(|r| r.backup_type == crate::models::BackupType::Automatic)
                .map(|r| r.created_at);

            let records = scheduler.run_pending(chrono::Utc::now(), last_run)?;
            if records.is_empty() {
                println!("No automatic backup due.");
            } else {
                for record in records {
                    println!("Created automatic backup: {}", record.filename);
                }
            }
        }
    }

    Ok(())
}

/// Resolve a backup identifier to its record
///
/// Accepts 'latest', a full UUID, the short display id (bak-xxxxxxxx), or
/// an artifact filename.
fn resolve_backup(engine: &Engine, identifier: &str) -> StockpileResult<BackupRecord> {
    if identifier.eq_ignore_ascii_case("latest") {
        return engine
            .backup
            .list_backups()?
            .into_iter()
            .find(|r| r.status() == BackupStatus::Completed)
            .ok_or_else(|| StockpileError::backup_not_found("latest"));
    }

    if let Ok(id) = BackupId::parse(identifier) {
        return engine.backup.get_backup(id);
    }

    engine
        .backup
        .list_backups()?
        .into_iter()
        .find(|r| r.id.to_string() == identifier || r.filename == identifier)
        .ok_or_else(|| StockpileError::backup_not_found(identifier))
}

fn parse_date_arg(value: Option<&str>) -> StockpileResult<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                StockpileError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
            }),
    }
}

fn check_mark(passed: bool) -> &'static str {
    if passed {
        "ok"
    } else {
        "FAIL"
    }
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> StockpileResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| StockpileError::Encryption(format!("Failed to read passphrase: {}", e)))
}

/// Prompt for a new passphrase with confirmation
fn prompt_new_passphrase() -> StockpileResult<SecureString> {
    loop {
        let pass1 = prompt_passphrase("Enter passphrase: ")?;

        if pass1.len() < 8 {
            println!("Passphrase must be at least 8 characters. Please try again.");
            continue;
        }

        let pass2 = prompt_passphrase("Confirm passphrase: ")?;

        if pass1.as_str() != pass2.as_str() {
            println!("Passphrases do not match. Please try again.");
            continue;
        }

        return Ok(pass1);
    }
}
