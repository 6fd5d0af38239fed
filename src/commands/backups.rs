use anyhow::Result;
use chrono::Local;
use colored::*;
use std::time::Instant;

use super::common::{confirm, elapsed_ms, warn_if_dropped};
use crate::kv::KeyValueStore;
use crate::storage::Storage;

pub fn handle_backup_create<S: KeyValueStore>(
    storage: &mut Storage<S>,
    start: Instant,
) -> Result<()> {
    let status = storage.create_backup()?;
    if status.is_saved() {
        println!(
            "✓ Backup of {} prompts created ({}ms)",
            storage.records().len(),
            elapsed_ms(start)
        );
    } else {
        warn_if_dropped(status);
    }
    Ok(())
}

pub fn handle_backup_list<S: KeyValueStore>(storage: &Storage<S>) -> Result<()> {
    let backups = storage.backups();
    if backups.is_empty() {
        println!("No backups yet");
        println!("Create one with: {}", "pshelf backup create".cyan());
        return Ok(());
    }

    println!("💾 Backups (newest first)\n");
    for backup in backups {
        println!(
            "  {:>2}. {}  {}",
            backup.index + 1,
            backup
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            format!("{} prompts", backup.records).dimmed()
        );
    }
    println!(
        "\nRestore with: {}",
        "pshelf backup restore <number>".cyan()
    );
    Ok(())
}

/// `number` is 1-based, as printed by `backup list`
pub fn handle_backup_restore<S: KeyValueStore>(
    storage: &mut Storage<S>,
    number: usize,
    yes: bool,
    start: Instant,
) -> Result<()> {
    let count = storage.backups().len();
    if number == 0 || number > count {
        anyhow::bail!(
            "There is no backup #{} ({} available, see 'pshelf backup list')",
            number,
            count
        );
    }

    if !yes && !confirm(&format!("Replace current data with backup #{}?", number))? {
        println!("Restore cancelled");
        return Ok(());
    }

    if storage.restore_from_backup(number - 1)? {
        println!(
            "✓ Restored backup #{}: {} prompts ({}ms)",
            number,
            storage.records().len(),
            elapsed_ms(start)
        );
    } else {
        anyhow::bail!("Backup #{} could not be restored", number);
    }
    Ok(())
}
