// Stats, theme and reset

use anyhow::Result;
use colored::*;
use std::collections::BTreeMap;
use std::time::Instant;

use super::common::{confirm, elapsed_ms, warn_if_dropped};
use crate::kv::KeyValueStore;
use crate::settings::Theme;
use crate::storage::Storage;

fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KB * KB {
        format!("{:.1} MB", bytes / (KB * KB))
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

pub fn handle_stats<S: KeyValueStore>(storage: &Storage<S>, start: Instant) -> Result<()> {
    let stats = storage.stats()?;

    println!("📊 {}\n", "PromptShelf statistics".bold());
    println!("  {:<14} {}", "Prompts:", stats.records.to_string().bold());
    println!("  {:<14} {}", "Favorites:", stats.favorites);
    println!("  {:<14} {}", "Folders:", stats.categories);
    println!("  {:<14} {}", "Backups:", stats.backups);

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for record in storage.records() {
        *by_type.entry(record.type_label()).or_default() += 1;
    }
    if !by_type.is_empty() {
        println!("\n  {}", "By type".dimmed());
        for (label, count) in by_type {
            println!("    {:<18} {}", label, count);
        }
    }

    let percent = stats.usage.percent_used();
    let usage = format!(
        "{} of {} ({:.1}%)",
        format_bytes(stats.usage.used_bytes),
        format_bytes(stats.usage.quota_bytes),
        percent
    );
    let usage = if percent >= 90.0 {
        usage.red().to_string()
    } else if percent >= 70.0 {
        usage.yellow().to_string()
    } else {
        usage.green().to_string()
    };
    println!("\n  {:<14} {}", "Storage:", usage);
    println!("\n({}ms)", elapsed_ms(start));
    Ok(())
}

/// Theme after applying a `theme` argument
pub fn next_theme(current: Theme, value: &str) -> Result<Theme> {
    match value.trim().to_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        "toggle" => Ok(current.toggled()),
        other => anyhow::bail!("Unknown theme '{}' (expected light, dark or toggle)", other),
    }
}

pub fn handle_theme<S: KeyValueStore>(storage: &mut Storage<S>, value: Option<&str>) -> Result<()> {
    let current = storage.settings().theme;
    let Some(value) = value else {
        println!("Theme: {}", current.to_string().bold());
        return Ok(());
    };

    let theme = next_theme(current, value)?;
    let status = storage.update_settings(|settings| settings.theme = theme)?;
    warn_if_dropped(status);
    println!("✓ Theme set to {}", theme.to_string().bold());
    Ok(())
}

pub fn handle_reset<S: KeyValueStore>(
    storage: &mut Storage<S>,
    drop_backups: bool,
    yes: bool,
    start: Instant,
) -> Result<()> {
    if !yes {
        println!(
            "{}",
            format!(
                "This deletes all {} prompts and your folders.",
                storage.records().len()
            )
            .yellow()
        );
        if drop_backups {
            println!("{}", "Backups will be deleted too.".red().bold());
        }
        if !confirm("Continue?")? {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let status = storage.clear_all(drop_backups)?;
    warn_if_dropped(status);
    println!("✓ All data cleared ({}ms)", elapsed_ms(start));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::common::fixtures;
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_theme_argument() {
        assert_eq!(next_theme(Theme::Dark, "toggle").unwrap(), Theme::Light);
        assert_eq!(next_theme(Theme::Dark, "LIGHT").unwrap(), Theme::Light);
        assert!(next_theme(Theme::Dark, "blue").is_err());

        let mut storage = fixtures::storage();
        handle_theme(&mut storage, Some("light")).unwrap();
        assert_eq!(storage.settings().theme, Theme::Light);
    }

    #[test]
    fn test_reset_keeps_backups_by_default() {
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "Recruiter", "");
        storage.create_backup().unwrap();

        handle_reset(&mut storage, false, true, Instant::now()).unwrap();
        assert!(storage.records().is_empty());
        assert_eq!(storage.backups().len(), 1);

        handle_reset(&mut storage, true, true, Instant::now()).unwrap();
        assert!(storage.backups().is_empty());
    }
}
