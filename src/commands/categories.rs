// Folder commands: category add | rename | ls

use anyhow::Result;
use colored::*;
use std::time::Instant;

use super::common::{elapsed_ms, warn_if_dropped};
use crate::category;
use crate::kv::KeyValueStore;
use crate::storage::Storage;

pub fn handle_category_add<S: KeyValueStore>(
    storage: &mut Storage<S>,
    path: &str,
    name: Option<&str>,
    icon: Option<&str>,
    color: Option<&str>,
    start: Instant,
) -> Result<()> {
    let stored = storage.add_category(path, name, icon, color)?;
    println!(
        "✓ Created folder {} ({}ms)",
        storage.categories().display_name(&stored).bold(),
        elapsed_ms(start)
    );
    Ok(())
}

pub fn handle_category_rename<S: KeyValueStore>(
    storage: &mut Storage<S>,
    path: &str,
    name: &str,
    start: Instant,
) -> Result<()> {
    let path = category::normalize_path(path);
    let status = storage.rename_category(&path, name)?;
    warn_if_dropped(status);
    println!(
        "✓ {} is now called {} ({}ms)",
        path,
        name.trim().bold(),
        elapsed_ms(start)
    );
    Ok(())
}

/// Folders sorted by path, with how many prompts sit directly in each
pub fn category_rows<S: KeyValueStore>(storage: &Storage<S>) -> Vec<(String, String, usize)> {
    let mut rows: Vec<(String, String, usize)> = storage
        .categories()
        .iter()
        .map(|(path, meta)| {
            let count = if category::is_reserved(path) {
                storage.favorites().len()
            } else {
                storage.records().iter().filter(|r| r.category == path).count()
            };
            (path.to_string(), format!("{} {}", meta.icon, meta.name), count)
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

pub fn handle_category_ls<S: KeyValueStore>(storage: &Storage<S>) -> Result<()> {
    println!("📁 Folders\n");
    for (path, label, count) in category_rows(storage) {
        let depth = path.matches(category::PATH_SEPARATOR).count();
        println!(
            "  {}{:<28} {:<24} {}",
            "  ".repeat(depth),
            label,
            path.dimmed(),
            count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::common::fixtures;
    use super::*;

    #[test]
    fn test_add_rename_and_count() {
        let mut storage = fixtures::storage();
        handle_category_add(&mut storage, "linguaggi/rust", None, Some("🦀"), None, Instant::now())
            .unwrap();
        fixtures::add(&mut storage, "Borrow checker", "linguaggi/rust");

        handle_category_rename(&mut storage, "linguaggi/rust/", "Rust", Instant::now()).unwrap();
        assert_eq!(storage.categories().get("linguaggi/rust").unwrap().name, "Rust");

        let rows = category_rows(&storage);
        let rust = rows.iter().find(|(path, _, _)| path == "linguaggi/rust").unwrap();
        assert_eq!(rust.1, "🦀 Rust");
        assert_eq!(rust.2, 1);
    }

    #[test]
    fn test_duplicate_folder_is_rejected() {
        let mut storage = fixtures::storage();
        assert!(
            handle_category_add(&mut storage, "creative", None, None, None, Instant::now()).is_err()
        );
    }
}
