// Listing and search commands: ls, find, history

use anyhow::Result;
use colored::*;
use std::collections::HashSet;
use std::time::Instant;

use super::common::elapsed_ms;
use crate::kv::KeyValueStore;
use crate::record::PromptRecord;
use crate::search;
use crate::storage::Storage;
use crate::tree::{CategoryNode, PromptTree, RecordOrder};

const SUMMARY_CHARS: usize = 60;

/// Render the folder tree as indented text lines
///
/// With a filter only matching prompts are listed, and folders that end up
/// empty are left out.
pub fn tree_lines<S: KeyValueStore>(
    storage: &Storage<S>,
    filter: Option<&str>,
    folders_only: bool,
) -> Vec<String> {
    let tree = PromptTree::build_ordered(
        storage.records(),
        storage.categories(),
        RecordOrder::from_settings(storage.settings()),
    );
    let visible: Option<HashSet<&str>> = filter.map(|q| {
        storage
            .records()
            .iter()
            .filter(|r| r.matches_query(q))
            .map(|r| r.id.as_str())
            .collect()
    });
    let shown = |id: &String| visible.as_ref().map_or(true, |v| v.contains(id.as_str()));

    let mut printer = TreePrinter {
        storage,
        tree: &tree,
        shown: &shown,
        folders_only,
        filtered: filter.is_some(),
        lines: Vec::new(),
    };

    let favorites: Vec<&String> = tree.favorites().iter().filter(|id| shown(*id)).collect();
    if !favorites.is_empty() || !printer.filtered {
        let name = storage.categories().display_name(crate::category::FAVORITES_PATH);
        printer.folder_line(0, "⭐", &name, favorites.len());
        printer.items(1, favorites);
    }

    for root in tree.roots() {
        printer.category(root, 0);
    }

    let loose: Vec<&String> = tree.uncategorized().iter().filter(|id| shown(*id)).collect();
    if !loose.is_empty() {
        printer.folder_line(0, "📂", "Uncategorized", loose.len());
        printer.items(1, loose);
    }

    printer.lines
}

struct TreePrinter<'a, S: KeyValueStore, F: Fn(&String) -> bool> {
    storage: &'a Storage<S>,
    tree: &'a PromptTree,
    shown: &'a F,
    folders_only: bool,
    filtered: bool,
    lines: Vec<String>,
}

impl<'a, S: KeyValueStore, F: Fn(&String) -> bool> TreePrinter<'a, S, F> {
    fn folder_line(&mut self, depth: usize, icon: &str, name: &str, count: usize) {
        self.lines.push(format!(
            "{}{} {} {}",
            "  ".repeat(depth),
            icon,
            name.bold(),
            format!("({})", count).dimmed()
        ));
    }

    fn items(&mut self, depth: usize, ids: Vec<&String>) {
        if self.folders_only {
            return;
        }
        for id in ids {
            if let Some(record) = self.storage.record(id) {
                self.lines.push(record_line(record, depth));
            }
        }
    }

    /// Prompts under a node and all of its descendants that pass the filter
    fn subtree_count(&self, node: &CategoryNode) -> usize {
        let own = node.items.iter().filter(|id| (self.shown)(*id)).count();
        own + node
            .children
            .iter()
            .filter_map(|child| self.tree.node(child))
            .map(|child| self.subtree_count(child))
            .sum::<usize>()
    }

    fn category(&mut self, node: &CategoryNode, depth: usize) {
        let count = self.subtree_count(node);
        if self.filtered && count == 0 {
            return;
        }
        self.folder_line(depth, &node.icon, &node.name, count);

        for child in &node.children {
            if let Some(child) = self.tree.node(child) {
                self.category(child, depth + 1);
            }
        }
        let items: Vec<&String> = node.items.iter().filter(|id| (self.shown)(*id)).collect();
        self.items(depth + 1, items);
    }
}

fn record_line(record: &PromptRecord, depth: usize) -> String {
    let star = if record.favorite { " ★".yellow().to_string() } else { String::new() };
    format!(
        "{}{} {}{}  {}",
        "  ".repeat(depth),
        record.prompt_type.icon(),
        record.title,
        star,
        record.summary(SUMMARY_CHARS).dimmed()
    )
}

pub fn handle_ls<S: KeyValueStore>(
    storage: &Storage<S>,
    filter: Option<&str>,
    folders_only: bool,
    start: Instant,
) -> Result<()> {
    if storage.records().is_empty() && !folders_only {
        println!("No prompts yet");
        println!("Create one with: {}", "pshelf new \"My prompt\" --body \"...\"".cyan());
        return Ok(());
    }

    let lines = tree_lines(storage, filter, folders_only);
    if lines.is_empty() {
        println!("Nothing matches '{}'", filter.unwrap_or_default());
        return Ok(());
    }
    for line in lines {
        println!("{}", line);
    }
    println!(
        "\n{} prompts ({}ms)",
        storage.records().len(),
        elapsed_ms(start)
    );
    Ok(())
}

/// Explicit `--limit`, otherwise the page size from settings
fn result_limit<S: KeyValueStore>(storage: &Storage<S>, limit: Option<usize>) -> usize {
    limit.unwrap_or(storage.settings().items_per_page).max(1)
}

pub fn handle_find<S: KeyValueStore>(
    storage: &mut Storage<S>,
    query: &str,
    limit: Option<usize>,
    start: Instant,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("Search query is empty");
    }

    let limit = result_limit(storage, limit);
    let hits = search::rank(storage.records(), query);
    storage.record_search(query)?;

    if hits.is_empty() {
        println!("No prompts match '{}'", query);
        return Ok(());
    }

    println!("🔍 {} results for '{}'\n", hits.len(), query.bold());
    for id in hits.iter().take(limit) {
        if let Some(record) = storage.record(id) {
            let folder = if record.category.is_empty() {
                String::new()
            } else {
                format!(
                    "  {}",
                    storage.categories().display_name(&record.category).dimmed()
                )
            };
            println!("{}{}", record_line(record, 1), folder);
        }
    }
    if hits.len() > limit {
        println!("  {}", format!("... and {} more", hits.len() - limit).dimmed());
    }
    println!("\n({}ms)", elapsed_ms(start));
    Ok(())
}

pub fn handle_history<S: KeyValueStore>(storage: &mut Storage<S>, clear: bool) -> Result<()> {
    if clear {
        storage.clear_search_history()?;
        println!("✓ Search history cleared");
        return Ok(());
    }

    let history = storage.search_history();
    if history.is_empty() {
        println!("No recent searches");
        return Ok(());
    }
    println!("🕘 Recent searches\n");
    for (idx, query) in history.recent(history.len()).enumerate() {
        println!("  {:>2}. {}", idx + 1, query);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::common::fixtures;
    use super::*;

    fn plain(lines: Vec<String>) -> Vec<String> {
        lines.into_iter().map(|l| l.trim_end().to_string()).collect()
    }

    #[test]
    fn test_tree_lines_nest_folders() {
        colored::control::set_override(false);
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "Java Review", "linguaggi/java");
        fixtures::add(&mut storage, "Loose", "");

        let lines = plain(tree_lines(&storage, None, false));
        let java = lines.iter().position(|l| l.contains("Java (1)")).unwrap();
        let languages = lines.iter().position(|l| l.contains("Linguaggi (1)")).unwrap();
        assert!(languages < java);
        assert!(lines[java + 1].starts_with("    "));
        assert!(lines[java + 1].contains("Java Review"));
        assert!(lines.iter().any(|l| l.contains("Uncategorized (1)")));
    }

    #[test]
    fn test_tree_lines_filter_drops_empty_folders() {
        colored::control::set_override(false);
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "Java Review", "linguaggi/java");
        fixtures::add(&mut storage, "Recruiter", "productivity");

        let lines = plain(tree_lines(&storage, Some("recruit"), false));
        assert!(lines.iter().any(|l| l.contains("Recruiter")));
        assert!(!lines.iter().any(|l| l.contains("Linguaggi")));
        assert!(!lines.iter().any(|l| l.contains("Java Review")));
    }

    #[test]
    fn test_find_records_history() {
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "Recruiter", "");

        handle_find(&mut storage, "recruit", Some(10), Instant::now()).unwrap();
        handle_find(&mut storage, "nothing here", None, Instant::now()).unwrap();
        let history = storage.search_history();
        assert_eq!(history.last(), Some("nothing here"));
        assert_eq!(history.len(), 2);

        handle_history(&mut storage, true).unwrap();
        assert!(storage.search_history().is_empty());
    }

    #[test]
    fn test_result_limit_falls_back_to_page_size() {
        let mut storage = fixtures::storage();
        assert_eq!(result_limit(&storage, None), 50);
        assert_eq!(result_limit(&storage, Some(5)), 5);

        storage.update_settings(|s| s.items_per_page = 7).unwrap();
        assert_eq!(result_limit(&storage, None), 7);
        assert_eq!(result_limit(&storage, Some(0)), 1);
    }
}
