//! Recent search queries
//!
//! Most recent first, without duplicates, bounded. The list itself is plain
//! data; [`crate::storage::Storage`] owns the slot it is persisted in.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHistory {
    entries: Vec<String>,
    #[serde(skip, default = "default_cap")]
    max_entries: usize,
}

fn default_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAP)
    }
}

impl SearchHistory {
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Remember a query; returns false when there was nothing to record
    pub fn record(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }

        self.entries.retain(|existing| existing != query);
        self.entries.insert(0, query.to_string());

        if self.entries.len() > self.max_entries {
            self.entries.truncate(self.max_entries);
        }
        true
    }

    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &str> {
        self.entries.iter().take(limit).map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    /// Earlier queries starting with `prefix`, for completion
    pub fn suggestions(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.to_lowercase().starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    /// Re-apply the cap after loading entries written with a larger one
    pub fn set_capacity(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
        self.entries.truncate(max_entries);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_tracking() {
        let mut history = SearchHistory::default();
        assert!(history.record("java"));
        assert!(history.record("python"));
        assert!(history.record("java"));
        assert!(!history.record("   "));

        assert_eq!(history.entries(), &["java".to_string(), "python".to_string()]);
        assert_eq!(history.last(), Some("java"));
    }

    #[test]
    fn test_history_cap() {
        let mut history = SearchHistory::default();
        for i in 0..15 {
            history.record(&format!("query {}", i));
        }
        assert_eq!(history.len(), DEFAULT_HISTORY_CAP);
        assert_eq!(history.last(), Some("query 14"));
        assert_eq!(history.recent(2).collect::<Vec<_>>(), vec!["query 14", "query 13"]);
    }

    #[test]
    fn test_history_suggestions() {
        let mut history = SearchHistory::default();
        history.record("Java streams");
        history.record("python");
        history.record("javascript");

        assert_eq!(history.suggestions("ja"), vec!["javascript", "Java streams"]);
    }

    #[test]
    fn test_history_serializes_as_plain_list() {
        let mut history = SearchHistory::default();
        history.record("a");
        history.record("b");

        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"["b","a"]"#);

        let back: SearchHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
