//! User settings persisted in their own slot
//!
//! Stored values override the defaults field by field; keys this version
//! does not know about are carried along untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::category::FAVORITES_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Title,
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_items_per_page() -> usize {
    50
}

fn default_expanded() -> Vec<String> {
    vec![FAVORITES_PATH.to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_true")]
    pub autosave: bool,
    #[serde(default = "default_true")]
    pub backup_enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    #[serde(default)]
    pub default_category: String,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_expanded")]
    pub expanded_nodes: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            autosave: true,
            backup_enabled: true,
            search_debounce_ms: default_debounce_ms(),
            items_per_page: default_items_per_page(),
            default_category: String::new(),
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            expanded_nodes: default_expanded(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Overlay a loose key/value object onto these settings
    ///
    /// Incoming keys win; anything that no longer parses leaves `self` as is.
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Self {
        let mut base = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return self.clone(),
        };
        if let serde_json::Value::Object(incoming) = overrides {
            for (key, value) in incoming {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(serde_json::Value::Object(base)).unwrap_or_else(|_| self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_overrides_merge_over_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"theme":"light","searchDebounceMs":500}"#).unwrap();

        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.search_debounce_ms, 500);
        assert!(settings.autosave);
        assert_eq!(settings.items_per_page, 50);
        assert_eq!(settings.expanded_nodes, vec!["favorites".to_string()]);
    }

    #[test]
    fn test_unknown_keys_are_kept() {
        let settings: Settings = serde_json::from_str(r#"{"fontSize":14}"#).unwrap();
        assert_eq!(settings.extra.get("fontSize"), Some(&json!(14)));

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["fontSize"], json!(14));
    }

    #[test]
    fn test_merged_with() {
        let base = Settings::default();
        let merged = base.merged_with(&json!({"theme": "light", "itemsPerPage": 10}));
        assert_eq!(merged.theme, Theme::Light);
        assert_eq!(merged.items_per_page, 10);

        let unchanged = base.merged_with(&json!({"itemsPerPage": "many"}));
        assert_eq!(unchanged, base);
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled().to_string(), "dark");
    }
}
