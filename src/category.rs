//! Folder metadata keyed by `/`-separated paths

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Reserved path of the synthesized favorites bucket
pub const FAVORITES_PATH: &str = "favorites";
pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
}

impl Category {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            color: color.into(),
        }
    }
}

/// Parent of a category path, `None` for root paths
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR).map(|idx| &path[..idx])
}

/// Last segment of a path
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or(path)
}

/// Trim whitespace and drop empty segments (`" a//b/ "` → `"a/b"`)
pub fn normalize_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn is_reserved(path: &str) -> bool {
    path == FAVORITES_PATH
}

/// Category map that keeps insertion order, in memory and on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    entries: Vec<(String, Category)>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed folders used on first run and after a reset
    pub fn defaults() -> Self {
        let mut map = Self::new();
        map.insert(FAVORITES_PATH, Category::new("Preferiti", "⭐", "#f59e0b"));
        map.insert("linguaggi", Category::new("Linguaggi", "💻", "#3b82f6"));
        map.insert("linguaggi/java", Category::new("Java", "☕", "#f97316"));
        map.insert("linguaggi/python", Category::new("Python", "🐍", "#22c55e"));
        map.insert("productivity", Category::new("Productivity", "⚡", "#eab308"));
        map.insert("creative", Category::new("Creative", "🎨", "#ec4899"));
        map.insert("image-generation", Category::new("Image Generation", "🖼", "#8b5cf6"));
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Category> {
        self.entries
            .iter()
            .find(|(key, _)| key == path)
            .map(|(_, category)| category)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Category> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == path)
            .map(|(_, category)| category)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Insert or replace; a replaced entry keeps its position
    pub fn insert(&mut self, path: impl Into<String>, category: Category) -> Option<Category> {
        let path = path.into();
        match self.get_mut(&path) {
            Some(existing) => Some(std::mem::replace(existing, category)),
            None => {
                self.entries.push((path, category));
                None
            }
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<Category> {
        let idx = self.entries.iter().position(|(key, _)| key == path)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.entries
            .iter()
            .map(|(path, category)| (path.as_str(), category))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Merge another map in; incoming values win on collisions
    pub fn merge(&mut self, other: CategoryMap) {
        for (path, category) in other.entries {
            self.insert(path, category);
        }
    }

    /// Display name for a path, falling back to its last segment
    pub fn display_name(&self, path: &str) -> String {
        self.get(path)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| leaf_name(path).to_string())
    }
}

impl Serialize for CategoryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, category) in &self.entries {
            map.serialize_entry(path, category)?;
        }
        map.end()
    }
}

struct CategoryMapVisitor;

impl<'de> Visitor<'de> for CategoryMapVisitor {
    type Value = CategoryMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from category path to {name, icon, color}")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = CategoryMap::new();
        while let Some((path, category)) = access.next_entry::<String, Category>()? {
            map.insert(path, category);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for CategoryMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CategoryMapVisitor)
    }
}
