//! Category tree built from the flat record list
//!
//! [`PromptTree`] is the pure projection: one node per stored category with
//! parent/child links derived from the paths, plus the favorites and
//! uncategorized buckets. [`TreeView`] layers the interactive state on top
//! (expansion, selection, focus, filtering) and produces the rows a front end
//! draws.

use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::category::{self, CategoryMap, FAVORITES_PATH};
use crate::error::{Error, StoreError};
use crate::events::{AppEvent, EventBus};
use crate::kv::KeyValueStore;
use crate::record::PromptRecord;
use crate::settings::{Settings, SortField, SortOrder};
use crate::storage::{SaveStatus, Storage};

/// Expansion key of the uncategorized bucket
pub const UNCATEGORIZED_KEY: &str = "__uncategorized__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Favorites,
    Uncategorized,
}

impl Bucket {
    pub fn key(&self) -> &'static str {
        match self {
            Bucket::Favorites => FAVORITES_PATH,
            Bucket::Uncategorized => UNCATEGORIZED_KEY,
        }
    }
}

/// Anything a row can point at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Bucket(Bucket),
    Category(String),
    Record(String),
}

impl NodeRef {
    /// Key under which the node's expansion is remembered
    pub fn expansion_key(&self) -> Option<&str> {
        match self {
            NodeRef::Bucket(bucket) => Some(bucket.key()),
            NodeRef::Category(path) => Some(path),
            NodeRef::Record(_) => None,
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        match self {
            NodeRef::Record(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub path: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    /// Set only when the parent path is itself a stored category
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// Record ids, sorted by title
    pub items: Vec<String>,
}

/// Title order: case-insensitive first, raw text to break ties
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Order of records inside each folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordOrder {
    pub field: SortField,
    pub order: SortOrder,
}

impl RecordOrder {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            field: settings.sort_by,
            order: settings.sort_order,
        }
    }

    fn compare(&self, a: &PromptRecord, b: &PromptRecord) -> Ordering {
        let primary = match self.field {
            SortField::Title => Ordering::Equal,
            SortField::Created => a.created.cmp(&b.created),
            SortField::Modified => a.modified.cmp(&b.modified),
        };
        let ordering = primary.then_with(|| compare_titles(&a.title, &b.title));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

fn sort_items(items: &mut [String], records: &HashMap<&str, &PromptRecord>, order: RecordOrder) {
    items.sort_by(|a, b| match (records.get(a.as_str()), records.get(b.as_str())) {
        (Some(a), Some(b)) => order.compare(a, b),
        _ => a.cmp(b),
    });
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptTree {
    nodes: Vec<CategoryNode>,
    favorites: Vec<String>,
    uncategorized: Vec<String>,
}

impl PromptTree {
    /// Project with records in title order
    pub fn build(records: &[PromptRecord], categories: &CategoryMap) -> Self {
        Self::build_ordered(records, categories, RecordOrder::default())
    }

    pub fn build_ordered(
        records: &[PromptRecord],
        categories: &CategoryMap,
        order: RecordOrder,
    ) -> Self {
        let mut nodes: Vec<CategoryNode> = categories
            .iter()
            .filter(|(path, _)| !category::is_reserved(path))
            .map(|(path, meta)| CategoryNode {
                path: path.to_string(),
                name: meta.name.clone(),
                icon: meta.icon.clone(),
                color: meta.color.clone(),
                parent: None,
                children: Vec::new(),
                items: Vec::new(),
            })
            .collect();

        for idx in 0..nodes.len() {
            let Some(parent) = category::parent_path(&nodes[idx].path).map(str::to_string) else {
                continue;
            };
            if let Some(parent_idx) = nodes.iter().position(|n| n.path == parent) {
                let child = nodes[idx].path.clone();
                if !nodes[parent_idx].children.contains(&child) {
                    nodes[parent_idx].children.push(child);
                }
                nodes[idx].parent = Some(parent);
            }
        }

        let mut favorites = Vec::new();
        let mut uncategorized = Vec::new();
        for record in records {
            if record.favorite {
                favorites.push(record.id.clone());
            }
            let home = nodes
                .iter_mut()
                .find(|n| !record.category.is_empty() && n.path == record.category);
            match home {
                Some(node) => node.items.push(record.id.clone()),
                None if !record.favorite => uncategorized.push(record.id.clone()),
                None => {}
            }
        }

        let by_id: HashMap<&str, &PromptRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        sort_items(&mut favorites, &by_id, order);
        sort_items(&mut uncategorized, &by_id, order);
        for node in nodes.iter_mut() {
            sort_items(&mut node.items, &by_id, order);
        }

        Self {
            nodes,
            favorites,
            uncategorized,
        }
    }

    pub fn nodes(&self) -> &[CategoryNode] {
        &self.nodes
    }

    pub fn node(&self, path: &str) -> Option<&CategoryNode> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn uncategorized(&self) -> &[String] {
        &self.uncategorized
    }

    /// Every place a record shows up
    pub fn placements(&self, id: &str) -> Vec<NodeRef> {
        let mut found = Vec::new();
        if self.favorites.iter().any(|f| f == id) {
            found.push(NodeRef::Bucket(Bucket::Favorites));
        }
        for node in &self.nodes {
            if node.items.iter().any(|i| i == id) {
                found.push(NodeRef::Category(node.path.clone()));
            }
        }
        if self.uncategorized.iter().any(|u| u == id) {
            found.push(NodeRef::Bucket(Bucket::Uncategorized));
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub node: NodeRef,
    pub depth: usize,
    pub label: String,
    pub icon: String,
    /// Only meaningful for folders and buckets
    pub expanded: bool,
    pub selected: bool,
    pub favorite: bool,
    /// Visible records at or below this folder
    pub count: usize,
    /// Byte ranges of `label` matching the active filter
    pub highlights: Vec<Range<usize>>,
}

impl TreeRow {
    pub fn is_folder(&self) -> bool {
        !matches!(self.node, NodeRef::Record(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKey {
    Enter,
    Space,
    Left,
    Right,
    Up,
    Down,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeAction {
    None,
    FocusMoved,
    Selected(NodeRef),
    Expanded(String),
    Collapsed(String),
    /// Caller must confirm before deleting this record
    ConfirmDelete(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit,
    Duplicate,
    ToggleFavorite,
    Delete,
    NewPrompt,
    NewSubfolder,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub action: MenuAction,
    pub label: String,
    pub enabled: bool,
}

impl MenuItem {
    fn new(action: MenuAction, label: impl Into<String>, enabled: bool) -> Self {
        Self {
            action,
            label: label.into(),
            enabled,
        }
    }
}

#[derive(Debug, Clone)]
struct ItemInfo {
    title: String,
    icon: &'static str,
    favorite: bool,
}

#[derive(Debug, Clone)]
struct TreeFilter {
    query: String,
    pattern: Option<Regex>,
    matches: HashSet<String>,
    /// Folders the user closed while this filter is active; never persisted
    collapsed: HashSet<String>,
}

fn matching_ids(records: &[PromptRecord], query: &str) -> HashSet<String> {
    records
        .iter()
        .filter(|r| r.matches_query(query))
        .map(|r| r.id.clone())
        .collect()
}

/// Interactive state over a [`PromptTree`]
pub struct TreeView {
    tree: PromptTree,
    items: HashMap<String, ItemInfo>,
    favorites_label: String,
    favorites_icon: String,
    expanded: Vec<String>,
    selected: Option<NodeRef>,
    focus: usize,
    filter: Option<TreeFilter>,
    events: EventBus,
}

impl TreeView {
    pub fn new(events: EventBus) -> Self {
        Self {
            tree: PromptTree::default(),
            items: HashMap::new(),
            favorites_label: "Favorites".to_string(),
            favorites_icon: "⭐".to_string(),
            expanded: vec![FAVORITES_PATH.to_string()],
            selected: None,
            focus: 0,
            filter: None,
            events,
        }
    }

    /// Re-project from the current collections
    pub fn rebuild<S: KeyValueStore>(&mut self, storage: &Storage<S>) {
        let records = storage.records();
        self.tree = PromptTree::build_ordered(
            records,
            storage.categories(),
            RecordOrder::from_settings(storage.settings()),
        );
        self.items = records
            .iter()
            .map(|r| {
                (
                    r.id.clone(),
                    ItemInfo {
                        title: r.title.clone(),
                        icon: r.prompt_type.icon(),
                        favorite: r.favorite,
                    },
                )
            })
            .collect();
        if let Some(meta) = storage.categories().get(FAVORITES_PATH) {
            self.favorites_label = meta.name.clone();
            self.favorites_icon = meta.icon.clone();
        }
        self.expanded = storage.settings().expanded_nodes.clone();

        if let Some(filter) = self.filter.as_mut() {
            filter.matches = matching_ids(records, &filter.query);
        }

        let stale = match &self.selected {
            Some(NodeRef::Record(id)) => !self.items.contains_key(id),
            Some(NodeRef::Category(path)) => self.tree.node(path).is_none(),
            _ => false,
        };
        if stale {
            self.clear_selection();
        }
        self.clamp_focus();
    }

    pub fn tree(&self) -> &PromptTree {
        &self.tree
    }

    pub fn selected(&self) -> Option<&NodeRef> {
        self.selected.as_ref()
    }

    pub fn selected_record(&self) -> Option<&str> {
        self.selected.as_ref().and_then(NodeRef::record_id)
    }

    // ---- visibility ----------------------------------------------------

    fn record_visible(&self, id: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.matches.contains(id),
            None => true,
        }
    }

    fn visible_items<'a>(&'a self, ids: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
        ids.iter().filter(move |id| self.record_visible(id))
    }

    fn visible_count(&self, node: &CategoryNode) -> usize {
        let own = self.visible_items(&node.items).count();
        let nested: usize = node
            .children
            .iter()
            .filter_map(|child| self.tree.node(child))
            .map(|child| self.visible_count(child))
            .sum();
        own + nested
    }

    fn bucket_ids(&self, bucket: Bucket) -> &[String] {
        match bucket {
            Bucket::Favorites => self.tree.favorites(),
            Bucket::Uncategorized => self.tree.uncategorized(),
        }
    }

    fn is_expanded(&self, key: &str, visible: usize) -> bool {
        match &self.filter {
            Some(filter) if filter.collapsed.contains(key) => false,
            Some(_) => visible > 0 || self.expanded.iter().any(|e| e == key),
            None => self.expanded.iter().any(|e| e == key),
        }
    }

    /// Open or close a folder for the lifetime of the current filter only
    fn set_filter_expanded(&mut self, key: &str, expanded: bool) {
        if let Some(filter) = self.filter.as_mut() {
            if expanded {
                filter.collapsed.remove(key);
            } else {
                filter.collapsed.insert(key.to_string());
            }
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    pub fn filter_query(&self) -> Option<&str> {
        self.filter.as_ref().map(|f| f.query.as_str())
    }

    // ---- rows ----------------------------------------------------------

    fn record_row(&self, id: &str, depth: usize) -> Option<TreeRow> {
        let info = self.items.get(id)?;
        let highlights = self
            .filter
            .as_ref()
            .and_then(|f| f.pattern.as_ref())
            .map(|pattern| pattern.find_iter(&info.title).map(|m| m.range()).collect())
            .unwrap_or_default();
        let node = NodeRef::Record(id.to_string());
        Some(TreeRow {
            selected: self.selected.as_ref() == Some(&node),
            node,
            depth,
            label: info.title.clone(),
            icon: info.icon.to_string(),
            expanded: false,
            favorite: info.favorite,
            count: 0,
            highlights,
        })
    }

    fn push_bucket(&self, rows: &mut Vec<TreeRow>, bucket: Bucket) {
        let ids = self.bucket_ids(bucket);
        let visible = self.visible_items(ids).count();
        let shown = match bucket {
            Bucket::Favorites => self.filter.is_none() || visible > 0,
            Bucket::Uncategorized => visible > 0,
        };
        if !shown {
            return;
        }

        let node = NodeRef::Bucket(bucket);
        let expanded = self.is_expanded(bucket.key(), visible);
        let (label, icon) = match bucket {
            Bucket::Favorites => (self.favorites_label.clone(), self.favorites_icon.clone()),
            Bucket::Uncategorized => ("Uncategorized".to_string(), "📂".to_string()),
        };
        rows.push(TreeRow {
            selected: self.selected.as_ref() == Some(&node),
            node,
            depth: 0,
            label,
            icon,
            expanded,
            favorite: false,
            count: visible,
            highlights: Vec::new(),
        });
        if expanded {
            rows.extend(self.visible_items(ids).filter_map(|id| self.record_row(id, 1)));
        }
    }

    fn push_category(&self, rows: &mut Vec<TreeRow>, node: &CategoryNode, depth: usize) {
        let visible = self.visible_count(node);
        if self.filter.is_some() && visible == 0 {
            return;
        }

        let node_ref = NodeRef::Category(node.path.clone());
        let expanded = self.is_expanded(&node.path, visible);
        rows.push(TreeRow {
            selected: self.selected.as_ref() == Some(&node_ref),
            node: node_ref,
            depth,
            label: node.name.clone(),
            icon: node.icon.clone(),
            expanded,
            favorite: false,
            count: visible,
            highlights: Vec::new(),
        });
        if !expanded {
            return;
        }

        rows.extend(
            self.visible_items(&node.items)
                .filter_map(|id| self.record_row(id, depth + 1)),
        );
        for child in node.children.iter().filter_map(|c| self.tree.node(c)) {
            self.push_category(rows, child, depth + 1);
        }
    }

    /// Visible rows in document order
    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.push_bucket(&mut rows, Bucket::Favorites);
        for root in self.tree.roots() {
            self.push_category(&mut rows, root, 0);
        }
        self.push_bucket(&mut rows, Bucket::Uncategorized);
        rows
    }

    /// Whether any row currently shows this node
    pub fn is_visible(&self, node: &NodeRef) -> bool {
        self.rows().iter().any(|row| &row.node == node)
    }

    // ---- expansion -----------------------------------------------------

    fn set_expanded<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
        key: &str,
        expanded: bool,
    ) -> Result<SaveStatus, StoreError> {
        let status = storage.set_expanded(key, expanded)?;
        self.expanded = storage.settings().expanded_nodes.clone();
        Ok(status)
    }

    /// Flip a folder open or closed; returns the new state
    pub fn toggle<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
        key: &str,
    ) -> Result<bool, StoreError> {
        let expanded = !self.expanded.iter().any(|e| e == key);
        self.set_expanded(storage, key, expanded)?;
        Ok(expanded)
    }

    pub fn expand_all<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
    ) -> Result<SaveStatus, StoreError> {
        let mut keys = vec![FAVORITES_PATH.to_string()];
        keys.extend(self.tree.nodes().iter().map(|n| n.path.clone()));
        keys.push(UNCATEGORIZED_KEY.to_string());
        let status = storage.update_settings(|s| s.expanded_nodes = keys)?;
        self.expanded = storage.settings().expanded_nodes.clone();
        Ok(status)
    }

    /// Close every folder; favorites stays open
    pub fn collapse_all<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
    ) -> Result<SaveStatus, StoreError> {
        let status =
            storage.update_settings(|s| s.expanded_nodes = vec![FAVORITES_PATH.to_string()])?;
        self.expanded = storage.settings().expanded_nodes.clone();
        Ok(status)
    }

    // ---- selection and focus -------------------------------------------

    pub fn select(&mut self, node: NodeRef) {
        match &node {
            NodeRef::Record(id) => self.events.emit(AppEvent::RecordSelected(id.clone())),
            NodeRef::Category(path) => self.events.emit(AppEvent::CategorySelected(path.clone())),
            NodeRef::Bucket(bucket) => self
                .events
                .emit(AppEvent::CategorySelected(bucket.key().to_string())),
        }
        self.focus_node(&node);
        self.selected = Some(node);
    }

    pub fn clear_selection(&mut self) {
        if let Some(NodeRef::Record(_)) = self.selected.take() {
            self.events.emit(AppEvent::RecordDeselected);
        }
    }

    /// Drop the selection if it points at a record that no longer exists
    pub fn forget_record(&mut self, id: &str) {
        if self.selected_record() == Some(id) {
            self.clear_selection();
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused_row(&self) -> Option<TreeRow> {
        self.rows().into_iter().nth(self.focus)
    }

    /// Move focus to the first row showing `node`, if any
    pub fn focus_node(&mut self, node: &NodeRef) {
        if let Some(idx) = self.rows().iter().position(|row| &row.node == node) {
            self.focus = idx;
        }
    }

    fn clamp_focus(&mut self) {
        let len = self.rows().len();
        if self.focus >= len {
            self.focus = len.saturating_sub(1);
        }
    }

    pub fn handle_key<S: KeyValueStore>(
        &mut self,
        key: TreeKey,
        storage: &mut Storage<S>,
    ) -> Result<TreeAction, StoreError> {
        let rows = self.rows();
        let Some(row) = rows.get(self.focus).cloned() else {
            return Ok(TreeAction::None);
        };

        let action = match key {
            TreeKey::Up if self.focus > 0 => {
                self.focus -= 1;
                TreeAction::FocusMoved
            }
            TreeKey::Down if self.focus + 1 < rows.len() => {
                self.focus += 1;
                TreeAction::FocusMoved
            }
            TreeKey::Up | TreeKey::Down => TreeAction::None,
            TreeKey::Enter | TreeKey::Space => {
                self.select(row.node.clone());
                TreeAction::Selected(row.node)
            }
            TreeKey::Right if row.is_folder() && !row.expanded => {
                let key = row.node.expansion_key().unwrap_or_default().to_string();
                if self.filter.is_some() {
                    self.set_filter_expanded(&key, true);
                } else {
                    self.set_expanded(storage, &key, true)?;
                }
                TreeAction::Expanded(key)
            }
            TreeKey::Left if row.is_folder() && row.expanded => {
                let key = row.node.expansion_key().unwrap_or_default().to_string();
                if self.filter.is_some() {
                    self.set_filter_expanded(&key, false);
                } else {
                    self.set_expanded(storage, &key, false)?;
                }
                TreeAction::Collapsed(key)
            }
            TreeKey::Left | TreeKey::Right => TreeAction::None,
            TreeKey::Delete => match row.node {
                NodeRef::Record(id) => TreeAction::ConfirmDelete(id),
                _ => TreeAction::None,
            },
        };
        Ok(action)
    }

    // ---- drag and drop -------------------------------------------------

    pub fn can_drag(&self, node: &NodeRef) -> bool {
        matches!(node, NodeRef::Record(id) if self.items.contains_key(id))
    }

    /// Only stored folders accept drops; the buckets are derived
    pub fn can_drop(&self, target: &NodeRef) -> bool {
        matches!(target, NodeRef::Category(path) if self.tree.node(path).is_some())
    }

    /// Re-file a dragged record; false when the drop is not accepted
    pub fn drop_record<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
        id: &str,
        target: &NodeRef,
    ) -> Result<bool, Error> {
        let NodeRef::Category(path) = target else {
            return Ok(false);
        };
        if !self.can_drop(target) || !self.can_drag(&NodeRef::Record(id.to_string())) {
            return Ok(false);
        }
        if storage.record(id).map(|r| r.category.as_str()) == Some(path.as_str()) {
            return Ok(false);
        }

        storage.move_record(id, path)?;
        self.events.emit(AppEvent::RecordMoved {
            id: id.to_string(),
            category: path.clone(),
        });
        self.rebuild(storage);
        Ok(true)
    }

    // ---- context menu --------------------------------------------------

    /// Select the node, then list what can be done with it
    pub fn context_menu(&mut self, node: NodeRef) -> Vec<MenuItem> {
        self.select(node.clone());
        match &node {
            NodeRef::Record(id) => {
                let favorite = self.items.get(id).map(|i| i.favorite).unwrap_or(false);
                vec![
                    MenuItem::new(MenuAction::Edit, "Edit", true),
                    MenuItem::new(MenuAction::Duplicate, "Duplicate", true),
                    MenuItem::new(
                        MenuAction::ToggleFavorite,
                        if favorite {
                            "Remove from favorites"
                        } else {
                            "Add to favorites"
                        },
                        true,
                    ),
                    MenuItem::new(MenuAction::Delete, "Delete", true),
                ]
            }
            NodeRef::Category(_) => vec![
                MenuItem::new(MenuAction::NewPrompt, "New prompt here", true),
                MenuItem::new(MenuAction::NewSubfolder, "New subfolder", true),
                MenuItem::new(MenuAction::Rename, "Rename", true),
            ],
            NodeRef::Bucket(Bucket::Favorites) => vec![
                MenuItem::new(MenuAction::NewPrompt, "New favorite prompt", true),
                MenuItem::new(MenuAction::NewSubfolder, "New subfolder", false),
                MenuItem::new(MenuAction::Rename, "Rename", false),
            ],
            NodeRef::Bucket(Bucket::Uncategorized) => {
                vec![MenuItem::new(MenuAction::NewPrompt, "New prompt", true)]
            }
        }
    }

    // ---- filtering -----------------------------------------------------

    /// Show only records matching `query`; returns how many matched
    pub fn apply_filter<S: KeyValueStore>(&mut self, storage: &Storage<S>, query: &str) -> usize {
        let query = query.trim();
        if query.is_empty() {
            self.clear_filter();
            return storage.records().len();
        }

        let matches = matching_ids(storage.records(), query);
        let count = matches.len();
        self.filter = Some(TreeFilter {
            query: query.to_string(),
            pattern: RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
                .ok(),
            matches,
            collapsed: HashSet::new(),
        });
        self.focus = 0;
        count
    }

    pub fn clear_filter(&mut self) {
        if self.filter.take().is_some() {
            self.clamp_focus();
        }
    }
}
