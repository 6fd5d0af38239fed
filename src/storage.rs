//! Persistence layer for prompts, categories, favorites and settings
//!
//! [`Storage`] is the single owner of the canonical collections. Every other
//! component holds ids and view state only and mutates through the methods
//! here, which write the affected slots back to the underlying
//! [`KeyValueStore`] right away.
//!
//! Each collection lives in its own slot so that a damaged one can be told
//! apart from the rest. Backups are full snapshots kept newest first in a
//! separate slot, and are the first thing given up when the store runs out
//! of space.

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::category::{self, Category, CategoryMap, FAVORITES_PATH};
use crate::error::{Error, ParseError, StoreError};
use crate::events::{AppEvent, EventBus, Severity};
use crate::history::{SearchHistory, DEFAULT_HISTORY_CAP};
use crate::kv::{KeyValueStore, StoreUsage};
use crate::record::{PromptRecord, PromptUpdate};
use crate::settings::Settings;

pub const PROMPTS_KEY: &str = "prompt_manager_prompts";
pub const CATEGORIES_KEY: &str = "prompt_manager_categories";
pub const FAVORITES_KEY: &str = "prompt_manager_favorites";
pub const SETTINGS_KEY: &str = "prompt_manager_settings";
pub const BACKUPS_KEY: &str = "prompt_manager_backups";
pub const SEARCH_HISTORY_KEY: &str = "prompt_manager_search_history";

/// Slots whose external change means the collections must be reloaded
const DATA_KEYS: [&str; 4] = [PROMPTS_KEY, CATEGORIES_KEY, FAVORITES_KEY, SETTINGS_KEY];

pub const EXPORT_FORMAT_VERSION: &str = "1.0";
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Icon given to folders created implicitly as ancestors of a new path
const FOLDER_ICON: &str = "📁";

/// Result of a write that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    /// The store was full; backups were evicted and the write was dropped
    QuotaWarning,
}

impl SaveStatus {
    /// Combine the outcome of several writes
    pub fn and(self, other: SaveStatus) -> SaveStatus {
        if self == SaveStatus::QuotaWarning || other == SaveStatus::QuotaWarning {
            SaveStatus::QuotaWarning
        } else {
            SaveStatus::Saved
        }
    }

    pub fn is_saved(&self) -> bool {
        *self == SaveStatus::Saved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    RestoredFromBackup,
    ResetToDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub outcome: LoadOutcome,
    /// No prompts slot existed before this load
    pub first_run: bool,
    pub skipped_records: usize,
}

/// Full copy of the persisted collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub prompts: Vec<PromptRecord>,
    pub categories: CategoryMap,
    pub favorites: Vec<String>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }

    /// Guess from a file name, `None` when the extension says nothing
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(format!("unknown format '{}' (expected json or yaml)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub status: SaveStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageStats {
    pub records: usize,
    pub categories: usize,
    pub favorites: usize,
    pub backups: usize,
    pub usage: StoreUsage,
}

/// Borrowed shape of an export document
#[derive(Serialize)]
struct ExportDocument<'a> {
    version: &'a str,
    exported: String,
    prompts: &'a [PromptRecord],
    categories: &'a CategoryMap,
    favorites: &'a [String],
    settings: &'a Settings,
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })
}

/// Parse an import document, trying JSON first when no format is given
pub fn parse_document(
    text: &str,
    format: Option<ExportFormat>,
) -> Result<serde_json::Value, ParseError> {
    match format {
        Some(ExportFormat::Json) => Ok(serde_json::from_str(text)?),
        Some(ExportFormat::Yaml) => Ok(serde_yaml::from_str(text)?),
        None => match serde_json::from_str(text) {
            Ok(value) => Ok(value),
            Err(json) => serde_yaml::from_str(text).map_err(|yaml| ParseError::Unrecognized {
                json: json.to_string(),
                yaml: yaml.to_string(),
            }),
        },
    }
}

/// Collections as read from the slots, before they are adopted
struct Loaded {
    snapshot: Snapshot,
    first_run: bool,
    skipped: usize,
}

pub struct Storage<S: KeyValueStore> {
    store: S,
    records: Vec<PromptRecord>,
    categories: CategoryMap,
    favorites: Vec<String>,
    settings: Settings,
    events: EventBus,
    max_backups: usize,
    history_cap: usize,
}

impl<S: KeyValueStore> Storage<S> {
    /// Wrap a store; collections start at factory defaults until [`Storage::load`]
    pub fn new(store: S, events: EventBus) -> Self {
        Self {
            store,
            records: Vec::new(),
            categories: CategoryMap::defaults(),
            favorites: Vec::new(),
            settings: Settings::default(),
            events,
            max_backups: DEFAULT_MAX_BACKUPS,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }

    pub fn with_limits(mut self, max_backups: usize, history_cap: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self.history_cap = history_cap.max(1);
        self
    }

    pub fn records(&self) -> &[PromptRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&PromptRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.record(id).is_some()
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|f| f == id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            prompts: self.records.clone(),
            categories: self.categories.clone(),
            favorites: self.favorites.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Find a record by id, exact title, or fuzzy title match
    pub fn resolve(&self, query: &str) -> Result<&PromptRecord, Error> {
        let query = query.trim();
        if let Some(record) = self.record(query) {
            return Ok(record);
        }
        if let Some(record) = self
            .records
            .iter()
            .find(|r| r.title.eq_ignore_ascii_case(query))
        {
            return Ok(record);
        }

        let matcher = SkimMatcherV2::default();
        let mut best: Option<(&PromptRecord, i64)> = None;
        for record in &self.records {
            if let Some(score) = matcher.fuzzy_match(&record.title, query) {
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((record, score));
                }
            }
        }

        best.map(|(record, _)| record)
            .ok_or_else(|| Error::NotFound(format!("no prompt matching '{}'", query)))
    }

    // ---- loading -------------------------------------------------------

    /// Read every slot and adopt the result, recovering when a slot is damaged
    pub fn load(&mut self) -> LoadReport {
        match self.read_slots() {
            Ok(loaded) => {
                let report = LoadReport {
                    outcome: LoadOutcome::Loaded,
                    first_run: loaded.first_run,
                    skipped_records: loaded.skipped,
                };
                self.adopt(loaded.snapshot);
                debug!(
                    records = self.records.len(),
                    categories = self.categories.len(),
                    skipped = report.skipped_records,
                    "Collections loaded"
                );
                report
            }
            Err(e) => {
                warn!(error = %e, "Stored data could not be read, recovering");
                self.recover()
            }
        }
    }

    fn read_slots(&self) -> Result<Loaded, Error> {
        let mut skipped = 0;

        let prompts_blob = self.store.get(PROMPTS_KEY)?;
        let first_run = prompts_blob.is_none();
        let mut prompts: Vec<PromptRecord> = Vec::new();
        if let Some(blob) = prompts_blob {
            let raw: Vec<serde_json::Value> =
                serde_json::from_str(&blob).map_err(ParseError::from)?;
            for (idx, value) in raw.into_iter().enumerate() {
                match PromptRecord::from_plain(value) {
                    Ok(record) if prompts.iter().any(|r| r.id == record.id) => {
                        warn!(id = %record.id, "Duplicate record id in store, skipping");
                        skipped += 1;
                    }
                    Ok(record) => prompts.push(record),
                    Err(e) => {
                        warn!(index = idx, error = %e, "Invalid stored record, skipping");
                        skipped += 1;
                    }
                }
            }
        }

        let categories = match self.store.get(CATEGORIES_KEY)? {
            Some(blob) => serde_json::from_str(&blob).map_err(ParseError::from)?,
            None => CategoryMap::defaults(),
        };
        let favorites = match self.store.get(FAVORITES_KEY)? {
            Some(blob) => serde_json::from_str(&blob).map_err(ParseError::from)?,
            None => Vec::new(),
        };
        let settings = match self.store.get(SETTINGS_KEY)? {
            Some(blob) => serde_json::from_str(&blob).map_err(ParseError::from)?,
            None => Settings::default(),
        };

        Ok(Loaded {
            snapshot: Snapshot {
                prompts,
                categories,
                favorites,
                settings,
            },
            first_run,
            skipped,
        })
    }

    /// Take a snapshot as the current state, reconciling favorite flags
    fn adopt(&mut self, snapshot: Snapshot) {
        let Snapshot {
            mut prompts,
            categories,
            favorites,
            settings,
        } = snapshot;

        let mut set: Vec<String> = Vec::new();
        for id in favorites {
            if !set.contains(&id) && prompts.iter().any(|r| r.id == id) {
                set.push(id);
            }
        }
        for record in prompts.iter_mut() {
            if record.favorite && !set.contains(&record.id) {
                set.push(record.id.clone());
            }
            record.favorite = set.contains(&record.id);
        }

        self.records = prompts;
        self.categories = categories;
        self.favorites = set;
        self.settings = settings;
    }

    fn reset_to_defaults(&mut self) {
        self.records.clear();
        self.categories = CategoryMap::defaults();
        self.favorites.clear();
        self.settings = Settings::default();
    }

    fn recover(&mut self) -> LoadReport {
        if let Some(newest) = self.read_backups().into_iter().next() {
            let timestamp = newest.timestamp;
            self.adopt(newest.data);
            if let Err(e) = self.save_all() {
                warn!(error = %e, "Could not persist restored backup");
            }
            info!(%timestamp, "Restored newest backup after load failure");
            self.events.notify(
                Severity::Warning,
                "Stored data was damaged; the latest backup was restored",
            );
            return LoadReport {
                outcome: LoadOutcome::RestoredFromBackup,
                first_run: false,
                skipped_records: 0,
            };
        }

        self.reset_to_defaults();
        if let Err(e) = self.save_all() {
            warn!(error = %e, "Could not persist defaults");
        }
        info!("No usable backup, data reset to defaults");
        self.events.notify(
            Severity::Warning,
            "Stored data was damaged and no backup was available; starting fresh",
        );
        LoadReport {
            outcome: LoadOutcome::ResetToDefaults,
            first_run: false,
            skipped_records: 0,
        }
    }

    // ---- saving --------------------------------------------------------

    fn write_slot(&mut self, key: &str, value: &str) -> Result<SaveStatus, StoreError> {
        match self.store.set(key, value) {
            Ok(()) => {
                debug!(key, bytes = value.len(), "Slot written");
                Ok(SaveStatus::Saved)
            }
            Err(e) if e.is_quota() => {
                warn!(key, error = %e, "Storage quota exceeded");
                self.evict_backups();
                self.events.notify(
                    Severity::Warning,
                    "Storage is full; old backups were removed and the last change was not saved",
                );
                Ok(SaveStatus::QuotaWarning)
            }
            Err(e) => Err(e),
        }
    }

    /// Free space by keeping only the newest backup, or none
    fn evict_backups(&mut self) {
        let mut backups = self.read_backups();
        if backups.len() > 1 {
            backups.truncate(1);
            let kept = to_json(BACKUPS_KEY, &backups)
                .and_then(|json| self.store.set(BACKUPS_KEY, &json));
            if kept.is_ok() {
                info!("Evicted all but the newest backup");
                return;
            }
        }
        match self.store.remove(BACKUPS_KEY) {
            Ok(()) => info!("Evicted all backups"),
            Err(e) => warn!(error = %e, "Could not evict backups"),
        }
    }

    pub fn save_records(&mut self) -> Result<SaveStatus, StoreError> {
        let json = to_json(PROMPTS_KEY, &self.records)?;
        self.write_slot(PROMPTS_KEY, &json)
    }

    pub fn save_categories(&mut self) -> Result<SaveStatus, StoreError> {
        let json = to_json(CATEGORIES_KEY, &self.categories)?;
        self.write_slot(CATEGORIES_KEY, &json)
    }

    pub fn save_favorites(&mut self) -> Result<SaveStatus, StoreError> {
        let json = to_json(FAVORITES_KEY, &self.favorites)?;
        self.write_slot(FAVORITES_KEY, &json)
    }

    pub fn save_settings(&mut self) -> Result<SaveStatus, StoreError> {
        let json = to_json(SETTINGS_KEY, &self.settings)?;
        self.write_slot(SETTINGS_KEY, &json)
    }

    pub fn save_all(&mut self) -> Result<SaveStatus, StoreError> {
        Ok(self
            .save_records()?
            .and(self.save_categories()?)
            .and(self.save_favorites()?)
            .and(self.save_settings()?))
    }

    // ---- backups -------------------------------------------------------

    fn read_backups(&self) -> Vec<Backup> {
        match self.store.get(BACKUPS_KEY) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|e| {
                warn!(error = %e, "Backup slot is unreadable");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Could not read backup slot");
                Vec::new()
            }
        }
    }

    /// Snapshot the collections into the backup list, newest first
    pub fn create_backup(&mut self) -> Result<SaveStatus, StoreError> {
        let mut backups = self.read_backups();
        backups.insert(
            0,
            Backup {
                timestamp: Utc::now(),
                version: EXPORT_FORMAT_VERSION.to_string(),
                data: self.snapshot(),
            },
        );
        backups.truncate(self.max_backups);

        let json = to_json(BACKUPS_KEY, &backups)?;
        let status = self.write_slot(BACKUPS_KEY, &json)?;
        if status.is_saved() {
            info!(count = backups.len(), "Backup created");
            self.events.emit(AppEvent::BackupCreated);
        }
        Ok(status)
    }

    pub fn backups(&self) -> Vec<BackupSummary> {
        self.read_backups()
            .into_iter()
            .enumerate()
            .map(|(index, backup)| BackupSummary {
                index,
                timestamp: backup.timestamp,
                records: backup.data.prompts.len(),
            })
            .collect()
    }

    /// Replace the collections with backup `index`; false when out of range
    pub fn restore_from_backup(&mut self, index: usize) -> Result<bool, StoreError> {
        let Some(backup) = self.read_backups().into_iter().nth(index) else {
            return Ok(false);
        };

        let timestamp = backup.timestamp;
        self.adopt(backup.data);
        self.save_all()?;
        info!(index, %timestamp, "Backup restored");
        self.events.emit(AppEvent::DataReloaded);
        Ok(true)
    }

    // ---- cross-instance sync --------------------------------------------

    /// Reload when another instance changed one of the data slots
    pub fn sync_external_changes(&mut self) -> bool {
        let changed = self.store.take_external_changes();
        if !changed.iter().any(|key| DATA_KEYS.contains(&key.as_str())) {
            return false;
        }

        match self.read_slots() {
            Ok(loaded) => {
                debug!(slots = ?changed, "Reloading after external change");
                self.adopt(loaded.snapshot);
                self.events.emit(AppEvent::DataReloaded);
                true
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable external change");
                false
            }
        }
    }

    // ---- record mutations ----------------------------------------------

    fn record_mut(&mut self, id: &str) -> Result<&mut PromptRecord, Error> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("prompt '{}'", id)))
    }

    fn sync_favorite_set(&mut self, id: &str, favorite: bool) -> bool {
        let present = self.is_favorite(id);
        match (favorite, present) {
            (true, false) => self.favorites.push(id.to_string()),
            (false, true) => self.favorites.retain(|f| f != id),
            _ => return false,
        }
        true
    }

    fn save_records_and_favorites(
        &mut self,
        favorites_changed: bool,
    ) -> Result<SaveStatus, StoreError> {
        let status = self.save_records()?;
        if favorites_changed {
            Ok(status.and(self.save_favorites()?))
        } else {
            Ok(status)
        }
    }

    pub fn add_record(&mut self, record: PromptRecord) -> Result<SaveStatus, Error> {
        if self.contains(&record.id) {
            return Err(Error::Conflict(format!(
                "a prompt with id '{}' already exists",
                record.id
            )));
        }
        record.validate()?;

        let favorites_changed = record.favorite && self.sync_favorite_set(&record.id, true);
        debug!(id = %record.id, title = %record.title, "Adding record");
        self.records.push(record);
        Ok(self.save_records_and_favorites(favorites_changed)?)
    }

    pub fn update_record(
        &mut self,
        id: &str,
        changes: PromptUpdate,
    ) -> Result<SaveStatus, Error> {
        let record = self.record_mut(id)?;
        record.update(changes)?;
        let favorite = record.favorite;

        let favorites_changed = self.sync_favorite_set(id, favorite);
        debug!(id, "Record updated");
        Ok(self.save_records_and_favorites(favorites_changed)?)
    }

    /// Remove a record and its favorite membership; false for unknown ids
    pub fn delete_record(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Ok(false);
        }

        let favorites_changed = self.sync_favorite_set(id, false);
        debug!(id, "Record deleted");
        self.save_records_and_favorites(favorites_changed)?;
        Ok(true)
    }

    /// Store a copy of a record next to it; returns the new id
    pub fn duplicate_record(&mut self, id: &str) -> Result<String, Error> {
        let position = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("prompt '{}'", id)))?;

        let copy = self.records[position].duplicate();
        let new_id = copy.id.clone();
        let favorites_changed = copy.favorite && self.sync_favorite_set(&new_id, true);
        self.records.insert(position + 1, copy);
        self.save_records_and_favorites(favorites_changed)?;
        Ok(new_id)
    }

    pub fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<SaveStatus, Error> {
        let record = self.record_mut(id)?;
        record.favorite = favorite;
        self.sync_favorite_set(id, favorite);
        Ok(self.save_records_and_favorites(true)?)
    }

    /// Flip the favorite flag; returns the new state
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, Error> {
        let favorite = !self.record_mut(id)?.favorite;
        self.set_favorite(id, favorite)?;
        Ok(favorite)
    }

    /// Re-file a record; an empty path means uncategorized
    pub fn move_record(&mut self, id: &str, category: &str) -> Result<SaveStatus, Error> {
        let path = category::normalize_path(category);
        if category::is_reserved(&path) {
            return Err(Error::Conflict(
                "prompts are added to favorites by starring them, not by moving".to_string(),
            ));
        }
        if !path.is_empty() && !self.categories.contains(&path) {
            return Err(Error::NotFound(format!("category '{}'", path)));
        }

        let record = self.record_mut(id)?;
        record.update(PromptUpdate {
            category: Some(path.clone()),
            ..Default::default()
        })?;
        debug!(id, category = %path, "Record moved");
        Ok(self.save_records()?)
    }

    // ---- categories ----------------------------------------------------

    /// Create a folder, creating missing ancestors; returns the stored path
    pub fn add_category(
        &mut self,
        path: &str,
        name: Option<&str>,
        icon: Option<&str>,
        color: Option<&str>,
    ) -> Result<String, Error> {
        let path = category::normalize_path(path);
        if path.is_empty() {
            return Err(Error::Conflict("category path is empty".to_string()));
        }
        if category::is_reserved(&path) {
            return Err(Error::Conflict(format!("'{}' is reserved", FAVORITES_PATH)));
        }
        if self.categories.contains(&path) {
            return Err(Error::Conflict(format!("category '{}' already exists", path)));
        }

        let mut ancestors = Vec::new();
        let mut cursor = category::parent_path(&path);
        while let Some(parent) = cursor {
            if !self.categories.contains(parent) {
                ancestors.push(parent.to_string());
            }
            cursor = category::parent_path(parent);
        }
        for ancestor in ancestors.into_iter().rev() {
            let leaf = category::leaf_name(&ancestor).to_string();
            self.categories
                .insert(ancestor, Category::new(leaf, FOLDER_ICON, ""));
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| category::leaf_name(&path));
        self.categories.insert(
            path.clone(),
            Category::new(name, icon.unwrap_or(FOLDER_ICON), color.unwrap_or("")),
        );
        info!(path = %path, "Category created");
        self.save_categories()?;
        Ok(path)
    }

    /// Change a folder's display name; the path stays the same
    pub fn rename_category(&mut self, path: &str, new_name: &str) -> Result<SaveStatus, Error> {
        if category::is_reserved(path) {
            return Err(Error::Conflict("favorites cannot be renamed".to_string()));
        }
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::Conflict("category name is empty".to_string()));
        }
        let category = self
            .categories
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(format!("category '{}'", path)))?;
        category.name = new_name.to_string();
        Ok(self.save_categories()?)
    }

    // ---- settings ------------------------------------------------------

    pub fn set_expanded(&mut self, path: &str, expanded: bool) -> Result<SaveStatus, StoreError> {
        let nodes = &mut self.settings.expanded_nodes;
        let present = nodes.iter().any(|n| n == path);
        match (expanded, present) {
            (true, false) => nodes.push(path.to_string()),
            (false, true) => nodes.retain(|n| n != path),
            _ => return Ok(SaveStatus::Saved),
        }
        self.save_settings()
    }

    pub fn update_settings<F>(&mut self, apply: F) -> Result<SaveStatus, StoreError>
    where
        F: FnOnce(&mut Settings),
    {
        apply(&mut self.settings);
        self.save_settings()
    }

    /// Back to factory defaults; backups survive unless `drop_backups`
    pub fn clear_all(&mut self, drop_backups: bool) -> Result<SaveStatus, StoreError> {
        self.reset_to_defaults();
        let status = self.save_all()?;
        if drop_backups {
            self.store.remove(BACKUPS_KEY)?;
        }
        info!(drop_backups, "All data cleared");
        self.events.emit(AppEvent::DataReloaded);
        Ok(status)
    }

    // ---- import / export -----------------------------------------------

    pub fn export_all(&self, format: ExportFormat) -> Result<String, Error> {
        let document = ExportDocument {
            version: EXPORT_FORMAT_VERSION,
            exported: Utc::now().to_rfc3339(),
            prompts: &self.records,
            categories: &self.categories,
            favorites: &self.favorites,
            settings: &self.settings,
        };
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&document).map_err(|source| {
                Error::Store(StoreError::Serialize {
                    key: "export".to_string(),
                    source,
                })
            }),
            ExportFormat::Yaml => Ok(serde_yaml::to_string(&document).map_err(ParseError::from)?),
        }
    }

    /// Bring in an export document, a bare record list, or one record
    ///
    /// Without `merge` everything except backups is reset first. Records
    /// whose id already exists are skipped. Invalid records are reported in
    /// the summary and do not stop the import.
    pub fn import_all(
        &mut self,
        text: &str,
        format: Option<ExportFormat>,
        merge: bool,
    ) -> Result<ImportSummary, Error> {
        let document = parse_document(text, format)?;

        let (prompts, categories, favorites, settings) = match document {
            serde_json::Value::Object(mut map) if map.contains_key("prompts") => {
                let prompts = match map.remove("prompts") {
                    Some(serde_json::Value::Array(items)) => items,
                    Some(serde_json::Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(ParseError::Shape("'prompts' must be a list".to_string()).into())
                    }
                };
                (
                    prompts,
                    map.remove("categories"),
                    map.remove("favorites"),
                    map.remove("settings"),
                )
            }
            serde_json::Value::Object(map) if map.contains_key("title") => {
                (vec![serde_json::Value::Object(map)], None, None, None)
            }
            serde_json::Value::Array(items) => (items, None, None, None),
            _ => {
                return Err(ParseError::Shape(
                    "expected an export document, a list of prompts, or a single prompt"
                        .to_string(),
                )
                .into())
            }
        };

        if !merge {
            self.reset_to_defaults();
        }

        let mut summary = ImportSummary {
            imported: 0,
            skipped: 0,
            errors: Vec::new(),
            status: SaveStatus::Saved,
        };
        let mut imported_ids: Vec<String> = Vec::new();

        for (idx, value) in prompts.into_iter().enumerate() {
            match PromptRecord::from_plain(value) {
                Ok(record) if self.contains(&record.id) => {
                    debug!(id = %record.id, "Import skipped existing id");
                    summary.skipped += 1;
                }
                Ok(record) => {
                    if record.favorite {
                        self.sync_favorite_set(&record.id, true);
                    }
                    imported_ids.push(record.id.clone());
                    self.records.push(record);
                    summary.imported += 1;
                }
                Err(e) => summary.errors.push(format!("prompt #{}: {}", idx + 1, e)),
            }
        }

        if let Some(value) = categories.filter(|v| !v.is_null()) {
            match serde_json::from_value::<CategoryMap>(value) {
                Ok(incoming) => self.categories.merge(incoming),
                Err(e) => summary.errors.push(format!("categories: {}", e)),
            }
        }

        if let Some(value) = favorites.filter(|v| !v.is_null()) {
            match serde_json::from_value::<Vec<String>>(value) {
                Ok(ids) => {
                    for id in ids.iter().filter(|id| imported_ids.contains(id)) {
                        if let Some(record) = self.records.iter_mut().find(|r| &r.id == id) {
                            record.favorite = true;
                        }
                        self.sync_favorite_set(id, true);
                    }
                }
                Err(e) => summary.errors.push(format!("favorites: {}", e)),
            }
        }

        if let Some(value) = settings.filter(|v| v.is_object()) {
            self.settings = self.settings.merged_with(&value);
        }

        summary.status = self.save_all()?;
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            merge,
            "Import finished"
        );
        self.events.emit(AppEvent::DataReloaded);
        Ok(summary)
    }

    /// YAML text of one record
    pub fn export_record(&self, id: &str) -> Result<String, Error> {
        let record = self
            .record(id)
            .ok_or_else(|| Error::NotFound(format!("prompt '{}'", id)))?;
        Ok(record.to_yaml()?)
    }

    /// Add one record from YAML (or JSON); a colliding id is replaced by a fresh one
    pub fn import_record(&mut self, text: &str) -> Result<String, Error> {
        let mut record = PromptRecord::from_yaml(text)?;
        if self.contains(&record.id) {
            record = PromptRecord {
                title: record.title.clone(),
                ..record.duplicate()
            };
        }
        let id = record.id.clone();
        self.add_record(record)?;
        Ok(id)
    }

    // ---- search history ------------------------------------------------

    pub fn search_history(&self) -> SearchHistory {
        let mut history = match self.store.get(SEARCH_HISTORY_KEY) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|e| {
                warn!(error = %e, "Search history is unreadable");
                SearchHistory::default()
            }),
            Ok(None) => SearchHistory::default(),
            Err(e) => {
                warn!(error = %e, "Could not read search history");
                SearchHistory::default()
            }
        };
        history.set_capacity(self.history_cap);
        history
    }

    pub fn record_search(&mut self, query: &str) -> Result<SaveStatus, StoreError> {
        let mut history = self.search_history();
        if !history.record(query) {
            return Ok(SaveStatus::Saved);
        }
        let json = to_json(SEARCH_HISTORY_KEY, &history)?;
        self.write_slot(SEARCH_HISTORY_KEY, &json)
    }

    pub fn clear_search_history(&mut self) -> Result<(), StoreError> {
        self.store.remove(SEARCH_HISTORY_KEY)
    }

    // ---- misc ----------------------------------------------------------

    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            records: self.records.len(),
            categories: self.categories.len(),
            favorites: self.favorites.len(),
            backups: self.read_backups().len(),
            usage: self.store.usage()?,
        })
    }

    /// Final persist, plus a backup when enabled
    pub fn shutdown(&mut self) -> Result<SaveStatus, StoreError> {
        let mut status = self.save_all()?;
        if self.settings.backup_enabled {
            status = status.and(self.create_backup()?);
        }
        info!("Storage flushed");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{FileStore, MemoryStore, DEFAULT_QUOTA_BYTES};
    use crate::record::{NewPrompt, PromptType};
    use tempfile::TempDir;

    fn new_prompt(title: &str) -> PromptRecord {
        PromptRecord::create(NewPrompt {
            title: title.to_string(),
            prompt_type: Some(PromptType::TextGeneration),
            body: format!("body of {}", title),
            ..Default::default()
        })
        .unwrap()
    }

    fn storage() -> Storage<MemoryStore> {
        let mut storage = Storage::new(MemoryStore::default(), EventBus::new());
        storage.load();
        storage
    }

    #[test]
    fn test_first_load_uses_defaults() {
        let mut storage = Storage::new(MemoryStore::default(), EventBus::new());
        let report = storage.load();

        assert_eq!(report.outcome, LoadOutcome::Loaded);
        assert!(report.first_run);
        assert!(storage.records().is_empty());
        assert_eq!(storage.categories(), &CategoryMap::defaults());
        assert_eq!(storage.settings(), &Settings::default());
    }

    #[test]
    fn test_records_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FileStore::open(dir.path(), DEFAULT_QUOTA_BYTES).unwrap();
            let mut storage = Storage::new(store, EventBus::new());
            storage.load();
            let record = new_prompt("Recruiter");
            let id = record.id.clone();
            storage.add_record(record).unwrap();
            storage.set_favorite(&id, true).unwrap();
            id
        };

        let store = FileStore::open(dir.path(), DEFAULT_QUOTA_BYTES).unwrap();
        let mut storage = Storage::new(store, EventBus::new());
        let report = storage.load();

        assert!(!report.first_run);
        assert_eq!(storage.records().len(), 1);
        assert!(storage.record(&id).unwrap().favorite);
        assert_eq!(storage.favorites(), &[id]);
    }

    #[test]
    fn test_invalid_records_are_skipped_on_load() {
        let mut store = MemoryStore::default();
        let good = new_prompt("ok").to_plain();
        let blob = serde_json::json!([good, {"title": "", "type": "code", "prompt": "x"}]);
        store.set(PROMPTS_KEY, &blob.to_string()).unwrap();

        let mut storage = Storage::new(store, EventBus::new());
        let report = storage.load();
        assert_eq!(report.outcome, LoadOutcome::Loaded);
        assert_eq!(report.skipped_records, 1);
        assert_eq!(storage.records().len(), 1);
    }

    #[test]
    fn test_damaged_slot_restores_newest_backup() {
        let shared = MemoryStore::default();
        let events = EventBus::new();
        let rx = events.subscribe();

        {
            let mut writer = Storage::new(shared.connect(), EventBus::new());
            writer.load();
            writer.add_record(new_prompt("kept")).unwrap();
            writer.create_backup().unwrap();
        }
        let mut handle = shared.connect();
        handle.set(PROMPTS_KEY, "{not json").unwrap();

        let mut storage = Storage::new(handle, events);
        let report = storage.load();

        assert_eq!(report.outcome, LoadOutcome::RestoredFromBackup);
        assert_eq!(storage.records()[0].title, "kept");
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::Notify(n) if n.severity == Severity::Warning)));
    }

    #[test]
    fn test_damaged_slot_without_backup_resets() {
        let mut store = MemoryStore::default();
        store.set(CATEGORIES_KEY, "[[[").unwrap();

        let mut storage = Storage::new(store, EventBus::new());
        let report = storage.load();
        assert_eq!(report.outcome, LoadOutcome::ResetToDefaults);
        assert_eq!(storage.categories(), &CategoryMap::defaults());
    }

    #[test]
    fn test_backup_cap_keeps_newest_first() {
        let mut storage = storage();
        for i in 0..6 {
            storage.add_record(new_prompt(&format!("p{}", i))).unwrap();
            storage.create_backup().unwrap();
        }

        let backups = storage.backups();
        assert_eq!(backups.len(), DEFAULT_MAX_BACKUPS);
        assert_eq!(backups[0].records, 6);
        assert_eq!(backups[4].records, 2);
        assert!(backups[0].timestamp >= backups[1].timestamp);
    }

    #[test]
    fn test_restore_from_backup() {
        let mut storage = storage();
        storage.add_record(new_prompt("before")).unwrap();
        storage.create_backup().unwrap();
        storage.clear_all(false).unwrap();
        assert!(storage.records().is_empty());

        assert!(!storage.restore_from_backup(3).unwrap());
        assert!(storage.restore_from_backup(0).unwrap());
        assert_eq!(storage.records()[0].title, "before");
    }

    #[test]
    fn test_delete_removes_favorite_membership() {
        let mut storage = storage();
        let record = new_prompt("gone");
        let id = record.id.clone();
        storage.add_record(record).unwrap();
        assert!(storage.toggle_favorite(&id).unwrap());
        assert!(storage.is_favorite(&id));

        assert!(storage.delete_record(&id).unwrap());
        assert!(storage.record(&id).is_none());
        assert!(!storage.is_favorite(&id));
        assert!(!storage.delete_record(&id).unwrap());
    }

    #[test]
    fn test_update_keeps_favorites_in_step() {
        let mut storage = storage();
        let record = new_prompt("x");
        let id = record.id.clone();
        storage.add_record(record).unwrap();

        storage
            .update_record(
                &id,
                PromptUpdate {
                    favorite: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(storage.favorites(), &[id.clone()]);

        let err = storage
            .update_record(
                &id,
                PromptUpdate {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(storage.record(&id).unwrap().title, "x");
    }

    #[test]
    fn test_duplicate_record_lands_next_to_original() {
        let mut storage = storage();
        let first = new_prompt("first");
        let first_id = first.id.clone();
        storage.add_record(first).unwrap();
        storage.add_record(new_prompt("second")).unwrap();

        let copy_id = storage.duplicate_record(&first_id).unwrap();
        assert_eq!(storage.records()[1].id, copy_id);
        assert_eq!(storage.records()[1].title, "first (copia)");
        assert!(matches!(
            storage.duplicate_record("missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_move_record() {
        let mut storage = storage();
        let record = new_prompt("m");
        let id = record.id.clone();
        storage.add_record(record).unwrap();

        storage.move_record(&id, "linguaggi/java").unwrap();
        assert_eq!(storage.record(&id).unwrap().category, "linguaggi/java");
        assert!(storage.move_record(&id, "favorites").is_err());
        assert!(storage.move_record(&id, "nowhere").is_err());
        storage.move_record(&id, "").unwrap();
        assert_eq!(storage.record(&id).unwrap().category, "");
    }

    #[test]
    fn test_add_category_creates_ancestors() {
        let mut storage = storage();
        let path = storage
            .add_category(" work / drafts ", Some("Drafts"), None, None)
            .unwrap();

        assert_eq!(path, "work/drafts");
        assert_eq!(storage.categories().display_name("work"), "work");
        assert_eq!(storage.categories().display_name("work/drafts"), "Drafts");
        assert!(storage.add_category("work/drafts", None, None, None).is_err());
        assert!(storage.add_category("favorites", None, None, None).is_err());
    }

    #[test]
    fn test_rename_category() {
        let mut storage = storage();
        storage.rename_category("creative", "Arte").unwrap();
        assert_eq!(storage.categories().display_name("creative"), "Arte");
        assert!(storage.rename_category("favorites", "Stars").is_err());
        assert!(matches!(
            storage.rename_category("missing", "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_expanded_nodes_persist() {
        let mut storage = storage();
        storage.set_expanded("linguaggi", true).unwrap();
        storage.set_expanded("linguaggi", true).unwrap();
        assert_eq!(
            storage.settings().expanded_nodes,
            vec!["favorites".to_string(), "linguaggi".to_string()]
        );
        storage.set_expanded("favorites", false).unwrap();
        assert_eq!(storage.settings().expanded_nodes, vec!["linguaggi".to_string()]);
    }

    #[test]
    fn test_export_import_replaces_everything() {
        let mut source = storage();
        let record = new_prompt("exported");
        let id = record.id.clone();
        source.add_record(record).unwrap();
        source.set_favorite(&id, true).unwrap();
        source.rename_category("creative", "Arte").unwrap();

        for format in [ExportFormat::Json, ExportFormat::Yaml] {
            let text = source.export_all(format).unwrap();
            let mut target = storage();
            target.add_record(new_prompt("old")).unwrap();

            let summary = target.import_all(&text, None, false).unwrap();
            assert_eq!(summary.imported, 1);
            assert_eq!(summary.skipped, 0);
            assert!(summary.errors.is_empty());
            assert_eq!(target.records().len(), 1);
            assert!(target.is_favorite(&id));
            assert_eq!(target.categories().display_name("creative"), "Arte");
        }
    }

    #[test]
    fn test_merge_import_skips_existing_ids() {
        let mut storage = storage();
        let record = new_prompt("original");
        let id = record.id.clone();
        storage.add_record(record).unwrap();

        let incoming = serde_json::json!({
            "version": "1.0",
            "prompts": [
                {"id": id, "title": "changed", "type": "code", "prompt": "changed"},
                {"id": "new-1", "title": "fresh", "type": "code", "prompt": "x"},
                {"id": "bad", "title": "", "type": "code", "prompt": "x"}
            ],
            "favorites": ["new-1", id]
        });

        let summary = storage
            .import_all(&incoming.to_string(), Some(ExportFormat::Json), true)
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(storage.record(&id).unwrap().title, "original");
        assert!(!storage.is_favorite(&id));
        assert!(storage.record("new-1").unwrap().favorite);
        assert_eq!(storage.favorites(), &["new-1".to_string()]);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let mut storage = storage();
        assert!(matches!(
            storage.import_all("just words", None, true),
            Err(Error::Parse(ParseError::Shape(_)))
        ));
        assert!(matches!(
            storage.import_all("{ broken: [", None, true),
            Err(Error::Parse(ParseError::Unrecognized { .. }))
        ));
    }

    #[test]
    fn test_single_record_round_trip() {
        let mut storage = storage();
        let record = new_prompt("solo");
        let id = record.id.clone();
        storage.add_record(record).unwrap();

        let yaml = storage.export_record(&id).unwrap();
        let new_id = storage.import_record(&yaml).unwrap();
        assert_ne!(new_id, id);
        assert_eq!(storage.record(&new_id).unwrap().title, "solo");
    }

    #[test]
    fn test_quota_failure_evicts_backups() {
        let events = EventBus::new();
        let rx = events.subscribe();
        let mut storage = Storage::new(MemoryStore::new(4096), events);
        storage.load();
        storage.save_all().unwrap();
        storage.create_backup().unwrap();
        storage.create_backup().unwrap();

        let huge = PromptRecord::create(NewPrompt {
            title: "huge".to_string(),
            prompt_type: Some(PromptType::Other),
            body: "x".repeat(9000),
            ..Default::default()
        })
        .unwrap();

        let status = storage.add_record(huge).unwrap();
        assert_eq!(status, SaveStatus::QuotaWarning);
        assert!(storage.backups().len() <= 1);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::Notify(n) if n.severity == Severity::Warning)));
    }

    #[test]
    fn test_external_change_triggers_reload() {
        let shared = MemoryStore::default();
        let events = EventBus::new();
        let rx = events.subscribe();

        let mut mine = Storage::new(shared.connect(), events);
        mine.load();
        let mut theirs = Storage::new(shared.connect(), EventBus::new());
        theirs.load();

        assert!(!mine.sync_external_changes());
        theirs.add_record(new_prompt("from elsewhere")).unwrap();

        assert!(mine.sync_external_changes());
        assert_eq!(mine.records()[0].title, "from elsewhere");
        assert!(rx.try_iter().any(|e| e == AppEvent::DataReloaded));

        // Search history is not data; it does not trigger a reload
        theirs.record_search("java").unwrap();
        assert!(!mine.sync_external_changes());
    }

    #[test]
    fn test_search_history_slot() {
        let mut storage = storage().with_limits(DEFAULT_MAX_BACKUPS, 3);
        for q in ["a", "b", "c", "d", "b"] {
            storage.record_search(q).unwrap();
        }
        assert_eq!(storage.search_history().entries(), &["b", "d", "c"]);

        storage.clear_search_history().unwrap();
        assert!(storage.search_history().is_empty());
    }

    #[test]
    fn test_resolve_by_id_title_and_fuzzy() {
        let mut storage = storage();
        let record = new_prompt("AI Code Review");
        let id = record.id.clone();
        storage.add_record(record).unwrap();
        storage.add_record(new_prompt("Recruiter")).unwrap();

        assert_eq!(storage.resolve(&id).unwrap().id, id);
        assert_eq!(storage.resolve("ai code review").unwrap().id, id);
        assert_eq!(storage.resolve("acr").unwrap().id, id);
        assert!(storage.resolve("zzzz").is_err());
    }

    #[test]
    fn test_stats_and_shutdown() {
        let mut storage = storage();
        storage.add_record(new_prompt("s")).unwrap();
        storage.shutdown().unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.backups, 1);
        assert_eq!(stats.categories, CategoryMap::defaults().len());
        assert!(stats.usage.used_bytes > 0);
    }
}
