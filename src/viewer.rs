//! Detail pane for the selected record

use crate::clipboard::ClipboardSink;
use crate::error::StoreError;
use crate::events::{AppEvent, EventBus, Severity};
use crate::kv::KeyValueStore;
use crate::record::PromptRecord;
use crate::storage::Storage;

const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Structured,
    Raw,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Structured => ViewMode::Raw,
            ViewMode::Raw => ViewMode::Structured,
        }
    }
}

/// Field-by-field presentation of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDetails {
    pub id: String,
    pub title: String,
    pub type_label: &'static str,
    pub type_icon: &'static str,
    pub model: Option<String>,
    pub author: Option<String>,
    pub version: String,
    pub created: String,
    pub modified: String,
    pub tags: Vec<String>,
    pub body: String,
    pub negative_body: Option<String>,
    pub notes: Option<String>,
    pub char_count: usize,
    pub word_count: usize,
    pub category: Option<String>,
    pub favorite: bool,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| value.to_string())
}

impl RecordDetails {
    fn from_record<S: KeyValueStore>(record: &PromptRecord, storage: &Storage<S>) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            type_label: record.type_label(),
            type_icon: record.prompt_type.icon(),
            model: non_empty(&record.model),
            author: non_empty(&record.author),
            version: record.version.clone(),
            created: record.created.format(DISPLAY_DATE_FORMAT).to_string(),
            modified: record.modified.format(DISPLAY_DATE_FORMAT).to_string(),
            tags: record.tags.clone(),
            body: record.body.clone(),
            negative_body: non_empty(&record.negative_body),
            notes: non_empty(&record.notes),
            char_count: record.char_count(),
            word_count: record.word_count(),
            category: (!record.category.is_empty())
                .then(|| storage.categories().display_name(&record.category)),
            favorite: record.favorite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerContent {
    /// Nothing (or nothing that still exists) is selected
    Welcome,
    Structured(RecordDetails),
    Raw { id: String, title: String, text: String },
}

pub struct DetailViewer {
    selected: Option<String>,
    mode: ViewMode,
    events: EventBus,
}

impl DetailViewer {
    pub fn new(events: EventBus) -> Self {
        Self {
            selected: None,
            mode: ViewMode::default(),
            events,
        }
    }

    pub fn show(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    fn current<'a, S: KeyValueStore>(&self, storage: &'a Storage<S>) -> Option<&'a PromptRecord> {
        self.selected.as_deref().and_then(|id| storage.record(id))
    }

    pub fn render<S: KeyValueStore>(&self, storage: &Storage<S>) -> ViewerContent {
        let Some(record) = self.current(storage) else {
            return ViewerContent::Welcome;
        };
        match self.mode {
            ViewMode::Structured => {
                ViewerContent::Structured(RecordDetails::from_record(record, storage))
            }
            ViewMode::Raw => ViewerContent::Raw {
                id: record.id.clone(),
                title: record.title.clone(),
                text: record
                    .to_yaml()
                    .unwrap_or_else(|e| format!("# could not serialize: {}", e)),
            },
        }
    }

    /// What a copy action puts on the clipboard in the current mode
    pub fn copy_text<S: KeyValueStore>(&self, storage: &Storage<S>) -> Option<String> {
        let record = self.current(storage)?;
        match self.mode {
            ViewMode::Structured => Some(record.body.clone()),
            ViewMode::Raw => record.to_yaml().ok(),
        }
    }

    /// Copy and report the outcome as a notification
    pub fn copy<S: KeyValueStore>(
        &self,
        storage: &Storage<S>,
        clipboard: &mut dyn ClipboardSink,
    ) -> bool {
        let Some(text) = self.copy_text(storage) else {
            return false;
        };
        match clipboard.copy(&text) {
            Ok(()) => {
                self.events.notify(Severity::Success, "Copied to clipboard");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Clipboard write failed");
                self.events
                    .notify(Severity::Error, format!("Could not copy: {}", e));
                false
            }
        }
    }

    /// Delete the shown record; call only after the user confirmed
    pub fn delete<S: KeyValueStore>(&mut self, storage: &mut Storage<S>) -> Result<bool, StoreError> {
        let Some(id) = self.selected.clone() else {
            return Ok(false);
        };
        if !storage.delete_record(&id)? {
            self.clear();
            return Ok(false);
        }

        self.clear();
        self.events.emit(AppEvent::RecordDeleted(id));
        self.events.notify(Severity::Success, "Prompt deleted");
        Ok(true)
    }

    /// Flip the favorite flag of the shown record; returns the new state
    pub fn toggle_favorite<S: KeyValueStore>(
        &self,
        storage: &mut Storage<S>,
    ) -> Result<Option<bool>, crate::error::Error> {
        let Some(id) = self.selected.as_deref() else {
            return Ok(None);
        };
        if !storage.contains(id) {
            return Ok(None);
        }
        let favorite = storage.toggle_favorite(id)?;
        self.events.emit(AppEvent::FavoriteToggled {
            id: id.to_string(),
            favorite,
        });
        Ok(Some(favorite))
    }

    /// Id to hand to the editor for the edit action
    pub fn edit_target<S: KeyValueStore>(&self, storage: &Storage<S>) -> Option<String> {
        self.current(storage).map(|r| r.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::kv::MemoryStore;
    use crate::record::{NewPrompt, PromptType};
    use chrono::NaiveDate;

    fn setup() -> (Storage<MemoryStore>, DetailViewer, String) {
        let events = EventBus::new();
        let mut storage = Storage::new(MemoryStore::default(), events.clone());
        storage.load();
        let mut record = PromptRecord::create(NewPrompt {
            title: "Sunset".to_string(),
            prompt_type: Some(PromptType::ImageGeneration),
            body: "a calm sunset over the sea".to_string(),
            negative_body: "blurry".to_string(),
            tags: vec!["art".to_string()],
            category: "image-generation".to_string(),
            ..Default::default()
        })
        .unwrap();
        record.created = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let id = record.id.clone();
        storage.add_record(record).unwrap();

        let mut viewer = DetailViewer::new(events);
        viewer.show(id.clone());
        (storage, viewer, id)
    }

    #[test]
    fn test_welcome_without_selection() {
        let (storage, mut viewer, _) = setup();
        viewer.clear();
        assert_eq!(viewer.render(&storage), ViewerContent::Welcome);

        viewer.show("deleted-id");
        assert_eq!(viewer.render(&storage), ViewerContent::Welcome);
    }

    #[test]
    fn test_structured_render() {
        let (storage, viewer, _) = setup();
        let ViewerContent::Structured(details) = viewer.render(&storage) else {
            panic!("expected structured view");
        };

        assert_eq!(details.type_label, "Image Generation");
        assert_eq!(details.created, "01/03/2024");
        assert_eq!(details.negative_body.as_deref(), Some("blurry"));
        assert_eq!(details.model, None);
        assert_eq!(details.word_count, 6);
        assert_eq!(details.category.as_deref(), Some("Image Generation"));
        assert!(!details.favorite);
    }

    #[test]
    fn test_raw_mode_and_copy() {
        let (storage, mut viewer, _) = setup();
        let mut clipboard = MemoryClipboard::default();

        assert!(viewer.copy(&storage, &mut clipboard));
        assert_eq!(clipboard.contents.as_deref(), Some("a calm sunset over the sea"));

        assert_eq!(viewer.toggle_mode(), ViewMode::Raw);
        assert!(matches!(viewer.render(&storage), ViewerContent::Raw { .. }));
        assert!(viewer.copy(&storage, &mut clipboard));
        assert!(clipboard.contents.unwrap().contains("negative_prompt: blurry"));
    }

    #[test]
    fn test_failed_copy_notifies() {
        let (storage, viewer, _) = setup();
        let rx = viewer.events.subscribe();
        let mut clipboard = MemoryClipboard {
            fail: true,
            ..Default::default()
        };

        assert!(!viewer.copy(&storage, &mut clipboard));
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::Notify(n) if n.severity == Severity::Error)));
    }

    #[test]
    fn test_delete_clears_and_notifies() {
        let (mut storage, mut viewer, id) = setup();
        storage.toggle_favorite(&id).unwrap();
        let rx = viewer.events.subscribe();

        assert!(viewer.delete(&mut storage).unwrap());
        assert!(storage.record(&id).is_none());
        assert!(!storage.is_favorite(&id));
        assert_eq!(viewer.selected(), None);
        assert!(rx.try_iter().any(|e| e == AppEvent::RecordDeleted(id.clone())));
        assert!(!viewer.delete(&mut storage).unwrap());
    }

    #[test]
    fn test_toggle_favorite_updates_both_sides() {
        let (mut storage, viewer, id) = setup();
        assert_eq!(viewer.toggle_favorite(&mut storage).unwrap(), Some(true));
        assert!(storage.record(&id).unwrap().favorite);
        assert!(storage.is_favorite(&id));

        assert_eq!(viewer.toggle_favorite(&mut storage).unwrap(), Some(false));
        assert!(storage.favorites().is_empty());
    }
}
