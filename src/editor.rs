//! Create/edit form for a single record
//!
//! The form keeps every field as the text the user typed. Nothing reaches
//! [`Storage`] until [`EditorForm::submit`] has validated all fields at
//! once, so a rejected submit leaves the collections untouched.

use crate::error::{Error, Field, FieldError, ValidationError};
use crate::events::{AppEvent, EventBus, Severity};
use crate::kv::KeyValueStore;
use crate::record::{
    validate_fields, NewPrompt, PromptRecord, PromptType, PromptUpdate, COPY_MARKER,
    DEFAULT_VERSION, MAX_TAGS,
};
use crate::storage::Storage;

pub const UNSAVED_CHANGES: &str = "You have unsaved changes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Closed,
    NeedsConfirmation,
}

/// Editable inputs, in tab order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Title,
    Type,
    Body,
    NegativeBody,
    Model,
    Author,
    Tags,
    Notes,
    Version,
    Category,
}

impl FormField {
    pub const ALL: [FormField; 10] = [
        FormField::Title,
        FormField::Type,
        FormField::Body,
        FormField::NegativeBody,
        FormField::Model,
        FormField::Author,
        FormField::Tags,
        FormField::Notes,
        FormField::Version,
        FormField::Category,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Title => "Title",
            FormField::Type => "Type",
            FormField::Body => "Prompt",
            FormField::NegativeBody => "Negative prompt",
            FormField::Model => "Model",
            FormField::Author => "Author",
            FormField::Tags => "Tags",
            FormField::Notes => "Notes",
            FormField::Version => "Version",
            FormField::Category => "Category",
        }
    }

    /// Record field a validation message for this input refers to
    pub fn validated_as(&self) -> Option<Field> {
        match self {
            FormField::Title => Some(Field::Title),
            FormField::Type => Some(Field::Type),
            FormField::Body => Some(Field::Body),
            FormField::Version => Some(Field::Version),
            FormField::Tags => Some(Field::Tags),
            _ => None,
        }
    }
}

/// Split on commas, trim, drop empties, keep at most [`MAX_TAGS`]
pub fn parse_tags(text: &str) -> Vec<String> {
    let mut tags = split_tags(text);
    tags.truncate(MAX_TAGS);
    tags
}

fn split_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct EditorForm {
    mode: EditorMode,
    pub title: String,
    /// Type id or label as typed; empty means not chosen
    pub prompt_type: String,
    pub body: String,
    pub negative_body: String,
    pub model: String,
    pub author: String,
    pub tags: String,
    pub notes: String,
    pub version: String,
    pub category: String,
    pub favorite: bool,
    dirty: bool,
    errors: Vec<FieldError>,
    events: EventBus,
}

impl EditorForm {
    fn blank(mode: EditorMode, events: EventBus) -> Self {
        Self {
            mode,
            title: String::new(),
            prompt_type: PromptType::default().as_str().to_string(),
            body: String::new(),
            negative_body: String::new(),
            model: String::new(),
            author: String::new(),
            tags: String::new(),
            notes: String::new(),
            version: DEFAULT_VERSION.to_string(),
            category: String::new(),
            favorite: false,
            dirty: false,
            errors: Vec::new(),
            events,
        }
    }

    fn prefill(&mut self, record: &PromptRecord) {
        self.title = record.title.clone();
        self.prompt_type = record.prompt_type.as_str().to_string();
        self.body = record.body.clone();
        self.negative_body = record.negative_body.clone();
        self.model = record.model.clone();
        self.author = record.author.clone();
        self.tags = record.tags.join(", ");
        self.notes = record.notes.clone();
        self.version = record.version.clone();
        self.category = record.category.clone();
        self.favorite = record.favorite;
    }

    /// Empty form, optionally filed under `category` already
    pub fn open_new(category: Option<&str>, events: EventBus) -> Self {
        let mut form = Self::blank(EditorMode::Create, events);
        if let Some(category) = category {
            form.category = category.to_string();
        }
        form
    }

    pub fn open_edit(record: &PromptRecord, events: EventBus) -> Self {
        let mut form = Self::blank(EditorMode::Edit(record.id.clone()), events);
        form.prefill(record);
        form
    }

    /// Creation form prefilled from an existing record
    pub fn open_duplicate(record: &PromptRecord, events: EventBus) -> Self {
        let mut form = Self::blank(EditorMode::Create, events);
        form.prefill(record);
        form.title = format!("{}{}", record.title, COPY_MARKER);
        form
    }

    pub fn mode(&self) -> &EditorMode {
        &self.mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Messages to show next to one input
    pub fn errors_for(&self, field: FormField) -> Vec<&str> {
        match field.validated_as() {
            Some(wanted) => self
                .errors
                .iter()
                .filter(|e| e.field == wanted)
                .map(|e| e.message.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Title => &self.title,
            FormField::Type => &self.prompt_type,
            FormField::Body => &self.body,
            FormField::NegativeBody => &self.negative_body,
            FormField::Model => &self.model,
            FormField::Author => &self.author,
            FormField::Tags => &self.tags,
            FormField::Notes => &self.notes,
            FormField::Version => &self.version,
            FormField::Category => &self.category,
        }
    }

    fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Title => &mut self.title,
            FormField::Type => &mut self.prompt_type,
            FormField::Body => &mut self.body,
            FormField::NegativeBody => &mut self.negative_body,
            FormField::Model => &mut self.model,
            FormField::Author => &mut self.author,
            FormField::Tags => &mut self.tags,
            FormField::Notes => &mut self.notes,
            FormField::Version => &mut self.version,
            FormField::Category => &mut self.category,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        *self.value_mut(field) = value.into();
        self.dirty = true;
    }

    pub fn push_char(&mut self, field: FormField, c: char) {
        self.value_mut(field).push(c);
        self.dirty = true;
    }

    pub fn pop_char(&mut self, field: FormField) {
        if self.value_mut(field).pop().is_some() {
            self.dirty = true;
        }
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.favorite = favorite;
        self.dirty = true;
    }

    /// Step the type selector to the next value
    pub fn cycle_type(&mut self) {
        let next = match self.parsed_type() {
            Some(current) => {
                let idx = PromptType::ALL
                    .iter()
                    .position(|t| *t == current)
                    .unwrap_or(0);
                PromptType::ALL[(idx + 1) % PromptType::ALL.len()]
            }
            None => PromptType::default(),
        };
        self.set(FormField::Type, next.as_str());
    }

    fn parsed_type(&self) -> Option<PromptType> {
        self.prompt_type.parse().ok()
    }

    /// The negative prompt input only applies to image prompts
    pub fn negative_body_visible(&self) -> bool {
        self.parsed_type() == Some(PromptType::ImageGeneration)
    }

    pub fn visible_fields(&self) -> Vec<FormField> {
        FormField::ALL
            .into_iter()
            .filter(|f| *f != FormField::NegativeBody || self.negative_body_visible())
            .collect()
    }

    /// Check every input; the result is also kept for display
    pub fn validate(&mut self) -> Vec<FieldError> {
        let prompt_type = self.parsed_type();
        let mut errors = validate_fields(
            &self.title,
            prompt_type,
            &self.body,
            self.version.trim(),
            split_tags(&self.tags).len(),
        );
        if prompt_type.is_none() && !self.prompt_type.trim().is_empty() {
            errors.retain(|e| e.field != Field::Type);
            errors.push(FieldError::new(
                Field::Type,
                format!("unknown type '{}'", self.prompt_type.trim()),
            ));
        }
        self.errors = errors.clone();
        errors
    }

    /// Validate, then create or update the record; returns its id
    pub fn submit<S: KeyValueStore>(&mut self, storage: &mut Storage<S>) -> Result<String, Error> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(ValidationError { errors }.into());
        }

        let prompt_type = self.parsed_type();
        let negative_body = if self.negative_body_visible() {
            self.negative_body.clone()
        } else {
            String::new()
        };

        let (id, event) = match &self.mode {
            EditorMode::Create => {
                let record = PromptRecord::create(NewPrompt {
                    title: self.title.clone(),
                    prompt_type,
                    body: self.body.clone(),
                    negative_body,
                    model: self.model.clone(),
                    author: self.author.clone(),
                    tags: parse_tags(&self.tags),
                    notes: self.notes.clone(),
                    version: Some(self.version.trim().to_string()),
                    category: self.category.clone(),
                    favorite: self.favorite,
                })?;
                let id = record.id.clone();
                storage.add_record(record)?;
                (id.clone(), AppEvent::RecordCreated(id))
            }
            EditorMode::Edit(id) => {
                storage.update_record(
                    id,
                    PromptUpdate {
                        title: Some(self.title.clone()),
                        prompt_type,
                        body: Some(self.body.clone()),
                        negative_body: Some(negative_body),
                        model: Some(self.model.clone()),
                        author: Some(self.author.clone()),
                        tags: Some(parse_tags(&self.tags)),
                        notes: Some(self.notes.clone()),
                        version: Some(self.version.clone()),
                        category: Some(self.category.clone()),
                        favorite: Some(self.favorite),
                    },
                )?;
                (id.clone(), AppEvent::RecordUpdated(id.clone()))
            }
        };

        tracing::debug!(id = %id, "Editor saved");
        self.dirty = false;
        self.events.emit(event);
        self.events.notify(Severity::Success, "Prompt saved");
        Ok(id)
    }

    pub fn request_close(&self) -> CloseDecision {
        if self.dirty {
            CloseDecision::NeedsConfirmation
        } else {
            CloseDecision::Closed
        }
    }

    /// Message for an exit attempt while edits are pending
    pub fn unload_guard(&self) -> Option<&'static str> {
        self.dirty.then_some(UNSAVED_CHANGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn storage() -> Storage<MemoryStore> {
        let mut storage = Storage::new(MemoryStore::default(), EventBus::new());
        storage.load();
        storage
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags(" a, b ,, c ,"), vec!["a", "b", "c"]);
        assert!(parse_tags("  ").is_empty());
        let many: String = (0..25).map(|i| format!("t{},", i)).collect();
        assert_eq!(parse_tags(&many).len(), MAX_TAGS);
    }

    #[test]
    fn test_validation_collects_everything() {
        let mut form = EditorForm::open_new(None, EventBus::new());
        form.set(FormField::Type, "");
        form.set(FormField::Version, "one");
        let many: String = (0..21).map(|i| format!("t{},", i)).collect();
        form.set(FormField::Tags, many);

        let errors = form.validate();
        let fields: Vec<Field> = errors.iter().map(|e| e.field).collect();
        for expected in [Field::Title, Field::Type, Field::Body, Field::Version, Field::Tags] {
            assert!(fields.contains(&expected), "missing {}", expected);
        }
        assert_eq!(form.errors_for(FormField::Title).len(), 1);
        assert!(form.errors_for(FormField::Model).is_empty());
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let mut form = EditorForm::open_new(None, EventBus::new());
        form.set(FormField::Title, "t");
        form.set(FormField::Body, "b");
        form.set(FormField::Type, "poem");
        let errors = form.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("poem"));
    }

    #[test]
    fn test_negative_body_only_for_images() {
        let mut form = EditorForm::open_new(None, EventBus::new());
        assert!(!form.negative_body_visible());
        assert!(!form.visible_fields().contains(&FormField::NegativeBody));

        form.set(FormField::Type, "image-generation");
        assert!(form.negative_body_visible());
        assert!(form.visible_fields().contains(&FormField::NegativeBody));
    }

    #[test]
    fn test_cycle_type() {
        let mut form = EditorForm::open_new(None, EventBus::new());
        form.cycle_type();
        assert_eq!(form.prompt_type, "image-generation");
        for _ in 0..3 {
            form.cycle_type();
        }
        assert_eq!(form.prompt_type, "text-generation");
    }

    #[test]
    fn test_create_flow() {
        let mut storage = storage();
        let events = EventBus::new();
        let rx = events.subscribe();
        let mut form = EditorForm::open_new(Some("creative"), events);

        assert_eq!(form.request_close(), CloseDecision::Closed);
        form.set(FormField::Title, "Haiku");
        form.set(FormField::Body, "Write a haiku about rust");
        form.set(FormField::Tags, "poetry, short");
        form.set(FormField::NegativeBody, "ignored for text prompts");
        form.set_favorite(true);
        assert_eq!(form.request_close(), CloseDecision::NeedsConfirmation);
        assert_eq!(form.unload_guard(), Some(UNSAVED_CHANGES));

        let id = form.submit(&mut storage).unwrap();
        let record = storage.record(&id).unwrap();
        assert_eq!(record.category, "creative");
        assert_eq!(record.tags, vec!["poetry", "short"]);
        assert_eq!(record.negative_body, "");
        assert!(storage.is_favorite(&id));
        assert!(!form.is_dirty());
        assert!(rx.try_iter().any(|e| e == AppEvent::RecordCreated(id.clone())));
    }

    #[test]
    fn test_invalid_submit_changes_nothing() {
        let mut storage = storage();
        let mut form = EditorForm::open_new(None, EventBus::new());
        form.set(FormField::Body, "no title");

        assert!(matches!(form.submit(&mut storage), Err(Error::Validation(_))));
        assert!(storage.records().is_empty());
        assert!(form.is_dirty());
    }

    #[test]
    fn test_edit_flow() {
        let mut storage = storage();
        let record = PromptRecord::create(NewPrompt {
            title: "Recruiter".to_string(),
            prompt_type: Some(PromptType::TextGeneration),
            body: "Write a recruiting message".to_string(),
            tags: vec!["hr".to_string()],
            ..Default::default()
        })
        .unwrap();
        let id = record.id.clone();
        storage.add_record(record.clone()).unwrap();

        let events = EventBus::new();
        let rx = events.subscribe();
        let mut form = EditorForm::open_edit(&record, events);
        assert_eq!(form.tags, "hr");
        assert!(!form.is_dirty());

        form.set(FormField::Title, "Recruiter v2");
        assert_eq!(form.submit(&mut storage).unwrap(), id);
        assert_eq!(storage.record(&id).unwrap().title, "Recruiter v2");
        assert_eq!(storage.records().len(), 1);
        assert!(rx.try_iter().any(|e| e == AppEvent::RecordUpdated(id.clone())));
    }

    #[test]
    fn test_duplicate_form_creates_new_record() {
        let mut storage = storage();
        let record = PromptRecord::create(NewPrompt {
            title: "Base".to_string(),
            prompt_type: Some(PromptType::Code),
            body: "fn main() {}".to_string(),
            ..Default::default()
        })
        .unwrap();
        storage.add_record(record.clone()).unwrap();

        let mut form = EditorForm::open_duplicate(&record, EventBus::new());
        assert_eq!(form.mode(), &EditorMode::Create);
        let id = form.submit(&mut storage).unwrap();
        assert_ne!(id, record.id);
        assert_eq!(storage.record(&id).unwrap().title, "Base (copia)");
    }
}
