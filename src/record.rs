//! Prompt record model
//!
//! A [`PromptRecord`] is the unit everything else in PromptShelf stores,
//! lists and searches. Records are always valid once constructed: every
//! entry point (creation, partial update, JSON or YAML parsing) runs the same
//! rule set and reports all violations at once through [`ValidationError`].

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Field, FieldError, ParseError, ValidationError};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 10_000;
pub const MAX_TAGS: usize = 20;
pub const DEFAULT_VERSION: &str = "1.0";
pub const COPY_MARKER: &str = " (copia)";

const DATE_FORMAT: &str = "%Y-%m-%d";

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("version pattern is valid"));

/// Kind of generation a prompt targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptType {
    #[default]
    TextGeneration,
    ImageGeneration,
    Code,
    Other,
}

impl PromptType {
    pub const ALL: [PromptType; 4] = [
        PromptType::TextGeneration,
        PromptType::ImageGeneration,
        PromptType::Code,
        PromptType::Other,
    ];

    /// Stable identifier used in serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::TextGeneration => "text-generation",
            PromptType::ImageGeneration => "image-generation",
            PromptType::Code => "code",
            PromptType::Other => "other",
        }
    }

    /// Human-readable label, also searchable
    pub fn label(&self) -> &'static str {
        match self {
            PromptType::TextGeneration => "Text Generation",
            PromptType::ImageGeneration => "Image Generation",
            PromptType::Code => "Code",
            PromptType::Other => "Other",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            PromptType::TextGeneration => "📝",
            PromptType::ImageGeneration => "🖼",
            PromptType::Code => "💻",
            PromptType::Other => "📄",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PromptType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted) || t.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown prompt type '{}'", wanted))
    }
}

/// A stored prompt with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPrompt", into = "RawPrompt")]
pub struct PromptRecord {
    pub id: String,
    pub title: String,
    pub prompt_type: PromptType,
    pub body: String,
    pub negative_body: String,
    pub model: String,
    pub author: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub version: String,
    pub created: NaiveDate,
    pub modified: NaiveDate,
    pub category: String,
    pub favorite: bool,
}

/// Fields accepted when creating a record
#[derive(Debug, Clone, Default)]
pub struct NewPrompt {
    pub title: String,
    pub prompt_type: Option<PromptType>,
    pub body: String,
    pub negative_body: String,
    pub model: String,
    pub author: String,
    pub tags: Vec<String>,
    pub notes: String,
    /// `None` falls back to [`DEFAULT_VERSION`]
    pub version: Option<String>,
    pub category: String,
    pub favorite: bool,
}

/// Typed partial update: only these fields can be changed after creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptUpdate {
    pub title: Option<String>,
    pub prompt_type: Option<PromptType>,
    pub body: Option<String>,
    pub negative_body: Option<String>,
    pub model: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub version: Option<String>,
    pub category: Option<String>,
    pub favorite: Option<bool>,
}

impl PromptUpdate {
    pub fn is_empty(&self) -> bool {
        *self == PromptUpdate::default()
    }
}

/// Run the record rule set against loose field values
///
/// Shared by record construction and the editor form so both report the
/// same messages.
pub fn validate_fields(
    title: &str,
    prompt_type: Option<PromptType>,
    body: &str,
    version: &str,
    tag_count: usize,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if title.trim().is_empty() {
        errors.push(FieldError::new(Field::Title, "title is required"));
    } else if title.chars().count() > MAX_TITLE_CHARS {
        errors.push(FieldError::new(
            Field::Title,
            format!("title must be at most {} characters", MAX_TITLE_CHARS),
        ));
    }

    if prompt_type.is_none() {
        errors.push(FieldError::new(Field::Type, "type is required"));
    }

    if body.trim().is_empty() {
        errors.push(FieldError::new(Field::Body, "prompt text is required"));
    } else if body.chars().count() > MAX_BODY_CHARS {
        errors.push(FieldError::new(
            Field::Body,
            format!("prompt text must be at most {} characters", MAX_BODY_CHARS),
        ));
    }

    if !version.is_empty() && !VERSION_PATTERN.is_match(version) {
        errors.push(FieldError::new(
            Field::Version,
            "version must look like 1.0 or 1.0.0",
        ));
    }

    if tag_count > MAX_TAGS {
        errors.push(FieldError::new(
            Field::Tags,
            format!("at most {} tags are allowed", MAX_TAGS),
        ));
    }

    errors
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl PromptRecord {
    /// Build a new record, stamping id and dates
    pub fn create(fields: NewPrompt) -> Result<Self, ValidationError> {
        let version = fields
            .version
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        let errors = validate_fields(
            &fields.title,
            fields.prompt_type,
            &fields.body,
            &version,
            fields.tags.len(),
        );
        if !errors.is_empty() {
            return Err(ValidationError { errors });
        }

        let now = today();
        Ok(Self {
            id: new_id(),
            title: fields.title.trim().to_string(),
            prompt_type: fields.prompt_type.unwrap_or_default(),
            body: fields.body,
            negative_body: fields.negative_body,
            model: fields.model.trim().to_string(),
            author: fields.author.trim().to_string(),
            tags: fields.tags,
            notes: fields.notes,
            version,
            created: now,
            modified: now,
            category: fields.category.trim().to_string(),
            favorite: fields.favorite,
        })
    }

    /// Apply a partial update in place
    ///
    /// The modified date is refreshed. When the result would be invalid the
    /// record is left untouched.
    pub fn update(&mut self, changes: PromptUpdate) -> Result<(), ValidationError> {
        let mut next = self.clone();

        if let Some(title) = changes.title {
            next.title = title.trim().to_string();
        }
        if let Some(prompt_type) = changes.prompt_type {
            next.prompt_type = prompt_type;
        }
        if let Some(body) = changes.body {
            next.body = body;
        }
        if let Some(negative_body) = changes.negative_body {
            next.negative_body = negative_body;
        }
        if let Some(model) = changes.model {
            next.model = model.trim().to_string();
        }
        if let Some(author) = changes.author {
            next.author = author.trim().to_string();
        }
        if let Some(tags) = changes.tags {
            next.tags = tags;
        }
        if let Some(notes) = changes.notes {
            next.notes = notes;
        }
        if let Some(version) = changes.version {
            next.version = version.trim().to_string();
        }
        if let Some(category) = changes.category {
            next.category = category.trim().to_string();
        }
        if let Some(favorite) = changes.favorite {
            next.favorite = favorite;
        }

        next.validate()?;
        next.modified = today();
        *self = next;
        Ok(())
    }

    /// Check the invariants of an already-built record
    pub fn validate(&self) -> Result<(), ValidationError> {
        let errors = validate_fields(
            &self.title,
            Some(self.prompt_type),
            &self.body,
            &self.version,
            self.tags.len(),
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Copy with a fresh id and a marked title
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_id(),
            title: format!("{}{}", self.title, COPY_MARKER),
            ..self.clone()
        }
    }

    pub fn type_label(&self) -> &'static str {
        self.prompt_type.label()
    }

    pub fn char_count(&self) -> usize {
        self.body.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// First line of the body, shortened for list display
    pub fn summary(&self, max_chars: usize) -> String {
        let first_line = self.body.lines().next().unwrap_or("").trim();
        if first_line.chars().count() <= max_chars {
            first_line.to_string()
        } else {
            let cut: String = first_line.chars().take(max_chars).collect();
            format!("{}...", cut.trim_end())
        }
    }

    pub fn to_plain(&self) -> serde_json::Value {
        serde_json::to_value(RawPrompt::from(self.clone())).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_plain(value: serde_json::Value) -> Result<Self, ParseError> {
        let raw: RawPrompt = serde_json::from_value(value)?;
        Ok(Self::try_from(raw)?)
    }

    pub fn to_yaml(&self) -> Result<String, ParseError> {
        Ok(serde_yaml::to_string(&RawPrompt::from(self.clone()))?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ParseError> {
        let raw: RawPrompt = serde_yaml::from_str(text)?;
        Ok(Self::try_from(raw)?)
    }

    /// Case-insensitive substring match over every searchable field
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }

        [
            self.title.as_str(),
            self.body.as_str(),
            self.notes.as_str(),
            self.author.as_str(),
            self.model.as_str(),
            self.type_label(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&q))
            || self.tags.join(" ").to_lowercase().contains(&q)
    }

    /// Heuristic 0-100 ranking used to order search results
    pub fn relevance_score(&self, query: &str) -> u32 {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return 0;
        }

        let mut score = 0;
        let title = self.title.to_lowercase();
        if title.contains(&q) {
            score += 50;
            if title.starts_with(&q) {
                score += 25;
            }
        }
        if self.body.to_lowercase().contains(&q) {
            score += 20;
        }
        if self.tags.join(" ").to_lowercase().contains(&q) {
            score += 15;
        }
        for field in [&self.notes, &self.author, &self.model] {
            if field.to_lowercase().contains(&q) {
                score += 5;
            }
        }

        score.min(100)
    }
}

/// Wire shape of a record; loose so that parsing can report every problem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPrompt {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "type")]
    prompt_type: String,
    #[serde(default, rename = "prompt")]
    body: String,
    #[serde(default, rename = "negative_prompt", skip_serializing_if = "String::is_empty")]
    negative_body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    notes: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    modified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    category: String,
    #[serde(default)]
    favorite: bool,
}

/// Hand-written documents often carry `version: 1.0` unquoted
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Text(text) => text,
        Loose::Number(number) => number.to_string(),
    })
}

impl From<PromptRecord> for RawPrompt {
    fn from(record: PromptRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            prompt_type: record.prompt_type.as_str().to_string(),
            body: record.body,
            negative_body: record.negative_body,
            model: record.model,
            author: record.author,
            tags: record.tags,
            notes: record.notes,
            version: record.version,
            created: record.created.format(DATE_FORMAT).to_string(),
            modified: record.modified.format(DATE_FORMAT).to_string(),
            category: record.category,
            favorite: record.favorite,
        }
    }
}

fn parse_date(value: &str, field: Field, errors: &mut Vec<FieldError>) -> NaiveDate {
    let value = value.trim();
    if value.is_empty() {
        return today();
    }
    // Full timestamps are accepted too; only the calendar date is kept
    let parsed = NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|t| t.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.date())
        });
    match parsed {
        Some(date) => date,
        None => {
            errors.push(FieldError::new(
                field,
                format!("'{}' is not a valid YYYY-MM-DD date", value),
            ));
            today()
        }
    }
}

impl TryFrom<RawPrompt> for PromptRecord {
    type Error = ValidationError;

    fn try_from(raw: RawPrompt) -> Result<Self, Self::Error> {
        let prompt_type = if raw.prompt_type.trim().is_empty() {
            None
        } else {
            raw.prompt_type.parse::<PromptType>().ok()
        };

        let mut errors = validate_fields(
            &raw.title,
            prompt_type,
            &raw.body,
            raw.version.trim(),
            raw.tags.len(),
        );
        if prompt_type.is_none() && !raw.prompt_type.trim().is_empty() {
            errors.retain(|e| e.field != Field::Type);
            errors.push(FieldError::new(
                Field::Type,
                format!("unknown prompt type '{}'", raw.prompt_type.trim()),
            ));
        }

        let created = parse_date(&raw.created, Field::Created, &mut errors);
        let modified = parse_date(&raw.modified, Field::Modified, &mut errors);

        if !errors.is_empty() {
            return Err(ValidationError { errors });
        }

        Ok(Self {
            id: if raw.id.trim().is_empty() {
                new_id()
            } else {
                raw.id
            },
            title: raw.title.trim().to_string(),
            prompt_type: prompt_type.unwrap_or_default(),
            body: raw.body,
            negative_body: raw.negative_body,
            model: raw.model,
            author: raw.author,
            tags: raw.tags,
            notes: raw.notes,
            version: raw.version.trim().to_string(),
            created,
            modified,
            category: raw.category.trim().to_string(),
            favorite: raw.favorite,
        })
    }
}
