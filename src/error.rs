//! Error types shared by the library modules
//!
//! Command handlers and `main` work with `anyhow::Result`; the library layers
//! below them return these typed errors so callers can tell a validation
//! failure apart from a broken store.

use std::fmt;
use thiserror::Error;

/// Field of a prompt record a validation failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Type,
    Body,
    Version,
    Tags,
    Created,
    Modified,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Type => "type",
            Field::Body => "prompt",
            Field::Version => "version",
            Field::Tags => "tags",
            Field::Created => "created",
            Field::Modified => "modified",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violated constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every constraint a record violates, collected in one pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", join_errors(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn has(&self, field: Field) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn for_field(&self, field: Field) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.field == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Malformed serialized input
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized format: not valid JSON ({json}) nor YAML ({yaml})")]
    Unrecognized { json: String, yaml: String },
    #[error("unexpected document shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Failures of the underlying key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: writing '{key}' needs {needed} bytes, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Any failure of a persistence-layer mutation
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError {
            errors: vec![
                FieldError::new(Field::Title, "required"),
                FieldError::new(Field::Version, "must look like 1.0 or 1.0.0"),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("title: required"));
        assert!(message.contains("version: must look like"));
        assert!(err.has(Field::Title));
        assert!(!err.has(Field::Body));
    }

    #[test]
    fn test_quota_detection() {
        let err = StoreError::QuotaExceeded {
            key: "k".to_string(),
            needed: 10,
            available: 2,
        };
        assert!(err.is_quota());
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!io.is_quota());
    }
}
