use anyhow::Result;
use colored::*;
use is_terminal::IsTerminal;
use std::io::{self, BufRead, Read, Write};

use crate::error::Error;
use crate::error_help;
use crate::kv::KeyValueStore;
use crate::record::PromptType;
use crate::storage::{SaveStatus, Storage};

/// An error whose text is already formatted for the terminal
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Reported(pub String);

/// Resolve a prompt by id, exact title or fuzzy title; returns its id
pub fn resolve_record<S: KeyValueStore>(storage: &Storage<S>, query: &str) -> Result<String> {
    match storage.resolve(query) {
        Ok(record) => Ok(record.id.clone()),
        Err(Error::NotFound(_)) => {
            let titles: Vec<String> = storage.records().iter().map(|r| r.title.clone()).collect();
            Err(Reported(error_help::format_prompt_not_found(query, &titles)).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask a y/N question on stdin
pub fn confirm(question: &str) -> Result<bool> {
    print!("{} ", format!("{} [y/N]", question).red());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Accepts the short forms `text` and `image` besides the stored names
pub fn parse_prompt_type(value: &str) -> Result<PromptType> {
    match value.trim().to_lowercase().as_str() {
        "text" | "txt" => Ok(PromptType::TextGeneration),
        "image" | "img" => Ok(PromptType::ImageGeneration),
        other => other.parse().map_err(|e: String| anyhow::anyhow!(e)),
    }
}

/// Piped stdin, or `None` when stdin is a terminal
pub fn read_piped_stdin() -> Result<Option<String>> {
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok((!buffer.trim().is_empty()).then_some(buffer))
}

/// Warn when a write was dropped because the store is full
pub fn warn_if_dropped(status: SaveStatus) {
    if !status.is_saved() {
        eprintln!(
            "{} The store is full: old backups were dropped and this change was not saved.",
            "Warning:".yellow().bold()
        );
        eprintln!("  Free space with {} or raise PSHELF_QUOTA_BYTES.", "pshelf backup list".cyan());
    }
}

pub fn elapsed_ms(start: std::time::Instant) -> u128 {
    start.elapsed().as_millis()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("nope"));
    }

    #[test]
    fn test_parse_prompt_type_short_forms() {
        assert_eq!(parse_prompt_type("text").unwrap(), PromptType::TextGeneration);
        assert_eq!(parse_prompt_type("Image").unwrap(), PromptType::ImageGeneration);
        assert_eq!(parse_prompt_type("code").unwrap(), PromptType::Code);
        assert!(parse_prompt_type("poem").is_err());
    }

    #[test]
    fn test_resolve_unknown_prompt_is_reported() {
        colored::control::set_override(false);
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "AI Code Review", "");

        assert!(resolve_record(&storage, "code rev").is_ok());
        let err = resolve_record(&storage, "zzz").unwrap_err();
        assert!(err.downcast_ref::<Reported>().is_some());
        assert!(err.to_string().contains("Prompt 'zzz' not found"));
    }
}
