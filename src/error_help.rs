//! User-facing error messages with suggestions
//!
//! Plain strings with ANSI colors; callers decide where to print them.

use colored::*;
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};

use crate::error::{Error, ParseError, StoreError, ValidationError};

fn closest<'a>(needle: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<(&'a str, i64)> {
    let matcher = SkimMatcherV2::default();
    let mut suggestions: Vec<(&str, i64)> = candidates
        .filter_map(|c| matcher.fuzzy_match(c, needle).map(|score| (c, score)))
        .collect();
    suggestions.sort_by(|a, b| b.1.cmp(&a.1));
    suggestions
}

/// Format a "prompt not found" error with similar titles
pub fn format_prompt_not_found(query: &str, titles: &[String]) -> String {
    let mut message = format!("Error: Prompt '{}' not found\n\n", query)
        .red()
        .to_string();

    let suggestions = closest(query, titles.iter().map(String::as_str));
    if !suggestions.is_empty() {
        message.push_str(&"Did you mean one of these?\n".yellow().to_string());
        for (title, _) in suggestions.iter().take(3) {
            message.push_str(&format!("  - {}\n", title));
        }
        message.push('\n');
    }

    message.push_str(&format!(
        "Try '{}' to see the tree or '{}' to search.\n",
        "pshelf ls".cyan(),
        format!("pshelf find {}", query).cyan()
    ));

    message
}

/// Format a command typo error with suggestions
pub fn format_command_typo(command: &str, available_commands: &[&str]) -> String {
    let mut message = format!("Error: Unknown command '{}'\n\n", command)
        .red()
        .to_string();

    if command == "pshelf" {
        message.push_str(&format!(
            "{}\n\n",
            "Did you type 'pshelf pshelf'? Try removing the extra 'pshelf'.".yellow()
        ));
    } else {
        let suggestions = closest(command, available_commands.iter().copied());
        if let Some((best, score)) = suggestions.first() {
            if *score > 50 {
                message.push_str(&format!("Did you mean '{}'?\n\n", best).yellow().to_string());
            }
        }
    }

    message.push_str("Available commands:\n");
    for cmd in available_commands {
        message.push_str(&format!("  {}\n", cmd));
    }

    message.push_str(&format!(
        "\nRun '{}' for more information\n",
        "pshelf --help".cyan()
    ));

    message
}

/// Format an invalid file path error
pub fn format_file_not_found(path: &str) -> String {
    let mut message = format!("Error: File not found: '{}'\n\n", path)
        .red()
        .to_string();

    message.push_str("Please check:\n");
    message.push_str(&format!("  - Current directory: {}\n", "pwd".cyan()));
    message.push_str("  - Ensure the path is correct and the file exists\n");

    message
}

/// One line per rejected field
pub fn format_validation_error(error: &ValidationError) -> String {
    let mut message = "Error: The prompt is not valid\n\n".red().to_string();
    for field_error in &error.errors {
        message.push_str(&format!(
            "  - {}: {}\n",
            field_error.field.to_string().bold(),
            field_error.message
        ));
    }
    message
}

/// Format an unreadable import document
pub fn format_parse_error(source: &str, error: &ParseError) -> String {
    let mut message = format!("Error: Could not read '{}'\n{}\n\n", source, error)
        .red()
        .to_string();

    message.push_str("Accepted input:\n");
    message.push_str(&format!(
        "  - a file produced by {}\n",
        "pshelf export".cyan()
    ));
    message.push_str("  - a JSON or YAML list of prompts\n");
    message.push_str("  - a single prompt with at least a title\n");

    message
}

/// Format a full store
pub fn format_quota_error(needed: usize, available: usize) -> String {
    let mut message = format!(
        "Error: Not enough space in the prompt store ({} bytes needed, {} available)\n\n",
        needed, available
    )
    .red()
    .to_string();

    message.push_str("To fix this:\n");
    message.push_str(&format!("  - Drop old backups: {}\n", "pshelf backup list".cyan()));
    message.push_str(&format!(
        "  - Raise the limit: {}\n",
        "PSHELF_QUOTA_BYTES=10485760".cyan()
    ));

    message
}

/// Best message for a library error
pub fn describe(error: &Error) -> String {
    match error {
        Error::Validation(e) => format_validation_error(e),
        Error::Parse(e) => format_parse_error("input", e),
        Error::Store(StoreError::QuotaExceeded {
            needed, available, ..
        }) => format_quota_error(*needed, *available),
        other => format!("Error: {}", other).red().to_string(),
    }
}
