// Import and export commands

use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use super::common::{confirm, elapsed_ms, resolve_record, warn_if_dropped, Reported};
use crate::error::Error;
use crate::error_help;
use crate::kv::KeyValueStore;
use crate::storage::{ExportFormat, ImportSummary, Storage};

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn parse_format(format: Option<&str>) -> Result<Option<ExportFormat>> {
    format
        .map(|f| f.parse::<ExportFormat>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }

    let file = expand(path);
    if !file.exists() {
        return Err(Reported(error_help::format_file_not_found(path)).into());
    }
    fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Swap a parse failure for the guided message naming the source
fn explain(source: &str, error: Error) -> anyhow::Error {
    match error {
        Error::Parse(e) => Reported(error_help::format_parse_error(source, &e)).into(),
        other => other.into(),
    }
}

fn print_summary(summary: &ImportSummary) {
    println!("✓ Imported {} prompts", summary.imported.to_string().bold());
    if summary.skipped > 0 {
        println!(
            "  {} already present, skipped",
            summary.skipped.to_string().yellow()
        );
    }
    if !summary.errors.is_empty() {
        println!("  {} entries could not be read:", summary.errors.len().to_string().red());
        for error in &summary.errors {
            println!("    - {}", error.dimmed());
        }
    }
    warn_if_dropped(summary.status);
}

#[allow(clippy::too_many_arguments)]
pub fn handle_import<S: KeyValueStore>(
    storage: &mut Storage<S>,
    path: &str,
    replace: bool,
    format: Option<&str>,
    single: bool,
    yes: bool,
    start: Instant,
) -> Result<()> {
    let text = read_input(path)?;

    if single {
        let id = storage.import_record(&text).map_err(|e| explain(path, e))?;
        let title = storage.record(&id).map(|r| r.title.clone()).unwrap_or_default();
        println!("✓ Imported {} ({}ms)", title.bold(), elapsed_ms(start));
        return Ok(());
    }

    let format = match parse_format(format)? {
        Some(format) => Some(format),
        None if path != "-" => ExportFormat::from_path(&expand(path)),
        None => None,
    };

    if replace && !yes {
        println!(
            "{}",
            "Replacing deletes every prompt and folder you have now (backups are kept).".yellow()
        );
        if !confirm("Replace all data?")? {
            println!("Import cancelled");
            return Ok(());
        }
    }

    let summary = storage
        .import_all(&text, format, !replace)
        .map_err(|e| explain(path, e))?;
    print_summary(&summary);
    println!("({}ms)", elapsed_ms(start));
    Ok(())
}

/// Text of a full export, or of one prompt when `prompt` is given
pub fn export_text<S: KeyValueStore>(
    storage: &Storage<S>,
    format: ExportFormat,
    prompt: Option<&str>,
) -> Result<String> {
    match prompt {
        None => Ok(storage.export_all(format)?),
        Some(query) => {
            let id = resolve_record(storage, query)?;
            match format {
                ExportFormat::Yaml => Ok(storage.export_record(&id)?),
                ExportFormat::Json => {
                    let record = storage
                        .record(&id)
                        .ok_or_else(|| Error::NotFound(format!("prompt '{}'", id)))?;
                    Ok(serde_json::to_string_pretty(&record.to_plain())?)
                }
            }
        }
    }
}

pub fn handle_export<S: KeyValueStore>(
    storage: &Storage<S>,
    path: Option<&str>,
    format: Option<&str>,
    prompt: Option<&str>,
    start: Instant,
) -> Result<()> {
    let explicit = parse_format(format)?;
    let format = explicit
        .or_else(|| path.and_then(|p| ExportFormat::from_path(&expand(p))))
        .unwrap_or(if prompt.is_some() {
            ExportFormat::Yaml
        } else {
            ExportFormat::Json
        });

    let text = export_text(storage, format, prompt)?;

    match path {
        None => print!("{}", text),
        Some(path) => {
            let file = expand(path);
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&file, &text)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!(
                "✓ Exported {} prompts to {} ({}ms)",
                if prompt.is_some() { 1 } else { storage.records().len() },
                file.display(),
                elapsed_ms(start)
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::common::fixtures;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("shelf.yaml");
        let file = file.to_str().unwrap();

        let mut source = fixtures::storage();
        fixtures::add(&mut source, "Recruiter", "productivity");
        fixtures::add(&mut source, "Java Review", "linguaggi/java");
        handle_export(&source, Some(file), None, None, Instant::now()).unwrap();
        assert!(fs::read_to_string(file).unwrap().contains("Recruiter"));

        let mut target = fixtures::storage();
        handle_import(&mut target, file, false, None, false, true, Instant::now()).unwrap();
        assert_eq!(target.records().len(), 2);

        // Same ids again: everything is skipped
        handle_import(&mut target, file, false, None, false, true, Instant::now()).unwrap();
        assert_eq!(target.records().len(), 2);
    }

    #[test]
    fn test_single_prompt_export_is_yaml() {
        let mut storage = fixtures::storage();
        fixtures::add(&mut storage, "Recruiter", "");
        let text = export_text(&storage, ExportFormat::Yaml, Some("recruiter")).unwrap();
        assert!(text.contains("title: Recruiter"));

        let json = export_text(&storage, ExportFormat::Json, Some("recruiter")).unwrap();
        assert!(json.trim_start().starts_with('{'));
    }

    #[test]
    fn test_import_missing_file_is_reported() {
        colored::control::set_override(false);
        let mut storage = fixtures::storage();
        let err = handle_import(
            &mut storage,
            "/no/such/shelf.json",
            false,
            None,
            false,
            true,
            Instant::now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_unreadable_import_is_explained() {
        colored::control::set_override(false);
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("broken.json");
        fs::write(&file, "{ not json").unwrap();

        let mut storage = fixtures::storage();
        let err = handle_import(
            &mut storage,
            file.to_str().unwrap(),
            false,
            None,
            false,
            true,
            Instant::now(),
        )
        .unwrap_err();
        assert!(err.downcast_ref::<Reported>().is_some());
        assert!(err.to_string().contains("Accepted input"));
    }
}
