// Prompt commands: new, show, edit, delete, dup, fav, mv

use anyhow::{Context, Result};
use colored::*;
use is_terminal::IsTerminal;
use std::time::Instant;

use super::common::{
    confirm, elapsed_ms, parse_prompt_type, read_piped_stdin, resolve_record, warn_if_dropped,
};
use crate::category;
use crate::cli::RecordFields;
use crate::clipboard::Clipboard;
use crate::config::EditorConfig;
use crate::edit::edit_content;
use crate::editor::parse_tags;
use crate::error::Error;
use crate::kv::KeyValueStore;
use crate::record::{NewPrompt, PromptRecord, PromptUpdate};
use crate::storage::Storage;
use crate::viewer::{DetailViewer, RecordDetails, ViewerContent};

/// Create the folder a record points at when it does not exist yet
fn ensure_category<S: KeyValueStore>(storage: &mut Storage<S>, path: &str) -> Result<String> {
    let path = category::normalize_path(path);
    if category::is_reserved(&path) {
        anyhow::bail!(
            "'{}' is not a folder; use --fav to star a prompt",
            category::FAVORITES_PATH
        );
    }
    if !path.is_empty() && !storage.categories().contains(&path) {
        storage.add_category(&path, None, None, None)?;
        println!("{} Created folder {}", "📁".dimmed(), path.bold());
    }
    Ok(path)
}

pub fn handle_new<S: KeyValueStore>(
    storage: &mut Storage<S>,
    title: &str,
    fields: RecordFields,
    edit: bool,
    editor: &EditorConfig,
    start: Instant,
) -> Result<()> {
    let prompt_type = fields
        .prompt_type
        .as_deref()
        .map(parse_prompt_type)
        .transpose()?
        .unwrap_or_default();

    let mut body = match fields.body {
        Some(body) => body,
        None if edit => String::new(),
        None => read_piped_stdin()?.unwrap_or_default(),
    };
    if edit {
        body = edit_content(&body, editor, ".md")?;
    }

    let fallback = storage.settings().default_category.clone();
    let category = match fields.category.as_deref() {
        Some(path) => ensure_category(storage, path)?,
        None if fallback.is_empty() => String::new(),
        None => ensure_category(storage, &fallback)?,
    };

    let record = PromptRecord::create(NewPrompt {
        title: title.to_string(),
        prompt_type: Some(prompt_type),
        body,
        negative_body: fields.negative.unwrap_or_default(),
        model: fields.model.unwrap_or_default(),
        author: fields.author.unwrap_or_default(),
        tags: fields.tags.as_deref().map(parse_tags).unwrap_or_default(),
        notes: fields.notes.unwrap_or_default(),
        version: fields.version,
        category,
        favorite: fields.favorite,
    })
    .map_err(Error::from)?;

    let id = record.id.clone();
    let status = storage.add_record(record)?;
    warn_if_dropped(status);

    println!(
        "✓ Created {} {} ({}ms)",
        title.bold(),
        format!("[{}]", &id[..8.min(id.len())]).dimmed(),
        elapsed_ms(start)
    );
    Ok(())
}

fn print_details(details: &RecordDetails) {
    let star = if details.favorite { " ★" } else { "" };
    println!(
        "\n{} {}{}",
        details.type_icon,
        details.title.bold(),
        star.yellow()
    );
    println!("{}", "─".repeat(50).dimmed());

    println!("  {:<10} {}", "Type:".dimmed(), details.type_label);
    if let Some(category) = &details.category {
        println!("  {:<10} {}", "Folder:".dimmed(), category);
    }
    if let Some(model) = &details.model {
        println!("  {:<10} {}", "Model:".dimmed(), model);
    }
    if let Some(author) = &details.author {
        println!("  {:<10} {}", "Author:".dimmed(), author);
    }
    println!("  {:<10} {}", "Version:".dimmed(), details.version);
    println!(
        "  {:<10} {} (modified {})",
        "Created:".dimmed(),
        details.created,
        details.modified
    );
    if !details.tags.is_empty() {
        let tags: Vec<String> = details.tags.iter().map(|t| format!("#{}", t)).collect();
        println!("  {:<10} {}", "Tags:".dimmed(), tags.join(" ").cyan());
    }

    println!("\n{}", details.body);

    if let Some(negative) = &details.negative_body {
        println!("\n{}", "Negative prompt:".red().bold());
        println!("{}", negative);
    }
    if let Some(notes) = &details.notes {
        println!("\n{}", "Notes:".bold());
        println!("{}", notes.dimmed());
    }

    println!(
        "\n{}",
        format!("{} characters, {} words", details.char_count, details.word_count).dimmed()
    );
}

pub fn handle_show<S: KeyValueStore>(
    storage: &Storage<S>,
    name: &str,
    raw: bool,
    clipboard: bool,
    quiet: bool,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;

    let mut viewer = DetailViewer::new(storage.events().clone());
    viewer.show(id);
    if raw {
        viewer.toggle_mode();
    }

    if clipboard {
        let text = viewer
            .copy_text(storage)
            .context("Nothing to copy for this prompt")?;
        let is_tty = std::io::stdout().is_terminal();
        Clipboard::new().copy_or_pipe(&text, is_tty)?;
        if is_tty && !quiet {
            println!("✓ Copied to clipboard ({}ms)", elapsed_ms(start));
        }
        return Ok(());
    }

    match viewer.render(storage) {
        ViewerContent::Structured(details) if quiet => println!("{}", details.body),
        ViewerContent::Structured(details) => print_details(&details),
        ViewerContent::Raw { text, .. } => print!("{}", text),
        ViewerContent::Welcome => anyhow::bail!("Prompt '{}' disappeared while reading", name),
    }
    Ok(())
}

/// Everything a YAML edit may change; the id always stays
fn update_from(edited: PromptRecord) -> PromptUpdate {
    PromptUpdate {
        title: Some(edited.title),
        prompt_type: Some(edited.prompt_type),
        body: Some(edited.body),
        negative_body: Some(edited.negative_body),
        model: Some(edited.model),
        author: Some(edited.author),
        tags: Some(edited.tags),
        notes: Some(edited.notes),
        version: Some(edited.version),
        category: Some(edited.category),
        favorite: Some(edited.favorite),
    }
}

/// Apply edited YAML to a stored record; false when nothing changed
pub fn apply_yaml_edit<S: KeyValueStore>(
    storage: &mut Storage<S>,
    id: &str,
    original: &str,
    edited: &str,
) -> Result<bool> {
    if edited.trim() == original.trim() {
        return Ok(false);
    }

    let mut record = PromptRecord::from_yaml(edited).map_err(Error::from)?;
    record.category = ensure_category(storage, &record.category)?;
    let status = storage.update_record(id, update_from(record))?;
    warn_if_dropped(status);
    Ok(true)
}

pub fn handle_edit<S: KeyValueStore>(
    storage: &mut Storage<S>,
    name: &str,
    editor: &EditorConfig,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;
    let original = storage.export_record(&id)?;

    println!("Opening in {}...", editor.command.dimmed());
    let edited = edit_content(&original, editor, ".yaml")?;

    if apply_yaml_edit(storage, &id, &original, &edited)? {
        let title = storage.record(&id).map(|r| r.title.clone()).unwrap_or_default();
        println!("✓ Updated {} ({}ms)", title.bold(), elapsed_ms(start));
    } else {
        println!("No changes");
    }
    Ok(())
}

pub fn handle_delete<S: KeyValueStore>(
    storage: &mut Storage<S>,
    name: &str,
    yes: bool,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;
    let (title, preview) = match storage.record(&id) {
        Some(record) => (record.title.clone(), record.body.clone()),
        None => return Ok(()),
    };

    if !yes {
        println!("\n{}", "About to delete:".yellow().bold());
        println!("  {}", title.bold());
        let lines: Vec<&str> = preview.lines().take(3).collect();
        if !lines.is_empty() {
            println!("  {}", lines.join("\n  ").dimmed());
            if preview.lines().count() > 3 {
                println!("  {}", "...".dimmed());
            }
        }
        println!();
        if !confirm(&format!("Delete '{}'?", title))? {
            println!("Deletion cancelled");
            return Ok(());
        }
    }

    storage.delete_record(&id)?;
    println!("✓ Deleted {} ({}ms)", title, elapsed_ms(start));
    Ok(())
}

pub fn handle_dup<S: KeyValueStore>(
    storage: &mut Storage<S>,
    name: &str,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;
    let copy = storage.duplicate_record(&id)?;
    let title = storage.record(&copy).map(|r| r.title.clone()).unwrap_or_default();
    println!("✓ Created {} ({}ms)", title.bold(), elapsed_ms(start));
    Ok(())
}

pub fn handle_fav<S: KeyValueStore>(
    storage: &mut Storage<S>,
    name: &str,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;
    let favorite = storage.toggle_favorite(&id)?;
    let title = storage.record(&id).map(|r| r.title.clone()).unwrap_or_default();
    if favorite {
        println!("★ Starred {} ({}ms)", title.bold(), elapsed_ms(start));
    } else {
        println!("☆ Unstarred {} ({}ms)", title.bold(), elapsed_ms(start));
    }
    Ok(())
}

pub fn handle_mv<S: KeyValueStore>(
    storage: &mut Storage<S>,
    name: &str,
    target: &str,
    start: Instant,
) -> Result<()> {
    let id = resolve_record(storage, name)?;
    let path = if target.trim() == "-" {
        String::new()
    } else {
        ensure_category(storage, target)?
    };
    let status = storage.move_record(&id, &path)?;
    warn_if_dropped(status);

    let title = storage.record(&id).map(|r| r.title.clone()).unwrap_or_default();
    let destination = if path.is_empty() {
        "Uncategorized".to_string()
    } else {
        storage.categories().display_name(&path)
    };
    println!(
        "✓ Moved {} to {} ({}ms)",
        title.bold(),
        destination,
        elapsed_ms(start)
    );
    Ok(())
}
