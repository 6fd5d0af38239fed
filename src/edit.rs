use anyhow::{Context, Result};
use std::io::Write;
use tempfile::NamedTempFile;

use crate::config::EditorConfig;

/// Open content in the configured editor and return the edited content
///
/// `suffix` picks the temp file extension so editors choose the right
/// syntax highlighting (".yaml" for records).
pub fn edit_content(content: &str, editor: &EditorConfig, suffix: &str) -> Result<String> {
    let mut temp_file = tempfile::Builder::new()
        .prefix("pshelf-")
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temporary file")?;
    write_and_flush(&mut temp_file, content)?;

    let mut cmd = std::process::Command::new(&editor.command);
    cmd.args(&editor.args);
    cmd.arg(temp_file.path());

    tracing::debug!(editor = %editor.command, path = ?temp_file.path(), "Launching editor");
    let status = cmd
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", editor.command))?;

    if !status.success() {
        anyhow::bail!("Editor '{}' exited with non-zero status", editor.command);
    }

    let edited = std::fs::read_to_string(temp_file.path())?;
    Ok(edited)
}

fn write_and_flush(file: &mut NamedTempFile, content: &str) -> Result<()> {
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_content_round_trips() {
        // `true` exits successfully without touching the file
        let editor = EditorConfig {
            command: "true".to_string(),
            args: vec![],
        };
        let edited = edit_content("title: Sunset\n", &editor, ".yaml").unwrap();
        assert_eq!(edited, "title: Sunset\n");
    }

    #[test]
    fn test_failing_editor_is_an_error() {
        let editor = EditorConfig {
            command: "false".to_string(),
            args: vec![],
        };
        assert!(edit_content("x", &editor, ".txt").is_err());
    }
}
