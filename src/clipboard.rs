//! System clipboard access
//!
//! Copy actions go through [`ClipboardSink`] so that the viewer can be
//! driven without a display server. When no system clipboard is available
//! the text is written to stdout instead.

use anyhow::{Context, Result};
use copypasta::{ClipboardContext, ClipboardProvider};
use std::io::{self, Write};

pub trait ClipboardSink {
    fn copy(&mut self, content: &str) -> Result<()>;
}

pub struct Clipboard {
    context: Option<ClipboardContext>,
}

impl Default for Clipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard {
    pub fn new() -> Self {
        // Headless sessions have no clipboard; that is not an error
        let context = ClipboardContext::new().ok();
        Self { context }
    }

    pub fn is_available(&self) -> bool {
        self.context.is_some()
    }

    /// Clipboard when writing to a terminal, raw stdout when piped
    pub fn copy_or_pipe(&mut self, content: &str, is_tty: bool) -> Result<()> {
        if is_tty {
            self.copy_to_clipboard(content)
        } else {
            self.write_to_stdout(content)
        }
    }

    pub fn copy_to_clipboard(&mut self, content: &str) -> Result<()> {
        match self.context.as_mut() {
            Some(ctx) => ctx
                .set_contents(content.to_string())
                .map_err(|e| anyhow::anyhow!("Failed to copy to clipboard: {}", e)),
            None => {
                println!("{}", content);
                Ok(())
            }
        }
    }

    pub fn write_to_stdout(&self, content: &str) -> Result<()> {
        let mut stdout = io::stdout();
        stdout
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        stdout.flush()?;
        Ok(())
    }
}

impl ClipboardSink for Clipboard {
    fn copy(&mut self, content: &str) -> Result<()> {
        self.copy_to_clipboard(content)
    }
}

/// Keeps copied text in memory
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
    pub fail: bool,
}

impl ClipboardSink for MemoryClipboard {
    fn copy(&mut self, content: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("clipboard unavailable");
        }
        self.contents = Some(content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipboard_creation() {
        // Must not panic without a display
        let clipboard = Clipboard::new();
        let _ = clipboard.is_available();
    }

    #[test]
    fn test_memory_clipboard() {
        let mut clipboard = MemoryClipboard::default();
        clipboard.copy("hello").unwrap();
        assert_eq!(clipboard.contents.as_deref(), Some("hello"));

        clipboard.fail = true;
        assert!(clipboard.copy("again").is_err());
        assert_eq!(clipboard.contents.as_deref(), Some("hello"));
    }
}
