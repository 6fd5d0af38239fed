//! Application configuration
//!
//! Resolution order, later wins:
//! 1. built-in defaults
//! 2. `<base_dir>/config.toml`
//! 3. environment (`PSHELF_*`, also read from a `.env` file by `main`)
//!
//! User-facing preferences (theme, debounce, expanded folders) are not here;
//! they live in the settings slot of the store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAP;
use crate::kv::DEFAULT_QUOTA_BYTES;
use crate::storage::DEFAULT_MAX_BACKUPS;

pub const CONFIG_FILE: &str = "config.toml";
const DATA_DIR: &str = "data";
const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 30 * 60;

/// Editor launched for `edit` and for long text fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        let command = env::var("VISUAL")
            .or_else(|_| env::var("EDITOR"))
            .unwrap_or_else(|_| {
                if cfg!(windows) {
                    "notepad".to_string()
                } else {
                    "vi".to_string()
                }
            });
        Self {
            command,
            args: vec![],
        }
    }
}

/// Shape of `config.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    quota_bytes: Option<usize>,
    max_backups: Option<usize>,
    history_size: Option<usize>,
    backup_interval_secs: Option<u64>,
    editor: Option<EditorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub quota_bytes: usize,
    pub max_backups: usize,
    pub history_size: usize,
    /// Periodic backup while the TUI runs; zero disables
    pub backup_interval: Duration,
    pub editor: EditorConfig,
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            max_backups: DEFAULT_MAX_BACKUPS,
            history_size: DEFAULT_HISTORY_CAP,
            backup_interval: Duration::from_secs(DEFAULT_BACKUP_INTERVAL_SECS),
            editor: EditorConfig::default(),
        }
    }

    /// Default base directory: `$PSHELF_BASE_DIR`, else `~/.pshelf`
    pub fn default_base_dir() -> Result<PathBuf> {
        if let Ok(custom) = env::var("PSHELF_BASE_DIR") {
            return Ok(PathBuf::from(shellexpand::tilde(&custom).as_ref()));
        }
        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".pshelf"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_base_dir()?)
    }

    pub fn load_from(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self::with_base_dir(base_dir);

        let path = config.config_path();
        if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: FileConfig = toml::from_str(&text)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            config.apply_file(file);
        }

        config.apply_env();
        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(quota) = file.quota_bytes {
            self.quota_bytes = quota;
        }
        if let Some(max) = file.max_backups {
            self.max_backups = max;
        }
        if let Some(size) = file.history_size {
            self.history_size = size;
        }
        if let Some(secs) = file.backup_interval_secs {
            self.backup_interval = Duration::from_secs(secs);
        }
        if let Some(editor) = file.editor {
            self.editor = editor;
        }
    }

    fn apply_env(&mut self) {
        if let Some(quota) = env_number("PSHELF_QUOTA_BYTES") {
            self.quota_bytes = quota;
        }
        if let Some(max) = env_number("PSHELF_MAX_BACKUPS") {
            self.max_backups = max;
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    /// Directory holding the store slots
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join(DATA_DIR)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.max_backups, DEFAULT_MAX_BACKUPS);
        assert_eq!(config.history_size, DEFAULT_HISTORY_CAP);
        assert_eq!(config.data_dir(), dir.path().join("data"));
    }

    #[test]
    fn test_file_values_apply() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
history_size = 3
backup_interval_secs = 0

[editor]
command = "code"
args = ["--wait"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.history_size, 3);
        assert_eq!(config.backup_interval, Duration::ZERO);
        assert_eq!(config.editor.command, "code");
        assert_eq!(config.editor.args, vec!["--wait".to_string()]);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "history_size = \"many\"").unwrap();
        assert!(AppConfig::load_from(dir.path()).is_err());
    }
}
