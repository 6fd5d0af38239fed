//! PromptShelf - a local library for AI prompts, organized in folders
//!
//! Prompts are stored as records in a small key-value store with rolling
//! backups. The same data is reachable from a command-line interface and an
//! interactive terminal browser.
//!
//! # Quick Start
//!
//! ```no_run
//! use promptshelf::{EventBus, FileStore, NewPrompt, PromptRecord, PromptType, Storage};
//!
//! let store = FileStore::open("/tmp/pshelf-data", promptshelf::kv::DEFAULT_QUOTA_BYTES)?;
//! let mut storage = Storage::new(store, EventBus::new());
//! storage.load();
//!
//! let record = PromptRecord::create(NewPrompt {
//!     title: "Commit message".to_string(),
//!     prompt_type: Some(PromptType::TextGeneration),
//!     body: "Write a commit message for this diff: {diff}".to_string(),
//!     ..Default::default()
//! })?;
//! storage.add_record(record)?;
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - [`record`]: The prompt record, its validation and search scoring
//! - [`kv`]: Key-value stores (files on disk, or memory for tests)
//! - [`storage`]: Collections, persistence, backups, import and export
//! - [`tree`]: Folder tree model and its navigable view
//! - [`app`]: Coordinator wiring the interactive components together
//! - [`tui`]: Terminal user interface (feature-gated)

pub mod app;
pub mod category;
pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod edit;
pub mod editor;
pub mod error;
pub mod error_help;
pub mod events;
pub mod history;
pub mod kv;
pub mod logging;
pub mod record;
pub mod search;
pub mod settings;
pub mod signals;
pub mod storage;
pub mod tree;
pub mod viewer;

#[cfg(feature = "tui")]
pub mod tui;

pub use app::{App, AppKey, Focus};
pub use category::{Category, CategoryMap};
pub use cli::{Cli, Commands};
pub use clipboard::{Clipboard, ClipboardSink, MemoryClipboard};
pub use config::{AppConfig, EditorConfig};
pub use error::{Error, ParseError, StoreError, ValidationError};
pub use events::{AppEvent, EventBus, Notification, Severity};
pub use history::SearchHistory;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use logging::{init_logging, log_command_execution, LogConfig};
pub use record::{NewPrompt, PromptRecord, PromptType, PromptUpdate};
pub use search::SearchController;
pub use settings::{Settings, Theme};
pub use signals::ShutdownHandler;
pub use storage::{ExportFormat, LoadOutcome, SaveStatus, Storage};
pub use tree::{PromptTree, TreeView};
pub use viewer::DetailViewer;
