//! Command-line interface definitions and parsing
//!
//! Defines the CLI structure using Clap, including all commands, subcommands,
//! and their associated arguments and options.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pshelf")]
#[command(version)]
#[command(arg_required_else_help = false)]
#[command(about = "PromptShelf - your prompt library, organized in folders")]
#[command(after_help = "COMMANDS BY CATEGORY:

PROMPTS:
  new, n          Create a prompt
  show, s         Display a prompt
  edit, e         Edit a prompt in your editor
  delete, d, rm   Delete a prompt
  dup             Duplicate a prompt
  fav             Star or unstar a prompt
  mv              Move a prompt to another folder

BROWSE & SEARCH:
  ls, l, tree     Show the folder tree
  find, f         Ranked search
  history         Recent searches
  tui, t          Interactive browser (default on a terminal)

FOLDERS:
  category, cat   add | rename | ls

DATA:
  import          Import prompts from JSON or YAML
  export          Export everything (or one prompt)
  backup          create | list | restore
  stats           Counts and storage usage
  theme           Show or switch the TUI theme
  reset           Delete all data

EXAMPLES:
  pshelf new \"Commit message\" --type text --category productivity --tags git
  echo \"Summarize: {text}\" | pshelf new Summary
  pshelf show review -c                  # copy the body of \"AI Code Review\"
  pshelf export ~/prompts.yaml

Run 'pshelf COMMAND --help' for more information on a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Fields shared by `new`
#[derive(Args, Debug, Default)]
pub struct RecordFields {
    /// Prompt type: text, image, code or other
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub prompt_type: Option<String>,
    /// Prompt text (reads stdin when omitted and piped)
    #[arg(short = 'b', long)]
    pub body: Option<String>,
    /// Negative prompt (image prompts only)
    #[arg(long)]
    pub negative: Option<String>,
    /// Folder path, e.g. linguaggi/java
    #[arg(short = 'C', long)]
    pub category: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(short = 'm', long)]
    pub model: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Version such as 1.0 or 2.1.3
    #[arg(long = "prompt-version", value_name = "VERSION")]
    pub version: Option<String>,
    /// Mark as favorite
    #[arg(long = "fav")]
    pub favorite: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    // === PROMPTS ===
    /// Create a new prompt
    #[command(alias = "n")]
    New {
        /// Title of the new prompt
        title: String,
        #[command(flatten)]
        fields: RecordFields,
        /// Write the body in your editor
        #[arg(short = 'e', long = "edit")]
        edit: bool,
    },
    /// Display a prompt
    #[command(alias = "s")]
    Show {
        /// Id or title (fuzzy) of the prompt
        name: String,
        /// Print the raw YAML record instead of the formatted view
        #[arg(short = 'r', long)]
        raw: bool,
        /// Copy to clipboard
        #[arg(short = 'c')]
        clipboard: bool,
        /// Quiet mode - print only the body
        #[arg(short = 'q')]
        quiet: bool,
    },
    /// Edit a prompt in your editor
    #[command(alias = "e")]
    Edit {
        /// Id or title (fuzzy) of the prompt
        name: String,
    },
    /// Delete a prompt
    #[command(alias = "d", alias = "rm")]
    Delete {
        /// Id or title (fuzzy) of the prompt
        name: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Duplicate a prompt
    #[command(alias = "duplicate")]
    Dup {
        name: String,
    },
    /// Star or unstar a prompt
    #[command(alias = "favorite")]
    Fav {
        name: String,
    },
    /// Move a prompt to another folder ("-" for none)
    Mv {
        name: String,
        category: String,
    },

    // === BROWSE & SEARCH ===
    /// Show the folder tree
    #[command(alias = "l", alias = "tree")]
    Ls {
        /// Only show prompts matching this text
        #[arg(short = 'f', long)]
        filter: Option<String>,
        /// Show folders only
        #[arg(long)]
        folders: bool,
    },
    /// Ranked search across titles, bodies, tags and notes
    #[command(alias = "f")]
    Find {
        query: String,
        /// Maximum number of results (default: the itemsPerPage setting)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show or clear recent searches
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Launch the interactive browser
    #[command(alias = "t")]
    Tui,

    // === FOLDERS ===
    /// Manage folders
    #[command(alias = "cat")]
    Category {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    // === DATA ===
    /// Import prompts from an export, a list or a single prompt
    Import {
        /// File to read ("-" for stdin)
        path: String,
        /// Replace all existing data instead of merging
        #[arg(long)]
        replace: bool,
        /// Force a format instead of detecting it (json, yaml)
        #[arg(long)]
        format: Option<String>,
        /// Treat the input as one prompt record
        #[arg(long)]
        record: bool,
        /// Skip the confirmation prompt for --replace
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Export everything, or a single prompt as YAML
    Export {
        /// Output file (stdout when omitted)
        path: Option<String>,
        /// json or yaml (default: from the file extension, else json)
        #[arg(long)]
        format: Option<String>,
        /// Export only this prompt
        #[arg(short = 'p', long = "prompt", value_name = "NAME")]
        prompt: Option<String>,
    },
    /// Create, list or restore backups
    Backup {
        #[command(subcommand)]
        action: BackupCommands,
    },
    /// Counts and storage usage
    Stats,
    /// Show the theme, or set it (light, dark, toggle)
    Theme {
        value: Option<String>,
    },
    /// Delete every prompt and folder
    Reset {
        /// Also delete backups
        #[arg(long)]
        backups: bool,
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a folder (missing parents are created too)
    Add {
        /// Path such as linguaggi/rust
        path: String,
        /// Display name (defaults to the last path segment)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Change a folder's display name
    Rename {
        path: String,
        name: String,
    },
    /// List folders with their prompt counts
    #[command(alias = "list")]
    Ls,
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Take a backup now
    Create,
    /// List backups, newest first
    #[command(alias = "ls")]
    List,
    /// Replace current data with a backup
    Restore {
        /// Backup number as shown by `backup list`
        number: usize,
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Every top-level command and alias, for typo suggestions
pub const COMMAND_NAMES: &[&str] = &[
    "new", "n", "show", "s", "edit", "e", "delete", "d", "rm", "dup", "fav", "mv", "ls", "l",
    "tree", "find", "f", "history", "tui", "t", "category", "cat", "import", "export", "backup",
    "stats", "theme", "reset",
];
