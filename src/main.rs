use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::env;
use std::time::Instant;

use promptshelf::cli::{BackupCommands, CategoryCommands, COMMAND_NAMES};
use promptshelf::commands::{self, common::Reported};
use promptshelf::{
    error_help, init_logging, log_command_execution, AppConfig, Cli, Commands, Error, EventBus,
    FileStore, LoadOutcome, LogConfig, Storage, StoreError,
};

fn command_name(command: &Option<Commands>) -> &'static str {
    match command {
        None => "tui",
        Some(command) => match command {
            Commands::New { .. } => "new",
            Commands::Show { .. } => "show",
            Commands::Edit { .. } => "edit",
            Commands::Delete { .. } => "delete",
            Commands::Dup { .. } => "dup",
            Commands::Fav { .. } => "fav",
            Commands::Mv { .. } => "mv",
            Commands::Ls { .. } => "ls",
            Commands::Find { .. } => "find",
            Commands::History { .. } => "history",
            Commands::Tui => "tui",
            Commands::Category { .. } => "category",
            Commands::Import { .. } => "import",
            Commands::Export { .. } => "export",
            Commands::Backup { .. } => "backup",
            Commands::Stats => "stats",
            Commands::Theme { .. } => "theme",
            Commands::Reset { .. } => "reset",
        },
    }
}

fn wants_tui(command: &Option<Commands>) -> bool {
    use is_terminal::IsTerminal;
    match command {
        Some(Commands::Tui) => true,
        None => cfg!(feature = "tui") && std::io::stdout().is_terminal(),
        Some(_) => false,
    }
}

/// Print an error the friendliest way its type allows
fn report(error: anyhow::Error) {
    if let Some(reported) = error.downcast_ref::<Reported>() {
        eprintln!("{}", reported);
    } else if let Some(e) = error.downcast_ref::<Error>() {
        eprintln!("{}", error_help::describe(e));
    } else {
        match error.downcast::<StoreError>() {
            Ok(e) => eprintln!("{}", error_help::describe(&Error::Store(e))),
            Err(e) => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
    }
}

fn main() {
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if let clap::error::ErrorKind::InvalidSubcommand = e.kind() {
                if let Some(cmd) = env::args().nth(1) {
                    eprintln!("{}", error_help::format_command_typo(&cmd, COMMAND_NAMES));
                    std::process::exit(1);
                }
            }
            e.exit();
        }
    };

    if let Err(e) = run(cli) {
        report(e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let config = AppConfig::load()?;
    let tui = wants_tui(&cli.command);

    // Only initialize logging if explicitly requested via env var. The
    // browser owns the screen, so its logs always go to files.
    let _log_guard = if env::var("PSHELF_LOG_LEVEL").is_ok() {
        let mut log_config = LogConfig::from_env();
        if tui && log_config.file_dir.is_none() {
            log_config = log_config.to_file(config.base_dir().join("logs"));
        }
        init_logging(log_config)?
    } else {
        None
    };

    let store = FileStore::open(config.data_dir(), config.quota_bytes)?;
    let mut storage = Storage::new(store, EventBus::new())
        .with_limits(config.max_backups, config.history_size);

    let name = command_name(&cli.command);
    let result = if tui {
        launch_tui(storage, &config)
    } else {
        let loaded = storage.load();
        match loaded.outcome {
            LoadOutcome::Loaded => {}
            LoadOutcome::RestoredFromBackup => eprintln!(
                "{}",
                "⚠️  Saved data was unreadable; restored the latest backup".yellow()
            ),
            LoadOutcome::ResetToDefaults => eprintln!(
                "{}",
                "⚠️  Saved data was unreadable and no backup worked; started fresh".yellow()
            ),
        }
        dispatch(cli.command, &mut storage, &config, start)
    };

    log_command_execution(name, start.elapsed().as_millis() as u64, &result);
    result
}

#[cfg(feature = "tui")]
fn launch_tui(storage: Storage<FileStore>, config: &AppConfig) -> Result<()> {
    // Set up graceful shutdown handling
    let shutdown = promptshelf::ShutdownHandler::new();
    shutdown.setup_signal_handlers()?;
    promptshelf::tui::launch(storage, config, shutdown)
}

#[cfg(not(feature = "tui"))]
fn launch_tui(_storage: Storage<FileStore>, _config: &AppConfig) -> Result<()> {
    anyhow::bail!("This build has no interactive browser; rebuild with the \"tui\" feature")
}

fn dispatch(
    command: Option<Commands>,
    storage: &mut Storage<FileStore>,
    config: &AppConfig,
    start: Instant,
) -> Result<()> {
    let Some(command) = command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::New {
            title,
            fields,
            edit,
        } => commands::handle_new(storage, &title, fields, edit, &config.editor, start),
        Commands::Show {
            name,
            raw,
            clipboard,
            quiet,
        } => commands::handle_show(storage, &name, raw, clipboard, quiet, start),
        Commands::Edit { name } => commands::handle_edit(storage, &name, &config.editor, start),
        Commands::Delete { name, yes } => commands::handle_delete(storage, &name, yes, start),
        Commands::Dup { name } => commands::handle_dup(storage, &name, start),
        Commands::Fav { name } => commands::handle_fav(storage, &name, start),
        Commands::Mv { name, category } => commands::handle_mv(storage, &name, &category, start),
        Commands::Ls { filter, folders } => {
            commands::handle_ls(storage, filter.as_deref(), folders, start)
        }
        Commands::Find { query, limit } => commands::handle_find(storage, &query, limit, start),
        Commands::History { clear } => commands::handle_history(storage, clear),
        // Routed to the browser before dispatch
        Commands::Tui => Ok(()),
        Commands::Category { action } => match action {
            CategoryCommands::Add {
                path,
                name,
                icon,
                color,
            } => commands::handle_category_add(
                storage,
                &path,
                name.as_deref(),
                icon.as_deref(),
                color.as_deref(),
                start,
            ),
            CategoryCommands::Rename { path, name } => {
                commands::handle_category_rename(storage, &path, &name, start)
            }
            CategoryCommands::Ls => commands::handle_category_ls(storage),
        },
        Commands::Import {
            path,
            replace,
            format,
            record,
            yes,
        } => commands::handle_import(
            storage,
            &path,
            replace,
            format.as_deref(),
            record,
            yes,
            start,
        ),
        Commands::Export {
            path,
            format,
            prompt,
        } => commands::handle_export(
            storage,
            path.as_deref(),
            format.as_deref(),
            prompt.as_deref(),
            start,
        ),
        Commands::Backup { action } => match action {
            BackupCommands::Create => commands::handle_backup_create(storage, start),
            BackupCommands::List => commands::handle_backup_list(storage),
            BackupCommands::Restore { number, yes } => {
                commands::handle_backup_restore(storage, number, yes, start)
            }
        },
        Commands::Stats => commands::handle_stats(storage, start),
        Commands::Theme { value } => commands::handle_theme(storage, value.as_deref()),
        Commands::Reset { backups, yes } => commands::handle_reset(storage, backups, yes, start),
    }
}
