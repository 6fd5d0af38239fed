//! Structured logging configuration
//!
//! Logging is opt-in: `main` only calls [`init_logging`] when
//! `PSHELF_LOG_LEVEL` is set, and the TUI requires a log directory so that
//! nothing is written over the alternate screen.

use anyhow::Result;
use std::env;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

const LOG_FILE_PREFIX: &str = "pshelf.log";

/// Logging configuration for different environments
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// Daily rolling log files go here; stderr when unset
    pub file_dir: Option<PathBuf>,
    pub colored: bool,
    pub with_location: bool,
    pub with_spans: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "error".to_string(),
            format: LogFormat::Pretty,
            file_dir: None,
            colored: is_terminal::IsTerminal::is_terminal(&std::io::stderr()),
            with_location: false,
            with_spans: false,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.to_lowercase() == "true")
}

impl LogConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let level = env::var("PSHELF_LOG_LEVEL")
            .or_else(|_| env::var("LOG_LEVEL"))
            .unwrap_or_else(|_| "error".to_string());

        let format = match env::var("PSHELF_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        let file_dir = env::var("PSHELF_LOG_DIR")
            .ok()
            .map(|dir| PathBuf::from(shellexpand::tilde(&dir).as_ref()));

        let colored = env_flag("PSHELF_LOG_COLOR")
            .unwrap_or_else(|| is_terminal::IsTerminal::is_terminal(&std::io::stderr()));

        Self {
            level,
            format,
            file_dir,
            colored,
            with_location: env_flag("PSHELF_LOG_LOCATION").unwrap_or(false),
            with_spans: env_flag("PSHELF_LOG_SPANS").unwrap_or(false),
        }
    }

    /// Same settings, but always into files under `dir`
    pub fn to_file(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = Some(dir.into());
        self.colored = false;
        self
    }
}

/// Initialize the global tracing subscriber
///
/// When logging to files the returned guard flushes the background writer on
/// drop; keep it alive for the life of the process.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_new("error"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    let span_events = if config.with_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (writer, guard, ansi) = match &config.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, config.colored),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(span_events)
        .with_file(config.with_location)
        .with_line_number(config.with_location);

    match config.format {
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize JSON logging: {}", e))?,
        LogFormat::Pretty => subscriber
            .pretty()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize pretty logging: {}", e))?,
        LogFormat::Compact => subscriber
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize compact logging: {}", e))?,
    }

    info!(
        level = %config.level,
        format = ?config.format,
        file_dir = ?config.file_dir,
        "Logging initialized"
    );

    Ok(guard)
}

/// Log a command execution with timing and outcome
pub fn log_command_execution<T>(command_name: &str, duration_ms: u64, result: &Result<T>) {
    let span = tracing::info_span!(
        "command_execution",
        command = command_name,
        duration_ms = duration_ms
    );
    let _enter = span.enter();

    match result {
        Ok(_) if duration_ms > 1000 => warn!(
            command = command_name,
            duration_ms = duration_ms,
            "Command completed slowly"
        ),
        Ok(_) => info!(
            command = command_name,
            duration_ms = duration_ms,
            "Command completed successfully"
        ),
        Err(e) => error!(
            command = command_name,
            duration_ms = duration_ms,
            error = %e,
            "Command failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let config = LogConfig {
                level: "debug".to_string(),
                format: LogFormat::Compact,
                file_dir: None,
                colored: false,
                with_location: false,
                with_spans: false,
            };
            let _ = init_logging(config);
        });
    }

    #[test]
    fn test_log_config_from_env() {
        env::set_var("PSHELF_LOG_LEVEL", "debug");
        env::set_var("PSHELF_LOG_FORMAT", "json");
        env::set_var("PSHELF_LOG_COLOR", "false");

        let config = LogConfig::from_env();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.colored);

        env::remove_var("PSHELF_LOG_LEVEL");
        env::remove_var("PSHELF_LOG_FORMAT");
        env::remove_var("PSHELF_LOG_COLOR");
    }

    #[test]
    fn test_to_file_disables_color() {
        let config = LogConfig {
            colored: true,
            ..Default::default()
        }
        .to_file("/tmp/pshelf-logs");
        assert!(!config.colored);
        assert_eq!(config.file_dir, Some(PathBuf::from("/tmp/pshelf-logs")));
    }

    #[test]
    fn test_command_execution_logging() {
        init_test_logging();

        let result: Result<()> = Ok(());
        log_command_execution("ls", 12, &result);

        let result: Result<()> = Err(anyhow::anyhow!("test error"));
        log_command_execution("import", 2000, &result);
    }
}
