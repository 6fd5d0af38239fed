//! Interactive terminal browser
//!
//! [`App`] owns all state and behavior; this module only turns crossterm
//! events into [`AppKey`]s, drives the periodic tick and draws frames.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    io,
    time::{Duration, Instant},
};

use crate::app::{is_multiline, App, AppKey, Focus};
use crate::config::{AppConfig, EditorConfig};
use crate::edit::edit_content;
use crate::events::Severity;
use crate::kv::{FileStore, KeyValueStore};
use crate::signals::ShutdownHandler;
use crate::storage::{LoadOutcome, Storage};

pub mod render;
pub mod theme;

const FRAME_TIMEOUT: Duration = Duration::from_millis(250);

pub struct ShelfTui<S: KeyValueStore> {
    app: App<S>,
    editor: EditorConfig,
    shutdown: ShutdownHandler,
    /// Set after a store failure; the recovery panel replaces normal input
    recovery: Option<String>,
}

impl<S: KeyValueStore> ShelfTui<S> {
    pub fn new(app: App<S>, editor: EditorConfig, shutdown: ShutdownHandler) -> Self {
        Self {
            app,
            editor,
            shutdown,
            recovery: None,
        }
    }

    pub fn run(mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = self.run_app(&mut terminal);

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        if let Err(e) = self.app.shutdown() {
            tracing::error!(error = %e, "Final save failed");
            eprintln!("Error: final save failed: {}", e);
        }
        res
    }

    fn poll_timeout(&self) -> Duration {
        match self.app.search().deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(FRAME_TIMEOUT),
            None => FRAME_TIMEOUT,
        }
    }

    fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            terminal.draw(|f| render::draw(f, &self.app, self.recovery.as_deref()))?;

            if self.shutdown.is_shutdown_requested() {
                tracing::info!("Leaving the browser on shutdown request");
                return Ok(());
            }

            if event::poll(self.poll_timeout())? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.on_key(terminal, key)?;
                    }
                }
            }

            if self.recovery.is_none() {
                self.app.tick(Instant::now());
            }
            if self.app.should_quit() {
                return Ok(());
            }
        }
    }

    fn on_key<B: Backend>(&mut self, terminal: &mut Terminal<B>, key: KeyEvent) -> Result<()> {
        if self.recovery.is_some() {
            self.on_recovery_key(key);
            return Ok(());
        }

        if is_ctrl(&key, 'x') && self.app.focus() == Focus::Editor {
            if let Some(field) = self.app.editor_field().filter(|f| is_multiline(*f)) {
                let current = self
                    .app
                    .editor()
                    .map(|form| form.value(field).to_string())
                    .unwrap_or_default();
                match self.edit_externally(terminal, &current) {
                    Ok(text) => self.app.set_editor_value(field, text),
                    Err(e) => self
                        .app
                        .storage()
                        .events()
                        .notify(Severity::Error, format!("External editor failed: {}", e)),
                }
                return Ok(());
            }
        }

        if let Some(app_key) = map_key(key) {
            if let Err(e) = self.app.handle_key(app_key, Instant::now()) {
                tracing::error!(error = %e, "Store failure, entering recovery");
                self.recovery = Some(e.to_string());
            }
        }
        Ok(())
    }

    fn on_recovery_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('r') => {
                self.app.reload();
                self.recovery = None;
            }
            KeyCode::Char('w') => match self.app.wipe_and_reload() {
                Ok(()) => self.recovery = None,
                Err(e) => {
                    tracing::error!(error = %e, "Wipe failed");
                    self.recovery = Some(e.to_string());
                }
            },
            KeyCode::Char('q') | KeyCode::Esc => self.app.force_quit(),
            _ => {}
        }
    }

    /// Leave the alternate screen while `$EDITOR` runs
    fn edit_externally<B: Backend>(
        &self,
        terminal: &mut Terminal<B>,
        current: &str,
    ) -> Result<String> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;

        let edited = edit_content(current, &self.editor, ".md");

        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        terminal.clear()?;

        edited
    }
}

fn is_ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(c)
}

/// Translate a crossterm key into the application's key vocabulary
pub fn map_key(key: KeyEvent) -> Option<AppKey> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let mapped = match key.code {
        KeyCode::Char(c) if ctrl => AppKey::Ctrl(c.to_ascii_lowercase()),
        KeyCode::Char(c) => AppKey::Char(c),
        KeyCode::Enter => AppKey::Enter,
        KeyCode::Esc => AppKey::Esc,
        KeyCode::Backspace => AppKey::Backspace,
        KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => AppKey::BackTab,
        KeyCode::Tab => AppKey::Tab,
        KeyCode::BackTab => AppKey::BackTab,
        KeyCode::Up => AppKey::Up,
        KeyCode::Down => AppKey::Down,
        KeyCode::Left => AppKey::Left,
        KeyCode::Right => AppKey::Right,
        KeyCode::Delete => AppKey::Delete,
        KeyCode::PageUp => AppKey::PageUp,
        KeyCode::PageDown => AppKey::PageDown,
        KeyCode::F(n) => AppKey::F(n),
        _ => return None,
    };
    Some(mapped)
}

/// Start the browser over an unloaded file-backed storage
pub fn launch(
    storage: Storage<FileStore>,
    config: &AppConfig,
    shutdown: ShutdownHandler,
) -> Result<()> {
    let app = App::start(storage, Instant::now())?.with_backup_interval(config.backup_interval);

    let message = match app.load_report().outcome {
        LoadOutcome::Loaded => None,
        LoadOutcome::RestoredFromBackup => {
            Some("Saved data was unreadable; restored the latest backup")
        }
        LoadOutcome::ResetToDefaults => {
            Some("Saved data was unreadable and no backup worked; started fresh")
        }
    };
    if let Some(message) = message {
        tracing::warn!(message, "Data recovered at startup");
        app.storage().events().notify(Severity::Warning, message);
    }

    tracing::info!(records = app.storage().records().len(), "Starting browser");
    ShelfTui::new(app, config.editor.clone(), shutdown).run()
}
