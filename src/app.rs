//! Top-level coordinator
//!
//! `App` owns the persistence layer and every view-model, turns key presses
//! into operations and fans [`AppEvent`]s back out to the views. It knows
//! nothing about terminals: the TUI maps crossterm keys to [`AppKey`] and
//! draws from the accessors here.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::clipboard::{Clipboard, ClipboardSink};
use crate::editor::{CloseDecision, EditorForm, FormField};
use crate::error::{Error, StoreError};
use crate::events::{AppEvent, EventBus, NotificationQueue, Severity};
use crate::kv::KeyValueStore;
use crate::record::{NewPrompt, PromptRecord, PromptType};
use crate::search::SearchController;
use crate::storage::{ExportFormat, LoadReport, Storage};
use crate::tree::{Bucket, MenuAction, MenuItem, NodeRef, TreeAction, TreeKey, TreeView};
use crate::viewer::DetailViewer;

/// Keys the coordinator understands, independent of the terminal backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKey {
    Char(char),
    Ctrl(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    BackTab,
    Up,
    Down,
    Left,
    Right,
    Delete,
    PageUp,
    PageDown,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Tree,
    Search,
    Editor,
}

/// Destructive actions waiting for a yes/no
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    DeleteRecord { id: String, title: String },
    ClearAll,
    RestoreBackup(usize),
    DiscardEdits,
}

impl Confirmation {
    pub fn message(&self) -> String {
        match self {
            Confirmation::DeleteRecord { title, .. } => {
                format!("Delete \"{}\"? This cannot be undone.", title)
            }
            Confirmation::ClearAll => {
                "Delete every prompt and folder? Backups are kept.".to_string()
            }
            Confirmation::RestoreBackup(index) => format!(
                "Replace all current data with backup #{}?",
                index + 1
            ),
            Confirmation::DiscardEdits => "Discard unsaved changes?".to_string(),
        }
    }
}

/// Single-line text prompts shown as a dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    ImportPath { merge: bool },
    ExportPath,
    NewFolder { parent: Option<String> },
    RenameFolder(String),
}

impl InputKind {
    pub fn title(&self) -> &'static str {
        match self {
            InputKind::ImportPath { merge: true } => "Import (merge) from file",
            InputKind::ImportPath { merge: false } => "Import (replace) from file",
            InputKind::ExportPath => "Export to file (.json or .yaml)",
            InputKind::NewFolder { .. } => "New folder name",
            InputKind::RenameFolder(_) => "Rename folder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDialog {
    pub kind: InputKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMenu {
    pub target: NodeRef,
    pub items: Vec<MenuItem>,
    pub cursor: usize,
}

fn default_export_name() -> String {
    format!("pshelf-export-{}.json", Local::now().format("%Y-%m-%d"))
}

/// Records seeded on the very first run
pub fn sample_records() -> Vec<PromptRecord> {
    let samples = [
        NewPrompt {
            title: "AI Code Review".to_string(),
            prompt_type: Some(PromptType::Code),
            body: "Review the following code. Point out bugs, unclear names and missing \
                   error handling, then suggest a corrected version.\n\n{code}"
                .to_string(),
            model: "gpt-4".to_string(),
            tags: vec!["java".to_string(), "review".to_string()],
            notes: "Paste the class under review in place of {code}.".to_string(),
            category: "linguaggi/java".to_string(),
            favorite: true,
            ..Default::default()
        },
        NewPrompt {
            title: "Recruiter".to_string(),
            prompt_type: Some(PromptType::TextGeneration),
            body: "Act as a recruiter. Write a short, friendly message inviting {name} \
                   to a first interview for the {role} position."
                .to_string(),
            tags: vec!["hr".to_string(), "email".to_string()],
            category: "productivity".to_string(),
            ..Default::default()
        },
    ];
    samples
        .into_iter()
        .filter_map(|fields| PromptRecord::create(fields).ok())
        .collect()
}

pub struct App<S: KeyValueStore> {
    storage: Storage<S>,
    events: EventBus,
    inbox: Receiver<AppEvent>,
    tree: TreeView,
    viewer: DetailViewer,
    editor: Option<EditorForm>,
    editor_field: usize,
    search: SearchController,
    history_cursor: Option<usize>,
    notifications: NotificationQueue,
    confirmation: Option<Confirmation>,
    input: Option<InputDialog>,
    menu: Option<ContextMenu>,
    grabbed: Option<String>,
    clipboard: Box<dyn ClipboardSink>,
    focus: Focus,
    help_visible: bool,
    viewer_scroll: u16,
    backup_interval: Duration,
    last_backup: Instant,
    load_report: LoadReport,
    quit: bool,
}

impl<S: KeyValueStore> App<S> {
    /// Load the store, seed sample data on first run and build the tree
    pub fn start(mut storage: Storage<S>, now: Instant) -> Result<Self, Error> {
        let events = storage.events().clone();
        let inbox = events.subscribe();

        let load_report = storage.load();
        if load_report.first_run && storage.records().is_empty() {
            for record in sample_records() {
                storage.add_record(record)?;
            }
            tracing::info!("Seeded sample prompts");
        }

        let search = SearchController::from_settings(storage.settings(), events.clone());
        let mut app = Self {
            tree: TreeView::new(events.clone()),
            viewer: DetailViewer::new(events.clone()),
            editor: None,
            editor_field: 0,
            search,
            history_cursor: None,
            notifications: NotificationQueue::default(),
            confirmation: None,
            input: None,
            menu: None,
            grabbed: None,
            clipboard: Box::new(Clipboard::new()),
            focus: Focus::Tree,
            help_visible: false,
            viewer_scroll: 0,
            backup_interval: Duration::ZERO,
            last_backup: now,
            load_report,
            quit: false,
            storage,
            events,
            inbox,
        };
        app.tree.rebuild(&app.storage);
        app.process_events(now);
        Ok(app)
    }

    pub fn with_clipboard(mut self, clipboard: Box<dyn ClipboardSink>) -> Self {
        self.clipboard = clipboard;
        self
    }

    /// Take a backup every `interval` while running; zero disables
    pub fn with_backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    // ---- accessors for the renderer ------------------------------------

    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    pub fn tree(&self) -> &TreeView {
        &self.tree
    }

    pub fn viewer(&self) -> &DetailViewer {
        &self.viewer
    }

    pub fn editor(&self) -> Option<&EditorForm> {
        self.editor.as_ref()
    }

    /// Field the editor cursor is on
    pub fn editor_field(&self) -> Option<FormField> {
        let editor = self.editor.as_ref()?;
        editor.visible_fields().get(self.editor_field).copied()
    }

    /// Replace the text of one editor field, e.g. after an external edit
    pub fn set_editor_value(&mut self, field: FormField, value: impl Into<String>) {
        if let Some(editor) = self.editor.as_mut() {
            editor.set(field, value);
        }
    }

    pub fn search(&self) -> &SearchController {
        &self.search
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    pub fn input(&self) -> Option<&InputDialog> {
        self.input.as_ref()
    }

    pub fn menu(&self) -> Option<&ContextMenu> {
        self.menu.as_ref()
    }

    /// Record picked up for a move, waiting for a target folder
    pub fn grabbed(&self) -> Option<&str> {
        self.grabbed.as_deref()
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn help_visible(&self) -> bool {
        self.help_visible
    }

    pub fn viewer_scroll(&self) -> u16 {
        self.viewer_scroll
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    // ---- event fan-in --------------------------------------------------

    /// Apply every pending event to the views
    pub fn process_events(&mut self, now: Instant) {
        while let Ok(event) = self.inbox.try_recv() {
            match event {
                AppEvent::Notify(notification) => self.notifications.push(notification, now),
                AppEvent::RecordSelected(id) => {
                    if self.viewer.selected() != Some(id.as_str()) {
                        self.viewer_scroll = 0;
                    }
                    self.viewer.show(id);
                }
                AppEvent::RecordDeselected => self.viewer.clear(),
                AppEvent::RecordDeleted(id) => {
                    self.tree.forget_record(&id);
                    if self.grabbed.as_deref() == Some(id.as_str()) {
                        self.grabbed = None;
                    }
                    self.tree.rebuild(&self.storage);
                }
                AppEvent::RecordCreated(_)
                | AppEvent::RecordUpdated(_)
                | AppEvent::RecordMoved { .. }
                | AppEvent::FavoriteToggled { .. }
                | AppEvent::CategoryCreated(_) => self.tree.rebuild(&self.storage),
                AppEvent::DataReloaded => self.on_data_reloaded(),
                AppEvent::CategorySelected(_)
                | AppEvent::SearchPerformed { .. }
                | AppEvent::ThemeChanged(_)
                | AppEvent::BackupCreated => {}
            }
        }
    }

    fn on_data_reloaded(&mut self) {
        let focused = self.tree.focused_row().map(|row| row.node);
        self.tree.rebuild(&self.storage);
        if let Some(id) = self.viewer.selected() {
            if !self.storage.contains(id) {
                self.viewer.clear();
            }
        }
        if let Some(node) = focused {
            self.tree.focus_node(&node);
        }
        self.search
            .set_debounce(Duration::from_millis(self.storage.settings().search_debounce_ms));
    }

    // ---- periodic work -------------------------------------------------

    /// Debounced search, notification expiry, external changes and backups
    pub fn tick(&mut self, now: Instant) {
        if let Some(request) = self.search.poll(now) {
            self.search.apply(&request, &mut self.tree, &self.storage);
        }
        self.notifications.expire(now);

        if self.storage.sync_external_changes() {
            tracing::info!("Reloaded data changed by another instance");
        }

        if !self.backup_interval.is_zero()
            && self.storage.settings().autosave
            && self.storage.settings().backup_enabled
            && now.duration_since(self.last_backup) >= self.backup_interval
        {
            self.last_backup = now;
            match self.storage.create_backup() {
                Ok(_) => tracing::debug!("Periodic backup created"),
                Err(e) => tracing::warn!(error = %e, "Periodic backup failed"),
            }
        }

        self.process_events(now);
    }

    // ---- key handling --------------------------------------------------

    /// Handle one key press
    ///
    /// Rejected operations become error notifications; only store failures
    /// are returned to the caller.
    pub fn handle_key(&mut self, key: AppKey, now: Instant) -> Result<(), StoreError> {
        self.process_events(now);
        let outcome = match self.dispatch_key(key, now) {
            Ok(()) => Ok(()),
            Err(Error::Store(e)) => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "Operation rejected");
                self.events.notify(Severity::Error, e.to_string());
                Ok(())
            }
        };
        self.process_events(now);
        outcome
    }

    fn dispatch_key(&mut self, key: AppKey, now: Instant) -> Result<(), Error> {
        if self.help_visible {
            self.help_visible = false;
            return Ok(());
        }
        if self.confirmation.is_some() {
            return self.handle_confirmation_key(key);
        }
        if self.input.is_some() {
            return self.handle_input_key(key);
        }
        if self.menu.is_some() {
            return self.handle_menu_key(key);
        }
        if self.handle_global_key(key, now)? {
            return Ok(());
        }
        match self.focus {
            Focus::Tree => self.handle_tree_key(key),
            Focus::Search => self.handle_search_key(key, now),
            Focus::Editor => self.handle_editor_key(key),
        }
    }

    /// Shortcuts that work from any focus; true when consumed
    fn handle_global_key(&mut self, key: AppKey, now: Instant) -> Result<bool, Error> {
        match key {
            AppKey::Ctrl('n') => self.open_new_editor(),
            AppKey::Ctrl('f') => {
                self.focus = Focus::Search;
                self.history_cursor = None;
            }
            AppKey::Ctrl('s') => self.save()?,
            AppKey::Ctrl('e') => {
                self.input = Some(InputDialog {
                    kind: InputKind::ExportPath,
                    value: default_export_name(),
                })
            }
            AppKey::Ctrl('i') => {
                self.input = Some(InputDialog {
                    kind: InputKind::ImportPath { merge: true },
                    value: String::new(),
                })
            }
            AppKey::Ctrl('t') => self.toggle_theme()?,
            AppKey::Ctrl('b') => self.backup_now()?,
            AppKey::Ctrl('c') | AppKey::Ctrl('q') => self.request_quit(),
            AppKey::F(1) => self.help_visible = true,
            AppKey::Esc => self.escape(now),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn escape(&mut self, now: Instant) {
        match self.focus {
            Focus::Editor => self.close_editor(),
            Focus::Search => {
                let request = self.search.escape();
                self.search.apply(&request, &mut self.tree, &self.storage);
                self.focus = Focus::Tree;
            }
            Focus::Tree => {
                if self.grabbed.take().is_some() {
                    self.events.notify(Severity::Info, "Move cancelled");
                } else if self.notifications.dismiss().is_none() {
                    if self.tree.is_filtered() {
                        let request = self.search.escape();
                        self.search.apply(&request, &mut self.tree, &self.storage);
                    } else {
                        self.tree.clear_selection();
                    }
                }
            }
        }
        self.process_events(now);
    }

    fn handle_tree_key(&mut self, key: AppKey) -> Result<(), Error> {
        let tree_key = match key {
            AppKey::Up | AppKey::Char('k') => Some(TreeKey::Up),
            AppKey::Down | AppKey::Char('j') => Some(TreeKey::Down),
            AppKey::Left | AppKey::Char('h') => Some(TreeKey::Left),
            AppKey::Right | AppKey::Char('l') => Some(TreeKey::Right),
            AppKey::Enter => Some(TreeKey::Enter),
            AppKey::Char(' ') => Some(TreeKey::Space),
            AppKey::Delete => Some(TreeKey::Delete),
            _ => None,
        };
        if let Some(tree_key) = tree_key {
            return match self.tree.handle_key(tree_key, &mut self.storage)? {
                TreeAction::ConfirmDelete(id) => {
                    self.confirm_delete(&id);
                    Ok(())
                }
                _ => Ok(()),
            };
        }

        match key {
            AppKey::Char('?') => self.help_visible = true,
            AppKey::Char('/') => self.focus = Focus::Search,
            AppKey::Char('q') => self.request_quit(),
            AppKey::Char('e') => self.open_edit_editor(),
            AppKey::Char('d') => self.duplicate_selected()?,
            AppKey::Char('f') => {
                self.viewer.toggle_favorite(&mut self.storage)?;
            }
            AppKey::Char('c') | AppKey::Char('y') => {
                self.viewer.copy(&self.storage, self.clipboard.as_mut());
            }
            AppKey::Char('v') => {
                self.viewer.toggle_mode();
                self.viewer_scroll = 0;
            }
            AppKey::Char('m') | AppKey::F(10) => self.open_menu(),
            AppKey::Char('x') => self.grab_or_drop()?,
            AppKey::Char('+') => {
                self.tree.expand_all(&mut self.storage)?;
            }
            AppKey::Char('-') => {
                self.tree.collapse_all(&mut self.storage)?;
            }
            AppKey::Char('n') => self.open_new_folder_dialog(),
            AppKey::Char('R') => {
                if self.storage.backups().is_empty() {
                    self.events.notify(Severity::Info, "No backups yet");
                } else {
                    self.confirmation = Some(Confirmation::RestoreBackup(0));
                }
            }
            AppKey::Char('X') => self.confirmation = Some(Confirmation::ClearAll),
            AppKey::Char('I') => {
                self.input = Some(InputDialog {
                    kind: InputKind::ImportPath { merge: false },
                    value: String::new(),
                })
            }
            AppKey::PageDown => self.viewer_scroll = self.viewer_scroll.saturating_add(10),
            AppKey::PageUp => self.viewer_scroll = self.viewer_scroll.saturating_sub(10),
            _ => {}
        }
        Ok(())
    }

    fn handle_search_key(&mut self, key: AppKey, now: Instant) -> Result<(), Error> {
        match key {
            AppKey::Char(c) => {
                self.history_cursor = None;
                self.search.push_char(c, now);
            }
            AppKey::Backspace => {
                self.history_cursor = None;
                self.search.pop_char(now);
            }
            AppKey::Enter => {
                let request = self.search.submit(&mut self.storage)?;
                self.search.apply(&request, &mut self.tree, &self.storage);
                self.focus = Focus::Tree;
            }
            AppKey::Up => self.recall_history(1, now),
            AppKey::Down => self.recall_history(-1, now),
            AppKey::Tab | AppKey::BackTab => self.focus = Focus::Tree,
            _ => {}
        }
        Ok(())
    }

    fn recall_history(&mut self, step: isize, now: Instant) {
        let history = self.storage.search_history();
        if history.is_empty() {
            return;
        }
        let next = match self.history_cursor {
            None if step > 0 => 0,
            None => return,
            Some(idx) => idx as isize + step,
        };
        if next < 0 {
            self.history_cursor = None;
            self.search.input("", now);
            return;
        }
        let idx = (next as usize).min(history.len() - 1);
        if let Some(entry) = history.entries().get(idx) {
            self.history_cursor = Some(idx);
            self.search.input(entry.clone(), now);
        }
    }

    fn handle_editor_key(&mut self, key: AppKey) -> Result<(), Error> {
        let Some(field) = self.editor_field() else {
            return Ok(());
        };
        let Some(editor) = self.editor.as_mut() else {
            return Ok(());
        };
        let field_count = editor.visible_fields().len();

        match key {
            AppKey::Tab | AppKey::Down => {
                self.editor_field = (self.editor_field + 1) % field_count;
            }
            AppKey::BackTab | AppKey::Up => {
                self.editor_field = (self.editor_field + field_count - 1) % field_count;
            }
            AppKey::Left | AppKey::Right | AppKey::Char(' ') if field == FormField::Type => {
                editor.cycle_type();
                self.editor_field = self.editor_field.min(editor.visible_fields().len() - 1);
            }
            AppKey::Enter if is_multiline(field) => editor.push_char(field, '\n'),
            AppKey::Enter => self.editor_field = (self.editor_field + 1) % field_count,
            AppKey::Char(c) if field != FormField::Type => editor.push_char(field, c),
            AppKey::Backspace => editor.pop_char(field),
            AppKey::Ctrl('d') => {
                let favorite = !editor.favorite;
                editor.set_favorite(favorite);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_confirmation_key(&mut self, key: AppKey) -> Result<(), Error> {
        match key {
            AppKey::Char('y') | AppKey::Char('Y') | AppKey::Enter => {
                if let Some(confirmation) = self.confirmation.take() {
                    self.confirm(confirmation)?;
                }
            }
            AppKey::Char('n') | AppKey::Char('N') | AppKey::Esc => {
                self.confirmation = None;
                self.events.notify(Severity::Info, "Cancelled");
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_input_key(&mut self, key: AppKey) -> Result<(), Error> {
        let Some(dialog) = self.input.as_mut() else {
            return Ok(());
        };
        match key {
            AppKey::Char(c) => dialog.value.push(c),
            AppKey::Backspace => {
                dialog.value.pop();
            }
            AppKey::Esc => self.input = None,
            AppKey::Enter => {
                if let Some(dialog) = self.input.take() {
                    self.submit_input(dialog)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_menu_key(&mut self, key: AppKey) -> Result<(), Error> {
        let Some(menu) = self.menu.as_mut() else {
            return Ok(());
        };
        match key {
            AppKey::Up | AppKey::Char('k') => menu.cursor = menu.cursor.saturating_sub(1),
            AppKey::Down | AppKey::Char('j') => {
                menu.cursor = (menu.cursor + 1).min(menu.items.len().saturating_sub(1))
            }
            AppKey::Esc => self.menu = None,
            AppKey::Enter => {
                if let Some(menu) = self.menu.take() {
                    if let Some(item) = menu.items.get(menu.cursor).filter(|i| i.enabled) {
                        self.run_menu_action(item.action, &menu.target)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- actions -------------------------------------------------------

    fn request_quit(&mut self) {
        match self.editor.as_ref().and_then(EditorForm::unload_guard) {
            Some(message) => {
                self.events.notify(Severity::Warning, message);
                self.focus = Focus::Editor;
            }
            None => self.quit = true,
        }
    }

    /// Quit even with pending editor changes
    pub fn force_quit(&mut self) {
        self.quit = true;
    }

    fn selected_category(&self) -> Option<String> {
        match self.tree.selected()? {
            NodeRef::Category(path) => Some(path.clone()),
            NodeRef::Record(id) => self
                .storage
                .record(id)
                .map(|r| r.category.clone())
                .filter(|c| !c.is_empty()),
            NodeRef::Bucket(_) => None,
        }
    }

    fn open_editor(&mut self, form: EditorForm) {
        if self.editor.as_ref().is_some_and(EditorForm::is_dirty) {
            self.events
                .notify(Severity::Warning, "Finish or discard the open editor first");
            self.focus = Focus::Editor;
            return;
        }
        self.editor = Some(form);
        self.editor_field = 0;
        self.focus = Focus::Editor;
    }

    fn open_new_editor(&mut self) {
        let category = self.selected_category().or_else(|| {
            let fallback = &self.storage.settings().default_category;
            self.storage
                .categories()
                .contains(fallback)
                .then(|| fallback.clone())
        });
        let mut form = EditorForm::open_new(category.as_deref(), self.events.clone());
        if matches!(self.tree.selected(), Some(NodeRef::Bucket(Bucket::Favorites))) {
            form.favorite = true;
        }
        self.open_editor(form);
    }

    fn open_edit_editor(&mut self) {
        let Some(id) = self.viewer.edit_target(&self.storage) else {
            return;
        };
        if let Some(record) = self.storage.record(&id) {
            let form = EditorForm::open_edit(record, self.events.clone());
            self.open_editor(form);
        }
    }

    fn duplicate_selected(&mut self) -> Result<(), Error> {
        let Some(id) = self.tree.selected_record().map(str::to_string) else {
            return Ok(());
        };
        let copy = self.storage.duplicate_record(&id)?;
        self.events.emit(AppEvent::RecordCreated(copy.clone()));
        self.tree.rebuild(&self.storage);
        self.tree.select(NodeRef::Record(copy));
        self.events.notify(Severity::Success, "Prompt duplicated");
        Ok(())
    }

    fn close_editor(&mut self) {
        match self.editor.as_ref().map(EditorForm::request_close) {
            Some(CloseDecision::NeedsConfirmation) => {
                self.confirmation = Some(Confirmation::DiscardEdits)
            }
            Some(CloseDecision::Closed) | None => {
                self.editor = None;
                self.focus = Focus::Tree;
            }
        }
    }

    /// Ctrl+S: submit the editor, or flush everything when no editor is open
    fn save(&mut self) -> Result<(), Error> {
        let Some(editor) = self.editor.as_mut() else {
            self.storage.save_all()?;
            self.events.notify(Severity::Success, "All changes saved");
            return Ok(());
        };

        match editor.submit(&mut self.storage) {
            Ok(id) => {
                self.editor = None;
                self.focus = Focus::Tree;
                self.tree.rebuild(&self.storage);
                self.tree.select(NodeRef::Record(id));
                Ok(())
            }
            Err(Error::Validation(e)) => {
                let count = e.errors.len();
                self.events.notify(
                    Severity::Error,
                    format!("Please fix {} field{}", count, if count == 1 { "" } else { "s" }),
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn toggle_theme(&mut self) -> Result<(), Error> {
        let theme = self.storage.settings().theme.toggled();
        self.storage.update_settings(|s| s.theme = theme)?;
        self.events.emit(AppEvent::ThemeChanged(theme));
        self.events
            .notify(Severity::Info, format!("Theme: {}", theme));
        Ok(())
    }

    fn backup_now(&mut self) -> Result<(), Error> {
        self.storage.create_backup()?;
        self.last_backup = Instant::now();
        self.events.emit(AppEvent::BackupCreated);
        self.events.notify(Severity::Success, "Backup created");
        Ok(())
    }

    fn confirm_delete(&mut self, id: &str) {
        if let Some(record) = self.storage.record(id) {
            self.confirmation = Some(Confirmation::DeleteRecord {
                id: record.id.clone(),
                title: record.title.clone(),
            });
        }
    }

    fn confirm(&mut self, confirmation: Confirmation) -> Result<(), Error> {
        match confirmation {
            Confirmation::DeleteRecord { id, .. } => {
                if !self.storage.delete_record(&id)? {
                    return Ok(());
                }
                if self.viewer.selected() == Some(id.as_str()) {
                    self.viewer.clear();
                }
                self.tree.forget_record(&id);
                self.events.emit(AppEvent::RecordDeleted(id));
                self.events.notify(Severity::Success, "Prompt deleted");
            }
            Confirmation::ClearAll => {
                self.storage.clear_all(false)?;
                self.editor = None;
                self.focus = Focus::Tree;
                self.events.notify(Severity::Success, "All data cleared");
            }
            Confirmation::RestoreBackup(index) => {
                if self.storage.restore_from_backup(index)? {
                    self.events.notify(Severity::Success, "Backup restored");
                } else {
                    self.events.notify(Severity::Error, "Backup not found");
                }
            }
            Confirmation::DiscardEdits => {
                self.editor = None;
                self.focus = Focus::Tree;
            }
        }
        Ok(())
    }

    fn open_menu(&mut self) {
        let Some(row) = self.tree.focused_row() else {
            return;
        };
        let items = self.tree.context_menu(row.node.clone());
        self.menu = Some(ContextMenu {
            target: row.node,
            items,
            cursor: 0,
        });
    }

    fn run_menu_action(&mut self, action: MenuAction, target: &NodeRef) -> Result<(), Error> {
        match (action, target) {
            (MenuAction::Edit, NodeRef::Record(_)) => self.open_edit_editor(),
            (MenuAction::Duplicate, NodeRef::Record(_)) => self.duplicate_selected()?,
            (MenuAction::ToggleFavorite, NodeRef::Record(_)) => {
                self.viewer.toggle_favorite(&mut self.storage)?;
            }
            (MenuAction::Delete, NodeRef::Record(id)) => self.confirm_delete(id),
            (MenuAction::NewPrompt, _) => self.open_new_editor(),
            (MenuAction::NewSubfolder, NodeRef::Category(path)) => {
                self.input = Some(InputDialog {
                    kind: InputKind::NewFolder {
                        parent: Some(path.clone()),
                    },
                    value: String::new(),
                })
            }
            (MenuAction::Rename, NodeRef::Category(path)) => {
                let current = self.storage.categories().display_name(path);
                self.input = Some(InputDialog {
                    kind: InputKind::RenameFolder(path.clone()),
                    value: current,
                })
            }
            _ => {}
        }
        Ok(())
    }

    fn open_new_folder_dialog(&mut self) {
        let parent = match self.tree.selected() {
            Some(NodeRef::Category(path)) => Some(path.clone()),
            _ => None,
        };
        self.input = Some(InputDialog {
            kind: InputKind::NewFolder { parent },
            value: String::new(),
        });
    }

    /// Keyboard stand-in for drag and drop: pick a record up, drop it on a folder
    fn grab_or_drop(&mut self) -> Result<(), Error> {
        let Some(row) = self.tree.focused_row() else {
            return Ok(());
        };
        match (self.grabbed.take(), &row.node) {
            (None, NodeRef::Record(id)) if self.tree.can_drag(&row.node) => {
                self.grabbed = Some(id.clone());
                self.events
                    .notify(Severity::Info, "Select a folder and press x to move here");
            }
            (None, _) => {}
            (Some(id), target) => {
                if self.tree.drop_record(&mut self.storage, &id, target)? {
                    let name = match target {
                        NodeRef::Category(path) => self.storage.categories().display_name(path),
                        _ => String::new(),
                    };
                    self.events
                        .notify(Severity::Success, format!("Moved to {}", name));
                } else {
                    self.events
                        .notify(Severity::Warning, "Prompts can only be moved into a folder");
                }
            }
        }
        Ok(())
    }

    fn submit_input(&mut self, dialog: InputDialog) -> Result<(), Error> {
        let value = dialog.value.trim().to_string();
        if value.is_empty() {
            return Ok(());
        }
        match dialog.kind {
            InputKind::ExportPath => {
                let path = expand_path(&value);
                match self.export_to(&path) {
                    Ok(()) => self
                        .events
                        .notify(Severity::Success, format!("Exported to {}", path.display())),
                    Err(e) => self
                        .events
                        .notify(Severity::Error, format!("Export failed: {}", e)),
                }
            }
            InputKind::ImportPath { merge } => {
                let path = expand_path(&value);
                self.import_from(&path, merge)?;
            }
            InputKind::NewFolder { parent } => {
                let path = match parent {
                    Some(parent) => format!("{}/{}", parent, value),
                    None => value.clone(),
                };
                let path = self.storage.add_category(&path, Some(&value), None, None)?;
                self.events.emit(AppEvent::CategoryCreated(path.clone()));
                self.tree.rebuild(&self.storage);
                self.tree.select(NodeRef::Category(path));
                self.events.notify(Severity::Success, "Folder created");
            }
            InputKind::RenameFolder(path) => {
                self.storage.rename_category(&path, &value)?;
                self.tree.rebuild(&self.storage);
                self.events.notify(Severity::Success, "Folder renamed");
            }
        }
        Ok(())
    }

    // ---- import / export -----------------------------------------------

    /// Write the full collection; the format follows the file extension
    pub fn export_to(&self, path: &Path) -> anyhow::Result<()> {
        let format = ExportFormat::from_path(path).unwrap_or(ExportFormat::Json);
        let text = self.storage.export_all(format)?;
        std::fs::write(path, text)?;
        tracing::info!(path = %path.display(), %format, "Exported collection");
        Ok(())
    }

    /// Read a file and import it; problems are reported as notifications
    pub fn import_from(&mut self, path: &Path, merge: bool) -> Result<(), Error> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                self.events.notify(
                    Severity::Error,
                    format!("Cannot read {}: {}", path.display(), e),
                );
                return Ok(());
            }
        };

        match self
            .storage
            .import_all(&text, ExportFormat::from_path(path), merge)
        {
            Ok(summary) => {
                let severity = if summary.errors.is_empty() {
                    Severity::Success
                } else {
                    Severity::Warning
                };
                self.events.notify(
                    severity,
                    format!(
                        "Imported {} prompt(s), skipped {}, {} error(s)",
                        summary.imported,
                        summary.skipped,
                        summary.errors.len()
                    ),
                );
                Ok(())
            }
            Err(Error::Parse(e)) => {
                self.events
                    .notify(Severity::Error, format!("Import failed: {}", e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ---- recovery and shutdown -----------------------------------------

    /// Re-read everything from the store and reset transient view state
    pub fn reload(&mut self) {
        self.confirmation = None;
        self.input = None;
        self.menu = None;
        self.grabbed = None;
        self.editor = None;
        self.focus = Focus::Tree;
        self.load_report = self.storage.load();
        self.tree.rebuild(&self.storage);
        self.on_data_reloaded();
    }

    /// Drop all stored data, backups included, and start fresh
    pub fn wipe_and_reload(&mut self) -> Result<(), StoreError> {
        self.storage.clear_all(true)?;
        self.storage.clear_search_history()?;
        self.reload();
        Ok(())
    }

    /// Final save and backup
    pub fn shutdown(&mut self) -> Result<(), StoreError> {
        if let Some(message) = self.editor.as_ref().and_then(EditorForm::unload_guard) {
            tracing::warn!(message, "Closing with an open editor");
        }
        self.storage.shutdown()?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Fields where Enter inserts a newline
pub fn is_multiline(field: FormField) -> bool {
    matches!(
        field,
        FormField::Body | FormField::NegativeBody | FormField::Notes
    )
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::kv::MemoryStore;
    use crate::settings::Theme;
    use tempfile::TempDir;

    fn app_with(store: MemoryStore) -> App<MemoryStore> {
        let storage = Storage::new(store, EventBus::new());
        App::start(storage, Instant::now())
            .unwrap()
            .with_clipboard(Box::new(MemoryClipboard::default()))
    }

    fn app() -> App<MemoryStore> {
        app_with(MemoryStore::default())
    }

    fn id_of(app: &App<MemoryStore>, title: &str) -> String {
        app.storage()
            .records()
            .iter()
            .find(|r| r.title == title)
            .map(|r| r.id.clone())
            .unwrap()
    }

    fn press(app: &mut App<MemoryStore>, keys: &[AppKey]) {
        for key in keys {
            app.handle_key(*key, Instant::now()).unwrap();
        }
    }

    fn type_text(app: &mut App<MemoryStore>, text: &str) {
        for c in text.chars() {
            app.handle_key(AppKey::Char(c), Instant::now()).unwrap();
        }
    }

    #[test]
    fn test_first_run_seeds_samples() {
        let app = app();
        assert!(app.load_report().first_run);
        assert_eq!(app.storage().records().len(), 2);

        let review = id_of(&app, "AI Code Review");
        assert!(app.storage().is_favorite(&review));
        assert_eq!(app.tree().tree().favorites(), &[review]);
    }

    #[test]
    fn test_second_start_does_not_reseed() {
        let store = MemoryStore::default();
        let mut first = app_with(store.connect());
        let id = id_of(&first, "Recruiter");
        first.storage.delete_record(&id).unwrap();
        let review = id_of(&first, "AI Code Review");
        first.storage.delete_record(&review).unwrap();

        let second = app_with(store.connect());
        assert!(!second.load_report().first_run);
        assert!(second.storage().records().is_empty());
    }

    #[test]
    fn test_search_filters_tree_after_debounce() {
        let mut app = app();
        let start = Instant::now();

        app.handle_key(AppKey::Ctrl('f'), start).unwrap();
        for c in "java".chars() {
            app.handle_key(AppKey::Char(c), start).unwrap();
        }
        assert!(!app.tree().is_filtered());

        app.tick(start + Duration::from_millis(350));
        assert!(app.tree().is_filtered());

        let review = id_of(&app, "AI Code Review");
        let recruiter = id_of(&app, "Recruiter");
        let rows = app.tree().rows();
        assert!(rows.iter().any(|r| r.node == NodeRef::Record(review.clone())));
        assert!(!rows.iter().any(|r| r.node == NodeRef::Record(recruiter.clone())));
        assert!(!rows
            .iter()
            .any(|r| r.node == NodeRef::Category("productivity".to_string())));

        app.handle_key(AppKey::Esc, start).unwrap();
        assert!(!app.tree().is_filtered());
        assert_eq!(app.focus(), Focus::Tree);
    }

    #[test]
    fn test_enter_in_search_records_history() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('f')]);
        type_text(&mut app, "hr");
        press(&mut app, &[AppKey::Enter]);

        assert!(app.tree().is_filtered());
        assert_eq!(app.storage().search_history().entries(), &["hr"]);
    }

    #[test]
    fn test_new_prompt_through_editor() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('n')]);
        assert_eq!(app.focus(), Focus::Editor);
        assert_eq!(app.editor_field(), Some(FormField::Title));

        // Saving an empty form keeps the editor open
        press(&mut app, &[AppKey::Ctrl('s')]);
        assert!(app.editor().is_some());

        type_text(&mut app, "Haiku");
        press(&mut app, &[AppKey::Tab, AppKey::Tab]);
        assert_eq!(app.editor_field(), Some(FormField::Body));
        type_text(&mut app, "Write a haiku");
        press(&mut app, &[AppKey::Ctrl('s')]);

        assert!(app.editor().is_none());
        let id = id_of(&app, "Haiku");
        assert_eq!(app.tree().selected_record(), Some(id.as_str()));
        assert_eq!(app.viewer().selected(), Some(id.as_str()));
    }

    #[test]
    fn test_dirty_editor_needs_confirmation_to_close() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('n')]);
        type_text(&mut app, "Draft");

        press(&mut app, &[AppKey::Esc]);
        assert_eq!(app.confirmation(), Some(&Confirmation::DiscardEdits));
        press(&mut app, &[AppKey::Char('n')]);
        assert!(app.editor().is_some());

        press(&mut app, &[AppKey::Esc, AppKey::Char('y')]);
        assert!(app.editor().is_none());
        assert_eq!(app.focus(), Focus::Tree);
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut app = app();
        let id = id_of(&app, "Recruiter");
        app.tree.toggle(&mut app.storage, "productivity").unwrap();
        app.tree.select(NodeRef::Record(id.clone()));

        press(&mut app, &[AppKey::Delete]);
        assert!(matches!(
            app.confirmation(),
            Some(Confirmation::DeleteRecord { .. })
        ));
        assert!(app.storage().contains(&id));

        press(&mut app, &[AppKey::Char('y')]);
        assert!(!app.storage().contains(&id));
        assert_eq!(app.viewer().selected(), None);
        assert_eq!(app.tree().selected(), None);
    }

    #[test]
    fn test_theme_toggle_persists() {
        let store = MemoryStore::default();
        let mut app = app_with(store.connect());
        assert_eq!(app.storage().settings().theme, Theme::Dark);

        press(&mut app, &[AppKey::Ctrl('t')]);
        assert_eq!(app.storage().settings().theme, Theme::Light);

        let other = app_with(store.connect());
        assert_eq!(other.storage().settings().theme, Theme::Light);
    }

    #[test]
    fn test_backup_and_restore() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('b')]);
        assert_eq!(app.storage().backups().len(), 1);

        let id = id_of(&app, "Recruiter");
        app.storage.delete_record(&id).unwrap();

        press(&mut app, &[AppKey::Char('R'), AppKey::Enter]);
        assert!(app.storage().contains(&id));
    }

    #[test]
    fn test_clear_all_keeps_backups() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('b'), AppKey::Char('X'), AppKey::Char('y')]);
        assert!(app.storage().records().is_empty());
        assert_eq!(app.storage().backups().len(), 1);
        assert!(app.tree().rows().iter().all(|r| r.is_folder()));
    }

    #[test]
    fn test_grab_and_drop_moves_record() {
        let mut app = app();
        let id = id_of(&app, "Recruiter");
        app.tree.toggle(&mut app.storage, "productivity").unwrap();
        app.tree.select(NodeRef::Record(id.clone()));

        press(&mut app, &[AppKey::Char('x')]);
        assert_eq!(app.grabbed(), Some(id.as_str()));

        app.tree.focus_node(&NodeRef::Category("creative".to_string()));
        press(&mut app, &[AppKey::Char('x')]);
        assert_eq!(app.grabbed(), None);
        assert_eq!(app.storage().record(&id).unwrap().category, "creative");
    }

    #[test]
    fn test_context_menu_new_subfolder() {
        let mut app = app();
        app.tree.focus_node(&NodeRef::Category("creative".to_string()));
        press(&mut app, &[AppKey::Char('m')]);
        let menu = app.menu().unwrap();
        assert_eq!(menu.items[1].action, MenuAction::NewSubfolder);

        press(&mut app, &[AppKey::Down, AppKey::Enter]);
        type_text(&mut app, "poetry");
        press(&mut app, &[AppKey::Enter]);

        assert!(app.storage().categories().contains("creative/poetry"));
        assert_eq!(
            app.tree().selected(),
            Some(&NodeRef::Category("creative/poetry".to_string()))
        );
    }

    #[test]
    fn test_copy_uses_clipboard() {
        let mut app = app();
        let id = id_of(&app, "Recruiter");
        app.tree.select(NodeRef::Record(id));
        press(&mut app, &[AppKey::Char('c')]);
        assert!(matches!(
            app.notifications().current(),
            Some(n) if n.severity == Severity::Success
        ));
    }

    #[test]
    fn test_export_then_replace_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all.yaml");
        let mut app = app();
        app.export_to(&path).unwrap();

        let id = id_of(&app, "Recruiter");
        app.storage.delete_record(&id).unwrap();
        app.import_from(&path, false).unwrap();
        app.process_events(Instant::now());

        assert_eq!(app.storage().records().len(), 2);
        assert!(app.storage().contains(&id));
    }

    #[test]
    fn test_import_of_missing_file_notifies() {
        let mut app = app();
        app.import_from(Path::new("/nonexistent/pshelf.json"), true)
            .unwrap();
        app.process_events(Instant::now());
        assert!(matches!(
            app.notifications().current(),
            Some(n) if n.severity == Severity::Error
        ));
    }

    #[test]
    fn test_changes_from_another_instance_are_picked_up() {
        let store = MemoryStore::default();
        let mut left = app_with(store.connect());
        let mut right = app_with(store.connect());

        let id = id_of(&left, "Recruiter");
        left.storage.delete_record(&id).unwrap();

        right.tick(Instant::now());
        assert!(!right.storage().contains(&id));
        assert!(!right
            .tree()
            .rows()
            .iter()
            .any(|r| r.node == NodeRef::Record(id.clone())));
    }

    #[test]
    fn test_quit_is_blocked_by_dirty_editor() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('n')]);
        type_text(&mut app, "x");
        press(&mut app, &[AppKey::Ctrl('q')]);
        assert!(!app.should_quit());

        app.force_quit();
        assert!(app.should_quit());
    }

    #[test]
    fn test_external_edit_replaces_field() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('n')]);
        app.set_editor_value(FormField::Body, "line one\nline two");
        assert_eq!(app.editor().unwrap().body, "line one\nline two");
        assert!(app.editor().unwrap().is_dirty());
    }

    #[test]
    fn test_periodic_backup() {
        let start = Instant::now();
        let storage = Storage::new(MemoryStore::default(), EventBus::new());
        let mut app = App::start(storage, start)
            .unwrap()
            .with_backup_interval(Duration::from_secs(60));

        app.tick(start + Duration::from_secs(30));
        assert!(app.storage().backups().is_empty());
        app.tick(start + Duration::from_secs(61));
        assert_eq!(app.storage().backups().len(), 1);
    }

    #[test]
    fn test_periodic_backup_off_without_autosave() {
        let start = Instant::now();
        let storage = Storage::new(MemoryStore::default(), EventBus::new());
        let mut app = App::start(storage, start)
            .unwrap()
            .with_backup_interval(Duration::from_secs(60));
        app.storage
            .update_settings(|s| s.autosave = false)
            .unwrap();

        app.tick(start + Duration::from_secs(61));
        assert!(app.storage().backups().is_empty());
    }

    #[test]
    fn test_new_prompt_starts_in_default_category() {
        let mut app = app();
        app.storage
            .update_settings(|s| s.default_category = "creative".to_string())
            .unwrap();
        press(&mut app, &[AppKey::Ctrl('n')]);
        assert_eq!(app.editor().unwrap().category, "creative");

        press(&mut app, &[AppKey::Esc]);
        app.tree.select(NodeRef::Category("productivity".to_string()));
        press(&mut app, &[AppKey::Ctrl('n')]);
        assert_eq!(app.editor().unwrap().category, "productivity");
    }

    #[test]
    fn test_delete_of_focused_row_keeps_viewer() {
        let mut app = app();
        let recruiter = id_of(&app, "Recruiter");
        let review = id_of(&app, "AI Code Review");
        for path in ["productivity", "linguaggi", "linguaggi/java"] {
            app.tree.toggle(&mut app.storage, path).unwrap();
        }
        app.tree.select(NodeRef::Record(recruiter.clone()));
        app.process_events(Instant::now());
        assert_eq!(app.viewer().selected(), Some(recruiter.as_str()));

        app.tree.focus_node(&NodeRef::Record(review.clone()));
        assert_eq!(
            app.tree().focused_row().map(|r| r.node),
            Some(NodeRef::Record(review.clone()))
        );
        press(&mut app, &[AppKey::Delete, AppKey::Char('y')]);

        assert!(!app.storage().contains(&review));
        assert_eq!(app.viewer().selected(), Some(recruiter.as_str()));
        assert_eq!(app.tree().selected_record(), Some(recruiter.as_str()));
    }

    #[test]
    fn test_restore_keeps_focus_and_reloads_once() {
        let mut app = app();
        let recruiter = id_of(&app, "Recruiter");
        app.tree.toggle(&mut app.storage, "productivity").unwrap();
        press(&mut app, &[AppKey::Ctrl('b')]);
        let node = NodeRef::Record(recruiter.clone());
        app.tree.focus_node(&node);
        let focus = app.tree().focus();
        assert!(focus > 0);

        let rx = app.storage().events().subscribe();
        press(&mut app, &[AppKey::Char('R'), AppKey::Enter]);

        let reloads = rx
            .try_iter()
            .filter(|e| *e == AppEvent::DataReloaded)
            .count();
        assert_eq!(reloads, 1);
        assert_eq!(app.tree().focused_row().map(|r| r.node), Some(node));
    }

    #[test]
    fn test_wipe_and_reload() {
        let mut app = app();
        press(&mut app, &[AppKey::Ctrl('b')]);
        app.wipe_and_reload().unwrap();
        assert!(app.storage().records().is_empty());
        assert!(app.storage().backups().is_empty());
    }
}
