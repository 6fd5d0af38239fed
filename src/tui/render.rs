//! Drawing of the application state
//!
//! Everything here reads from [`App`]; nothing mutates it.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::theme::Palette;
use crate::app::{App, Focus};
use crate::editor::{EditorForm, EditorMode, FormField};
use crate::kv::KeyValueStore;
use crate::record::PromptType;
use crate::tree::{NodeRef, TreeRow};
use crate::viewer::{RecordDetails, ViewerContent};

pub fn draw<S: KeyValueStore>(f: &mut Frame, app: &App<S>, recovery: Option<&str>) {
    let palette = Palette::for_theme(app.storage().settings().theme);
    f.render_widget(Block::default().style(palette.base()), f.area());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_search_bar(f, app, &palette, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(rows[1]);

    draw_tree(f, app, &palette, columns[0]);
    match app.editor() {
        Some(form) => draw_editor(f, form, app.editor_field(), &palette, columns[1]),
        None => draw_viewer(f, app, &palette, columns[1]),
    }
    draw_status_bar(f, app, &palette, rows[2]);

    if let Some(menu) = app.menu() {
        let items: Vec<ListItem> = menu
            .items
            .iter()
            .map(|item| {
                let style = if item.enabled {
                    Style::default().fg(palette.text)
                } else {
                    Style::default().fg(palette.muted)
                };
                ListItem::new(Span::styled(format!(" {}", item.label), style))
            })
            .collect();
        let height = menu.items.len() as u16 + 2;
        let area = centered_fixed(34, height, f.area());
        f.render_widget(Clear, area);
        let list = List::new(items)
            .block(modal_block(" Actions ", &palette))
            .highlight_style(palette.highlight())
            .highlight_symbol("▶");
        let mut state = ListState::default().with_selected(Some(menu.cursor));
        f.render_stateful_widget(list, area, &mut state);
    }

    if let Some(dialog) = app.input() {
        let area = centered_fixed(60, 5, f.area());
        f.render_widget(Clear, area);
        let text = vec![
            Line::from(Span::styled(
                format!("{}▏", dialog.value),
                Style::default().fg(palette.text),
            )),
            Line::from(Span::styled(
                "[Enter] Confirm  [Esc] Cancel",
                Style::default().fg(palette.muted),
            )),
        ];
        let title = format!(" {} ", dialog.kind.title());
        f.render_widget(
            Paragraph::new(text).block(modal_block(&title, &palette)),
            area,
        );
    }

    if let Some(confirmation) = app.confirmation() {
        draw_confirmation(f, &confirmation.message(), &palette);
    }

    if app.help_visible() {
        draw_help(f, &palette);
    }

    if let Some(message) = recovery {
        draw_recovery(f, message, &palette);
    }
}

fn modal_block<'a>(title: &'a str, palette: &Palette) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(palette.border(true))
        .title_style(palette.title())
        .style(Style::default().bg(palette.modal_bg))
}

fn draw_search_bar<S: KeyValueStore>(f: &mut Frame, app: &App<S>, palette: &Palette, area: Rect) {
    let focused = app.focus() == Focus::Search;
    let query = app.search().query();

    let mut spans = vec![Span::raw("🔍 ")];
    if query.is_empty() && !focused {
        spans.push(Span::styled(
            "Search titles, text, tags, notes... (Ctrl+F or /)",
            Style::default().fg(palette.muted),
        ));
    } else {
        spans.push(Span::styled(query.to_string(), Style::default().fg(palette.text)));
        if focused {
            spans.push(Span::styled("▏", Style::default().fg(palette.accent)));
        }
    }
    if app.search().is_pending() {
        spans.push(Span::styled(" …", Style::default().fg(palette.muted)));
    }

    let title = match app.tree().filter_query() {
        Some(filter) => format!(" Search: \"{}\" ", filter),
        None => " Search ".to_string(),
    };
    let bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(palette.border(focused))
            .title_style(palette.title()),
    );
    f.render_widget(bar, area);
}

/// Split a label into plain and highlighted spans
fn label_spans(row: &TreeRow, palette: &Palette) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    let matched = Style::default()
        .bg(palette.match_bg)
        .add_modifier(Modifier::BOLD);

    for range in &row.highlights {
        let (Some(before), Some(hit)) = (
            row.label.get(cursor..range.start),
            row.label.get(range.clone()),
        ) else {
            continue;
        };
        spans.push(Span::raw(before.to_string()));
        spans.push(Span::styled(hit.to_string(), matched));
        cursor = range.end;
    }
    spans.push(Span::raw(row.label.get(cursor..).unwrap_or_default().to_string()));
    spans
}

fn tree_item(row: &TreeRow, grabbed: Option<&str>, palette: &Palette) -> ListItem<'static> {
    let mut spans = vec![Span::raw("  ".repeat(row.depth))];

    if row.is_folder() {
        let marker = if row.expanded { "▼ " } else { "▶ " };
        spans.push(Span::styled(marker, Style::default().fg(palette.muted)));
    } else {
        spans.push(Span::raw("  "));
    }
    spans.push(Span::raw(format!("{} ", row.icon)));

    let label_style = if row.is_folder() {
        Style::default().fg(palette.text).add_modifier(Modifier::BOLD)
    } else if row.selected {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.text)
    };
    spans.extend(
        label_spans(row, palette)
            .into_iter()
            .map(|span| span.patch_style(label_style)),
    );

    if row.is_folder() {
        spans.push(Span::styled(
            format!(" ({})", row.count),
            Style::default().fg(palette.muted),
        ));
    } else if row.favorite {
        spans.push(Span::styled(" ★", Style::default().fg(palette.favorite)));
    }

    if let (NodeRef::Record(id), Some(grabbed)) = (&row.node, grabbed) {
        if id == grabbed {
            spans.push(Span::styled(" ✂", Style::default().fg(palette.warning)));
        }
    }

    ListItem::new(Line::from(spans))
}

fn draw_tree<S: KeyValueStore>(f: &mut Frame, app: &App<S>, palette: &Palette, area: Rect) {
    let rows = app.tree().rows();
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| tree_item(row, app.grabbed(), palette))
        .collect();

    let title = format!(" 📁 Prompts • {} ", app.storage().records().len());
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(palette.border(app.focus() == Focus::Tree))
                .title_style(palette.title()),
        )
        .highlight_style(palette.highlight())
        .highlight_symbol("▌");

    let selected = (!rows.is_empty()).then(|| app.tree().focus());
    let mut state = ListState::default().with_selected(selected);
    f.render_stateful_widget(list, area, &mut state);
}

fn field_line(label: &str, value: &str, palette: &Palette) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<10}", label), Style::default().fg(palette.muted)),
        Span::styled(value.to_string(), Style::default().fg(palette.text)),
    ])
}

/// Lines of the structured record view
pub fn detail_lines(details: &RecordDetails, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(vec![
            Span::raw(format!("{} ", details.type_icon)),
            Span::styled(details.title.clone(), palette.title()),
            Span::styled(
                if details.favorite { " ★" } else { "" },
                Style::default().fg(palette.favorite),
            ),
        ]),
        Line::from(""),
        field_line("Type", details.type_label, palette),
    ];

    if let Some(category) = &details.category {
        lines.push(field_line("Folder", category, palette));
    }
    if let Some(model) = &details.model {
        lines.push(field_line("Model", model, palette));
    }
    if let Some(author) = &details.author {
        lines.push(field_line("Author", author, palette));
    }
    lines.push(field_line("Version", &details.version, palette));
    lines.push(field_line(
        "Dates",
        &format!("created {}, modified {}", details.created, details.modified),
        palette,
    ));
    if !details.tags.is_empty() {
        let tags: Vec<Span> = details
            .tags
            .iter()
            .flat_map(|tag| {
                [
                    Span::styled(format!("#{}", tag), Style::default().fg(palette.accent)),
                    Span::raw(" "),
                ]
            })
            .collect();
        let mut spans = vec![Span::styled(
            format!("{:<10}", "Tags"),
            Style::default().fg(palette.muted),
        )];
        spans.extend(tags);
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Prompt",
        Style::default().fg(palette.muted).add_modifier(Modifier::BOLD),
    )));
    lines.extend(details.body.lines().map(|l| Line::from(l.to_string())));

    if let Some(negative) = &details.negative_body {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Negative prompt",
            Style::default().fg(palette.error).add_modifier(Modifier::BOLD),
        )));
        lines.extend(negative.lines().map(|l| Line::from(l.to_string())));
    }
    if let Some(notes) = &details.notes {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().fg(palette.muted).add_modifier(Modifier::BOLD),
        )));
        lines.extend(
            notes
                .lines()
                .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(palette.muted)))),
        );
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("{} characters • {} words", details.char_count, details.word_count),
        Style::default().fg(palette.muted),
    )));
    lines
}

fn welcome_lines(palette: &Palette) -> Vec<Line<'static>> {
    let key = |k: &str, what: &str| {
        Line::from(vec![
            Span::styled(format!("  {:<12}", k), Style::default().fg(palette.accent)),
            Span::styled(what.to_string(), Style::default().fg(palette.text)),
        ])
    };
    vec![
        Line::from(Span::styled("Welcome to PromptShelf", palette.title())),
        Line::from(""),
        Line::from(Span::styled(
            "Pick a prompt in the tree to see it here.",
            Style::default().fg(palette.muted),
        )),
        Line::from(""),
        key("Ctrl+N", "New prompt"),
        key("Ctrl+F, /", "Search"),
        key("Enter", "Open folder or prompt"),
        key("m", "Actions for the focused row"),
        key("F1, ?", "All shortcuts"),
    ]
}

fn draw_viewer<S: KeyValueStore>(f: &mut Frame, app: &App<S>, palette: &Palette, area: Rect) {
    let (title, lines) = match app.viewer().render(app.storage()) {
        ViewerContent::Welcome => (" Preview ".to_string(), welcome_lines(palette)),
        ViewerContent::Structured(details) => (" Preview ".to_string(), detail_lines(&details, palette)),
        ViewerContent::Raw { text, .. } => (
            " Raw (YAML) ".to_string(),
            text.lines().map(|l| Line::from(l.to_string())).collect(),
        ),
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(palette.border(false))
                .title_style(palette.title()),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.viewer_scroll(), 0));
    f.render_widget(paragraph, area);
}

fn type_selector(value: &str) -> String {
    let label = value
        .parse::<PromptType>()
        .map(|t| format!("{} {}", t.icon(), t.label()))
        .unwrap_or_else(|_| value.to_string());
    format!("◀ {} ▶", label)
}

fn draw_editor(
    f: &mut Frame,
    form: &EditorForm,
    current: Option<FormField>,
    palette: &Palette,
    area: Rect,
) {
    let mut lines = Vec::new();
    for field in form.visible_fields() {
        let active = current == Some(field);
        let marker = if active { "▸ " } else { "  " };
        let label_style = if active {
            Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        lines.push(Line::from(Span::styled(
            format!("{}{}", marker, field.label()),
            label_style,
        )));

        let value = form.value(field);
        if field == FormField::Type {
            lines.push(Line::from(format!("    {}", type_selector(value))));
        } else if value.is_empty() {
            lines.push(Line::from(Span::styled(
                if active { "    ▏" } else { "    -" },
                Style::default().fg(palette.muted),
            )));
        } else {
            let mut value_lines: Vec<String> = value.split('\n').map(|l| format!("    {}", l)).collect();
            if active {
                if let Some(last) = value_lines.last_mut() {
                    last.push('▏');
                }
            }
            lines.extend(value_lines.into_iter().map(Line::from));
        }

        for error in form.errors_for(field) {
            lines.push(Line::from(Span::styled(
                format!("    ⚠ {}", error),
                Style::default().fg(palette.error),
            )));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        if form.favorite { "★ Favorite (Ctrl+D)" } else { "☆ Favorite (Ctrl+D)" },
        Style::default().fg(palette.favorite),
    )));

    let title = match form.mode() {
        EditorMode::Create => " New prompt ",
        EditorMode::Edit(_) => " Edit prompt ",
    };
    let title = if form.is_dirty() {
        format!("{}* ", title)
    } else {
        title.to_string()
    };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(palette.border(true))
                .title_style(palette.title()),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn hints(focus: Focus) -> &'static str {
    match focus {
        Focus::Tree => " [↑↓] Move • [Enter] Open • [e] Edit • [f] Star • [c] Copy • [x] Move • [m] Actions • [?] Help • [q] Quit",
        Focus::Search => " [Enter] Search now • [↑↓] History • [Esc] Clear • [Tab] Back to tree",
        Focus::Editor => " [Tab] Next field • [Ctrl+S] Save • [Ctrl+X] External editor • [Esc] Close",
    }
}

fn draw_status_bar<S: KeyValueStore>(f: &mut Frame, app: &App<S>, palette: &Palette, area: Rect) {
    let (text, fg) = if let Some(notification) = app.notifications().current() {
        (
            format!(" {}", notification.message),
            palette.severity(notification.severity),
        )
    } else if let Some(title) = app
        .grabbed()
        .and_then(|id| app.storage().record(id))
        .map(|r| r.title.clone())
    {
        (
            format!(" Moving \"{}\": pick a folder and press x, Esc cancels", title),
            palette.warning,
        )
    } else {
        (hints(app.focus()).to_string(), palette.muted)
    };

    let status = Paragraph::new(text).style(Style::default().bg(palette.status_bg).fg(fg));
    f.render_widget(status, area);
}

fn draw_confirmation(f: &mut Frame, message: &str, palette: &Palette) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(message.to_string(), Style::default().fg(palette.text))),
        Line::from(""),
        Line::from(vec![
            Span::styled(
                "[Enter or y]",
                Style::default().fg(palette.success).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" Confirm  ", Style::default().fg(palette.text)),
            Span::styled(
                "[Esc or n]",
                Style::default().fg(palette.warning).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" Cancel", Style::default().fg(palette.text)),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .block(modal_block(" Confirm ", palette))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_help(f: &mut Frame, palette: &Palette) {
    let area = centered_rect(80, 80, f.area());
    f.render_widget(Clear, area);

    let section = |name: &str| {
        Line::from(Span::styled(
            name.to_string(),
            Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
        ))
    };
    let help_text = vec![
        section("Tree"),
        Line::from("  ↑↓ / j k      Move"),
        Line::from("  ← → / h l     Collapse / expand"),
        Line::from("  Enter, Space  Open folder or select prompt"),
        Line::from("  e / d / Del   Edit / duplicate / delete"),
        Line::from("  f             Star or unstar"),
        Line::from("  c, y          Copy (body, or YAML in raw view)"),
        Line::from("  v             Structured / raw view"),
        Line::from("  x             Pick up a prompt, then drop it on a folder"),
        Line::from("  n             New folder    m, F10  Actions menu"),
        Line::from("  + / -         Expand / collapse all"),
        Line::from("  PgUp / PgDn   Scroll the preview"),
        Line::from(""),
        section("Everywhere"),
        Line::from("  Ctrl+N        New prompt        Ctrl+S  Save"),
        Line::from("  Ctrl+F, /     Search            Esc     Cancel / clear"),
        Line::from("  Ctrl+E        Export            Ctrl+I  Import (merge)"),
        Line::from("  I             Import (replace)  Ctrl+B  Backup now"),
        Line::from("  R             Restore latest backup"),
        Line::from("  X             Delete everything (backups are kept)"),
        Line::from("  Ctrl+T        Light / dark theme"),
        Line::from("  Ctrl+Q, q     Quit"),
        Line::from(""),
        section("Editor"),
        Line::from("  Tab / Shift+Tab  Next / previous field"),
        Line::from("  ← →              Change type"),
        Line::from("  Ctrl+D           Star          Ctrl+X  Edit field in $EDITOR"),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key to close help...",
            Style::default().fg(palette.muted),
        )),
    ];

    let help_block = Paragraph::new(help_text)
        .block(modal_block(" Help ", palette))
        .style(Style::default().fg(palette.text))
        .wrap(Wrap { trim: false });
    f.render_widget(help_block, area);
}

fn draw_recovery(f: &mut Frame, message: &str, palette: &Palette) {
    let area = centered_rect(70, 40, f.area());
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(Span::styled(
            "Something went wrong while saving your data",
            Style::default().fg(palette.error).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(message.to_string(), Style::default().fg(palette.text))),
        Line::from(""),
        Line::from(vec![
            Span::styled("[r]", Style::default().fg(palette.success).add_modifier(Modifier::BOLD)),
            Span::raw(" Reload from disk   "),
            Span::styled("[w]", Style::default().fg(palette.error).add_modifier(Modifier::BOLD)),
            Span::raw(" Wipe all data and reload   "),
            Span::styled("[q]", Style::default().fg(palette.warning).add_modifier(Modifier::BOLD)),
            Span::raw(" Quit"),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .block(modal_block(" Recovery ", palette))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Fixed-size box centered in `r`, clipped to it
fn centered_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let width = width.min(r.width);
    let height = height.min(r.height);
    Rect {
        x: r.x + (r.width - width) / 2,
        y: r.y + (r.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppKey;
    use crate::clipboard::MemoryClipboard;
    use crate::events::EventBus;
    use crate::kv::MemoryStore;
    use crate::storage::Storage;
    use ratatui::{backend::TestBackend, Terminal};
    use std::time::Instant;

    fn app() -> App<MemoryStore> {
        let storage = Storage::new(MemoryStore::default(), EventBus::new());
        App::start(storage, Instant::now())
            .unwrap()
            .with_clipboard(Box::new(MemoryClipboard::default()))
    }

    fn screen(app: &App<MemoryStore>, recovery: Option<&str>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| draw(f, app, recovery)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for row in buffer.content.chunks(buffer.area.width as usize) {
            for cell in row {
                text.push_str(cell.symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_tree_and_welcome_are_drawn() {
        let app = app();
        let text = screen(&app, None);
        assert!(text.contains("AI Code Review"));
        assert!(text.contains("Welcome to PromptShelf"));
    }

    #[test]
    fn test_editor_replaces_viewer() {
        let mut app = app();
        app.handle_key(AppKey::Ctrl('n'), Instant::now()).unwrap();
        let text = screen(&app, None);
        assert!(text.contains("New prompt"));
        assert!(!text.contains("Welcome to PromptShelf"));
    }

    #[test]
    fn test_overlays() {
        let mut app = app();
        app.handle_key(AppKey::F(1), Instant::now()).unwrap();
        assert!(screen(&app, None).contains("Press any key to close help"));

        let text = screen(&app, Some("disk full"));
        assert!(text.contains("Recovery"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_highlight_spans_split_label() {
        let row = TreeRow {
            node: NodeRef::Record("a".to_string()),
            depth: 0,
            label: "AI Code Review".to_string(),
            icon: "💻".to_string(),
            expanded: false,
            selected: false,
            favorite: false,
            count: 0,
            highlights: vec![3..7],
        };
        let palette = Palette::for_theme(crate::settings::Theme::Dark);
        let spans = label_spans(&row, &palette);
        let texts: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, vec!["AI ", "Code", " Review"]);
    }

    #[test]
    fn test_centered_fixed_is_clipped() {
        let area = centered_fixed(50, 10, Rect::new(0, 0, 20, 5));
        assert_eq!(area, Rect::new(0, 0, 20, 5));
    }
}
