use ratatui::style::{Color, Modifier, Style};

use crate::events::Severity;
use crate::settings::Theme;

/// Colors for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub border_focused: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub accent: Color,
    pub favorite: Color,
    pub match_bg: Color,
    pub modal_bg: Color,
    pub status_bg: Color,
    pub info: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                background: Color::Rgb(25, 28, 35),
                text: Color::Rgb(200, 205, 215),
                muted: Color::Rgb(120, 128, 140),
                border: Color::Rgb(60, 66, 78),
                border_focused: Color::Rgb(130, 140, 255),
                selection_bg: Color::Rgb(45, 50, 59),
                selection_fg: Color::Rgb(255, 255, 255),
                accent: Color::Rgb(130, 140, 255),
                favorite: Color::Rgb(245, 158, 11),
                match_bg: Color::Rgb(120, 90, 20),
                modal_bg: Color::Rgb(30, 33, 41),
                status_bg: Color::Rgb(35, 38, 45),
                info: Color::Rgb(96, 165, 250),
                success: Color::Rgb(74, 222, 128),
                warning: Color::Rgb(250, 204, 21),
                error: Color::Rgb(248, 113, 113),
            },
            Theme::Light => Self {
                background: Color::Rgb(250, 250, 252),
                text: Color::Rgb(30, 34, 42),
                muted: Color::Rgb(110, 116, 128),
                border: Color::Rgb(200, 204, 212),
                border_focused: Color::Rgb(79, 70, 229),
                selection_bg: Color::Rgb(224, 231, 255),
                selection_fg: Color::Rgb(20, 20, 30),
                accent: Color::Rgb(79, 70, 229),
                favorite: Color::Rgb(217, 119, 6),
                match_bg: Color::Rgb(254, 240, 138),
                modal_bg: Color::Rgb(255, 255, 255),
                status_bg: Color::Rgb(235, 236, 240),
                info: Color::Rgb(37, 99, 235),
                success: Color::Rgb(22, 163, 74),
                warning: Color::Rgb(202, 138, 4),
                error: Color::Rgb(220, 38, 38),
            },
        }
    }

    pub fn severity(&self, severity: Severity) -> Color {
        match severity {
            Severity::Info => self.info,
            Severity::Success => self.success,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
        }
    }

    pub fn base(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }

    pub fn border(&self, focused: bool) -> Style {
        Style::default().fg(if focused {
            self.border_focused
        } else {
            self.border
        })
    }

    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn highlight(&self) -> Style {
        Style::default()
            .bg(self.selection_bg)
            .fg(self.selection_fg)
            .add_modifier(Modifier::BOLD)
    }
}
