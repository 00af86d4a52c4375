//! Scrollable key reference.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpAction {
    Continue,
    Close,
}

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub keys: &'static str,
    pub description: &'static str,
}

impl KeyBinding {
    pub const fn new(keys: &'static str, description: &'static str) -> Self {
        Self { keys, description }
    }
}

#[derive(Debug, Clone)]
pub struct HelpSection {
    pub title: &'static str,
    pub bindings: &'static [KeyBinding],
}

impl HelpSection {
    pub const fn new(title: &'static str, bindings: &'static [KeyBinding]) -> Self {
        Self { title, bindings }
    }
}

const GLOBAL: HelpSection = HelpSection::new(
    "Global",
    &[
        KeyBinding::new("q", "Quit (pending writes are committed)"),
        KeyBinding::new("?", "Toggle this help"),
        KeyBinding::new("/", "SQL command line"),
        KeyBinding::new(":", "Command prompt"),
        KeyBinding::new("Esc", "Clear selection / dismiss error"),
    ],
);

const NAVIGATION: HelpSection = HelpSection::new(
    "Navigation",
    &[
        KeyBinding::new("j/k", "Move down/up one row"),
        KeyBinding::new("h/l", "Move left/right one column"),
        KeyBinding::new("PgUp/PgDn", "Page up/down"),
        KeyBinding::new("Ctrl-u/d", "Half page up/down"),
        KeyBinding::new("g / G", "First row / follow the bottom"),
        KeyBinding::new("0 / $", "First/last column"),
    ],
);

const VIEW: HelpSection = HelpSection::new(
    "Filter and sort",
    &[
        KeyBinding::new("Enter", "Toggle filter on the cell value"),
        KeyBinding::new("s", "Cycle sort: asc, desc, off"),
        KeyBinding::new("r", "Refresh now"),
    ],
);

const EDITING: HelpSection = HelpSection::new(
    "Editing",
    &[
        KeyBinding::new("i", "Insert a row"),
        KeyBinding::new("e", "Edit the row at the cursor"),
        KeyBinding::new("Tab", "Keep cell, next column"),
        KeyBinding::new("Enter", "Keep cell, queue the statement"),
        KeyBinding::new("Esc", "Discard the edit"),
        KeyBinding::new("v", "Start/stop a selection"),
        KeyBinding::new("d", "Delete selected rows"),
        KeyBinding::new("y", "Copy selection (tab-separated)"),
        KeyBinding::new("p", "Paste rows from the clipboard"),
    ],
);

const COMMANDS: HelpSection = HelpSection::new(
    "Commands",
    &[
        KeyBinding::new(":open <path>", "Open another database"),
        KeyBinding::new(":save <path>", "Copy the database to a new file"),
        KeyBinding::new(":export <path>", "Write the visible rows"),
        KeyBinding::new(":commit", "Flush queued writes now"),
        KeyBinding::new(":tables", "List tables"),
        KeyBinding::new(":table <name>", "Browse a table"),
        KeyBinding::new(":q", "Quit"),
    ],
);

const ALL_SECTIONS: &[HelpSection] = &[GLOBAL, NAVIGATION, VIEW, EDITING, COMMANDS];

pub struct HelpPopup {
    sections: &'static [HelpSection],
    scroll_offset: usize,
    total_lines: usize,
    /// Set during render.
    visible_height: usize,
}

impl Default for HelpPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpPopup {
    pub fn new() -> Self {
        Self {
            sections: ALL_SECTIONS,
            scroll_offset: 0,
            total_lines: Self::calculate_total_lines(ALL_SECTIONS),
            visible_height: 0,
        }
    }

    fn calculate_total_lines(sections: &[HelpSection]) -> usize {
        // Title line per section, blank line between sections.
        sections.iter().map(|s| s.bindings.len() + 1).sum::<usize>()
            + sections.len().saturating_sub(1)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> HelpAction {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('q'), _) | (KeyCode::Char('?'), _) => {
                HelpAction::Close
            }
            (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
                self.scroll_down(1);
                HelpAction::Continue
            }
            (KeyCode::Char('k'), _) | (KeyCode::Up, _) => {
                self.scroll_up(1);
                HelpAction::Continue
            }
            (KeyCode::Char('d'), KeyModifiers::CONTROL) | (KeyCode::PageDown, _) => {
                self.scroll_down(self.visible_height / 2);
                HelpAction::Continue
            }
            (KeyCode::Char('u'), KeyModifiers::CONTROL) | (KeyCode::PageUp, _) => {
                self.scroll_up(self.visible_height / 2);
                HelpAction::Continue
            }
            (KeyCode::Char('g'), _) => {
                self.scroll_offset = 0;
                HelpAction::Continue
            }
            (KeyCode::Char('G'), _) => {
                self.scroll_offset = self.max_scroll();
                HelpAction::Continue
            }
            _ => HelpAction::Continue,
        }
    }

    fn max_scroll(&self) -> usize {
        self.total_lines.saturating_sub(self.visible_height)
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = (self.scroll_offset + amount).min(self.max_scroll());
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        let width = (area.width * 70 / 100).clamp(50, 80);
        let height = (area.height * 80 / 100).clamp(12, 40);
        let popup = centered_rect(width, height, area);

        frame.render_widget(Clear, popup);

        let block = Block::default()
            .title(" Help ")
            .title_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(popup);
        frame.render_widget(block, popup);

        let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(inner);
        self.visible_height = chunks[0].height as usize;
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());

        let mut lines: Vec<Line> = Vec::new();
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                lines.push(Line::from(""));
            }
            lines.push(Line::from(Span::styled(
                format!(" {} ", section.title),
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )));
            for binding in section.bindings {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(
                        format!("{:18}", binding.keys),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(binding.description),
                ]));
            }
        }
        let visible: Vec<Line> = lines
            .into_iter()
            .skip(self.scroll_offset)
            .take(chunks[0].height as usize)
            .collect();
        frame.render_widget(Paragraph::new(visible), chunks[0]);

        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(" j/k ", Style::default().fg(Color::Yellow)),
                Span::styled("scroll  ", Style::default().fg(Color::DarkGray)),
                Span::styled(" q/Esc ", Style::default().fg(Color::Yellow)),
                Span::styled("close", Style::default().fg(Color::DarkGray)),
            ])),
            chunks[1],
        );

        if self.total_lines > self.visible_height {
            let mut state = ScrollbarState::new(self.max_scroll()).position(self.scroll_offset);
            let bar_area = Rect {
                x: chunks[0].x + chunks[0].width.saturating_sub(1),
                width: 1,
                ..chunks[0]
            };
            frame.render_stateful_widget(
                Scrollbar::new(ScrollbarOrientation::VerticalRight),
                bar_area,
                &mut state,
            );
        }
    }
}

pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}
