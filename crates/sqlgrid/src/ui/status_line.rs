//! Status line that drops low-priority segments on narrow terminals.

use std::path::Path;

use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::util::display_width;

/// Lower sorts first and survives longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

#[derive(Debug, Clone)]
pub struct StatusSegment {
    pub content: String,
    pub priority: Priority,
    pub style: Style,
    pub right_align: bool,
}

impl StatusSegment {
    pub fn new(content: impl Into<String>, priority: Priority) -> Self {
        Self {
            content: content.into(),
            priority,
            style: Style::default(),
            right_align: false,
        }
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn right_align(mut self) -> Self {
        self.right_align = true;
        self
    }

    pub fn width(&self) -> u16 {
        display_width(&self.content) as u16
    }
}

/// Label for the open database file, shortened to fit `max_width`:
/// full path, then file name, then a truncated file name.
pub fn store_label(path: Option<&Path>, max_width: u16) -> String {
    let Some(path) = path else {
        return "no database".to_string();
    };
    let full = path.display().to_string();
    if display_width(&full) <= max_width as usize {
        return full;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(full);
    if display_width(&name) <= max_width as usize {
        return name;
    }

    if max_width >= 3 {
        let truncated: String = name.chars().take((max_width - 2) as usize).collect();
        format!("{}…", truncated)
    } else {
        name.chars().take(max_width as usize).collect()
    }
}

pub struct StatusLineBuilder {
    segments: Vec<StatusSegment>,
    separator: String,
    separator_style: Style,
}

impl Default for StatusLineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLineBuilder {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            separator: " │ ".to_string(),
            separator_style: Style::default().fg(Color::DarkGray),
        }
    }

    pub fn segment(mut self, segment: StatusSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn add_some<F>(self, option: Option<impl AsRef<str>>, f: F) -> Self
    where
        F: FnOnce(&str) -> StatusSegment,
    {
        match option {
            Some(value) => self.segment(f(value.as_ref())),
            None => self,
        }
    }

    pub fn build(self, available_width: u16) -> Line<'static> {
        if available_width == 0 {
            return Line::from("");
        }

        let separator_width = display_width(&self.separator) as u16;

        let (mut right, mut left): (Vec<_>, Vec<_>) =
            self.segments.into_iter().partition(|s| s.right_align);
        left.sort_by_key(|s| s.priority);
        right.sort_by_key(|s| s.priority);

        let right_width: u16 = right.iter().map(|s| s.width()).sum::<u16>()
            + separator_width * right.len().saturating_sub(1) as u16;
        let left_available = available_width
            .saturating_sub(right_width)
            .saturating_sub(if right.is_empty() { 0 } else { separator_width });

        let mut used: u16 = 0;
        let mut selected: Vec<&StatusSegment> = Vec::new();
        for segment in &left {
            let needed = segment.width()
                + if selected.is_empty() {
                    0
                } else {
                    separator_width
                };
            if used + needed <= left_available {
                used += needed;
                selected.push(segment);
            }
        }

        let mut spans: Vec<Span<'static>> = Vec::new();
        for (i, segment) in selected.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(self.separator.clone(), self.separator_style));
            }
            spans.push(Span::styled(segment.content.clone(), segment.style));
        }

        let padding = (available_width as usize)
            .saturating_sub(used as usize)
            .saturating_sub(right_width as usize)
            .saturating_sub(if !right.is_empty() && !selected.is_empty() {
                separator_width as usize
            } else {
                0
            });
        if padding > 0 {
            spans.push(Span::raw(" ".repeat(padding)));
        }

        for (i, segment) in right.iter().enumerate() {
            if i > 0 || !selected.is_empty() {
                spans.push(Span::styled(self.separator.clone(), self.separator_style));
            }
            spans.push(Span::styled(segment.content.clone(), segment.style));
        }

        Line::from(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_store_label_shortens() {
        let path = Path::new("/var/lib/monitoring/alarms.db");
        assert_eq!(store_label(Some(path), 80), "/var/lib/monitoring/alarms.db");
        assert_eq!(store_label(Some(path), 12), "alarms.db");
        assert_eq!(store_label(Some(path), 6), "alar…");
        assert_eq!(store_label(None, 80), "no database");
    }

    #[test]
    fn test_builder_keeps_high_priority() {
        let line = StatusLineBuilder::new()
            .segment(StatusSegment::new("GRID", Priority::Critical))
            .segment(StatusSegment::new("a very long low priority note", Priority::Low))
            .build(20);
        let s = text(&line);
        assert!(s.contains("GRID"));
        assert!(!s.contains("note"));
    }

    #[test]
    fn test_builder_right_align() {
        let line = StatusLineBuilder::new()
            .segment(StatusSegment::new("LEFT", Priority::Critical))
            .segment(StatusSegment::new("RIGHT", Priority::Critical).right_align())
            .build(30);
        let s = text(&line);
        assert!(s.starts_with("LEFT"));
        assert!(s.ends_with("RIGHT"));
        assert_eq!(display_width(&s), 30);
    }

    #[test]
    fn test_add_some() {
        let none: Option<&str> = None;
        let line = StatusLineBuilder::new()
            .add_some(none, |s| StatusSegment::new(s, Priority::High))
            .add_some(Some("3 queued"), |s| StatusSegment::new(s, Priority::High))
            .build(40);
        assert!(text(&line).contains("3 queued"));
    }
}
