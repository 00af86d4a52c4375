use std::ops::RangeInclusive;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use unicode_width::UnicodeWidthChar;

use crate::query::SortKey;
use crate::util::display_width;
use crate::window::RowWindow;

/// Cursor and selection over absolute row numbers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GridState {
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub col_offset: usize,
    /// Other corner of a rectangular selection.
    pub anchor: Option<(usize, usize)>,
}

impl GridState {
    /// Rows and columns covered by the selection (just the cursor cell when
    /// no anchor is set).
    pub fn selection(&self) -> (RangeInclusive<usize>, RangeInclusive<usize>) {
        let (ar, ac) = self.anchor.unwrap_or((self.cursor_row, self.cursor_col));
        (
            ar.min(self.cursor_row)..=ar.max(self.cursor_row),
            ac.min(self.cursor_col)..=ac.max(self.cursor_col),
        )
    }

    pub fn is_selected(&self, row: usize, col: usize) -> bool {
        let (rows, cols) = self.selection();
        self.anchor.is_some() && rows.contains(&row) && cols.contains(&col)
    }

    pub fn toggle_anchor(&mut self) {
        self.anchor = match self.anchor {
            Some(_) => None,
            None => Some((self.cursor_row, self.cursor_col)),
        };
    }

    /// Keep the cursor on an existing cell.
    pub fn clamp(&mut self, total_rows: usize, col_count: usize) {
        self.cursor_row = self.cursor_row.min(total_rows.saturating_sub(1));
        self.cursor_col = self.cursor_col.min(col_count.saturating_sub(1));
        self.col_offset = self.col_offset.min(self.cursor_col);
    }

    pub fn move_col(&mut self, delta: isize, col_count: usize) {
        if col_count == 0 {
            return;
        }
        self.cursor_col = self
            .cursor_col
            .saturating_add_signed(delta)
            .min(col_count - 1);
        if self.cursor_col < self.col_offset {
            self.col_offset = self.cursor_col;
        }
    }

    /// Scroll horizontally until the cursor column fits in `width`.
    pub fn ensure_col_visible(&mut self, widths: &[u16], width: u16) {
        if self.cursor_col < self.col_offset {
            self.col_offset = self.cursor_col;
        }
        while self.col_offset < self.cursor_col {
            let used: u32 = widths[self.col_offset..=self.cursor_col.min(widths.len().saturating_sub(1))]
                .iter()
                .map(|w| u32::from(*w) + 1)
                .sum();
            if used <= u32::from(width) {
                break;
            }
            self.col_offset += 1;
        }
    }
}

/// Row being edited, drawn over the cached row at the same position.
pub struct PendingRow<'a> {
    pub abs_row: usize,
    pub values: &'a [String],
    pub col: usize,
}

pub struct DataGrid<'a> {
    pub window: &'a RowWindow,
    pub state: &'a GridState,
    pub sort_keys: &'a [SortKey],
    pub pending: Option<PendingRow<'a>>,
    pub title: &'a str,
    pub focused: bool,
    pub show_row_numbers: bool,
    pub severity_colors: bool,
}

impl<'a> Widget for DataGrid<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border_style = if self.focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let block = Block::default()
            .title(self.title)
            .borders(Borders::ALL)
            .border_style(border_style);

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let window = self.window;
        if window.headers.is_empty() {
            Paragraph::new("No table")
                .style(Style::default().fg(Color::Gray))
                .render(inner, buf);
            return;
        }

        if inner.height < 2 {
            Paragraph::new("Window too small")
                .style(Style::default().fg(Color::Gray))
                .render(inner, buf);
            return;
        }

        // Row numbers stay fixed; horizontal scroll applies to data columns.
        let marker_w = marker_width(window, self.show_row_numbers);
        let data_x = inner.x.saturating_add(marker_w);
        let data_w = inner.width.saturating_sub(marker_w);

        let headers: Vec<String> = window
            .headers
            .iter()
            .map(|h| header_label(h, self.sort_keys))
            .collect();
        buf.set_string(inner.x, inner.y, " ".repeat(marker_w as usize), Style::default());
        let header_style = Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD);
        render_row_cells(
            data_x,
            inner.y,
            data_w,
            &headers,
            &window.col_widths,
            self.state.col_offset,
            |_| header_style,
            buf,
        );

        let body_y = inner.y + 1;
        let body_h = (inner.height - 1) as usize;

        if window.rows.is_empty() && self.pending.is_none() {
            let body = Rect {
                x: inner.x,
                y: body_y,
                width: inner.width,
                height: inner.height - 1,
            };
            Paragraph::new("(no rows)")
                .style(Style::default().fg(Color::Gray))
                .render(body, buf);
            return;
        }

        let severity = if self.severity_colors {
            SeverityColumns::find(&window.headers)
        } else {
            None
        };

        for line in 0..body_h {
            let abs_row = window.offset + line;
            let pending = self
                .pending
                .as_ref()
                .filter(|p| p.abs_row == abs_row);

            let cells: &[String] = match (pending, window.rows.get(line)) {
                (Some(p), _) => p.values,
                (None, Some(row)) => row,
                (None, None) => break,
            };
            let y = body_y + line as u16;
            let is_cursor = abs_row == self.state.cursor_row;

            let row_style = if pending.is_some() {
                Style::default().bg(Color::Blue)
            } else if is_cursor && self.focused {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };

            let marker = if self.show_row_numbers {
                format!(
                    "{}{:>width$} ",
                    if is_cursor { '>' } else { ' ' },
                    abs_row + 1,
                    width = marker_w as usize - 2
                )
            } else {
                format!("{} ", if is_cursor { '>' } else { ' ' })
            };
            buf.set_string(
                inner.x,
                y,
                fit_to_width(&marker, marker_w),
                row_style.fg(Color::DarkGray),
            );

            let state = self.state;
            let severity_color = severity.as_ref().and_then(|s| s.color(cells));
            render_row_cells(
                data_x,
                y,
                data_w,
                cells,
                &window.col_widths,
                state.col_offset,
                |col| {
                    if let Some(p) = pending {
                        if col == p.col {
                            return Style::default()
                                .bg(Color::Yellow)
                                .fg(Color::Black);
                        }
                        return row_style;
                    }
                    if state.is_selected(abs_row, col) {
                        return Style::default().bg(Color::Cyan).fg(Color::Black);
                    }
                    if is_cursor && col == state.cursor_col && self.focused {
                        return row_style.add_modifier(Modifier::REVERSED);
                    }
                    match (&severity, severity_color) {
                        (Some(s), Some(color)) if s.severity == col => {
                            row_style.bg(color).fg(Color::Black)
                        }
                        _ => row_style,
                    }
                },
                buf,
            );
        }
    }
}

/// Width of the cursor marker and row-number gutter.
pub fn marker_width(window: &RowWindow, show_row_numbers: bool) -> u16 {
    if show_row_numbers {
        digits(window.total_rows.max(1)) as u16 + 2
    } else {
        2
    }
}

/// Positions of the `severity` and `cleared` columns, when both exist.
struct SeverityColumns {
    severity: usize,
    cleared: usize,
}

impl SeverityColumns {
    fn find(headers: &[String]) -> Option<Self> {
        Some(Self {
            severity: headers.iter().position(|h| h == "severity")?,
            cleared: headers.iter().position(|h| h == "cleared")?,
        })
    }

    /// Colour for the severity cell of an uncleared row.
    fn color(&self, row: &[String]) -> Option<Color> {
        if !row.get(self.cleared)?.is_empty() {
            return None;
        }
        severity_color(row.get(self.severity)?)
    }
}

pub fn severity_color(severity: &str) -> Option<Color> {
    match severity {
        "critical" => Some(Color::Red),
        "major" => Some(Color::LightRed),
        "minor" => Some(Color::Yellow),
        "warning" => Some(Color::LightCyan),
        _ => None,
    }
}

/// Header text with the column's sort direction and priority.
fn header_label(name: &str, sort_keys: &[SortKey]) -> String {
    match sort_keys.iter().find(|k| k.column == name) {
        Some(k) => format!(
            "{} {}{}",
            name,
            if k.ascending { '^' } else { 'v' },
            k.priority
        ),
        None => name.to_string(),
    }
}

fn digits(mut n: usize) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

#[allow(clippy::too_many_arguments)]
fn render_row_cells(
    mut x: u16,
    y: u16,
    available_w: u16,
    cells: &[String],
    col_widths: &[u16],
    col_offset: usize,
    style_for: impl Fn(usize) -> Style,
    buf: &mut Buffer,
) {
    if available_w == 0 {
        return;
    }

    let max_x = x.saturating_add(available_w);
    let mut col = col_offset;
    while col < cells.len() && col < col_widths.len() && x < max_x {
        let w = col_widths[col];
        if w == 0 {
            col += 1;
            continue;
        }

        // Allow a partially visible last column.
        let draw_w = w.min(max_x - x);
        let style = style_for(col);
        buf.set_string(x, y, fit_to_width(&cells[col], draw_w), style);
        x += draw_w;

        if x < max_x {
            buf.set_string(x, y, " ", Style::default());
            x += 1;
        }
        col += 1;
    }
}

fn fit_to_width(s: &str, width: u16) -> String {
    let width = width as usize;
    if width == 0 {
        return String::new();
    }

    // Cells are single-line.
    let s: String = s.chars().map(|c| if c == '\n' || c == '\t' { ' ' } else { c }).collect();
    let current = display_width(&s);
    if current <= width {
        let mut out = s;
        out.push_str(&" ".repeat(width - current));
        return out;
    }

    if width <= 3 {
        return truncate_by_display_width(&s, width);
    }

    let mut out = truncate_by_display_width(&s, width - 3);
    out.push_str("...");
    out
}

fn truncate_by_display_width(s: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }

    if used < width {
        out.push_str(&" ".repeat(width - used));
    }
    out
}
