//! Turning grid edits into SQL statements.
//!
//! Inserts and updates are built cell by cell through [`EditSession`];
//! deletes, pastes and copies are one-shot helpers. Rows are identified by
//! the values last shown for them, so only rows present in the cached
//! window can be edited.

use std::fmt;
use std::ops::RangeInclusive;

use crate::query::sql::{quote_identifier, quote_literal};
use crate::query::QueryState;
use crate::window::RowWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    NotIdle,
    NoTable,
    NoColumns,
    OutOfWindow { row: usize },
    InvalidSelection,
    PasteShape {
        line: usize,
        expected: usize,
        found: usize,
    },
    EmptyPaste,
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::NotIdle => write!(f, "an edit is already in progress"),
            EditError::NoTable => write!(f, "the current view has no editable table"),
            EditError::NoColumns => write!(f, "the current view has no columns"),
            EditError::OutOfWindow { row } => {
                write!(f, "row {} is not loaded; scroll to it first", row + 1)
            }
            EditError::InvalidSelection => write!(f, "selection is outside the table"),
            EditError::PasteShape {
                line,
                expected,
                found,
            } => write!(
                f,
                "paste line {} has {} cells, expected {}",
                line, found, expected
            ),
            EditError::EmptyPaste => write!(f, "nothing to paste"),
        }
    }
}

impl std::error::Error for EditError {}

/// A key that ends editing of the current cell, carrying the cell's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKey {
    /// Keep the value and move to the next column.
    Tab(String),
    /// Keep the value and finish the row.
    Enter(String),
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Continue,
    /// The edit is complete; the statement (if anything changed) should be
    /// queued.
    Finished(Option<String>),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Inserting {
        table: String,
        /// Absolute row the blank row is shown at.
        anchor: usize,
        columns: Vec<String>,
        values: Vec<String>,
        touched: Vec<bool>,
        col: usize,
    },
    Updating {
        table: String,
        row: usize,
        columns: Vec<String>,
        /// Captured before any change.
        key: String,
        original: Vec<String>,
        values: Vec<String>,
        col: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EditSession {
    state: EditState,
}

impl Default for EditSession {
    fn default() -> Self {
        Self {
            state: EditState::Idle,
        }
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, EditState::Idle)
    }

    /// Absolute row and column of the cell being edited.
    pub fn cursor(&self) -> Option<(usize, usize)> {
        match &self.state {
            EditState::Idle => None,
            EditState::Inserting { anchor, col, .. } => Some((*anchor, *col)),
            EditState::Updating { row, col, .. } => Some((*row, *col)),
        }
    }

    pub fn current_column(&self) -> Option<&str> {
        match &self.state {
            EditState::Idle => None,
            EditState::Inserting { columns, col, .. } | EditState::Updating { columns, col, .. } => {
                columns.get(*col).map(String::as_str)
            }
        }
    }

    /// Text the cell editor should start with.
    pub fn current_value(&self) -> Option<&str> {
        match &self.state {
            EditState::Idle => None,
            EditState::Inserting { values, col, .. } | EditState::Updating { values, col, .. } => {
                values.get(*col).map(String::as_str)
            }
        }
    }

    /// Pending values of the edited row, for drawing it.
    pub fn values(&self) -> Option<&[String]> {
        match &self.state {
            EditState::Idle => None,
            EditState::Inserting { values, .. } | EditState::Updating { values, .. } => {
                Some(values)
            }
        }
    }

    pub fn begin_insert(
        &mut self,
        table: Option<&str>,
        window: &RowWindow,
        anchor: usize,
    ) -> Result<(), EditError> {
        if !self.is_idle() {
            return Err(EditError::NotIdle);
        }
        let table = table.ok_or(EditError::NoTable)?;
        if window.headers.is_empty() {
            return Err(EditError::NoColumns);
        }

        let n = window.headers.len();
        self.state = EditState::Inserting {
            table: table.to_string(),
            anchor,
            columns: window.headers.clone(),
            values: vec![String::new(); n],
            touched: vec![false; n],
            col: 0,
        };
        Ok(())
    }

    pub fn begin_update(
        &mut self,
        table: Option<&str>,
        window: &RowWindow,
        abs_row: usize,
        col: usize,
    ) -> Result<(), EditError> {
        if !self.is_idle() {
            return Err(EditError::NotIdle);
        }
        let table = table.ok_or(EditError::NoTable)?;
        if window.headers.is_empty() {
            return Err(EditError::NoColumns);
        }
        if col >= window.headers.len() {
            return Err(EditError::InvalidSelection);
        }
        let row = window
            .row(abs_row)
            .ok_or(EditError::OutOfWindow { row: abs_row })?;

        let key = row_key(&window.headers, row, 0..=window.headers.len() - 1);
        self.state = EditState::Updating {
            table: table.to_string(),
            row: abs_row,
            columns: window.headers.clone(),
            key,
            original: row.to_vec(),
            values: row.to_vec(),
            col,
        };
        Ok(())
    }

    pub fn handle(&mut self, key: EditKey) -> EditOutcome {
        match key {
            EditKey::Escape => {
                if self.is_idle() {
                    return EditOutcome::Continue;
                }
                self.state = EditState::Idle;
                EditOutcome::Cancelled
            }
            EditKey::Tab(value) => {
                self.commit_cell(value);
                self.advance();
                EditOutcome::Continue
            }
            EditKey::Enter(value) => {
                if self.is_idle() {
                    return EditOutcome::Continue;
                }
                self.commit_cell(value);
                let state = std::mem::replace(&mut self.state, EditState::Idle);
                EditOutcome::Finished(finalize(state))
            }
        }
    }

    fn commit_cell(&mut self, value: String) {
        match &mut self.state {
            EditState::Idle => {}
            EditState::Inserting {
                values,
                touched,
                col,
                ..
            } => {
                values[*col] = value;
                touched[*col] = true;
            }
            EditState::Updating { values, col, .. } => values[*col] = value,
        }
    }

    fn advance(&mut self) {
        match &mut self.state {
            EditState::Idle => {}
            EditState::Inserting { columns, col, .. } | EditState::Updating { columns, col, .. } => {
                *col = (*col + 1) % columns.len();
            }
        }
    }
}

fn finalize(state: EditState) -> Option<String> {
    match state {
        EditState::Idle => None,
        EditState::Inserting {
            table,
            columns,
            values,
            touched,
            ..
        } => {
            let (cols, vals): (Vec<String>, Vec<String>) = columns
                .iter()
                .zip(&values)
                .zip(&touched)
                .filter(|(_, t)| **t)
                .map(|((c, v), _)| (quote_identifier(c), quote_literal(v)))
                .unzip();
            if cols.is_empty() {
                return None;
            }
            Some(format!(
                "insert into {} ({}) values ({})",
                table,
                cols.join(", "),
                vals.join(", ")
            ))
        }
        EditState::Updating {
            table,
            columns,
            key,
            original,
            values,
            ..
        } => {
            let assignments: Vec<String> = columns
                .iter()
                .zip(original.iter().zip(&values))
                .filter(|(_, (old, new))| old != new)
                .map(|(c, (_, new))| format!("{}={}", quote_identifier(c), quote_literal(new)))
                .collect();
            if assignments.is_empty() {
                return None;
            }
            Some(format!(
                "update {} set {} where {}",
                table,
                assignments.join(", "),
                key
            ))
        }
    }
}

/// Conjunction of equality predicates on the given columns of a row.
///
/// Empty cells also match NULL, since both are shown blank.
fn row_key(columns: &[String], values: &[String], cols: RangeInclusive<usize>) -> String {
    cols.filter_map(|i| Some((columns.get(i)?, values.get(i)?)))
        .map(|(c, v)| {
            let c = quote_identifier(c);
            if v.is_empty() {
                format!("ifnull({},'')=''", c)
            } else {
                format!("{}={}", c, quote_literal(v))
            }
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

/// One `delete` per selected row, keyed on the selected columns.
///
/// Fails without producing anything if a row is not in the cached window.
pub fn delete_statements(
    table: Option<&str>,
    window: &RowWindow,
    rows: RangeInclusive<usize>,
    cols: RangeInclusive<usize>,
) -> Result<Vec<String>, EditError> {
    let table = table.ok_or(EditError::NoTable)?;
    if window.headers.is_empty() {
        return Err(EditError::NoColumns);
    }
    if cols.is_empty() || *cols.end() >= window.headers.len() || rows.is_empty() {
        return Err(EditError::InvalidSelection);
    }

    rows.map(|abs_row| {
        let row = window
            .row(abs_row)
            .ok_or(EditError::OutOfWindow { row: abs_row })?;
        Ok(format!(
            "delete from {} where {}",
            table,
            row_key(&window.headers, row, cols.clone())
        ))
    })
    .collect()
}

/// Parse clipboard text (a tab-separated header line, then value lines) into
/// `insert or replace` statements.
pub fn paste_statements(table: Option<&str>, text: &str) -> Result<Vec<String>, EditError> {
    let table = table.ok_or(EditError::NoTable)?;
    let mut lines = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or(EditError::EmptyPaste)?;
    let columns: Vec<String> = header.split('\t').map(quote_identifier).collect();
    let column_list = columns.join(", ");

    let statements = lines
        .map(|(idx, line)| {
            let cells: Vec<&str> = line.split('\t').collect();
            if cells.len() != columns.len() {
                return Err(EditError::PasteShape {
                    line: idx + 1,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
            let values: Vec<String> = cells.into_iter().map(quote_literal).collect();
            Ok(format!(
                "insert or replace into {} ({}) values ({})",
                table,
                column_list,
                values.join(", ")
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if statements.is_empty() {
        return Err(EditError::EmptyPaste);
    }
    Ok(statements)
}

/// Query returning the selected rows and columns of the current view, in
/// view order. Its tab-separated result (header first) pastes back in.
pub fn copy_sql(
    query: &QueryState,
    window: &RowWindow,
    rows: RangeInclusive<usize>,
    cols: RangeInclusive<usize>,
) -> Result<String, EditError> {
    if window.headers.is_empty() {
        return Err(EditError::NoColumns);
    }
    if rows.is_empty() || cols.is_empty() || *cols.end() >= window.headers.len() {
        return Err(EditError::InvalidSelection);
    }
    let columns: Vec<String> = window.headers[cols].to_vec();
    let limit = rows.end() - rows.start() + 1;
    Ok(query.columns_sql(&columns, limit, *rows.start()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RowWindow {
        RowWindow {
            headers: vec!["host".into(), "severity".into(), "note".into()],
            rows: vec![
                vec!["alpha".into(), "critical".into(), "it's".into()],
                vec!["beta".into(), "minor".into(), "".into()],
            ],
            offset: 40,
            total_rows: 42,
            ..RowWindow::default()
        }
    }

    #[test]
    fn test_insert_tab_and_enter() {
        let mut s = EditSession::new();
        s.begin_insert(Some("events"), &window(), 42).unwrap();
        assert_eq!(s.current_column(), Some("host"));
        assert_eq!(s.handle(EditKey::Tab("gamma".into())), EditOutcome::Continue);
        assert_eq!(s.current_column(), Some("severity"));
        assert_eq!(s.handle(EditKey::Tab("major".into())), EditOutcome::Continue);

        let out = s.handle(EditKey::Enter("o'clock".into()));
        assert_eq!(
            out,
            EditOutcome::Finished(Some(
                "insert into events (host, severity, note) values ('gamma', 'major', 'o''clock')"
                    .into()
            ))
        );
        assert!(s.is_idle());
    }

    #[test]
    fn test_insert_tab_wraps() {
        let mut s = EditSession::new();
        s.begin_insert(Some("events"), &window(), 42).unwrap();
        for v in ["a", "b", "c"] {
            s.handle(EditKey::Tab(v.into()));
        }
        assert_eq!(s.current_column(), Some("host"));
        assert_eq!(s.current_value(), Some("a"));
    }

    #[test]
    fn test_insert_only_confirmed_cells() {
        let mut s = EditSession::new();
        s.begin_insert(Some("events"), &window(), 42).unwrap();
        let out = s.handle(EditKey::Enter("solo".into()));
        assert_eq!(
            out,
            EditOutcome::Finished(Some("insert into events (host) values ('solo')".into()))
        );
    }

    #[test]
    fn test_escape_discards() {
        let mut s = EditSession::new();
        s.begin_insert(Some("events"), &window(), 42).unwrap();
        s.handle(EditKey::Tab("x".into()));
        assert_eq!(s.handle(EditKey::Escape), EditOutcome::Cancelled);
        assert!(s.is_idle());
    }

    #[test]
    fn test_begin_twice_rejected() {
        let mut s = EditSession::new();
        s.begin_insert(Some("events"), &window(), 42).unwrap();
        assert_eq!(
            s.begin_update(Some("events"), &window(), 40, 0),
            Err(EditError::NotIdle)
        );
    }

    #[test]
    fn test_no_table() {
        let mut s = EditSession::new();
        assert_eq!(s.begin_insert(None, &window(), 0), Err(EditError::NoTable));
    }

    #[test]
    fn test_update_captures_key_first() {
        let mut s = EditSession::new();
        s.begin_update(Some("events"), &window(), 40, 1).unwrap();
        assert_eq!(s.current_value(), Some("critical"));

        let out = s.handle(EditKey::Enter("cleared".into()));
        assert_eq!(
            out,
            EditOutcome::Finished(Some(
                "update events set severity='cleared' where host='alpha' and severity='critical' and note='it''s'"
                    .into()
            ))
        );
    }

    #[test]
    fn test_update_several_cells() {
        let mut s = EditSession::new();
        s.begin_update(Some("events"), &window(), 41, 1).unwrap();
        s.handle(EditKey::Tab("major".into()));
        let out = s.handle(EditKey::Enter("now set".into()));
        assert_eq!(
            out,
            EditOutcome::Finished(Some(
                "update events set severity='major', note='now set' where host='beta' and severity='minor' and ifnull(note,'')=''"
                    .into()
            ))
        );
    }

    #[test]
    fn test_update_without_change_produces_nothing() {
        let mut s = EditSession::new();
        s.begin_update(Some("events"), &window(), 40, 0).unwrap();
        assert_eq!(s.handle(EditKey::Enter("alpha".into())), EditOutcome::Finished(None));
    }

    #[test]
    fn test_update_out_of_window() {
        let mut s = EditSession::new();
        assert_eq!(
            s.begin_update(Some("events"), &window(), 3, 0),
            Err(EditError::OutOfWindow { row: 3 })
        );
        assert!(s.is_idle());
    }

    #[test]
    fn test_delete_statements_per_row() {
        let stmts = delete_statements(Some("events"), &window(), 40..=41, 0..=1).unwrap();
        assert_eq!(
            stmts,
            vec![
                "delete from events where host='alpha' and severity='critical'",
                "delete from events where host='beta' and severity='minor'",
            ]
        );
    }

    #[test]
    fn test_delete_outside_window_rejected() {
        assert_eq!(
            delete_statements(Some("events"), &window(), 39..=40, 0..=2),
            Err(EditError::OutOfWindow { row: 39 })
        );
        assert_eq!(
            delete_statements(Some("events"), &window(), 40..=40, 0..=5),
            Err(EditError::InvalidSelection)
        );
    }

    #[test]
    fn test_paste_statements() {
        let text = "host\tseverity\r\nalpha\tminor\r\n\r\nbeta\tit's\n";
        let stmts = paste_statements(Some("events"), text).unwrap();
        assert_eq!(
            stmts,
            vec![
                "insert or replace into events (host, severity) values ('alpha', 'minor')",
                "insert or replace into events (host, severity) values ('beta', 'it''s')",
            ]
        );
    }

    #[test]
    fn test_paste_shape_mismatch() {
        let text = "a\tb\n1\t2\n3\n";
        assert_eq!(
            paste_statements(Some("t"), text),
            Err(EditError::PasteShape {
                line: 3,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_paste_empty() {
        assert_eq!(paste_statements(Some("t"), ""), Err(EditError::EmptyPaste));
        assert_eq!(paste_statements(Some("t"), "a\tb\n"), Err(EditError::EmptyPaste));
    }

    #[test]
    fn test_copy_sql() {
        let q = QueryState::set_base("select * from events").unwrap();
        let sql = copy_sql(&q, &window(), 40..=41, 1..=2).unwrap();
        assert_eq!(sql, "select severity, note from events limit 2 offset 40");
    }
}
