//! Bottom-anchored cache of the rows behind the visible grid.
//!
//! Only `viewport_rows` rows are ever held. By default the window shows the
//! last rows of the result; `top_row_offset` counts how far the user has
//! scrolled up from there, so rows appended at the end show up on their own
//! while an upward scroll stays put.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::DisplayConfig;
use crate::query::QueryState;
use crate::store::{ChangeTracker, Store};
use crate::util::display_width;

/// One immutable fetch result. Rendering always holds a whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowWindow {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Absolute index of `rows[0]` in the full result.
    pub offset: usize,
    pub total_rows: usize,
    pub top_row_offset: usize,
    pub col_widths: Vec<u16>,
    pub generation: u64,
    pub change_seq: u64,
}

impl RowWindow {
    pub fn contains(&self, abs_row: usize) -> bool {
        abs_row >= self.offset && abs_row < self.offset + self.rows.len()
    }

    pub fn row(&self, abs_row: usize) -> Option<&[String]> {
        if !self.contains(abs_row) {
            return None;
        }
        self.rows.get(abs_row - self.offset).map(Vec::as_slice)
    }

    /// Absolute index of the last cached row.
    pub fn last_row(&self) -> Option<usize> {
        (!self.rows.is_empty()).then(|| self.offset + self.rows.len() - 1)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

#[derive(Debug)]
struct Request {
    query: Option<QueryState>,
    viewport_rows: usize,
    top_row_offset: usize,
    generation: u64,
    reset_widths: bool,
}

pub struct WindowCache {
    request: Mutex<Request>,
    current: Mutex<Arc<RowWindow>>,
    gate: tokio::sync::Mutex<()>,
    changes: Arc<ChangeTracker>,
    min_width: u16,
    max_width: u16,
}

impl WindowCache {
    pub fn new(changes: Arc<ChangeTracker>, display: &DisplayConfig) -> Self {
        Self {
            request: Mutex::new(Request {
                query: None,
                viewport_rows: 0,
                top_row_offset: 0,
                // Differs from the empty snapshot so the first pass refreshes.
                generation: 1,
                reset_widths: true,
            }),
            current: Mutex::new(Arc::new(RowWindow::default())),
            gate: tokio::sync::Mutex::new(()),
            changes,
            min_width: display.min_column_width,
            max_width: display.max_column_width.max(display.min_column_width),
        }
    }

    fn request(&self) -> std::sync::MutexGuard<'_, Request> {
        self.request.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The window the renderer should draw.
    pub fn snapshot(&self) -> Arc<RowWindow> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, window: RowWindow) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(window);
    }

    pub fn query(&self) -> Option<QueryState> {
        self.request().query.clone()
    }

    /// Replace the viewed query and scroll back to the bottom.
    pub fn set_query(&self, query: Option<QueryState>) {
        let mut req = self.request();
        req.query = query;
        req.top_row_offset = 0;
        req.reset_widths = true;
        req.generation += 1;
    }

    /// Change the viewed query in place (filter or sort toggles).
    pub fn update_query<R>(&self, f: impl FnOnce(&mut QueryState) -> R) -> Option<R> {
        let mut req = self.request();
        let out = req.query.as_mut().map(f)?;
        req.generation += 1;
        Some(out)
    }

    pub fn viewport_rows(&self) -> usize {
        self.request().viewport_rows
    }

    pub fn set_viewport(&self, rows: usize) {
        let mut req = self.request();
        if req.viewport_rows != rows {
            req.viewport_rows = rows;
            req.generation += 1;
        }
    }

    pub fn top_row_offset(&self) -> usize {
        self.request().top_row_offset
    }

    /// Scroll so that `top` rows lie below the window. Clamped to the
    /// known row count.
    pub fn scroll_to(&self, top: usize) {
        let total = self.snapshot().total_rows;
        let mut req = self.request();
        let top = top.min(total.saturating_sub(req.viewport_rows));
        if req.top_row_offset != top {
            req.top_row_offset = top;
            req.generation += 1;
        }
    }

    /// Positive `delta` scrolls up, away from the newest rows.
    pub fn scroll_by(&self, delta: isize) {
        let top = self.top_row_offset();
        self.scroll_to(top.saturating_add_signed(delta));
    }

    pub fn invalidate(&self) {
        self.request().generation += 1;
    }

    fn watched_counter(&self, query: &QueryState) -> u64 {
        query
            .watched_table()
            .map(|t| self.changes.counter(&t))
            .unwrap_or(0)
    }

    pub fn is_stale(&self) -> bool {
        let snapshot = self.snapshot();
        let req = self.request();
        if snapshot.generation != req.generation {
            return true;
        }
        match &req.query {
            Some(query) => self.watched_counter(query) != snapshot.change_seq,
            None => false,
        }
    }

    /// Refetch the window if it is stale (or always, with `force`).
    ///
    /// Returns whether a new snapshot was installed. A refresh already in
    /// progress makes this call a no-op. On a query error the window is
    /// emptied and the error returned.
    pub async fn refresh(&self, store: &Store, force: bool) -> Result<bool> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Ok(false);
        };
        if !force && !self.is_stale() {
            return Ok(false);
        }

        let (query, viewport, top, generation, reset_widths) = {
            let req = self.request();
            (
                req.query.clone(),
                req.viewport_rows,
                req.top_row_offset,
                req.generation,
                req.reset_widths,
            )
        };

        let Some(query) = query else {
            self.swap(RowWindow {
                generation,
                ..RowWindow::default()
            });
            return Ok(true);
        };

        // Read before fetching so a write landing mid-refresh leaves us stale.
        let change_seq = self.watched_counter(&query);

        let fetch_query = query.clone();
        let fetched = store
            .query_window(&query.count_sql(), move |total| {
                let (_, offset) = placement(total, viewport, top);
                fetch_query.fetch_sql(viewport, offset)
            })
            .await;

        let (total, fetched) = match fetched {
            Ok(window) => (window.total, window.rows),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "window refresh failed");
                self.swap(RowWindow {
                    generation,
                    change_seq,
                    ..RowWindow::default()
                });
                return Err(e);
            }
        };

        let (top, offset) = placement(total, viewport, top);
        let previous = self.snapshot();
        let start = if !reset_widths && previous.headers == fetched.headers {
            previous.col_widths.clone()
        } else {
            Vec::new()
        };
        let col_widths = self.widen(start, &fetched.headers, &fetched.rows);

        debug!(total, offset, rows = fetched.rows.len(), "window refreshed");
        self.swap(RowWindow {
            headers: fetched.headers,
            rows: fetched.rows,
            offset,
            total_rows: total,
            top_row_offset: top,
            col_widths,
            generation,
            change_seq,
        });

        let mut req = self.request();
        if req.generation == generation {
            req.reset_widths = false;
            // Keep the requested scroll inside the rows that exist.
            req.top_row_offset = top;
        }
        Ok(true)
    }

    /// Grow widths to fit the given cells, never shrinking a column.
    fn widen(&self, mut widths: Vec<u16>, headers: &[String], rows: &[Vec<String>]) -> Vec<u16> {
        widths.resize(headers.len(), self.min_width);
        let fit = |s: &str| (display_width(s).min(u16::MAX as usize) as u16).clamp(self.min_width, self.max_width);

        for (w, h) in widths.iter_mut().zip(headers) {
            *w = (*w).max(fit(h));
        }
        for row in rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(fit(cell));
            }
        }
        widths
    }
}

/// Clamp the upward scroll to the rows that exist and find the absolute
/// offset of the first row shown.
fn placement(total: usize, viewport: usize, top: usize) -> (usize, usize) {
    let top = top.min(total.saturating_sub(viewport));
    (top, total.saturating_sub(viewport).saturating_sub(top))
}
