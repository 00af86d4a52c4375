use std::io::Stdout;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::state::{Focus, StoreStatus};
use crate::clipboard;
use crate::context::AppContext;
use crate::edit::{
    copy_sql, delete_statements, paste_statements, EditKey, EditOutcome, EditSession, EditState,
};
use crate::export::export_to_path;
use crate::history::History;
use crate::query::sql::starts_with_keyword;
use crate::query::{Filter, FilterToggle, QueryState, SortDirection};
use crate::ui::{
    marker_width, store_label, DataGrid, GridState, HelpAction, HelpPopup, PendingRow, Priority,
    Prompt, StatusLineBuilder, StatusSegment,
};
use crate::util::one_line;
use crate::window::RowWindow;

/// How often the view is re-marked for refresh, to catch writers that do
/// not go through this process.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub enum AppEvent {
    StoreOpened { path: PathBuf, tables: Vec<String> },
    StoreFailed { path: PathBuf, error: String },
    Refreshed,
    RefreshFailed { error: String },
    TablesListed { tables: Vec<String> },
    CopyReady { text: String },
    Status(String),
    Error(String),
}

pub struct App {
    pub focus: Focus,

    pub ctx: AppContext,
    pub rt: tokio::runtime::Handle,
    pub events_tx: mpsc::UnboundedSender<AppEvent>,
    pub events_rx: mpsc::UnboundedReceiver<AppEvent>,

    pub grid_state: GridState,
    pub edit: EditSession,
    pub sql: Prompt,
    pub command: Prompt,
    pub cell: Prompt,
    pub history: History,
    pub help: Option<HelpPopup>,

    pub store_status: StoreStatus,
    pub tables: Vec<String>,
    pub server_port: Option<u16>,

    /// Keep the cursor on the newest row as rows arrive.
    follow_bottom: bool,
    refreshing: Arc<AtomicBool>,
    last_tick: Instant,
    last_refresh_error: Option<String>,

    pub last_status: Option<String>,
    pub last_error: Option<String>,
}

impl App {
    pub fn new(
        ctx: AppContext,
        rt: tokio::runtime::Handle,
        history: History,
        events_tx: mpsc::UnboundedSender<AppEvent>,
        events_rx: mpsc::UnboundedReceiver<AppEvent>,
        db_path: Option<PathBuf>,
        server_port: Option<u16>,
    ) -> Self {
        let mut app = Self {
            focus: Focus::Grid,

            ctx,
            rt,
            events_tx,
            events_rx,

            grid_state: GridState::default(),
            edit: EditSession::new(),
            sql: Prompt::new(),
            command: Prompt::new(),
            cell: Prompt::new(),
            history,
            help: None,

            store_status: StoreStatus::Closed,
            tables: Vec::new(),
            server_port,

            follow_bottom: true,
            refreshing: Arc::new(AtomicBool::new(false)),
            last_tick: Instant::now(),
            last_refresh_error: None,

            last_status: None,
            last_error: None,
        };

        if let Some(path) = db_path {
            app.start_open(path);
        }

        app
    }

    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.drain_events();
            self.tick();

            let window = self.ctx.window.snapshot();
            let query = self.ctx.window.query();
            let title = query
                .as_ref()
                .map(|q| format!(" {} ", one_line(&q.select_sql())))
                .unwrap_or_else(|| " No table ".to_string());
            let edit_title = self.edit_title();
            let mut body_rows = 0usize;

            terminal.draw(|frame| {
                let size = frame.area();

                let error_height = if self.last_error.is_some() { 4 } else { 0 };
                let prompt_height = if self.focus == Focus::Grid { 0 } else { 3 };

                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Length(error_height),
                        Constraint::Min(3),
                        Constraint::Length(prompt_height),
                        Constraint::Length(1),
                    ])
                    .split(size);

                let error_area = chunks[0];
                let grid_area = chunks[1];
                let prompt_area = chunks[2];
                let status_area = chunks[3];

                if let Some(ref err) = self.last_error {
                    let error_text = Paragraph::new(err.as_str())
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .title("Error (Enter to dismiss)")
                                .border_style(Style::default().fg(Color::Red)),
                        )
                        .style(Style::default().fg(Color::Red))
                        .wrap(Wrap { trim: false });
                    frame.render_widget(error_text, error_area);
                }

                // Borders plus the header line.
                body_rows = grid_area.height.saturating_sub(3) as usize;

                let display = &self.ctx.config.display;
                let data_width = grid_area
                    .width
                    .saturating_sub(2)
                    .saturating_sub(marker_width(&window, display.show_row_numbers));
                self.grid_state
                    .ensure_col_visible(&window.col_widths, data_width);

                let pending = match (self.edit.cursor(), self.edit.values()) {
                    (Some((abs_row, col)), Some(values)) => Some(PendingRow {
                        abs_row,
                        values,
                        col,
                    }),
                    _ => None,
                };
                let grid = DataGrid {
                    window: &window,
                    state: &self.grid_state,
                    sort_keys: query.as_ref().map(|q| q.sort_keys()).unwrap_or(&[]),
                    pending,
                    title: &title,
                    focused: matches!(self.focus, Focus::Grid | Focus::Edit),
                    show_row_numbers: display.show_row_numbers,
                    severity_colors: display.severity_colors,
                };
                frame.render_widget(grid, grid_area);

                frame.render_widget(self.status_line(&window, status_area.width), status_area);

                let prompt = match self.focus {
                    Focus::Grid => None,
                    Focus::Sql => Some((
                        &mut self.sql,
                        "SQL (Enter run, Up/Down history, Esc cancel)".to_string(),
                        Color::Green,
                    )),
                    Focus::Command => Some((
                        &mut self.command,
                        ": Command (Enter run, Esc cancel)".to_string(),
                        Color::Magenta,
                    )),
                    Focus::Edit => Some((&mut self.cell, edit_title, Color::Yellow)),
                };
                if let Some((prompt, title, color)) = prompt {
                    prompt.textarea.set_block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title(title)
                            .border_style(Style::default().fg(color)),
                    );
                    frame.render_widget(&prompt.textarea, prompt_area);
                }

                if let Some(help) = self.help.as_mut() {
                    help.render(frame, size);
                }
            })?;

            self.update_viewport(body_rows);

            if event::poll(Duration::from_millis(50))? {
                match event::read()? {
                    Event::Key(key) => {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if self.on_key(key) {
                            break;
                        }
                    }
                    Event::Paste(text) => self.on_paste(&text),
                    _ => {}
                }
            }
        }

        if let Err(e) = self.history.save() {
            warn!(error = %format!("{:#}", e), "could not save history");
        }
        Ok(())
    }

    fn edit_title(&self) -> String {
        let verb = match self.edit.state() {
            EditState::Idle => return String::new(),
            EditState::Inserting { .. } => "Insert",
            EditState::Updating { .. } => "Update",
        };
        format!(
            "{} {} (Tab next column, Enter queue, Esc discard)",
            verb,
            self.edit.current_column().unwrap_or("")
        )
    }

    fn update_viewport(&self, body_rows: usize) {
        // Leave a free line at the bottom for the row being inserted.
        let rows = if matches!(self.edit.state(), EditState::Inserting { .. }) {
            body_rows.saturating_sub(1)
        } else {
            body_rows
        };
        self.ctx.window.set_viewport(rows.max(1));
    }

    fn tick(&mut self) {
        if self.last_tick.elapsed() >= REFRESH_INTERVAL {
            self.last_tick = Instant::now();
            self.ctx.window.invalidate();
        }
        if self.store_status == StoreStatus::Open && self.ctx.window.is_stale() {
            self.request_refresh();
        }
    }

    fn request_refresh(&mut self) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let ctx = self.ctx.clone();
        let tx = self.events_tx.clone();
        let refreshing = Arc::clone(&self.refreshing);

        self.rt.spawn(async move {
            let ev = match ctx.refresh_window(false).await {
                Ok(true) => Some(AppEvent::Refreshed),
                Ok(false) => None,
                Err(e) => Some(AppEvent::RefreshFailed {
                    error: format!("{:#}", e),
                }),
            };
            refreshing.store(false, Ordering::Release);
            if let Some(ev) = ev {
                let _ = tx.send(ev);
            }
        });
    }

    fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            return true;
        }

        if let Some(help) = self.help.as_mut() {
            if help.handle_key(key) == HelpAction::Close {
                self.help = None;
            }
            return false;
        }

        // Errors are dismissed before the grid takes keys again.
        if self.last_error.is_some() && self.focus == Focus::Grid {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.last_error = None;
            }
            return false;
        }

        match self.focus {
            Focus::Grid => self.handle_grid_key(key),
            Focus::Sql => {
                self.handle_sql_key(key);
                false
            }
            Focus::Command => self.handle_command_key(key),
            Focus::Edit => {
                self.handle_edit_key(key);
                false
            }
        }
    }

    fn on_paste(&mut self, text: &str) {
        match self.focus {
            Focus::Grid => self.paste(text),
            Focus::Sql => self.sql.insert_str(text),
            Focus::Command => self.command.insert_str(text),
            Focus::Edit => self.cell.insert_str(text),
        }
    }

    fn handle_grid_key(&mut self, key: KeyEvent) -> bool {
        let window = self.ctx.window.snapshot();
        let columns = window.headers.len();
        let page = self.ctx.window.viewport_rows().max(1) as isize;

        match (key.code, key.modifiers) {
            (KeyCode::Char('q'), KeyModifiers::NONE) => return true,
            (KeyCode::Char('?'), _) => self.help = Some(HelpPopup::new()),
            (KeyCode::Char('/'), _) => {
                self.history.reset_recall();
                self.sql.open("");
                self.focus = Focus::Sql;
            }
            (KeyCode::Char(':'), _) => {
                self.command.open("");
                self.focus = Focus::Command;
            }

            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
                self.move_cursor(&window, 1)
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
                self.move_cursor(&window, -1)
            }
            (KeyCode::Char('d'), KeyModifiers::CONTROL) => {
                self.move_cursor(&window, (page / 2).max(1))
            }
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.move_cursor(&window, -(page / 2).max(1))
            }
            (KeyCode::PageDown, _) => self.move_cursor(&window, page),
            (KeyCode::PageUp, _) => self.move_cursor(&window, -page),
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.move_cursor(&window, isize::MIN / 2)
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => self.move_cursor(&window, isize::MAX / 2),
            (KeyCode::Char('h'), KeyModifiers::NONE) | (KeyCode::Left, _) => {
                self.grid_state.move_col(-1, columns)
            }
            (KeyCode::Char('l'), KeyModifiers::NONE) | (KeyCode::Right, _) => {
                self.grid_state.move_col(1, columns)
            }
            (KeyCode::Char('0'), _) => self.grid_state.move_col(-(columns as isize), columns),
            (KeyCode::Char('$'), _) => self.grid_state.move_col(columns as isize, columns),

            (KeyCode::Enter, _) => self.toggle_filter(&window),
            (KeyCode::Char('s'), KeyModifiers::NONE) => self.toggle_sort(&window),
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.ctx.window.invalidate();
                self.last_status = Some("Refreshing".to_string());
            }

            (KeyCode::Char('i'), KeyModifiers::NONE) => self.begin_insert(&window),
            (KeyCode::Char('e'), KeyModifiers::NONE) => self.begin_update(&window),
            (KeyCode::Char('v'), KeyModifiers::NONE) => self.grid_state.toggle_anchor(),
            (KeyCode::Esc, _) => self.grid_state.anchor = None,
            (KeyCode::Char('d'), KeyModifiers::NONE) => self.delete_selection(&window),
            (KeyCode::Char('y'), KeyModifiers::NONE) => self.copy_selection(&window),
            (KeyCode::Char('p'), KeyModifiers::NONE) => match clipboard::paste_text() {
                Ok(text) => self.paste(&text),
                Err(e) => self.last_error = Some(format!("{:#}", e)),
            },
            _ => {}
        }

        false
    }

    fn move_cursor(&mut self, window: &RowWindow, delta: isize) {
        if window.total_rows == 0 {
            return;
        }
        let last = window.total_rows - 1;
        let row = self.grid_state.cursor_row.saturating_add_signed(delta).min(last);
        self.grid_state.cursor_row = row;
        self.follow_bottom = row == last;
        self.scroll_to_cursor(window);
    }

    /// Scroll the window just enough to contain the cursor row.
    fn scroll_to_cursor(&self, window: &RowWindow) {
        let viewport = self.ctx.window.viewport_rows().max(1);
        let row = self.grid_state.cursor_row;
        let offset = if row < window.offset {
            row
        } else if row >= window.offset + viewport {
            row + 1 - viewport
        } else {
            return;
        };
        self.ctx.window.scroll_to(
            window
                .total_rows
                .saturating_sub(viewport)
                .saturating_sub(offset),
        );
    }

    fn jump_to_bottom(&mut self) {
        self.follow_bottom = true;
        self.grid_state.anchor = None;
        self.ctx.window.scroll_to(0);
    }

    fn reset_grid(&mut self) {
        self.grid_state = GridState::default();
        self.follow_bottom = true;
        self.last_refresh_error = None;
    }

    fn current_table(&self) -> Option<String> {
        self.ctx
            .window
            .query()
            .and_then(|q| q.table().map(str::to_string))
    }

    fn toggle_filter(&mut self, window: &RowWindow) {
        let col = self.grid_state.cursor_col;
        let Some(column) = window.headers.get(col).cloned() else {
            return;
        };
        let Some(value) = window
            .row(self.grid_state.cursor_row)
            .and_then(|r| r.get(col))
            .cloned()
        else {
            self.last_status = Some("Row is not loaded yet".to_string());
            return;
        };

        let filter = Filter::new(column.as_str(), value.as_str()).to_sql();
        match self
            .ctx
            .window
            .update_query(|q| q.toggle_filter(&column, &value))
        {
            Some(Ok(FilterToggle::Added)) => {
                self.last_status = Some(format!("Filter on {}", filter));
                self.jump_to_bottom();
            }
            Some(Ok(FilterToggle::Removed)) => {
                self.last_status = Some(format!("Filter off {}", filter));
                self.jump_to_bottom();
            }
            Some(Err(e)) => self.last_error = Some(e.to_string()),
            None => self.last_status = Some("No table".to_string()),
        }
    }

    fn toggle_sort(&mut self, window: &RowWindow) {
        let Some(column) = window.headers.get(self.grid_state.cursor_col).cloned() else {
            return;
        };
        match self.ctx.window.update_query(|q| q.toggle_sort(&column)) {
            Some(Ok(direction)) => {
                let label = match direction {
                    SortDirection::Ascending => "ascending",
                    SortDirection::Descending => "descending",
                    SortDirection::Unsorted => "unsorted",
                };
                self.last_status = Some(format!("{} {}", column, label));
                self.jump_to_bottom();
            }
            Some(Err(e)) => self.last_error = Some(e.to_string()),
            None => self.last_status = Some("No table".to_string()),
        }
    }

    fn begin_insert(&mut self, window: &RowWindow) {
        let table = self.current_table();
        match self
            .edit
            .begin_insert(table.as_deref(), window, window.total_rows)
        {
            Ok(()) => {
                self.ctx.window.scroll_to(0);
                self.open_cell_editor();
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    fn begin_update(&mut self, window: &RowWindow) {
        let table = self.current_table();
        match self.edit.begin_update(
            table.as_deref(),
            window,
            self.grid_state.cursor_row,
            self.grid_state.cursor_col,
        ) {
            Ok(()) => self.open_cell_editor(),
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    fn open_cell_editor(&mut self) {
        let value = self.edit.current_value().unwrap_or("").to_string();
        self.cell.open(&value);
        self.focus = Focus::Edit;
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => {
                let value = self.cell.text();
                self.edit.handle(EditKey::Tab(value));
                self.open_cell_editor();
            }
            KeyCode::Enter => {
                let value = self.cell.text();
                let outcome = self.edit.handle(EditKey::Enter(value));
                self.finish_edit(outcome);
            }
            KeyCode::Esc => {
                let outcome = self.edit.handle(EditKey::Escape);
                self.finish_edit(outcome);
            }
            _ => self.cell.input(key),
        }
    }

    fn finish_edit(&mut self, outcome: EditOutcome) {
        self.cell.close();
        self.focus = Focus::Grid;
        match outcome {
            EditOutcome::Finished(Some(sql)) => {
                self.last_status = Some(format!("Queued: {}", one_line(&sql)));
                self.ctx.queue.enqueue(sql);
            }
            EditOutcome::Finished(None) => self.last_status = Some("No changes".to_string()),
            EditOutcome::Cancelled => self.last_status = Some("Edit discarded".to_string()),
            EditOutcome::Continue => {}
        }
    }

    /// Selected rows and columns; without a selection, the whole cursor row.
    fn selection_ranges(
        &self,
        window: &RowWindow,
    ) -> (std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>) {
        if self.grid_state.anchor.is_some() {
            return self.grid_state.selection();
        }
        let row = self.grid_state.cursor_row;
        (row..=row, 0..=window.headers.len().saturating_sub(1))
    }

    fn delete_selection(&mut self, window: &RowWindow) {
        let (rows, cols) = self.selection_ranges(window);
        let table = self.current_table();
        match delete_statements(table.as_deref(), window, rows, cols) {
            Ok(statements) => {
                let n = statements.len();
                self.ctx.queue.enqueue_all(statements);
                self.grid_state.anchor = None;
                self.last_status = Some(format!(
                    "Queued {} delete{}",
                    n,
                    if n == 1 { "" } else { "s" }
                ));
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    fn copy_selection(&mut self, window: &RowWindow) {
        let Some(query) = self.ctx.window.query() else {
            self.last_status = Some("No table".to_string());
            return;
        };
        let Some(store) = self.ctx.store() else {
            self.last_error = Some("No database open".to_string());
            return;
        };
        let (rows, cols) = self.selection_ranges(window);
        let sql = match copy_sql(&query, window, rows, cols) {
            Ok(sql) => sql,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return;
            }
        };

        let tx = self.events_tx.clone();
        let max_bytes = self.ctx.config.server.max_reply_bytes;
        self.rt.spawn(async move {
            let ev = match store.query_table(&sql, max_bytes).await {
                Ok(reply) => AppEvent::CopyReady { text: reply.text },
                Err(e) => AppEvent::Error(format!("Copy failed: {:#}", e)),
            };
            let _ = tx.send(ev);
        });
        self.grid_state.anchor = None;
    }

    fn paste(&mut self, text: &str) {
        let table = self.current_table();
        match paste_statements(table.as_deref(), text) {
            Ok(statements) => {
                let n = statements.len();
                self.ctx.queue.enqueue_all(statements);
                self.follow_bottom = true;
                self.last_status = Some(format!(
                    "Queued {} pasted row{}",
                    n,
                    if n == 1 { "" } else { "s" }
                ));
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    fn handle_sql_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let text = self.sql.text().trim().to_string();
                self.sql.close();
                self.focus = Focus::Grid;
                self.run_sql(&text);
            }
            KeyCode::Esc => {
                self.sql.close();
                self.focus = Focus::Grid;
            }
            KeyCode::Up => {
                if let Some(cmd) = self.history.older() {
                    self.sql.set_text(cmd);
                }
            }
            KeyCode::Down => {
                let cmd = self.history.newer().unwrap_or("").to_string();
                self.sql.set_text(&cmd);
            }
            _ => self.sql.input(key),
        }
    }

    /// A `select` becomes the viewed query; anything else runs on the
    /// writer right away.
    fn run_sql(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let database = self.ctx.store().map(|s| s.path().display().to_string());
        self.history.push(text, database);

        if starts_with_keyword(text, "select") {
            match QueryState::set_base(text) {
                Ok(query) => {
                    self.ctx.window.set_query(Some(query));
                    self.reset_grid();
                }
                Err(e) => self.last_error = Some(e.to_string()),
            }
            return;
        }

        let Some(store) = self.ctx.store() else {
            self.last_error = Some("No database open".to_string());
            return;
        };
        let tx = self.events_tx.clone();
        let sql = text.to_string();
        self.rt.spawn(async move {
            let ev = match store.execute(&sql).await {
                Ok(()) => {
                    info!("+++ {}", one_line(&sql));
                    AppEvent::Status(format!("Done: {}", one_line(&sql)))
                }
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "--- {}", one_line(&sql));
                    AppEvent::Error(format!("{:#}", e))
                }
            };
            let _ = tx.send(ev);
        });
    }

    fn handle_command_key(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => {
                let cmd = self.command.text();
                self.command.close();
                self.focus = Focus::Grid;
                return self.execute_command(cmd.trim());
            }
            (KeyCode::Esc, _) => {
                self.command.close();
                self.focus = Focus::Grid;
            }
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => self.command.open(""),
            _ => self.command.input(key),
        }
        false
    }

    fn execute_command(&mut self, cmd: &str) -> bool {
        if cmd.is_empty() {
            return false;
        }

        let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
        let command = parts[0];
        let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

        match command {
            "q" | "quit" | "exit" => return true,
            "open" | "o" => {
                if args.is_empty() {
                    self.last_status = Some("Usage: :open <path>".to_string());
                } else {
                    self.start_open(expand_path(args));
                }
            }
            "save" | "w" => {
                if args.is_empty() {
                    self.last_status = Some("Usage: :save <path>".to_string());
                } else {
                    self.start_save(expand_path(args));
                }
            }
            "export" => {
                if args.is_empty() {
                    self.last_status = Some("Usage: :export <path>".to_string());
                } else {
                    self.export(expand_path(args));
                }
            }
            "commit" => self.start_commit(),
            "tables" => self.start_list_tables(),
            "table" | "t" => {
                if args.is_empty() {
                    self.last_status = Some("Usage: :table <name>".to_string());
                } else {
                    self.ctx.window.set_query(Some(QueryState::for_table(args)));
                    self.reset_grid();
                }
            }
            "help" | "h" => self.help = Some(HelpPopup::new()),
            _ => {
                self.last_status = Some(format!("Unknown command: {}", command));
            }
        }

        false
    }

    pub fn start_open(&mut self, path: PathBuf) {
        self.store_status = StoreStatus::Opening;
        self.last_status = Some(format!("Opening {}", path.display()));

        let ctx = self.ctx.clone();
        let tx = self.events_tx.clone();
        self.rt.spawn(async move {
            let ev = match ctx.open_store(&path).await {
                Ok(tables) => AppEvent::StoreOpened { path, tables },
                Err(e) => AppEvent::StoreFailed {
                    path,
                    error: format!("{:#}", e),
                },
            };
            let _ = tx.send(ev);
        });
    }

    fn start_save(&mut self, path: PathBuf) {
        let Some(store) = self.ctx.store() else {
            self.last_error = Some("No database open".to_string());
            return;
        };
        let tx = self.events_tx.clone();
        self.rt.spawn(async move {
            let ev = match store.save(&path).await {
                Ok(()) => AppEvent::Status(format!("Saved to {}", path.display())),
                Err(e) => AppEvent::Error(format!("{:#}", e)),
            };
            let _ = tx.send(ev);
        });
    }

    fn export(&mut self, path: PathBuf) {
        let window = self.ctx.window.snapshot();
        match export_to_path(&window, &path) {
            Ok(rows) => {
                self.last_status = Some(format!("Exported {} rows to {}", rows, path.display()));
            }
            Err(e) => self.last_error = Some(format!("{:#}", e)),
        }
    }

    fn start_commit(&mut self) {
        let ctx = self.ctx.clone();
        let tx = self.events_tx.clone();
        self.rt.spawn(async move {
            let ev = match ctx.flush().await {
                Some(outcome) => AppEvent::Status(format!(
                    "Committed {} of {} statements",
                    outcome.succeeded, outcome.attempted
                )),
                None => AppEvent::Error("No database open".to_string()),
            };
            let _ = tx.send(ev);
        });
    }

    fn start_list_tables(&mut self) {
        let Some(store) = self.ctx.store() else {
            self.last_error = Some("No database open".to_string());
            return;
        };
        let tx = self.events_tx.clone();
        self.rt.spawn(async move {
            let ev = match store.tables().await {
                Ok(tables) => AppEvent::TablesListed { tables },
                Err(e) => AppEvent::Error(format!("{:#}", e)),
            };
            let _ = tx.send(ev);
        });
    }

    fn drain_events(&mut self) {
        while let Ok(ev) = self.events_rx.try_recv() {
            self.apply_event(ev);
        }
    }

    fn apply_event(&mut self, ev: AppEvent) {
        match ev {
            AppEvent::StoreOpened { path, tables } => {
                self.store_status = StoreStatus::Open;
                self.reset_grid();
                self.last_status = Some(format!(
                    "Opened {} ({} table{})",
                    path.display(),
                    tables.len(),
                    if tables.len() == 1 { "" } else { "s" }
                ));
                if let Some(first) = tables.first() {
                    self.ctx.window.set_query(Some(QueryState::for_table(first)));
                }
                self.tables = tables;
            }
            AppEvent::StoreFailed { path, error } => {
                self.store_status = if self.ctx.store().is_some() {
                    StoreStatus::Open
                } else {
                    StoreStatus::Closed
                };
                self.last_error = Some(format!("Could not open {}: {}", path.display(), error));
            }
            AppEvent::Refreshed => {
                let window = self.ctx.window.snapshot();
                if self.follow_bottom && window.total_rows > 0 {
                    self.grid_state.cursor_row = window.total_rows - 1;
                }
                self.grid_state
                    .clamp(window.total_rows, window.headers.len());
                self.last_refresh_error = None;
            }
            AppEvent::RefreshFailed { error } => {
                // The periodic refresh would otherwise repeat the same error.
                if self.last_refresh_error.as_deref() != Some(error.as_str()) {
                    self.last_error = Some(error.clone());
                    self.last_refresh_error = Some(error);
                }
            }
            AppEvent::TablesListed { tables } => {
                self.last_status = Some(if tables.is_empty() {
                    "No tables".to_string()
                } else {
                    format!("Tables: {}", tables.join(", "))
                });
                self.tables = tables;
            }
            AppEvent::CopyReady { text } => match clipboard::copy_text(&text) {
                Ok(()) => self.last_status = Some(clipboard::describe(&text)),
                Err(e) => self.last_error = Some(format!("{:#}", e)),
            },
            AppEvent::Status(msg) => self.last_status = Some(msg),
            AppEvent::Error(msg) => self.last_error = Some(msg),
        }
    }

    fn status_line(&self, window: &RowWindow, width: u16) -> Paragraph<'static> {
        let store = self.ctx.store();
        let store_part = match self.store_status {
            StoreStatus::Open => store_label(store.as_deref().map(|s| s.path()), width / 3),
            other => other.label().to_string(),
        };
        let rows = if window.rows.is_empty() {
            format!("0 of {}", window.total_rows)
        } else {
            format!(
                "{}-{} of {}",
                window.offset + 1,
                window.offset + window.rows.len(),
                window.total_rows
            )
        };
        let queued = self.ctx.queue.len();

        let line = StatusLineBuilder::new()
            .segment(
                StatusSegment::new(format!(" {} ", self.focus.label()), Priority::Critical)
                    .style(Style::default().fg(Color::Black).bg(Color::Cyan)),
            )
            .segment(StatusSegment::new(store_part, Priority::High))
            .segment(StatusSegment::new(rows, Priority::High))
            .add_some((queued > 0).then(|| format!("{} queued", queued)), |s| {
                StatusSegment::new(s, Priority::Medium).style(Style::default().fg(Color::Yellow))
            })
            .add_some(self.last_status.as_deref(), |s| {
                StatusSegment::new(s, Priority::Low)
            })
            .add_some(self.server_port.map(|p| format!("port {}", p)), |s| {
                StatusSegment::new(s, Priority::Low)
                    .style(Style::default().fg(Color::DarkGray))
                    .right_align()
            })
            .build(width);

        Paragraph::new(line).style(Style::default().fg(Color::Gray))
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
