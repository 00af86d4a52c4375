//! The read/write handle pair over one SQLite file.
//!
//! Reads (count and window queries, script selects, backups) go through the
//! reader. Every mutation goes through the single writer, whose update hook
//! feeds [`ChangeTracker`] once each call has returned.

mod queue;

pub use queue::{spawn_flusher, FlushOutcome, QueuedStatement, StatementResult, WriteQueue};

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_rusqlite::rusqlite::{self, types::ValueRef};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::util::one_line;

/// Per-table modification counters.
///
/// The writer bumps a table's counter after each call that touched it; the
/// window cache compares counters to decide whether its rows are stale.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    counters: Mutex<HashMap<String, u64>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, table: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(table.to_lowercase()).or_insert(0) += 1;
    }

    pub fn counter(&self, table: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.get(&table.to_lowercase()).copied().unwrap_or(0)
    }
}

/// Column names and text values of a result set. NULL is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Row count and bounded rows of one query, read from a single snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowRows {
    pub total: usize,
    pub rows: QueryRows,
}

/// Tab-separated reply to a script query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReply {
    pub text: String,
    pub rows: usize,
    pub truncated: bool,
}

pub struct Store {
    path: PathBuf,
    reader: Connection,
    writer: Connection,
    touched: Arc<Mutex<BTreeSet<String>>>,
    changes: Arc<ChangeTracker>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open both handles on `path`.
    pub async fn open(
        path: &Path,
        config: &StoreConfig,
        changes: Arc<ChangeTracker>,
    ) -> Result<Store> {
        if !config.create_if_missing && !path.exists() {
            bail!("Database file does not exist: {}", path.display());
        }

        let busy = Duration::from_millis(config.busy_timeout_ms);

        let writer = Connection::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let touched: Arc<Mutex<BTreeSet<String>>> = Arc::default();
        let hook_touched = Arc::clone(&touched);
        writer
            .call_unwrap(move |conn| -> rusqlite::Result<()> {
                conn.busy_timeout(busy)?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                conn.update_hook(Some(
                    move |_action: rusqlite::hooks::Action, _db: &str, table: &str, _rowid: i64| {
                        hook_touched
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(table.to_string());
                    },
                ));
                Ok(())
            })
            .await
            .with_context(|| format!("Failed to configure {}", path.display()))?;

        let reader = Connection::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        reader
            .call_unwrap(move |conn| -> rusqlite::Result<i64> {
                conn.busy_timeout(busy)?;
                // Reading the schema fails here for files that are not databases.
                conn.query_row("select count(*) from sqlite_master", [], |row| row.get(0))
            })
            .await
            .with_context(|| format!("Not a database: {}", path.display()))?;

        info!(path = %path.display(), "store opened");

        Ok(Store {
            path: path.to_path_buf(),
            reader,
            writer,
            touched,
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn changes(&self) -> &Arc<ChangeTracker> {
        &self.changes
    }

    /// Flush pending writes, then release both handles.
    pub async fn close(self, queue: &WriteQueue) -> FlushOutcome {
        let outcome = queue.flush(&self).await;
        info!(path = %self.path.display(), "store closed");
        outcome
    }

    /// Run `f` on the writer, then publish the tables it touched.
    pub(crate) async fn write<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let result = self.writer.call_unwrap(f).await;
        self.publish_changes();
        result
    }

    async fn read<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.reader.call_unwrap(f).await
    }

    fn publish_changes(&self) {
        let tables = std::mem::take(
            &mut *self.touched.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for table in tables {
            debug!(table = %table, "table changed");
            self.changes.notify(&table);
        }
    }

    /// Table names from the schema, in schema order.
    pub async fn tables(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "select name from sqlite_master where type = 'table' and name not like 'sqlite_%'",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
        .context("Failed to list tables")
    }

    /// Copy the live database into a new file.
    pub async fn save(&self, target: &Path) -> Result<()> {
        if target.exists() {
            bail!("File already exists: {}", target.display());
        }
        let target_str = target
            .to_str()
            .with_context(|| format!("Path is not valid UTF-8: {}", target.display()))?
            .to_string();

        self.read(move |conn| {
            conn.execute("VACUUM INTO ?1", [target_str])?;
            Ok(())
        })
        .await
        .with_context(|| format!("Failed to save to {}", target.display()))?;

        info!(target = %target.display(), "store saved");
        Ok(())
    }

    /// Whether `sql` only reads. Statements that fail to prepare count as
    /// writes, so they surface their error from the writer.
    pub async fn is_read_only(&self, sql: &str) -> bool {
        let owned = sql.to_string();
        self.read(move |conn| Ok(conn.prepare(&owned)?.readonly()))
            .await
            .unwrap_or(false)
    }

    /// First column of the first row as an integer (count queries).
    pub async fn query_scalar(&self, sql: &str) -> Result<i64> {
        let owned = sql.to_string();
        self.read(move |conn| {
            let mut stmt = prepare_read_only(conn, &owned)?;
            stmt.query_row([], |row| row.get::<_, i64>(0))
        })
        .await
        .with_context(|| format!("Query failed: {}", one_line(sql)))
    }

    pub async fn query_rows(&self, sql: &str) -> Result<QueryRows> {
        let owned = sql.to_string();
        self.read(move |conn| collect_rows(conn, &owned))
            .await
            .with_context(|| format!("Query failed: {}", one_line(sql)))
    }

    /// Count rows with `count_sql`, then fetch the statement `fetch_sql`
    /// builds from that count, inside one read transaction. A commit landing
    /// in between cannot make the rows disagree with the count.
    pub async fn query_window<F>(&self, count_sql: &str, fetch_sql: F) -> Result<WindowRows>
    where
        F: FnOnce(usize) -> String + Send + 'static,
    {
        let owned = count_sql.to_string();
        self.read(move |conn| {
            let tx = conn.transaction()?;
            let total = prepare_read_only(&tx, &owned)?
                .query_row([], |row| row.get::<_, i64>(0))?
                .max(0) as usize;
            let rows = collect_rows(&tx, &fetch_sql(total))?;
            tx.commit()?;
            Ok(WindowRows { total, rows })
        })
        .await
        .with_context(|| format!("Query failed: {}", one_line(count_sql)))
    }

    /// Fully materialize a query as tab-separated text: header line first,
    /// rows joined by `\n`, no trailing newline. Stops at the last row that
    /// fits in `max_bytes`.
    pub async fn query_table(&self, sql: &str, max_bytes: usize) -> Result<TableReply> {
        let owned = sql.to_string();
        self.read(move |conn| {
            let mut stmt = prepare_read_only(conn, &owned)?;
            let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let width = headers.len();
            let mut text = headers.join("\t");
            let mut count = 0;
            let mut truncated = false;

            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let line = row_to_text(row, width)?.join("\t");
                if text.len() + 1 + line.len() > max_bytes {
                    truncated = true;
                    break;
                }
                text.push('\n');
                text.push_str(&line);
                count += 1;
            }

            Ok(TableReply {
                text,
                rows: count,
                truncated,
            })
        })
        .await
        .with_context(|| format!("Query failed: {}", one_line(sql)))
    }

    /// Run statements on the writer immediately, outside the queue.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        let owned = sql.to_string();
        self.write(move |conn| conn.execute_batch(&owned))
            .await
            .with_context(|| format!("Statement failed: {}", one_line(sql)))
    }
}

/// Prepare a statement for the reader, refusing anything that writes.
fn prepare_read_only<'c>(
    conn: &'c rusqlite::Connection,
    sql: &str,
) -> rusqlite::Result<rusqlite::Statement<'c>> {
    let stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(rusqlite::Error::InvalidQuery);
    }
    Ok(stmt)
}

fn collect_rows(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<QueryRows> {
    let mut stmt = prepare_read_only(conn, sql)?;
    let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let width = headers.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        rows.push(row_to_text(row, width)?);
    }
    Ok(QueryRows { headers, rows })
}

fn row_to_text(row: &rusqlite::Row<'_>, width: usize) -> rusqlite::Result<Vec<String>> {
    (0..width)
        .map(|i| row.get_ref(i).map(value_to_text))
        .collect()
}

/// Text form of a cell, matching how SQLite itself prints values.
pub fn value_to_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = StoreConfig {
            create_if_missing: true,
            ..StoreConfig::default()
        };
        let store = Store::open(&path, &config, Arc::new(ChangeTracker::new()))
            .await
            .unwrap();
        store
            .execute("create table t (name text, n integer, r real, note text)")
            .await
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_change_tracker_is_case_insensitive() {
        let tracker = ChangeTracker::new();
        assert_eq!(tracker.counter("events"), 0);
        tracker.notify("Events");
        tracker.notify("events");
        assert_eq!(tracker.counter("EVENTS"), 2);
        assert_eq!(tracker.counter("other"), 0);
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let result = Store::open(&path, &StoreConfig::default(), Arc::new(ChangeTracker::new())).await;
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_open_non_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        let result = Store::open(&path, &StoreConfig::default(), Arc::new(ChangeTracker::new())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_visible_to_reader_and_notifies() {
        let (_dir, store) = seeded().await;
        let before = store.changes().counter("t");

        store
            .execute("insert into t values ('alice', 1, 1.5, null)")
            .await
            .unwrap();

        assert!(store.changes().counter("t") > before);
        assert_eq!(store.query_scalar("select count(*) from t").await.unwrap(), 1);

        let rows = store.query_rows("select * from t").await.unwrap();
        assert_eq!(rows.headers, vec!["name", "n", "r", "note"]);
        assert_eq!(rows.rows, vec![vec!["alice", "1", "1.5", ""]]);
    }

    #[tokio::test]
    async fn test_tables() {
        let (_dir, store) = seeded().await;
        store.execute("create table u (x)").await.unwrap();
        assert_eq!(store.tables().await.unwrap(), vec!["t", "u"]);
    }

    #[tokio::test]
    async fn test_query_table_truncates_at_row_boundary() {
        let (_dir, store) = seeded().await;
        store
            .execute("insert into t (name) values ('alice'); insert into t (name) values ('bob'); insert into t (name) values ('carol');")
            .await
            .unwrap();

        let full = store.query_table("select name from t", 1024).await.unwrap();
        assert_eq!(full.text, "name\nalice\nbob\ncarol");
        assert_eq!(full.rows, 3);
        assert!(!full.truncated);

        // "name\nalice\nbob" is 14 bytes; carol would need 6 more.
        let cut = store.query_table("select name from t", 16).await.unwrap();
        assert_eq!(cut.text, "name\nalice\nbob");
        assert_eq!(cut.rows, 2);
        assert!(cut.truncated);
    }

    #[tokio::test]
    async fn test_reader_refuses_writing_statements() {
        let (_dir, store) = seeded().await;
        let before = store.changes().counter("t");

        let cte_insert = "with x as (select 'z' as name) insert into t (name) select name from x";
        assert!(store.query_table(cte_insert, 4096).await.is_err());
        assert!(store.query_rows("delete from t").await.is_err());
        assert_eq!(store.query_scalar("select count(*) from t").await.unwrap(), 0);
        assert_eq!(store.changes().counter("t"), before);

        assert!(!store.is_read_only(cte_insert).await);
        assert!(store.is_read_only("with x as (select 1 as a) select a from x").await);
        assert!(store.is_read_only("select count(*) from t").await);
        assert!(!store.is_read_only("select * from missing").await);
    }

    #[tokio::test]
    async fn test_query_window_counts_and_fetches_together() {
        let (_dir, store) = seeded().await;
        store
            .execute("insert into t (n) values (1); insert into t (n) values (2); insert into t (n) values (3);")
            .await
            .unwrap();

        let window = store
            .query_window("select count(*) from t", |total| {
                format!("select n from t order by n limit 2 offset {}", total - 2)
            })
            .await
            .unwrap();
        assert_eq!(window.total, 3);
        assert_eq!(window.rows.rows, vec![vec!["2"], vec!["3"]]);
    }

    #[tokio::test]
    async fn test_failed_statement_reports_error() {
        let (_dir, store) = seeded().await;
        let err = store.execute("insert into missing values (1)").await.unwrap_err();
        assert!(format!("{:#}", err).contains("no such table"));
    }

    #[tokio::test]
    async fn test_save_copies_and_refuses_existing() {
        let (dir, store) = seeded().await;
        store.execute("insert into t (name) values ('x')").await.unwrap();

        let target = dir.path().join("copy.db");
        store.save(&target).await.unwrap();
        assert!(target.exists());
        assert!(store.save(&target).await.is_err());

        let copy = Store::open(&target, &StoreConfig::default(), Arc::new(ChangeTracker::new()))
            .await
            .unwrap();
        assert_eq!(copy.query_scalar("select count(*) from t").await.unwrap(), 1);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(ValueRef::Null), "");
        assert_eq!(value_to_text(ValueRef::Integer(-4)), "-4");
        assert_eq!(value_to_text(ValueRef::Real(2.0)), "2.0");
        assert_eq!(value_to_text(ValueRef::Text(b"hi")), "hi");
    }
}
