//! Integration tests for sqlgrid: queue, window and edits against a real
//! database file.

mod common;

use common::{seed_alarms, TestDatabase, ALARMS_SCHEMA};
use sqlgrid::edit::{copy_sql, delete_statements, paste_statements, EditKey, EditOutcome, EditSession};
use sqlgrid::export::export_to_path;
use sqlgrid::query::QueryState;

/// The window shows the newest rows and follows appended ones.
#[tokio::test]
async fn test_window_is_bottom_anchored() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    ctx.window.set_query(Some(QueryState::for_table("alarms")));
    ctx.window.set_viewport(20);

    assert!(ctx.refresh_window(false).await.unwrap());
    assert_eq!(ctx.window.snapshot().total_rows, 0);

    seed_alarms(&ctx, 100).await;
    assert!(ctx.window.is_stale(), "flush should mark the view stale");
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert_eq!(window.total_rows, 100);
    assert_eq!(window.offset, 80);
    assert_eq!(window.rows.len(), 20);
    assert_eq!(window.rows[19][0], "h99");

    // Scrolled up, new rows do not move the window.
    ctx.window.scroll_by(30);
    ctx.refresh_window(false).await.unwrap();
    assert_eq!(ctx.window.snapshot().offset, 50);

    seed_alarms(&ctx, 4).await;
    ctx.refresh_window(false).await.unwrap();
    let window = ctx.window.snapshot();
    assert_eq!(window.total_rows, 104);
    assert_eq!(window.offset, 54);

    // Back at the bottom, the newest row is visible again.
    ctx.window.scroll_to(0);
    ctx.refresh_window(false).await.unwrap();
    let window = ctx.window.snapshot();
    assert_eq!(window.offset, 84);
    assert_eq!(window.last_row(), Some(103));
}

/// A failing statement is skipped; the rest of the batch commits.
#[tokio::test]
async fn test_flush_isolates_failures() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;

    ctx.queue.enqueue("insert into alarms (host) values ('a')");
    ctx.queue.enqueue("insert into missing_table values (1)");
    ctx.queue.enqueue("insert into alarms (host) values ('b')");

    let outcome = ctx.flush().await.unwrap();
    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert!(ctx.queue.is_empty());

    let store = ctx.store().unwrap();
    assert_eq!(store.query_scalar("select count(*) from alarms").await.unwrap(), 2);
}

/// Queued writes survive closing and reopening the file.
#[tokio::test]
async fn test_close_flushes_queue() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    ctx.queue.enqueue("insert into alarms (host) values ('kept')");
    let outcome = ctx.close_store().await.unwrap();
    assert_eq!(outcome.succeeded, 1);

    let ctx = db.context().await;
    let rows = ctx
        .store()
        .unwrap()
        .query_rows("select host from alarms")
        .await
        .unwrap();
    assert_eq!(rows.rows, vec![vec!["kept".to_string()]]);
}

/// Filtering by a cell value narrows the count and the rows.
#[tokio::test]
async fn test_filter_and_sort() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 8).await;

    ctx.window.set_query(Some(QueryState::for_table("alarms")));
    ctx.window.set_viewport(10);
    ctx.refresh_window(false).await.unwrap();
    assert_eq!(ctx.window.snapshot().total_rows, 8);

    ctx.window
        .update_query(|q| q.toggle_filter("severity", "critical"))
        .unwrap()
        .unwrap();
    ctx.window.update_query(|q| q.toggle_sort("host")).unwrap().unwrap();
    ctx.window.update_query(|q| q.toggle_sort("host")).unwrap().unwrap();
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert_eq!(window.total_rows, 2);
    let hosts: Vec<&str> = window.rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(hosts, vec!["h4", "h0"]);

    // Toggling the same value again removes the filter.
    ctx.window
        .update_query(|q| q.toggle_filter("severity", "critical"))
        .unwrap()
        .unwrap();
    ctx.refresh_window(false).await.unwrap();
    assert_eq!(ctx.window.snapshot().total_rows, 8);
}

/// A filter narrows a base query whose where clause uses `or`.
#[tokio::test]
async fn test_filter_on_or_base_query() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 8).await;

    ctx.window.set_query(Some(
        QueryState::set_base(
            "select host, severity from alarms where severity='critical' or severity='major'",
        )
        .unwrap(),
    ));
    ctx.window.set_viewport(10);
    ctx.refresh_window(false).await.unwrap();
    assert_eq!(ctx.window.snapshot().total_rows, 4);

    ctx.window
        .update_query(|q| q.toggle_filter("host", "h0"))
        .unwrap()
        .unwrap();
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert_eq!(window.total_rows, 1);
    assert_eq!(window.rows, vec![vec!["h0".to_string(), "critical".to_string()]]);
}

/// Insert, update and delete through the edit session and the queue.
#[tokio::test]
async fn test_edit_round_trip() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    ctx.window.set_query(Some(QueryState::for_table("alarms")));
    ctx.window.set_viewport(5);
    ctx.refresh_window(false).await.unwrap();

    let query = ctx.window.query().unwrap();
    let mut session = EditSession::new();

    let window = ctx.window.snapshot();
    session
        .begin_insert(query.table(), &window, window.total_rows)
        .unwrap();
    session.handle(EditKey::Tab("core-1".into()));
    let EditOutcome::Finished(Some(insert)) = session.handle(EditKey::Enter("major".into())) else {
        panic!("insert should produce a statement");
    };
    ctx.queue.enqueue(insert);
    ctx.flush().await.unwrap();
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert_eq!(window.total_rows, 1);
    assert_eq!(window.rows[0][..2], ["core-1".to_string(), "major".to_string()]);

    // The inserted row has NULL cleared/note; the key still matches it.
    session.begin_update(query.table(), &window, 0, 1).unwrap();
    let EditOutcome::Finished(Some(update)) = session.handle(EditKey::Enter("critical".into()))
    else {
        panic!("update should produce a statement");
    };
    ctx.queue.enqueue(update);
    ctx.flush().await.unwrap();
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert_eq!(window.rows[0][1], "critical");

    let deletes = delete_statements(query.table(), &window, 0..=0, 0..=3).unwrap();
    ctx.queue.enqueue_all(deletes);
    ctx.flush().await.unwrap();
    ctx.refresh_window(false).await.unwrap();
    assert_eq!(ctx.window.snapshot().total_rows, 0);
}

/// Rows copied as tab-separated text paste back into another table.
#[tokio::test]
async fn test_copy_then_paste() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 6).await;
    let store = ctx.store().unwrap();
    store
        .execute("create table archive (host text primary key, severity text)")
        .await
        .unwrap();

    let query = QueryState::for_table("alarms");
    ctx.window.set_query(Some(query.clone()));
    ctx.window.set_viewport(6);
    ctx.refresh_window(false).await.unwrap();
    let window = ctx.window.snapshot();

    let sql = copy_sql(&query, &window, 1..=2, 0..=1).unwrap();
    let copied = store.query_table(&sql, 1 << 20).await.unwrap();
    assert_eq!(copied.text, "host\tseverity\nh1\tmajor\nh2\tminor");

    let statements = paste_statements(Some("archive"), &copied.text).unwrap();
    assert_eq!(statements.len(), 2);
    ctx.queue.enqueue_all(statements.clone());
    // Pasting twice replaces rather than duplicates.
    ctx.queue.enqueue_all(statements);
    let outcome = ctx.flush().await.unwrap();
    assert_eq!(outcome.failed, 0);

    assert_eq!(
        store.query_scalar("select count(*) from archive").await.unwrap(),
        2
    );
}

/// Deleting a row that is not in the cached window is refused.
#[tokio::test]
async fn test_delete_outside_window_is_rejected() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 30).await;
    ctx.window.set_query(Some(QueryState::for_table("alarms")));
    ctx.window.set_viewport(10);
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    assert!(delete_statements(Some("alarms"), &window, 15..=25, 0..=0).is_err());
    assert!(ctx.queue.is_empty());
}

/// Save makes a standalone copy; export writes the cached window.
#[tokio::test]
async fn test_save_and_export() {
    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 3).await;
    let store = ctx.store().unwrap();

    let copy = db.sibling("copy.db");
    store.save(&copy).await.unwrap();
    assert!(store.save(&copy).await.is_err(), "save must not overwrite");

    let other = sqlgrid::context::AppContext::new(common::config());
    let tables = other.open_store(&copy).await.unwrap();
    assert_eq!(tables, vec!["alarms"]);

    ctx.window.set_query(Some(
        QueryState::set_base("select host, severity, cleared from alarms").unwrap(),
    ));
    ctx.window.set_viewport(10);
    ctx.refresh_window(false).await.unwrap();

    let out = db.sibling("out/export.txt");
    let rows = export_to_path(&ctx.window.snapshot(), &out).unwrap();
    assert_eq!(rows, 3);
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        text,
        "host, severity, \nh0, critical, \nh1, major, \nh2, minor, "
    );
}

/// Severity colouring applies to uncleared rows only.
#[tokio::test]
async fn test_severity_rows() {
    use ratatui::buffer::Buffer;
    use ratatui::layout::Rect;
    use ratatui::style::Color;
    use ratatui::widgets::Widget;
    use sqlgrid::ui::{DataGrid, GridState};

    let db = TestDatabase::with_schema(ALARMS_SCHEMA).await;
    let ctx = db.context().await;
    seed_alarms(&ctx, 2).await;
    ctx.store()
        .unwrap()
        .execute("update alarms set cleared = 'yes' where host = 'h1'")
        .await
        .unwrap();
    ctx.window.set_query(Some(QueryState::for_table("alarms")));
    ctx.window.set_viewport(5);
    ctx.refresh_window(false).await.unwrap();

    let window = ctx.window.snapshot();
    let state = GridState {
        cursor_col: 3,
        ..GridState::default()
    };
    let area = Rect::new(0, 0, 60, 6);
    let mut buf = Buffer::empty(area);
    DataGrid {
        window: &window,
        state: &state,
        sort_keys: &[],
        pending: None,
        title: "alarms",
        focused: false,
        show_row_numbers: false,
        severity_colors: true,
    }
    .render(area, &mut buf);

    // Border, two-cell marker, then host column.
    let severity_x = 1 + 2 + window.col_widths[0] + 1;
    assert_eq!(buf[(severity_x, 2)].bg, Color::Red);
    assert_ne!(buf[(severity_x, 3)].bg, Color::LightRed);
}
