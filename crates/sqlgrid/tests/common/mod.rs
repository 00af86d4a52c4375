//! Test utilities for sqlgrid integration tests.
//!
//! Each test gets its own database file in a temporary directory that is
//! removed when the `TestDatabase` is dropped.

#![allow(dead_code)]

use std::path::PathBuf;

use sqlgrid::config::{Config, ServerConfig, StoreConfig};
use sqlgrid::context::AppContext;
use tempfile::TempDir;

pub const ALARMS_SCHEMA: &str =
    "create table alarms (host text, severity text, cleared text, note text)";

pub struct TestDatabase {
    pub path: PathBuf,
    dir: TempDir,
}

impl TestDatabase {
    /// Create a database file holding `schema`.
    pub async fn with_schema(schema: &str) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("test.db");

        let ctx = AppContext::new(config());
        ctx.open_store(&path).await.expect("create database");
        ctx.store()
            .expect("store is open")
            .execute(schema)
            .await
            .expect("apply schema");
        ctx.close_store().await;

        Self { path, dir }
    }

    /// Another path inside the test directory.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A context with this database open.
    pub async fn context(&self) -> AppContext {
        let ctx = AppContext::new(config());
        ctx.open_store(&self.path).await.expect("open database");
        ctx
    }
}

/// Defaults, plus an ephemeral port for the script endpoint.
pub fn config() -> Config {
    Config {
        store: StoreConfig {
            create_if_missing: true,
            ..StoreConfig::default()
        },
        server: ServerConfig {
            port_start: 0,
            port_end: 0,
            ..ServerConfig::default()
        },
        ..Config::default()
    }
}

/// Queue `count` alarm rows and flush them.
pub async fn seed_alarms(ctx: &AppContext, count: usize) {
    let severities = ["critical", "major", "minor", "warning"];
    for i in 0..count {
        ctx.queue.enqueue(format!(
            "insert into alarms (host, severity, cleared) values ('h{}', '{}', '')",
            i,
            severities[i % severities.len()]
        ));
    }
    let outcome = ctx.flush().await.expect("store is open");
    assert_eq!(outcome.succeeded, count);
}
