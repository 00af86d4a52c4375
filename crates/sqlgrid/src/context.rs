//! Shared handles passed to the UI, the flush task and every script
//! connection.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::store::{ChangeTracker, FlushOutcome, Store, WriteQueue};
use crate::window::WindowCache;

#[derive(Clone)]
pub struct AppContext {
    /// `None` while no database is open.
    store: Arc<RwLock<Option<Arc<Store>>>>,
    pub queue: Arc<WriteQueue>,
    pub window: Arc<WindowCache>,
    pub changes: Arc<ChangeTracker>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let changes = Arc::new(ChangeTracker::new());
        let window = Arc::new(WindowCache::new(Arc::clone(&changes), &config.display));
        Self {
            store: Arc::new(RwLock::new(None)),
            queue: Arc::new(WriteQueue::new()),
            window,
            changes,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> Option<Arc<Store>> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_store(&self, store: Option<Arc<Store>>) -> Option<Arc<Store>> {
        let mut slot = self.store.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, store)
    }

    /// Open `path` and make it the current store, returning its tables.
    ///
    /// Pending writes are flushed into the previous store first. If the new
    /// file cannot be opened the previous store stays current.
    pub async fn open_store(&self, path: &Path) -> Result<Vec<String>> {
        let store = Store::open(path, &self.config.store, Arc::clone(&self.changes)).await?;
        let tables = store.tables().await?;

        if let Some(old) = self.store() {
            self.queue.flush(&old).await;
        }
        self.replace_store(Some(Arc::new(store)));
        self.window.set_query(None);

        info!(path = %path.display(), tables = tables.len(), "store is now current");
        Ok(tables)
    }

    /// Flush and release the current store.
    pub async fn close_store(&self) -> Option<FlushOutcome> {
        let store = self.replace_store(None)?;
        self.window.set_query(None);
        match Arc::try_unwrap(store) {
            Ok(store) => Some(store.close(&self.queue).await),
            // Still borrowed by an in-flight task; it closes when that ends.
            Err(shared) => Some(self.queue.flush(&shared).await),
        }
    }

    /// Flush the write queue now instead of waiting for the next tick.
    pub async fn flush(&self) -> Option<FlushOutcome> {
        let store = self.store()?;
        Some(self.queue.flush(&store).await)
    }

    /// Refresh the row window against the current store.
    pub async fn refresh_window(&self, force: bool) -> Result<bool> {
        match self.store() {
            Some(store) => self.window.refresh(&store, force).await,
            None => Ok(false),
        }
    }
}
