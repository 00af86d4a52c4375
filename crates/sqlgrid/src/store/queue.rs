use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_rusqlite::rusqlite;
use tracing::{debug, info, warn};

use super::Store;
use crate::context::AppContext;
use crate::util::{format_db_error, one_line};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedStatement {
    /// Arrival order, unique per queue.
    pub seq: u64,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementResult {
    pub statement: QueuedStatement,
    pub error: Option<String>,
}

impl StatementResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl FlushOutcome {
    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }
}

/// FIFO of statements waiting for the next transactional flush.
///
/// The lock is held only to push or to take the whole buffer, never while
/// statements run.
#[derive(Debug, Default)]
pub struct WriteQueue {
    pending: Mutex<VecDeque<QueuedStatement>>,
    next_seq: AtomicU64,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, sql: impl Into<String>) -> u64 {
        let sql = sql.into();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // Taken under the lock so seq order matches queue order.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(seq, sql = %one_line(&sql), "statement queued");
        pending.push_back(QueuedStatement { seq, sql });
        seq
    }

    pub fn enqueue_all<I, S>(&self, statements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for sql in statements {
            self.enqueue(sql);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every pending statement, leaving the queue empty.
    pub fn drain(&self) -> Vec<QueuedStatement> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending).into()
    }

    /// Run everything pending inside one transaction on the writer.
    ///
    /// A failing statement is logged and skipped; the rest of the batch
    /// still runs and commits.
    pub async fn flush(&self, store: &Store) -> FlushOutcome {
        let batch = self.drain();
        if batch.is_empty() {
            return FlushOutcome::default();
        }

        let attempted = batch.len();
        let fallback = batch.clone();
        let results = match store.write(move |conn| run_batch(conn, batch)).await {
            Ok(results) => results,
            Err(e) => {
                // The transaction itself failed; nothing in the batch applied.
                let msg = format_db_error(&e);
                warn!(error = %msg, "flush transaction failed");
                fallback
                    .into_iter()
                    .map(|statement| StatementResult {
                        statement,
                        error: Some(msg.clone()),
                    })
                    .collect()
            }
        };

        let mut outcome = FlushOutcome {
            attempted,
            ..FlushOutcome::default()
        };
        for result in &results {
            let sql = one_line(&result.statement.sql);
            match &result.error {
                None => {
                    outcome.succeeded += 1;
                    info!(seq = result.statement.seq, "+++ {}", sql);
                }
                Some(err) => {
                    outcome.failed += 1;
                    warn!(seq = result.statement.seq, error = %err, "--- {}", sql);
                }
            }
        }
        outcome
    }
}

fn run_batch(
    conn: &mut rusqlite::Connection,
    batch: Vec<QueuedStatement>,
) -> rusqlite::Result<Vec<StatementResult>> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    let results: Vec<StatementResult> = batch
        .into_iter()
        .map(|statement| {
            let error = conn
                .execute_batch(&statement.sql)
                .err()
                .map(|e| format_db_error(&e));
            StatementResult { statement, error }
        })
        .collect();

    // A queued statement may have ended the transaction on its own.
    if !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("COMMIT") {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }
    Ok(results)
}

/// Flush the queue on a fixed cadence for as long as the runtime lives.
///
/// Ticks are sequential, so flushes never overlap.
pub fn spawn_flusher(ctx: AppContext, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if ctx.queue.is_empty() {
                continue;
            }
            match ctx.store() {
                Some(store) => {
                    let outcome = ctx.queue.flush(&store).await;
                    debug!(?outcome, "queue flushed");
                }
                None => {
                    let dropped = ctx.queue.drain();
                    warn!(count = dropped.len(), "no store open, dropped queued statements");
                }
            }
        }
    })
}
