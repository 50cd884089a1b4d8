//! The minimal SQL execution seam destinations are built on.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ErrorKind, SiltResult};
use crate::silt_error;

/// One row of a query result, keyed by column label.
pub type QueryRow = HashMap<String, String>;

/// Per-statement timeout implementations should apply unless the vendor
/// client has a better default.
pub const DEFAULT_STATEMENT_TIMEOUT: std::time::Duration =
    std::time::Duration::from_secs(15 * 60);

/// Minimal warehouse access contract: statements, queries, and the staged-file
/// bulk-load primitive. Implementations wrap the vendor client and must apply
/// their own per-statement timeout.
pub trait Executor: Clone + Send + Sync + 'static {
    fn exec(&self, statement: &str) -> impl Future<Output = SiltResult<()>> + Send;

    fn query(&self, statement: &str) -> impl Future<Output = SiltResult<Vec<QueryRow>>> + Send;

    /// Loads a staged file into the named table. Snowflake expresses loading
    /// in SQL (`PUT` + `COPY INTO`) and does not use this.
    fn bulk_load(
        &self,
        table: &str,
        staged_file: &Path,
    ) -> impl Future<Output = SiltResult<()>> + Send;
}

#[derive(Debug, Default)]
struct RecordingInner {
    executed: Vec<String>,
    bulk_loads: Vec<(String, PathBuf)>,
    query_results: VecDeque<SiltResult<Vec<QueryRow>>>,
}

/// Test executor recording every statement in order and replaying queued
/// query results.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next `query` call.
    pub fn push_query_result(&self, result: SiltResult<Vec<QueryRow>>) {
        self.inner.lock().unwrap().query_results.push_back(result);
    }

    /// Returns every executed statement in order.
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    /// Returns every bulk load performed, in order.
    pub fn bulk_loads(&self) -> Vec<(String, PathBuf)> {
        self.inner.lock().unwrap().bulk_loads.clone()
    }
}

impl Executor for RecordingExecutor {
    async fn exec(&self, statement: &str) -> SiltResult<()> {
        self.inner
            .lock()
            .unwrap()
            .executed
            .push(statement.to_string());
        Ok(())
    }

    async fn query(&self, statement: &str) -> SiltResult<Vec<QueryRow>> {
        let mut inner = self.inner.lock().unwrap();
        inner.executed.push(statement.to_string());
        inner.query_results.pop_front().unwrap_or_else(|| {
            Err(silt_error!(
                ErrorKind::DestinationQueryFailed,
                "no queued query result",
                statement
            ))
        })
    }

    async fn bulk_load(&self, table: &str, staged_file: &Path) -> SiltResult<()> {
        self.inner
            .lock()
            .unwrap()
            .bulk_loads
            .push((table.to_string(), staged_file.to_path_buf()));
        Ok(())
    }
}
