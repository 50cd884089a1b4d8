//! Cached warehouse-side table state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::typing::columns::{Column, Columns};

/// How long a column must be continuously absent from the in-memory schema
/// before it is dropped warehouse-side, in hours.
// TODO: lift into configuration once per-table retention requirements differ.
pub const DELETED_COLUMN_GRACE_HOURS: i64 = 6;

/// The deleted-column grace window as a [`Duration`].
pub fn deleted_column_grace() -> Duration {
    Duration::hours(DELETED_COLUMN_GRACE_HOURS)
}

/// Cached warehouse-side schema for one fully qualified table.
#[derive(Debug, Clone, Default)]
pub struct DwhTableConfig {
    columns: Columns,
    /// Drop candidates and when they were first seen absent.
    columns_to_delete: HashMap<String, DateTime<Utc>>,
    create_table: bool,
    drop_deleted_columns: bool,
}

impl DwhTableConfig {
    pub fn new(columns: Columns, create_table: bool, drop_deleted_columns: bool) -> Self {
        Self {
            columns,
            columns_to_delete: HashMap::new(),
            create_table,
            drop_deleted_columns,
        }
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn create_table(&self) -> bool {
        self.create_table
    }

    pub fn drop_deleted_columns(&self) -> bool {
        self.drop_deleted_columns
    }

    /// Records that the table (and any added columns) now exist.
    pub fn mark_created(&mut self) {
        self.create_table = false;
    }

    pub fn add_columns(&mut self, columns: &[Column]) {
        for column in columns {
            self.columns.add(column.clone());
        }
    }

    pub fn remove_column(&mut self, name: &str) {
        self.columns.remove(name);
        self.columns_to_delete.remove(&name.to_lowercase());
    }

    /// Applies the deleted-column grace bookkeeping.
    ///
    /// Candidates absent from the in-memory schema get a first-absence stamp;
    /// candidates that re-appeared are cleared. Returns the columns whose
    /// absence has outlasted [`deleted_column_grace`], which is always empty
    /// unless `dropDeletedColumns` is set for the table.
    pub fn audit_drop_candidates(&mut self, candidates: &[Column], now: DateTime<Utc>) -> Vec<Column> {
        let candidate_names: Vec<String> = candidates
            .iter()
            .map(|c| c.name().to_lowercase())
            .collect();

        self.columns_to_delete
            .retain(|name, _| candidate_names.contains(name));

        let mut expired = Vec::new();
        for column in candidates {
            let first_absent = self
                .columns_to_delete
                .entry(column.name().to_lowercase())
                .or_insert(now);

            if self.drop_deleted_columns && now - *first_absent >= deleted_column_grace() {
                expired.push(column.clone());
            }
        }

        expired
    }

    /// Number of tracked drop candidates; used by tests and metrics.
    pub fn drop_candidate_count(&self) -> usize {
        self.columns_to_delete.len()
    }
}

/// Process-wide cache of [`DwhTableConfig`] per fully qualified table name.
///
/// Guarded by one mutex; entries are cloned out and written back whole
/// (copy-on-write) so readers never observe a half-updated schema.
#[derive(Debug, Clone, Default)]
pub struct DwhToTablesConfigMap {
    inner: Arc<Mutex<HashMap<String, DwhTableConfig>>>,
}

impl DwhToTablesConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fqn: &str) -> Option<DwhTableConfig> {
        self.inner.lock().unwrap().get(fqn).cloned()
    }

    pub fn insert(&self, fqn: impl Into<String>, config: DwhTableConfig) {
        self.inner.lock().unwrap().insert(fqn.into(), config);
    }

    /// Removes the cached entry, forcing a re-fetch on next use.
    pub fn clear_table_config(&self, fqn: &str) {
        self.inner.lock().unwrap().remove(fqn);
    }

    /// Applies `mutate` to the entry under the lock, creating a default entry
    /// if none exists.
    pub fn update<F>(&self, fqn: &str, mutate: F)
    where
        F: FnOnce(&mut DwhTableConfig),
    {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entry(fqn.to_string()).or_default();
        mutate(entry);
    }
}
