//! In-memory destination for tests and the `test` output source.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use silt_config::shared::DestinationKind;

use crate::buffer::{Row, TableData};
use crate::destination::base::Destination;
use crate::destination::ddl::AlterTableArgs;
use crate::destination::types::{DwhTableConfig, DwhToTablesConfigMap};
use crate::error::{ErrorKind, SiltResult};
use crate::silt_error;
use crate::typing::columns::Column;

#[derive(Debug, Default)]
struct Inner {
    created_tables: HashSet<String>,
    merged: Vec<(String, Vec<(String, Row)>)>,
    appended: Vec<(String, Vec<(String, Row)>)>,
    prepared_temp_tables: Vec<String>,
    fail_next_merges: u32,
}

/// Destination double that stores every batch in memory.
///
/// Tests inspect the captured batches afterwards; `fail_next_merges` injects
/// transient merge failures to exercise the flush retry path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
    config_map: DwhToTablesConfigMap,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` merge calls fail with a transient error.
    pub fn fail_next_merges(&self, n: u32) {
        self.inner.lock().unwrap().fail_next_merges = n;
    }

    /// Returns every merged batch as `(fqn, rows)`.
    pub fn merged(&self) -> Vec<(String, Vec<(String, Row)>)> {
        self.inner.lock().unwrap().merged.clone()
    }

    /// Returns every appended batch as `(fqn, rows)`.
    pub fn appended(&self) -> Vec<(String, Vec<(String, Row)>)> {
        self.inner.lock().unwrap().appended.clone()
    }

    /// Returns the temp table names prepared, in order.
    pub fn prepared_temp_tables(&self) -> Vec<String> {
        self.inner.lock().unwrap().prepared_temp_tables.clone()
    }

    /// Total number of rows across all merged batches.
    pub fn merged_row_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .merged
            .iter()
            .map(|(_, rows)| rows.len())
            .sum()
    }

    fn snapshot_rows(table_data: &TableData) -> Vec<(String, Row)> {
        table_data
            .rows()
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect()
    }
}

impl Destination for MemoryDestination {
    fn label(&self) -> DestinationKind {
        DestinationKind::Test
    }

    fn to_fqn(&self, table_data: &TableData) -> String {
        table_data.fqn()
    }

    async fn get_table_config(&self, table_data: &TableData) -> SiltResult<DwhTableConfig> {
        let fqn = table_data.fqn();
        if let Some(config) = self.config_map.get(&fqn) {
            return Ok(config);
        }

        let created = self.inner.lock().unwrap().created_tables.contains(&fqn);
        let config = DwhTableConfig::new(
            Default::default(),
            !created,
            table_data.topic_config().drop_deleted_columns,
        );
        self.config_map.insert(fqn, config.clone());
        Ok(config)
    }

    async fn alter_table(&self, args: AlterTableArgs<'_>) -> SiltResult<()> {
        self.inner
            .lock()
            .unwrap()
            .created_tables
            .insert(args.fqn.to_string());
        self.config_map.update(args.fqn, |config| {
            config.add_columns(args.columns);
            config.mark_created();
        });
        Ok(())
    }

    async fn backfill_column(&self, _fqn: &str, _column: &Column) -> SiltResult<()> {
        Ok(())
    }

    async fn prepare_temporary_table(
        &self,
        _table_data: &TableData,
        temp_table: &str,
    ) -> SiltResult<()> {
        self.inner
            .lock()
            .unwrap()
            .prepared_temp_tables
            .push(temp_table.to_string());
        Ok(())
    }

    async fn merge(&self, table_data: &TableData, _temp_table: &str) -> SiltResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_merges > 0 {
            inner.fail_next_merges -= 1;
            return Err(silt_error!(
                ErrorKind::DestinationQueryFailed,
                "injected merge failure",
                table_data.fqn()
            ));
        }

        let rows = Self::snapshot_rows(table_data);
        inner.merged.push((table_data.fqn(), rows));
        Ok(())
    }

    async fn append(&self, table_data: &TableData, _temp_table: &str) -> SiltResult<()> {
        let rows = Self::snapshot_rows(table_data);
        self.inner
            .lock()
            .unwrap()
            .appended
            .push((table_data.fqn(), rows));
        Ok(())
    }

    async fn dedupe(&self, _fqn: &str, _primary_keys: &[String]) -> SiltResult<()> {
        Ok(())
    }

    fn expire_drop_candidates(&self, fqn: &str, candidates: &[Column]) -> Vec<Column> {
        let mut expired = Vec::new();
        self.config_map.update(fqn, |config| {
            expired = config.audit_drop_candidates(candidates, chrono::Utc::now());
        });
        expired
    }
}
