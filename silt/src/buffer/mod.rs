//! The in-memory per-table accumulator.

use std::collections::{BTreeMap, HashMap};

use rand::distributions::Alphanumeric;
use rand::Rng;
use silt_config::shared::{TableMode, TopicConfig};

use crate::constants::{TEMP_TABLE_PREFIX, TEMP_TABLE_TTL_SECONDS};
use crate::queue::AckToken;
use crate::typing::columns::{Column, Columns};
use crate::typing::value::Value;

/// One buffered row: column name to value. Missing columns stage as NULL.
pub type Row = HashMap<String, Value>;

/// Flush thresholds, lifted out of the service configuration.
#[derive(Debug, Clone, Copy)]
pub struct FlushSettings {
    pub buffer_rows: u64,
    pub flush_size_kb: u64,
}

/// In-memory buffer for one destination table.
///
/// Consumer tasks insert rows; the flush orchestrator detaches the whole
/// buffer (snapshot-and-swap) and owns it exclusively for the duration of the
/// flush. In `Replication` mode at most one row exists per primary key within
/// a batch, later inserts overwriting earlier ones. `History` mode appends
/// every event under a synthetic key and never deduplicates.
#[derive(Debug)]
pub struct TableData {
    mode: TableMode,
    topic_config: TopicConfig,
    /// Resolved destination table name (topic-config override or the source
    /// table from the first event).
    table_name: String,
    columns: Columns,
    rows: BTreeMap<String, Row>,
    approx_size_bytes: usize,
    temp_table_suffix: String,
    ack_tokens: Vec<AckToken>,
    /// Fallback synthetic-key counter for history rows without broker offsets.
    synthetic_counter: u64,
}

impl TableData {
    pub fn new(mode: TableMode, topic_config: TopicConfig, table_name: impl Into<String>) -> Self {
        Self {
            mode,
            topic_config,
            table_name: table_name.into(),
            columns: Columns::new(),
            rows: BTreeMap::new(),
            approx_size_bytes: 0,
            temp_table_suffix: random_suffix(),
            ack_tokens: Vec::new(),
            synthetic_counter: 0,
        }
    }

    /// Creates an empty buffer with the same identity, used when the flush
    /// orchestrator swaps a dirty buffer out.
    pub fn fresh_like(&self) -> Self {
        Self::new(self.mode, self.topic_config.clone(), self.table_name.clone())
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    pub fn topic_config(&self) -> &TopicConfig {
        &self.topic_config
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fully qualified name in the generic `database.schema.table` shape.
    /// Destinations re-derive their own flavor (e.g. BigQuery's
    /// `project.dataset.table`).
    pub fn fqn(&self) -> String {
        format!(
            "{}.{}.{}",
            self.topic_config.database, self.topic_config.schema, self.table_name
        )
    }

    /// Read-only snapshot of the evolving in-memory schema.
    pub fn read_only_in_memory_cols(&self) -> &Columns {
        &self.columns
    }

    /// Evolves the schema with one column, applying the kind-upgrade rule.
    pub fn add_column(&mut self, column: Column) {
        self.columns.add(column);
    }

    /// Inserts a row under the given primary key.
    ///
    /// `pk` is `None` for tables without primary keys and for `History` mode,
    /// where a synthetic key of the originating broker `(partition, offset)`
    /// is used (falling back to a process-monotonic counter) so nothing
    /// deduplicates.
    pub fn insert_row(&mut self, pk: Option<String>, row: Row, token: Option<AckToken>) {
        let key = match (self.mode, pk) {
            (TableMode::Replication, Some(pk)) => pk,
            _ => self.synthetic_key(token.as_ref()),
        };

        let row_size: usize = row
            .iter()
            .map(|(name, value)| name.len() + value.size_hint())
            .sum();

        if let Some(previous) = self.rows.insert(key, row) {
            let previous_size: usize = previous
                .iter()
                .map(|(name, value)| name.len() + value.size_hint())
                .sum();
            self.approx_size_bytes = self.approx_size_bytes.saturating_sub(previous_size);
        }
        self.approx_size_bytes += row_size;

        if let Some(token) = token {
            self.ack_tokens.push(token);
        }
    }

    fn synthetic_key(&mut self, token: Option<&AckToken>) -> String {
        match token {
            Some(token) => format!("{:05}_{:020}", token.partition, token.offset),
            None => {
                self.synthetic_counter += 1;
                format!("synthetic_{:020}", self.synthetic_counter)
            }
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = (&String, &Row)> {
        self.rows.iter()
    }

    pub fn number_of_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.approx_size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the buffer has crossed its row-count or byte-size threshold.
    pub fn should_flush(&self, settings: &FlushSettings) -> bool {
        self.number_of_rows() >= settings.buffer_rows
            || (self.approx_size_bytes / 1024) as u64 >= settings.flush_size_kb
    }

    pub fn temp_table_suffix(&self) -> &str {
        &self.temp_table_suffix
    }

    /// Stage table name carrying the suffix and an expiry timestamp so a
    /// janitor can drop stragglers.
    pub fn temp_table_name(&self, fqn: &str) -> String {
        let expires = chrono::Utc::now().timestamp() + TEMP_TABLE_TTL_SECONDS;
        format!(
            "{fqn}{TEMP_TABLE_PREFIX}_{}_{expires}",
            self.temp_table_suffix
        )
    }

    /// Hands the retained broker acknowledgements to the caller.
    pub fn take_ack_tokens(&mut self) -> Vec<AckToken> {
        std::mem::take(&mut self.ack_tokens)
    }

    /// Clears rows and sizes after a successful flush and regenerates the
    /// temporary-table suffix. The schema is kept; it keeps evolving across
    /// batches.
    pub fn wipe(&mut self) {
        self.rows.clear();
        self.approx_size_bytes = 0;
        self.ack_tokens.clear();
        self.temp_table_suffix = random_suffix();
    }

    /// Folds a detached buffer back in after a failed flush.
    ///
    /// Rows that arrived while the flush ran are newer than the detached ones,
    /// so on key collision the current buffer wins. Ack tokens from the failed
    /// batch are re-queued ahead of the current ones to preserve commit order.
    pub fn merge_back(&mut self, mut failed: TableData) {
        for (key, row) in std::mem::take(&mut failed.rows) {
            if !self.rows.contains_key(&key) {
                let row_size: usize = row
                    .iter()
                    .map(|(name, value)| name.len() + value.size_hint())
                    .sum();
                self.approx_size_bytes += row_size;
                self.rows.insert(key, row);
            }
        }

        for column in failed.columns.iter() {
            self.columns.add(column.clone());
        }

        let mut tokens = std::mem::take(&mut failed.ack_tokens);
        tokens.append(&mut self.ack_tokens);
        self.ack_tokens = tokens;
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
