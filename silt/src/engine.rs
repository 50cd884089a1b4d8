//! Process-wide mutable state, held behind one explicit value.
//!
//! The [`Engine`] owns the `(destination, fqn) → TableData` registry and the
//! ack-token routing back to consumer drivers. Consumers mutate buffers under
//! the registry lock; the flush orchestrator detaches a buffer wholesale
//! (snapshot-and-swap) and owns it exclusively while flushing.

use std::collections::HashMap;
use std::sync::Arc;

use silt_config::shared::{Config, DestinationKind, TableMode};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::buffer::{FlushSettings, TableData};
use crate::concurrency::signal::{create_signal, SignalRx, SignalTx};
use crate::error::SiltResult;
use crate::queue::AckToken;
use crate::typing::Settings;

/// Registry key: destination plus generic fully qualified table name.
pub type TableKey = (DestinationKind, String);

/// Settings the ingest path needs on every message.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub destination_kind: DestinationKind,
    pub mode: TableMode,
    pub typing: Settings,
    pub flush: FlushSettings,
    pub flush_interval_seconds: u64,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            destination_kind: config.output_source,
            mode: config.mode,
            typing: Settings {
                additional_date_formats: config.additional_date_formats.clone(),
            },
            flush: FlushSettings {
                buffer_rows: config.buffer_rows,
                flush_size_kb: config.flush_size_kb,
            },
            flush_interval_seconds: config.flush_interval_seconds,
        }
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<TableKey, TableData>,
}

/// The pipeline's shared state. Cheap to clone; all clones share storage.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Mutex<Inner>>,
    ack_txs: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<AckToken>>>>,
    settings: Arc<EngineSettings>,
    flush_tx: SignalTx,
    flush_rx: SignalRx,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let (flush_tx, flush_rx) = create_signal();
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ack_txs: Arc::new(Mutex::new(HashMap::new())),
            settings: Arc::new(settings),
            flush_tx,
            flush_rx,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Receiver the flush orchestrator selects on for size-based nudges.
    pub fn flush_signal(&self) -> SignalRx {
        self.flush_rx.clone()
    }

    /// Nudges the flush orchestrator; repeated nudges coalesce.
    pub fn signal_flush(&self) {
        // Send only fails with no receivers, which means we are shutting down.
        let _ = self.flush_tx.send(());
    }

    /// Runs `mutate` against the table buffer for `key`, creating it through
    /// `init` on first use. The registry lock is held for the duration.
    pub async fn with_table<F, R>(&self, key: TableKey, init: impl FnOnce() -> TableData, mutate: F) -> R
    where
        F: FnOnce(&mut TableData) -> R,
    {
        let mut inner = self.inner.lock().await;
        let table = inner.tables.entry(key).or_insert_with(init);
        mutate(table)
    }

    /// Keys whose buffers currently hold rows.
    pub async fn dirty_keys(&self) -> Vec<TableKey> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Detaches the buffer for `key`, leaving a fresh empty one in its place.
    /// Returns `None` when the buffer is missing or empty.
    pub async fn detach(&self, key: &TableKey) -> Option<TableData> {
        let mut inner = self.inner.lock().await;
        let table = inner.tables.get_mut(key)?;
        if table.is_empty() {
            return None;
        }

        let fresh = table.fresh_like();
        Some(std::mem::replace(table, fresh))
    }

    /// Folds a detached buffer back in after a failed flush.
    pub async fn restore(&self, key: TableKey, failed: TableData) {
        let mut inner = self.inner.lock().await;
        match inner.tables.get_mut(&key) {
            Some(table) => table.merge_back(failed),
            None => {
                inner.tables.insert(key, failed);
            }
        }
    }

    /// Registers the ack channel for a topic. Consumer drivers call this once
    /// before consuming.
    pub async fn register_acker(&self, topic: impl Into<String>) -> mpsc::UnboundedReceiver<AckToken> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ack_txs.lock().await.insert(topic.into(), tx);
        rx
    }

    /// Routes flushed ack tokens back to their topic's consumer driver.
    ///
    /// A missing or closed driver is not fatal: the tokens stay unacked and
    /// the broker redelivers, which at-least-once delivery tolerates.
    pub async fn ack_tokens(&self, tokens: Vec<AckToken>) -> SiltResult<()> {
        let ack_txs = self.ack_txs.lock().await;
        for token in tokens {
            let Some(tx) = ack_txs.get(&token.topic) else {
                warn!(topic = %token.topic, "no consumer registered for acked topic");
                continue;
            };
            if tx.send(token).is_err() {
                warn!("consumer driver is gone, ack token dropped");
            }
        }
        Ok(())
    }

    /// Drops every registered ack channel, letting consumer drivers finish
    /// their drain loops. Called by the flush orchestrator after its final
    /// drain on shutdown.
    pub async fn close_ackers(&self) {
        self.ack_txs.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_config::shared::{CdcFormat, TopicConfig};
    use crate::typing::value::Value;

    fn settings() -> EngineSettings {
        EngineSettings {
            destination_kind: DestinationKind::Test,
            mode: TableMode::Replication,
            typing: Settings::default(),
            flush: FlushSettings {
                buffer_rows: 100,
                flush_size_kb: 1024,
            },
            flush_interval_seconds: 10,
        }
    }

    fn topic_config() -> TopicConfig {
        TopicConfig {
            database: "shop".to_string(),
            schema: "public".to_string(),
            table_name: None,
            topic: "shop.public.orders".to_string(),
            cdc_format: CdcFormat::DebeziumPostgres,
            primary_keys: vec!["id".to_string()],
            drop_deleted_columns: false,
            soft_delete: false,
            include_artie_updated_at: false,
            include_database_updated_at: false,
        }
    }

    fn key() -> TableKey {
        (DestinationKind::Test, "shop.public.orders".to_string())
    }

    fn init() -> TableData {
        TableData::new(TableMode::Replication, topic_config(), "orders")
    }

    async fn insert_row(engine: &Engine, pk: &str) {
        engine
            .with_table(key(), init, |table| {
                let mut row = crate::buffer::Row::new();
                row.insert("id".to_string(), Value::String(pk.to_string()));
                table.insert_row(Some(pk.to_string()), row, None);
            })
            .await;
    }

    #[tokio::test]
    async fn detach_swaps_in_a_fresh_buffer() {
        let engine = Engine::new(settings());
        insert_row(&engine, "1").await;

        assert_eq!(engine.dirty_keys().await, vec![key()]);

        let detached = engine.detach(&key()).await.unwrap();
        assert_eq!(detached.number_of_rows(), 1);

        // The replacement is empty, so nothing further to detach.
        assert!(engine.detach(&key()).await.is_none());
        assert!(engine.dirty_keys().await.is_empty());
    }

    #[tokio::test]
    async fn rows_arriving_during_flush_survive_a_restore() {
        let engine = Engine::new(settings());
        insert_row(&engine, "1").await;

        let detached = engine.detach(&key()).await.unwrap();
        // A new row lands while the flush is in flight.
        insert_row(&engine, "2").await;

        engine.restore(key(), detached).await;
        let rows = engine
            .with_table(key(), init, |table| table.number_of_rows())
            .await;
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn ack_tokens_route_by_topic() {
        let engine = Engine::new(settings());
        let mut rx = engine.register_acker("shop.public.orders").await;

        let token = AckToken {
            topic: "shop.public.orders".to_string(),
            partition: 0,
            offset: 5,
            ack_id: None,
        };
        engine.ack_tokens(vec![token.clone()]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), token);

        // Unknown topics are logged and skipped, not an error.
        let stray = AckToken {
            topic: "unknown".to_string(),
            partition: 0,
            offset: 1,
            ack_id: None,
        };
        engine.ack_tokens(vec![stray]).await.unwrap();
    }
}
