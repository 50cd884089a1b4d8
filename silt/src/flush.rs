//! The flush orchestrator.
//!
//! One task owns the write side of the pipeline: on a timer tick, a size
//! signal from a consumer, or shutdown, it detaches each dirty table buffer
//! and drives the destination through schema evolution, stage load, and merge.
//! Offsets are acked only after the destination confirmed the batch; a failed
//! table is folded back into its live buffer and retried with capped
//! exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::{interval, Instant};
use tracing::{error, info};

use crate::buffer::TableData;
use crate::concurrency::shutdown::{wait_for_shutdown, ShutdownRx};
use crate::concurrency::signal::SignalRx;
use crate::destination::base::Destination;
use crate::destination::ddl::{AlterTableArgs, ColumnOp};
use crate::engine::{Engine, TableKey};
use crate::error::SiltResult;
use crate::typing::columns;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// What triggered a flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Interval,
    Size,
    Shutdown,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Interval => "interval",
            FlushReason::Size => "size",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
struct BackoffState {
    failures: u32,
    next_attempt: Instant,
}

/// Drives flush cycles against one destination.
pub struct Flusher<D> {
    engine: Engine,
    destination: Arc<D>,
    signal_rx: SignalRx,
    shutdown_rx: ShutdownRx,
    backoff: HashMap<TableKey, BackoffState>,
}

impl<D: Destination> Flusher<D> {
    pub fn new(engine: Engine, destination: Arc<D>, shutdown_rx: ShutdownRx) -> Self {
        let signal_rx = engine.flush_signal();
        Self {
            engine,
            destination,
            signal_rx,
            shutdown_rx,
            backoff: HashMap::new(),
        }
    }

    /// Runs until shutdown, then drains once and releases the ack channels.
    pub async fn run(mut self) {
        let period = Duration::from_secs(self.engine.settings().flush_interval_seconds);
        let mut ticker = interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once(FlushReason::Interval).await;
                }
                result = self.signal_rx.changed() => {
                    if result.is_err() {
                        break;
                    }
                    self.flush_once(FlushReason::Size).await;
                }
                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!("shutdown requested, draining buffers once");
                    self.flush_once(FlushReason::Shutdown).await;
                    break;
                }
            }
        }

        self.engine.close_ackers().await;
    }

    /// One flush cycle over every dirty table.
    ///
    /// Cancellation is honored only between tables; a single table's merge
    /// runs to completion or errors.
    pub async fn flush_once(&mut self, reason: FlushReason) {
        let keys = self.engine.dirty_keys().await;

        for key in keys {
            if reason != FlushReason::Shutdown && *self.shutdown_rx.borrow() {
                break;
            }

            let now = Instant::now();
            if self
                .backoff
                .get(&key)
                .is_some_and(|state| state.next_attempt > now)
            {
                continue;
            }

            let Some(mut table_data) = self.engine.detach(&key).await else {
                continue;
            };

            let fqn = key.1.clone();
            let rows = table_data.number_of_rows();
            let started = Instant::now();

            match self.flush_table(&table_data).await {
                Ok(()) => {
                    let tokens = table_data.take_ack_tokens();
                    if let Err(err) = self.engine.ack_tokens(tokens).await {
                        error!(table = %fqn, error = %err, "failed to route acks");
                    }
                    self.backoff.remove(&key);

                    counter!("silt_flush_rows_total", "table" => fqn.clone()).increment(rows);
                    histogram!("silt_flush_duration_seconds", "table" => fqn.clone())
                        .record(started.elapsed().as_secs_f64());
                    info!(
                        table = %fqn,
                        rows,
                        reason = reason.as_str(),
                        "flushed table"
                    );
                }
                Err(err) => {
                    counter!("silt_flush_failures_total", "table" => fqn.clone()).increment(1);
                    let delay = self.bump_backoff(&key);
                    error!(
                        table = %fqn,
                        rows,
                        error = %err,
                        transient = err.is_transient(),
                        retry_in_secs = delay.as_secs(),
                        "flush failed, retaining buffer"
                    );
                    self.engine.restore(key, table_data).await;
                }
            }
        }
    }

    fn bump_backoff(&mut self, key: &TableKey) -> Duration {
        let failures = self
            .backoff
            .get(key)
            .map(|state| state.failures + 1)
            .unwrap_or(1);
        let delay = BACKOFF_BASE
            .saturating_mul(1u32 << (failures - 1).min(6))
            .min(BACKOFF_CAP);
        self.backoff.insert(
            key.clone(),
            BackoffState {
                failures,
                next_attempt: Instant::now() + delay,
            },
        );
        delay
    }

    /// One table's flush: schema evolution, backfill, stage load, merge (or
    /// append in history mode), then deleted-column expiry.
    async fn flush_table(&self, table_data: &TableData) -> SiltResult<()> {
        let destination = &*self.destination;
        let fqn = destination.to_fqn(table_data);

        let table_config = destination.get_table_config(table_data).await?;
        let (to_add, to_drop) = columns::diff(
            table_data.read_only_in_memory_cols(),
            table_config.columns(),
        );

        if table_config.create_table() || !to_add.is_empty() {
            destination
                .alter_table(AlterTableArgs {
                    fqn: &fqn,
                    op: ColumnOp::Add,
                    columns: &to_add,
                    create_table: table_config.create_table(),
                    create_suffix: "",
                })
                .await?;
        }

        for column in table_data.read_only_in_memory_cols().iter() {
            if !column.should_backfill() {
                continue;
            }
            let already_backfilled = table_config
                .columns()
                .get(column.name())
                .is_some_and(|warehouse| warehouse.backfilled());
            if already_backfilled {
                continue;
            }
            destination.backfill_column(&fqn, column).await?;
        }

        let temp_table = table_data.temp_table_name(&fqn);
        destination
            .prepare_temporary_table(table_data, &temp_table)
            .await?;

        match table_data.mode() {
            silt_config::shared::TableMode::History => {
                destination.append(table_data, &temp_table).await?
            }
            silt_config::shared::TableMode::Replication => {
                destination.merge(table_data, &temp_table).await?
            }
        }

        let expired = destination.expire_drop_candidates(&fqn, &to_drop);
        if !expired.is_empty() {
            destination
                .alter_table(AlterTableArgs {
                    fqn: &fqn,
                    op: ColumnOp::Drop,
                    columns: &expired,
                    create_table: false,
                    create_suffix: "",
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_config::shared::{CdcFormat, DestinationKind, TableMode, TopicConfig};
    use crate::buffer::{FlushSettings, Row};
    use crate::concurrency::shutdown::create_shutdown;
    use crate::destination::memory::MemoryDestination;
    use crate::engine::EngineSettings;
    use crate::queue::AckToken;
    use crate::typing::value::Value;
    use crate::typing::Settings;

    fn engine(mode: TableMode) -> Engine {
        Engine::new(EngineSettings {
            destination_kind: DestinationKind::Test,
            mode,
            typing: Settings::default(),
            flush: FlushSettings {
                buffer_rows: 100,
                flush_size_kb: 10_240,
            },
            flush_interval_seconds: 10,
        })
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

    async fn insert_row(engine: &Engine, mode: TableMode, pk: i64, offset: i64) {
        engine
            .with_table(
                key(),
                || TableData::new(mode, topic_config(), "orders"),
                |table| {
                    let mut row = Row::new();
                    row.insert("id".to_string(), Value::Integer(pk));
                    table.insert_row(
                        Some(format!("id={pk}")),
                        row,
                        Some(AckToken {
                            topic: "shop.public.orders".to_string(),
                            partition: 0,
                            offset,
                            ack_id: None,
                        }),
                    );
                },
            )
            .await;
    }

    #[tokio::test]
    async fn successful_flush_empties_buffers_and_routes_acks() {
        let engine = engine(TableMode::Replication);
        let mut ack_rx = engine.register_acker("shop.public.orders").await;
        let destination = Arc::new(MemoryDestination::new());
        let (_shutdown_tx, shutdown_rx) = create_shutdown();

        insert_row(&engine, TableMode::Replication, 1, 10).await;
        insert_row(&engine, TableMode::Replication, 2, 11).await;

        let mut flusher = Flusher::new(engine.clone(), destination.clone(), shutdown_rx);
        flusher.flush_once(FlushReason::Size).await;

        // Offsets acked and the warehouse row count grew by the batch size.
        assert_eq!(destination.merged_row_count(), 2);
        assert!(engine.dirty_keys().await.is_empty());
        assert_eq!(ack_rx.recv().await.unwrap().offset, 10);
        assert_eq!(ack_rx.recv().await.unwrap().offset, 11);

        // The stage table name carries the janitor-visible prefix.
        let temp_tables = destination.prepared_temp_tables();
        assert_eq!(temp_tables.len(), 1);
        assert!(temp_tables[0].starts_with("shop.public.orders__artie_"));
    }

    #[tokio::test]
    async fn failed_flush_restores_the_buffer_and_backs_off() {
        let engine = engine(TableMode::Replication);
        let _ack_rx = engine.register_acker("shop.public.orders").await;
        let destination = Arc::new(MemoryDestination::new());
        destination.fail_next_merges(1);
        let (_shutdown_tx, shutdown_rx) = create_shutdown();

        insert_row(&engine, TableMode::Replication, 1, 10).await;

        let mut flusher = Flusher::new(engine.clone(), destination.clone(), shutdown_rx);
        flusher.flush_once(FlushReason::Size).await;

        // Nothing merged, nothing acked, rows retained.
        assert_eq!(destination.merged_row_count(), 0);
        assert_eq!(engine.dirty_keys().await, vec![key()]);

        // The immediate retry is skipped by backoff.
        flusher.flush_once(FlushReason::Size).await;
        assert_eq!(destination.merged_row_count(), 0);
    }

    #[tokio::test]
    async fn history_mode_appends_instead_of_merging() {
        let engine = engine(TableMode::History);
        let _ack_rx = engine.register_acker("shop.public.orders").await;
        let destination = Arc::new(MemoryDestination::new());
        let (_shutdown_tx, shutdown_rx) = create_shutdown();

        insert_row(&engine, TableMode::History, 1, 10).await;

        let mut flusher = Flusher::new(engine.clone(), destination.clone(), shutdown_rx);
        flusher.flush_once(FlushReason::Interval).await;

        assert!(destination.merged().is_empty());
        assert_eq!(destination.appended().len(), 1);
    }
}
