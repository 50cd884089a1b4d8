//! Consumer drivers: broker loops that feed the ingest path and defer
//! acknowledgement until after a successful flush.

pub mod kafka;
pub mod pubsub;

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use silt_config::shared::{CdcFormat, TopicConfig};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cdc::debezium::DebeziumParser;
use crate::cdc::FormatParser;
use crate::concurrency::shutdown::ShutdownRx;
use crate::engine::Engine;
use crate::error::{ErrorKind, SiltResult};
use crate::queue::{AckToken, Message, Queue};
use crate::silt_error;
use crate::util::jitter::{jitter, DEFAULT_JITTER_MS};

/// Per-topic routing: the topic config plus its wire-format parser.
pub struct TopicHandler {
    pub config: TopicConfig,
    pub parser: Box<dyn FormatParser>,
}

/// Topic name to handler map, built once at startup.
pub struct TopicDispatcher {
    handlers: HashMap<String, TopicHandler>,
}

impl TopicDispatcher {
    pub fn from_topic_configs(topic_configs: &[TopicConfig]) -> Self {
        let mut handlers = HashMap::new();
        for topic_config in topic_configs {
            let parser: Box<dyn FormatParser> = match topic_config.cdc_format {
                CdcFormat::DebeziumPostgres => Box::new(DebeziumParser::postgres()),
                CdcFormat::DebeziumMysql => Box::new(DebeziumParser::mysql()),
            };
            handlers.insert(
                topic_config.topic.clone(),
                TopicHandler {
                    config: topic_config.clone(),
                    parser,
                },
            );
        }
        Self { handlers }
    }

    pub fn handler(&self, topic: &str) -> Option<&TopicHandler> {
        self.handlers.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Parses one message and applies it to the right table buffer.
///
/// Returns whether the buffer crossed a flush threshold. Unparseable messages
/// are permanently bad: the caller acks and skips them with a warning.
pub async fn process_message(
    engine: &Engine,
    dispatcher: &TopicDispatcher,
    message: &Message,
) -> SiltResult<bool> {
    let Some(handler) = dispatcher.handler(&message.topic) else {
        return Err(silt_error!(
            ErrorKind::SourceMessageInvalid,
            "no topic config for message topic",
            message.topic.clone()
        ));
    };

    let event = handler.parser.parse(message)?;

    let table = match &handler.config.table_name {
        Some(table_name) => table_name.clone(),
        None if !event.table.is_empty() => event.table.clone(),
        // Tombstones carry no source block; fall back to the topic's last
        // dotted segment.
        None => message
            .topic
            .rsplit('.')
            .next()
            .unwrap_or(&message.topic)
            .to_string(),
    };

    let settings = engine.settings().clone();
    let key = (
        settings.destination_kind,
        format!(
            "{}.{}.{}",
            handler.config.database, handler.config.schema, table
        ),
    );

    let topic_config = handler.config.clone();
    let mode = settings.mode;
    let should_flush = engine
        .with_table(
            key,
            || crate::buffer::TableData::new(mode, topic_config, table.clone()),
            |table_data| -> SiltResult<bool> {
                event.save(&settings.typing, table_data, Some(message.ack_token()))?;
                Ok(table_data.should_flush(&settings.flush))
            },
        )
        .await?;

    counter!("silt_messages_ingested_total", "topic" => message.topic.clone()).increment(1);

    Ok(should_flush)
}

/// Broker-specific deferred-ack policy.
pub trait AckPolicy: Send + 'static {
    /// Observes a delivered message before ingestion.
    fn record_delivered(&mut self, message: &Message);

    /// Handles one token released by a successful flush, returning the token
    /// to pass to [`Queue::ack`], if any is due.
    fn record_acked(&mut self, token: AckToken) -> Option<AckToken>;
}

/// One consumer task: reads a topic's messages, feeds ingest, forwards
/// released acks back to the broker per the policy.
pub struct ConsumerLoop<Q: Queue, P: AckPolicy> {
    pub queue: Q,
    pub engine: Engine,
    pub dispatcher: Arc<TopicDispatcher>,
    pub topic: String,
    pub ack_rx: mpsc::UnboundedReceiver<AckToken>,
    pub shutdown_rx: ShutdownRx,
    pub policy: P,
}

impl<Q: Queue, P: AckPolicy> ConsumerLoop<Q, P> {
    pub async fn run(mut self) -> SiltResult<()> {
        let mut reading = true;

        // After shutdown the loop refuses new reads but keeps draining acks
        // from the final flush cycle; the channel closes once the orchestrator
        // has drained and called `Engine::close_ackers`.
        loop {
            tokio::select! {
                result = self.shutdown_rx.changed(), if reading => {
                    if result.is_err() || *self.shutdown_rx.borrow() {
                        reading = false;
                    }
                }
                maybe_token = self.ack_rx.recv() => {
                    match maybe_token {
                        Some(token) => self.handle_ack(token).await?,
                        None => break,
                    }
                }
                result = self.queue.recv(), if reading => {
                    match result? {
                        Some(message) => self.handle_message(message).await?,
                        None => reading = false,
                    }
                }
            }
        }

        debug!(topic = %self.topic, "consumer loop finished");
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> SiltResult<()> {
        self.policy.record_delivered(&message);

        match process_message(&self.engine, &self.dispatcher, &message).await {
            Ok(should_flush) => {
                if should_flush {
                    self.engine.signal_flush();
                    // Give the flush task a chance to win the buffer lock
                    // before reading more.
                    tokio::time::sleep(jitter(DEFAULT_JITTER_MS)).await;
                }
            }
            Err(err) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "skipping message"
                );
                counter!("silt_messages_skipped_total", "topic" => message.topic.clone())
                    .increment(1);
                // Unparseable messages are acked immediately; redelivery
                // would not make them parseable.
                self.handle_ack(message.ack_token()).await?;
            }
        }

        Ok(())
    }

    async fn handle_ack(&mut self, token: AckToken) -> SiltResult<()> {
        if let Some(due) = self.policy.record_acked(token) {
            self.queue.ack(due).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_config::shared::DestinationKind;
    use crate::buffer::FlushSettings;
    use crate::engine::EngineSettings;
    use crate::typing::Settings;
    use silt_config::shared::TableMode;

    fn engine(buffer_rows: u64) -> Engine {
        Engine::new(EngineSettings {
            destination_kind: DestinationKind::Test,
            mode: TableMode::Replication,
            typing: Settings::default(),
            flush: FlushSettings {
                buffer_rows,
                flush_size_kb: 10_240,
            },
            flush_interval_seconds: 10,
        })
    }

    fn dispatcher() -> TopicDispatcher {
        TopicDispatcher::from_topic_configs(&[TopicConfig {
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
        }])
    }

    fn upsert_message(offset: i64, id: i64) -> Message {
        let value = serde_json::json!({
            "payload": {
                "after": {"id": id, "name": "dusty"},
                "source": {"table": "orders", "ts_ms": 1_672_531_200_000i64},
                "op": "c",
                "ts_ms": 1_672_531_205_000i64
            }
        });
        Message {
            topic: "shop.public.orders".to_string(),
            partition: 0,
            offset,
            key: Some(format!(r#"{{"id": {id}}}"#).into_bytes()),
            value: value.to_string().into_bytes(),
            ack_id: None,
        }
    }

    #[tokio::test]
    async fn process_message_buffers_the_row() {
        let engine = engine(100);
        let dispatcher = dispatcher();

        let should_flush = process_message(&engine, &dispatcher, &upsert_message(1, 7))
            .await
            .unwrap();
        assert!(!should_flush);

        let keys = engine.dirty_keys().await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].1, "shop.public.orders");
    }

    #[tokio::test]
    async fn should_flush_fires_at_the_row_threshold() {
        let engine = engine(2);
        let dispatcher = dispatcher();

        assert!(!process_message(&engine, &dispatcher, &upsert_message(1, 1))
            .await
            .unwrap());
        assert!(process_message(&engine, &dispatcher, &upsert_message(2, 2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_topic_is_an_error() {
        let engine = engine(100);
        let dispatcher = dispatcher();

        let mut message = upsert_message(1, 1);
        message.topic = "unknown.topic".to_string();
        let err = process_message(&engine, &dispatcher, &message)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceMessageInvalid);
    }
}
