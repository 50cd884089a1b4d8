//! Engine wiring: consumers, flush orchestrator, shutdown.

use std::sync::Arc;

use silt::concurrency::shutdown::{create_shutdown, ShutdownTx};
use silt::consumer::kafka::KafkaAckPolicy;
use silt::consumer::pubsub::PubsubAckPolicy;
use silt::consumer::{AckPolicy, ConsumerLoop, TopicDispatcher};
use silt::destination::base::Destination;
use silt::destination::memory::MemoryDestination;
use silt::engine::{Engine, EngineSettings};
use silt::flush::Flusher;
use silt::queue::memory::MemoryQueue;
use silt::queue::Queue;
use silt_config::shared::{Config, DestinationKind, QueueKind};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::error::{SinkError, SinkResult};

/// Runs the full pipeline until the broker source ends or ctrl-c arrives.
///
/// The broker transport and the warehouse executor are external
/// collaborators injected behind their seams; this build links the in-memory
/// queue (used by the `test` output source) and returns a broker setup error
/// for transports that are not linked in.
pub async fn run(config: Config) -> SinkResult<()> {
    config
        .validate()
        .map_err(|err| SinkError::Config(err.to_string()))?;

    match config.output_source {
        DestinationKind::Test => {
            let destination = Arc::new(MemoryDestination::new());
            let queue = build_queue(&config)?;
            run_pipeline(&config, queue, destination).await
        }
        other => Err(SinkError::Destination(format!(
            "no {} executor linked into this build; construct the destination \
             over an Executor and use run_pipeline",
            other.label()
        ))),
    }
}

fn build_queue(config: &Config) -> SinkResult<MemoryQueue> {
    match config.queue {
        QueueKind::Kafka => Err(SinkError::Broker(
            "no kafka transport linked into this build".to_string(),
        )),
        QueueKind::Pubsub => Err(SinkError::Broker(
            "no pubsub transport linked into this build".to_string(),
        )),
    }
}

/// Wires consumers and the flush orchestrator over concrete queue and
/// destination implementations, then runs to completion.
pub async fn run_pipeline<Q, D>(config: &Config, queue: Q, destination: Arc<D>) -> SinkResult<()>
where
    Q: Queue,
    D: Destination,
{
    let engine = Engine::new(EngineSettings::from_config(config));
    let dispatcher = Arc::new(TopicDispatcher::from_topic_configs(config.topic_configs()));
    let (shutdown_tx, shutdown_rx) = create_shutdown();

    let mut consumers = JoinSet::new();
    for topic_config in config.topic_configs() {
        let topic = topic_config.topic.clone();
        let ack_rx = engine.register_acker(topic.clone()).await;

        match config.queue {
            QueueKind::Kafka => {
                consumers.spawn(spawn_consumer(
                    queue.clone(),
                    engine.clone(),
                    dispatcher.clone(),
                    topic,
                    ack_rx,
                    shutdown_rx.clone(),
                    KafkaAckPolicy::new(),
                ));
            }
            QueueKind::Pubsub => {
                consumers.spawn(spawn_consumer(
                    queue.clone(),
                    engine.clone(),
                    dispatcher.clone(),
                    topic,
                    ack_rx,
                    shutdown_rx.clone(),
                    PubsubAckPolicy::new(),
                ));
            }
        }
    }

    let flusher = Flusher::new(engine.clone(), destination, shutdown_rx);
    let flusher_handle = tokio::spawn(flusher.run());

    wait_for_termination(&mut consumers, shutdown_tx).await;

    if let Err(err) = flusher_handle.await {
        error!(error = %err, "flush task panicked");
    }

    info!("pipeline stopped");
    Ok(())
}

async fn spawn_consumer<Q: Queue, P: AckPolicy>(
    queue: Q,
    engine: Engine,
    dispatcher: Arc<TopicDispatcher>,
    topic: String,
    ack_rx: tokio::sync::mpsc::UnboundedReceiver<silt::queue::AckToken>,
    shutdown_rx: silt::concurrency::shutdown::ShutdownRx,
    policy: P,
) {
    let consumer = ConsumerLoop {
        queue,
        engine,
        dispatcher,
        topic: topic.clone(),
        ack_rx,
        shutdown_rx,
        policy,
    };

    if let Err(err) = consumer.run().await {
        error!(topic = %topic, error = %err, "consumer loop failed");
    }
}

/// Blocks until ctrl-c or every consumer finishes, then requests shutdown so
/// the flush orchestrator drains once and exits.
async fn wait_for_termination(consumers: &mut JoinSet<()>, shutdown_tx: ShutdownTx) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("ctrl-c received, shutting down"),
                Err(err) => error!(error = %err, "failed to listen for ctrl-c"),
            }
        }
        _ = drain_consumers(consumers) => {
            info!("all consumers finished");
        }
    }

    let _ = shutdown_tx.send(true);
    drain_consumers(consumers).await;
}

async fn drain_consumers(consumers: &mut JoinSet<()>) {
    while let Some(result) = consumers.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "consumer task panicked");
        }
    }
}
