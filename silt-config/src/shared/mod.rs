//! Shared configuration types for silt pipelines.

mod base;
mod destination;
mod queue;

pub use base::{
    Config, DestinationKind, QueueKind, TableMode, ValidationError, BUFFER_ROWS_MAX,
    BUFFER_ROWS_MIN, FLUSH_INTERVAL_SECONDS_MAX, FLUSH_INTERVAL_SECONDS_MIN,
};
pub use destination::{BigQueryConfig, RedshiftConfig, SnowflakeConfig};
pub use queue::{CdcFormat, KafkaConfig, PubsubConfig, TopicConfig};
