use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::destination::{BigQueryConfig, RedshiftConfig, SnowflakeConfig};
use crate::shared::queue::{KafkaConfig, PubsubConfig, TopicConfig};

/// Smallest accepted flush interval, in seconds.
pub const FLUSH_INTERVAL_SECONDS_MIN: u64 = 5;
/// Largest accepted flush interval, in seconds (6 hours).
pub const FLUSH_INTERVAL_SECONDS_MAX: u64 = 6 * 60 * 60;
/// Smallest accepted row-count flush trigger.
pub const BUFFER_ROWS_MIN: u64 = 5;
/// Largest accepted row-count flush trigger.
pub const BUFFER_ROWS_MAX: u64 = 30_000;

const DEFAULT_FLUSH_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_FLUSH_SIZE_KB: u64 = 25 * 1024;
const DEFAULT_BUFFER_ROWS: u64 = BUFFER_ROWS_MAX;

/// Validation failure for a configuration field.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: String,
    },

    #[error("missing required section `{0}`")]
    MissingSection(&'static str),
}

impl ValidationError {
    fn invalid(field: &'static str, constraint: impl Into<String>) -> Self {
        ValidationError::InvalidFieldValue {
            field,
            constraint: constraint.into(),
        }
    }
}

/// Supported warehouse destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Snowflake,
    BigQuery,
    Redshift,
    S3,
    Test,
}

impl DestinationKind {
    /// Returns the label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DestinationKind::Snowflake => "snowflake",
            DestinationKind::BigQuery => "bigquery",
            DestinationKind::Redshift => "redshift",
            DestinationKind::S3 => "s3",
            DestinationKind::Test => "test",
        }
    }
}

/// Supported message brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Kafka,
    Pubsub,
}

/// Buffering mode for destination tables.
///
/// `Replication` keeps at most one row per primary key within a batch;
/// `History` appends every event and never deduplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    #[default]
    Replication,
    History,
}

/// Top-level service configuration.
///
/// Field names mirror the YAML keys (camelCase). See the crate docs for the
/// environment-variable override scheme.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub output_source: DestinationKind,
    pub queue: QueueKind,

    #[serde(default)]
    pub mode: TableMode,

    // Flush rules.
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
    #[serde(default = "default_flush_size_kb")]
    pub flush_size_kb: u64,
    #[serde(default = "default_buffer_rows")]
    pub buffer_rows: u64,

    /// Extra timestamp layouts consulted by type inference, strftime syntax.
    #[serde(default)]
    pub additional_date_formats: Vec<String>,

    // Supported message brokers.
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub pubsub: Option<PubsubConfig>,

    // Supported destinations.
    #[serde(default)]
    pub snowflake: Option<SnowflakeConfig>,
    #[serde(default)]
    pub bigquery: Option<BigQueryConfig>,
    #[serde(default)]
    pub redshift: Option<RedshiftConfig>,
}

fn default_flush_interval_seconds() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECONDS
}

fn default_flush_size_kb() -> u64 {
    DEFAULT_FLUSH_SIZE_KB
}

fn default_buffer_rows() -> u64 {
    DEFAULT_BUFFER_ROWS
}

impl Config {
    /// Checks flush ranges, the broker section for the selected queue, and the
    /// destination section for the selected output.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flush_size_kb == 0 {
            return Err(ValidationError::invalid(
                "flushSizeKb",
                "must be greater than 0",
            ));
        }

        if self.flush_interval_seconds < FLUSH_INTERVAL_SECONDS_MIN
            || self.flush_interval_seconds > FLUSH_INTERVAL_SECONDS_MAX
        {
            return Err(ValidationError::invalid(
                "flushIntervalSeconds",
                format!(
                    "must be within [{FLUSH_INTERVAL_SECONDS_MIN}, {FLUSH_INTERVAL_SECONDS_MAX}], got {}",
                    self.flush_interval_seconds
                ),
            ));
        }

        if self.buffer_rows < BUFFER_ROWS_MIN || self.buffer_rows > BUFFER_ROWS_MAX {
            return Err(ValidationError::invalid(
                "bufferRows",
                format!(
                    "must be within [{BUFFER_ROWS_MIN}, {BUFFER_ROWS_MAX}], got {}",
                    self.buffer_rows
                ),
            ));
        }

        match self.queue {
            QueueKind::Kafka => {
                let kafka = self
                    .kafka
                    .as_ref()
                    .ok_or(ValidationError::MissingSection("kafka"))?;
                kafka.validate()?;
            }
            QueueKind::Pubsub => {
                let pubsub = self
                    .pubsub
                    .as_ref()
                    .ok_or(ValidationError::MissingSection("pubsub"))?;
                pubsub.validate()?;
            }
        }

        match self.output_source {
            DestinationKind::Snowflake => {
                let snowflake = self
                    .snowflake
                    .as_ref()
                    .ok_or(ValidationError::MissingSection("snowflake"))?;
                snowflake.validate()?;
            }
            DestinationKind::BigQuery => {
                let bigquery = self
                    .bigquery
                    .as_ref()
                    .ok_or(ValidationError::MissingSection("bigquery"))?;
                bigquery.validate()?;
            }
            DestinationKind::Redshift => {
                let redshift = self
                    .redshift
                    .as_ref()
                    .ok_or(ValidationError::MissingSection("redshift"))?;
                redshift.validate()?;
            }
            DestinationKind::S3 | DestinationKind::Test => {}
        }

        Ok(())
    }

    /// Returns the topic configurations of the selected broker.
    pub fn topic_configs(&self) -> &[TopicConfig] {
        match self.queue {
            QueueKind::Kafka => self
                .kafka
                .as_ref()
                .map(|k| k.topic_configs.as_slice())
                .unwrap_or(&[]),
            QueueKind::Pubsub => self
                .pubsub
                .as_ref()
                .map(|p| p.topic_configs.as_slice())
                .unwrap_or(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::queue::CdcFormat;

    fn base_config() -> Config {
        Config {
            output_source: DestinationKind::Test,
            queue: QueueKind::Kafka,
            mode: TableMode::Replication,
            flush_interval_seconds: 10,
            flush_size_kb: 1024,
            buffer_rows: 500,
            additional_date_formats: vec![],
            kafka: Some(KafkaConfig {
                bootstrap_server: "localhost:9092".to_string(),
                group_id: "silt".to_string(),
                username: None,
                password: None,
                topic_configs: vec![TopicConfig {
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
                }],
            }),
            pubsub: None,
            snowflake: None,
            bigquery: None,
            redshift: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn flush_interval_outside_range_is_rejected() {
        let mut cfg = base_config();
        cfg.flush_interval_seconds = 4;
        assert!(cfg.validate().is_err());

        cfg.flush_interval_seconds = FLUSH_INTERVAL_SECONDS_MAX + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn buffer_rows_outside_range_is_rejected() {
        let mut cfg = base_config();
        cfg.buffer_rows = 4;
        assert!(cfg.validate().is_err());

        cfg.buffer_rows = BUFFER_ROWS_MAX + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_flush_size_is_rejected() {
        let mut cfg = base_config();
        cfg.flush_size_kb = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn selected_queue_section_is_required() {
        let mut cfg = base_config();
        cfg.kafka = None;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingSection("kafka")));
    }

    #[test]
    fn selected_destination_section_is_required() {
        let mut cfg = base_config();
        cfg.output_source = DestinationKind::Snowflake;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingSection("snowflake")));
    }
}
