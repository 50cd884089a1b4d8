use serde::{Deserialize, Serialize};

use crate::shared::base::ValidationError;

/// CDC envelope formats the parser registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CdcFormat {
    #[serde(rename = "debezium.postgres")]
    DebeziumPostgres,
    #[serde(rename = "debezium.mysql")]
    DebeziumMysql,
}

/// Per-topic routing and merge behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
    pub database: String,
    pub schema: String,
    /// Destination table override; when absent the source table name from the
    /// event is used.
    #[serde(default)]
    pub table_name: Option<String>,
    pub topic: String,
    pub cdc_format: CdcFormat,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub drop_deleted_columns: bool,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub include_artie_updated_at: bool,
    #[serde(default)]
    pub include_database_updated_at: bool,
}

impl TopicConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("topicConfigs.database", &self.database),
            ("topicConfigs.schema", &self.schema),
            ("topicConfigs.topic", &self.topic),
        ] {
            if value.is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field,
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Kafka broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    /// Comma-separated `host:port` pairs.
    pub bootstrap_server: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub topic_configs: Vec<TopicConfig>,
}

impl KafkaConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bootstrap_server.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "kafka.bootstrapServer",
                constraint: "must not be empty".to_string(),
            });
        }

        if self.group_id.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "kafka.groupID",
                constraint: "must not be empty".to_string(),
            });
        }

        validate_topic_configs("kafka.topicConfigs", &self.topic_configs)
    }
}

/// Google Pub/Sub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubConfig {
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub path_to_credentials: String,
    pub topic_configs: Vec<TopicConfig>,
}

impl PubsubConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "pubsub.projectID",
                constraint: "must not be empty".to_string(),
            });
        }

        if self.path_to_credentials.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "pubsub.pathToCredentials",
                constraint: "must not be empty".to_string(),
            });
        }

        validate_topic_configs("pubsub.topicConfigs", &self.topic_configs)
    }
}

fn validate_topic_configs(
    field: &'static str,
    topic_configs: &[TopicConfig],
) -> Result<(), ValidationError> {
    if topic_configs.is_empty() {
        return Err(ValidationError::InvalidFieldValue {
            field,
            constraint: "at least one topic config is required".to_string(),
        });
    }

    for topic_config in topic_configs {
        topic_config.validate()?;
    }

    Ok(())
}
