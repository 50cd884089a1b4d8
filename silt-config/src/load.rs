use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "SILT";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading the configuration file and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration file does not exist or is not a regular file.
    #[error("configuration file `{0}` does not exist")]
    MissingConfigurationFile(PathBuf),

    /// Failed to initialize the configuration builder.
    #[error("failed to initialize configuration builder")]
    Builder(#[source] config::ConfigError),

    /// The configuration file was parsed but deserialization failed.
    #[error("failed to deserialize configuration")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads configuration from a file plus `SILT_`-prefixed environment overrides.
///
/// Nested keys use double underscores in the environment, e.g.
/// `SILT_KAFKA__BOOTSTRAPSERVER` overrides `kafka.bootstrapServer`.
///
/// The returned value is *not* validated; callers run
/// [`shared::Config::validate`](crate::shared::Config::validate) themselves so
/// that validation failures can be reported with the right exit code.
pub fn load_config<T>(path: &Path) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    if !path.is_file() {
        return Err(LoadConfigError::MissingConfigurationFile(
            path.to_path_buf(),
        ));
    }

    let file_source = config::File::from(path);
    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_SEPARATOR);

    let settings = config::Config::builder()
        .add_source(file_source)
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Config, DestinationKind, QueueKind};
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL_YAML: &str = r#"
outputSource: snowflake
queue: kafka
flushIntervalSeconds: 10
flushSizeKb: 1024
bufferRows: 500
snowflake:
  account: acme
  username: loader
  password: hunter2
  warehouse: COMPUTE_WH
kafka:
  bootstrapServer: localhost:9092
  groupID: silt
  topicConfigs:
    - database: shop
      schema: public
      topic: shop.public.orders
      cdcFormat: debezium.postgres
      primaryKeys: [id]
"#;

    #[test]
    fn load_minimal_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("silt.yaml");
        fs::write(&path, MINIMAL_YAML).unwrap();

        let cfg: Config = load_config(&path).unwrap();
        assert_eq!(cfg.output_source, DestinationKind::Snowflake);
        assert_eq!(cfg.queue, QueueKind::Kafka);
        assert_eq!(cfg.flush_interval_seconds, 10);
        assert_eq!(cfg.buffer_rows, 500);
        let kafka = cfg.kafka.as_ref().unwrap();
        assert_eq!(kafka.topic_configs.len(), 1);
        assert_eq!(kafka.topic_configs[0].primary_keys, vec!["id"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config::<Config>(Path::new("/nonexistent/silt.yaml")).unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingConfigurationFile(_)));
    }
}
