use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::base::ValidationError;

// The secret-bearing structs only derive `Deserialize`; `SecretString` has no
// `Serialize` impl, which keeps credentials out of any serialized output.

/// Snowflake destination settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnowflakeConfig {
    pub account: String,
    pub username: String,
    pub password: SecretString,
    pub warehouse: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    /// Reserved column names are quoted and upper-cased when set.
    #[serde(default = "default_uppercase_escaped_names")]
    pub uppercase_escaped_names: bool,
}

fn default_uppercase_escaped_names() -> bool {
    true
}

impl SnowflakeConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("snowflake.account", &self.account),
            ("snowflake.username", &self.username),
            ("snowflake.warehouse", &self.warehouse),
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

/// BigQuery destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BigQueryConfig {
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub default_dataset: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Optional when `GOOGLE_APPLICATION_CREDENTIALS` is set in the
    /// environment.
    #[serde(default)]
    pub path_to_credentials: Option<String>,
}

impl BigQueryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("bigquery.projectID", &self.project_id),
            ("bigquery.defaultDataset", &self.default_dataset),
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

/// Redshift destination settings. Staged files land under the S3 bucket and
/// optional prefix before `COPY` picks them up.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedshiftConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: SecretString,
    pub bucket: String,
    #[serde(default)]
    pub optional_s3_prefix: Option<String>,
    /// Authorization clause appended to `COPY` statements.
    pub credentials_clause: String,
}

impl RedshiftConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("redshift.host", &self.host),
            ("redshift.database", &self.database),
            ("redshift.username", &self.username),
            ("redshift.bucket", &self.bucket),
            ("redshift.credentialsClause", &self.credentials_clause),
        ] {
            if value.is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field,
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        if self.port == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "redshift.port",
                constraint: "must be a valid port".to_string(),
            });
        }

        Ok(())
    }
}
