//! Runtime dispatch over the three warehouse destinations.

use std::future::Future;

use silt::buffer::TableData;
use silt::destination::base::Destination;
use silt::destination::ddl::AlterTableArgs;
use silt::destination::executor::Executor;
use silt::destination::types::DwhTableConfig;
use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt::typing::columns::Column;
use silt_config::shared::{Config, DestinationKind};

use crate::bigquery::BigQueryDestination;
use crate::redshift::RedshiftDestination;
use crate::snowflake::SnowflakeDestination;

/// The configured warehouse destination, selected at startup.
///
/// Embedders construct this over their [`Executor`] implementation and hand
/// it to the flush orchestrator.
#[derive(Debug, Clone)]
pub enum WarehouseDestination<E> {
    Snowflake(SnowflakeDestination<E>),
    BigQuery(BigQueryDestination<E>),
    Redshift(RedshiftDestination<E>),
}

impl<E: Executor> WarehouseDestination<E> {
    /// Builds the destination named by `outputSource`.
    pub fn for_config(config: &Config, executor: E) -> SiltResult<Self> {
        let additional_date_formats = config.additional_date_formats.clone();

        match config.output_source {
            DestinationKind::Snowflake => {
                let snowflake = config.snowflake.as_ref().ok_or_else(|| {
                    silt_error!(
                        ErrorKind::ConfigurationInvalid,
                        "snowflake output requires a snowflake config section"
                    )
                })?;
                Ok(WarehouseDestination::Snowflake(SnowflakeDestination::new(
                    executor,
                    snowflake,
                    additional_date_formats,
                )))
            }
            DestinationKind::BigQuery => {
                let bigquery = config.bigquery.as_ref().ok_or_else(|| {
                    silt_error!(
                        ErrorKind::ConfigurationInvalid,
                        "bigquery output requires a bigquery config section"
                    )
                })?;
                Ok(WarehouseDestination::BigQuery(BigQueryDestination::new(
                    executor,
                    bigquery,
                    additional_date_formats,
                )))
            }
            DestinationKind::Redshift => Ok(WarehouseDestination::Redshift(
                RedshiftDestination::new(executor, additional_date_formats),
            )),
            other => Err(silt_error!(
                ErrorKind::ConfigurationInvalid,
                "output source has no warehouse destination",
                other.label()
            )),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            WarehouseDestination::Snowflake($inner) => $body,
            WarehouseDestination::BigQuery($inner) => $body,
            WarehouseDestination::Redshift($inner) => $body,
        }
    };
}

impl<E: Executor> Destination for WarehouseDestination<E> {
    fn label(&self) -> DestinationKind {
        delegate!(self, inner => inner.label())
    }

    fn to_fqn(&self, table_data: &TableData) -> String {
        delegate!(self, inner => inner.to_fqn(table_data))
    }

    fn get_table_config(
        &self,
        table_data: &TableData,
    ) -> impl Future<Output = SiltResult<DwhTableConfig>> + Send {
        async move { delegate!(self, inner => inner.get_table_config(table_data).await) }
    }

    fn alter_table(&self, args: AlterTableArgs<'_>) -> impl Future<Output = SiltResult<()>> + Send {
        async move { delegate!(self, inner => inner.alter_table(args).await) }
    }

    fn backfill_column(
        &self,
        fqn: &str,
        column: &Column,
    ) -> impl Future<Output = SiltResult<()>> + Send {
        async move { delegate!(self, inner => inner.backfill_column(fqn, column).await) }
    }

    fn prepare_temporary_table(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send {
        async move {
            delegate!(self, inner => inner.prepare_temporary_table(table_data, temp_table).await)
        }
    }

    fn merge(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send {
        async move { delegate!(self, inner => inner.merge(table_data, temp_table).await) }
    }

    fn append(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> impl Future<Output = SiltResult<()>> + Send {
        async move { delegate!(self, inner => inner.append(table_data, temp_table).await) }
    }

    fn dedupe(
        &self,
        fqn: &str,
        primary_keys: &[String],
    ) -> impl Future<Output = SiltResult<()>> + Send {
        async move { delegate!(self, inner => inner.dedupe(fqn, primary_keys).await) }
    }

    fn expire_drop_candidates(&self, fqn: &str, candidates: &[Column]) -> Vec<Column> {
        delegate!(self, inner => inner.expire_drop_candidates(fqn, candidates))
    }
}
