//! Redshift destination.
//!
//! Redshift has no `MERGE`; the upsert is a DELETE-then-INSERT over the stage
//! table inside one transaction. With `softDelete` the DELETE becomes an
//! UPDATE of the delete marker. Staged files land in S3 (via the executor's
//! bulk-load) and `COPY` picks them up with the configured credentials clause.

pub mod cast;

use silt::buffer::TableData;
use silt::constants::DELETE_COLUMN_MARKER;
use silt::destination::base::Destination;
use silt::destination::ddl::{build_statements, AlterTableArgs, ColumnOp};
use silt::destination::executor::Executor;
use silt::destination::types::{DwhTableConfig, DwhToTablesConfigMap};
use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt::typing::columns::Column;
use silt::typing::mapping::kind_to_dwh_type;
use silt_config::shared::DestinationKind;
use tempfile::NamedTempFile;

use crate::shared;

/// Redshift implementation of the destination contract.
#[derive(Debug, Clone)]
pub struct RedshiftDestination<E> {
    executor: E,
    config_map: DwhToTablesConfigMap,
    additional_date_formats: Vec<String>,
}

impl<E: Executor> RedshiftDestination<E> {
    pub fn new(executor: E, additional_date_formats: Vec<String>) -> Self {
        Self {
            executor,
            config_map: DwhToTablesConfigMap::new(),
            additional_date_formats,
        }
    }

    fn stageable_columns(&self, table_data: &TableData) -> Vec<Column> {
        table_data
            .read_only_in_memory_cols()
            .iter()
            .filter(|column| kind_to_dwh_type(&column.kind, DestinationKind::Redshift).is_some())
            .cloned()
            .collect()
    }

    fn escaped(&self, column: &Column) -> String {
        column.escaped_name(DestinationKind::Redshift, false)
    }

    fn write_staged_file(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> SiltResult<NamedTempFile> {
        let mut staged_file = tempfile::Builder::new()
            .prefix(&format!("{}_", temp_table.replace('.', "_")))
            .suffix(".csv")
            .tempfile()?;

        let mut writer = csv::Writer::from_writer(staged_file.as_file_mut());
        let columns = self.stageable_columns(table_data);
        for (_, row) in table_data.rows() {
            let mut record = Vec::with_capacity(columns.len());
            for column in &columns {
                record.push(cast::cast_column_value_staging(
                    row.get(column.name()),
                    column,
                    &self.additional_date_formats,
                )?);
            }
            writer.write_record(&record).map_err(|err| {
                silt_error!(ErrorKind::IoFailed, "failed to write staged file record")
                    .with_source(err)
            })?;
        }

        writer.flush().map_err(|err| {
            silt_error!(ErrorKind::IoFailed, "failed to flush staged file").with_source(err)
        })?;
        drop(writer);

        Ok(staged_file)
    }

    /// The statements of the transactional merge.
    ///
    /// Hard delete is a DELETE-then-INSERT over the stage. With `softDelete`
    /// the DELETE is replaced by an UPDATE that sets the delete marker on
    /// matched rows; existing rows are never reinserted, so TOAST columns
    /// staged as NULL keep their destination values.
    fn build_merge_statements(
        &self,
        table_data: &TableData,
        target: &str,
        temp_table: &str,
    ) -> SiltResult<Vec<String>> {
        let topic_config = table_data.topic_config();
        if topic_config.primary_keys.is_empty() {
            return Err(silt_error!(
                ErrorKind::DestinationSchemaMismatch,
                "merge requires primary keys",
                target
            ));
        }

        let columns = self.stageable_columns(table_data);
        let pk_conditions: Vec<String> = topic_config
            .primary_keys
            .iter()
            .map(|pk| {
                let escaped = columns
                    .iter()
                    .find(|c| c.name().eq_ignore_ascii_case(pk))
                    .map(|c| self.escaped(c))
                    .unwrap_or_else(|| pk.clone());
                format!("{target}.{escaped} = {temp_table}.{escaped}")
            })
            .collect();

        let insert_names: Vec<String> = columns
            .iter()
            .filter(|column| column.name() != DELETE_COLUMN_MARKER)
            .map(|column| self.escaped(column))
            .collect();
        let insert = format!(
            "INSERT INTO {target} ({}) SELECT {} FROM {temp_table} WHERE {DELETE_COLUMN_MARKER} = false;",
            insert_names.join(","),
            insert_names.join(",")
        );

        if topic_config.soft_delete {
            let update = format!(
                "UPDATE {target} SET {DELETE_COLUMN_MARKER} = true FROM {temp_table} WHERE {} AND {temp_table}.{DELETE_COLUMN_MARKER} = true;",
                pk_conditions.join(" AND ")
            );
            return Ok(vec![update, insert]);
        }

        let delete = format!(
            "DELETE FROM {target} USING {temp_table} WHERE {};",
            pk_conditions.join(" AND ")
        );

        Ok(vec![delete, insert])
    }
}

impl<E: Executor> Destination for RedshiftDestination<E> {
    fn label(&self) -> DestinationKind {
        DestinationKind::Redshift
    }

    fn to_fqn(&self, table_data: &TableData) -> String {
        table_data.fqn()
    }

    async fn get_table_config(&self, table_data: &TableData) -> SiltResult<DwhTableConfig> {
        let fqn = self.to_fqn(table_data);
        let topic_config = table_data.topic_config();

        shared::get_table_config(
            &self.executor,
            &self.config_map,
            shared::GetTableConfigArgs {
                fqn: &fqn,
                destination: DestinationKind::Redshift,
                query: format!(
                    "SELECT column_name, data_type, coalesce(description, '') AS description \
                     FROM information_schema.columns \
                     LEFT JOIN pg_catalog.pg_description \
                       ON pg_description.objoid = (table_schema || '.' || table_name)::regclass::oid \
                      AND pg_description.objsubid = ordinal_position \
                     WHERE table_schema = '{}' AND table_name = '{}';",
                    topic_config.schema,
                    table_data.table_name()
                ),
                column_name_label: "column_name",
                column_type_label: "data_type",
                column_comment_label: Some("description"),
                table_missing_markers: &["does not exist"],
                drop_deleted_columns: topic_config.drop_deleted_columns,
            },
        )
        .await
    }

    async fn alter_table(&self, args: AlterTableArgs<'_>) -> SiltResult<()> {
        let statements = build_statements(&args, DestinationKind::Redshift, false);
        for statement in statements {
            self.executor.exec(&statement).await?;
        }

        self.config_map.update(args.fqn, |config| match args.op {
            ColumnOp::Add => {
                config.add_columns(args.columns);
                config.mark_created();
            }
            ColumnOp::Drop => {
                for column in args.columns {
                    config.remove_column(column.name());
                }
            }
        });

        Ok(())
    }

    async fn backfill_column(&self, fqn: &str, column: &Column) -> SiltResult<()> {
        shared::backfill_column(
            &self.executor,
            &self.config_map,
            DestinationKind::Redshift,
            false,
            fqn,
            column,
        )
        .await
    }

    async fn prepare_temporary_table(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> SiltResult<()> {
        let columns = self.stageable_columns(table_data);
        let statements = build_statements(
            &AlterTableArgs {
                fqn: temp_table,
                op: ColumnOp::Add,
                columns: &columns,
                create_table: true,
                create_suffix: "",
            },
            DestinationKind::Redshift,
            false,
        );
        for statement in statements {
            self.executor.exec(&statement).await?;
        }

        let staged_file = self.write_staged_file(table_data, temp_table)?;
        self.executor.bulk_load(temp_table, staged_file.path()).await
    }

    async fn merge(&self, table_data: &TableData, temp_table: &str) -> SiltResult<()> {
        let target = self.to_fqn(table_data);
        let statements = self.build_merge_statements(table_data, &target, temp_table)?;

        self.executor.exec("BEGIN;").await?;
        for statement in &statements {
            if let Err(err) = self.executor.exec(statement).await {
                // Best effort; the session dropping also rolls back.
                let _ = self.executor.exec("ROLLBACK;").await;
                return Err(err);
            }
        }
        self.executor.exec("COMMIT;").await
    }

    async fn append(&self, table_data: &TableData, temp_table: &str) -> SiltResult<()> {
        let target = self.to_fqn(table_data);
        let names: Vec<String> = self
            .stageable_columns(table_data)
            .iter()
            .map(|column| self.escaped(column))
            .collect();
        self.executor
            .exec(&format!(
                "INSERT INTO {target} ({}) SELECT {} FROM {temp_table}",
                names.join(","),
                names.join(",")
            ))
            .await
    }

    async fn dedupe(&self, _fqn: &str, _primary_keys: &[String]) -> SiltResult<()> {
        Err(silt_error!(
            ErrorKind::Unknown,
            "dedupe is not yet implemented"
        ))
    }

    fn expire_drop_candidates(&self, fqn: &str, candidates: &[Column]) -> Vec<Column> {
        let mut expired = Vec::new();
        self.config_map.update(fqn, |config| {
            expired = config.audit_drop_candidates(candidates, chrono::Utc::now());
        });
        expired
    }
}
