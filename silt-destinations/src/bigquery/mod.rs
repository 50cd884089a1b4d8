//! BigQuery destination.

pub mod cast;

use std::io::Write;

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
use silt_config::shared::{BigQueryConfig, DestinationKind};
use tempfile::NamedTempFile;

use crate::shared;

/// Returns the table-relative part of a fully qualified name
/// (`project.dataset.rest…`).
pub fn table_rel_name(fqn: &str) -> SiltResult<String> {
    let parts: Vec<&str> = fqn.split('.').collect();
    if parts.len() < 3 {
        return Err(silt_error!(
            ErrorKind::InvalidTableName,
            "invalid fully qualified name",
            fqn
        ));
    }

    Ok(parts[2..].join("."))
}

/// BigQuery implementation of the destination contract.
#[derive(Debug, Clone)]
pub struct BigQueryDestination<E> {
    executor: E,
    config_map: DwhToTablesConfigMap,
    project_id: String,
    additional_date_formats: Vec<String>,
}

impl<E: Executor> BigQueryDestination<E> {
    pub fn new(executor: E, config: &BigQueryConfig, additional_date_formats: Vec<String>) -> Self {
        Self {
            executor,
            config_map: DwhToTablesConfigMap::new(),
            project_id: config.project_id.clone(),
            additional_date_formats,
        }
    }

    fn stageable_columns(&self, table_data: &TableData) -> Vec<Column> {
        table_data
            .read_only_in_memory_cols()
            .iter()
            .filter(|column| kind_to_dwh_type(&column.kind, DestinationKind::BigQuery).is_some())
            .cloned()
            .collect()
    }

    fn escaped(&self, column: &Column) -> String {
        column.escaped_name(DestinationKind::BigQuery, false)
    }

    /// Writes the buffered rows as a newline-delimited JSON staged file. The
    /// file is removed when the returned handle drops.
    fn write_staged_file(
        &self,
        table_data: &TableData,
        temp_table: &str,
    ) -> SiltResult<NamedTempFile> {
        let mut staged_file = tempfile::Builder::new()
            .prefix(&format!("{}_", temp_table.replace('.', "_")))
            .suffix(".ndjson")
            .tempfile()?;

        let columns = self.stageable_columns(table_data);
        let file = staged_file.as_file_mut();
        for (_, row) in table_data.rows() {
            let mut object = serde_json::Map::new();
            for column in &columns {
                let value = cast::cast_column_value(
                    row.get(column.name()),
                    column,
                    &self.additional_date_formats,
                )?;
                if !value.is_null() {
                    object.insert(column.name().to_string(), value);
                }
            }
            serde_json::to_writer(&mut *file, &serde_json::Value::Object(object))?;
            file.write_all(b"\n")?;
        }

        file.flush()?;
        Ok(staged_file)
    }

    fn build_merge_statement(
        &self,
        table_data: &TableData,
        target: &str,
        temp_table: &str,
    ) -> SiltResult<String> {
        let topic_config = table_data.topic_config();
        if topic_config.primary_keys.is_empty() {
            return Err(silt_error!(
                ErrorKind::DestinationSchemaMismatch,
                "merge requires primary keys",
                target
            ));
        }

        let columns = self.stageable_columns(table_data);
        let escaped_pks: Vec<String> = topic_config
            .primary_keys
            .iter()
            .map(|pk| {
                columns
                    .iter()
                    .find(|c| c.name().eq_ignore_ascii_case(pk))
                    .map(|c| self.escaped(c))
                    .unwrap_or_else(|| pk.clone())
            })
            .collect();
        let on_clause: Vec<String> = escaped_pks
            .iter()
            .map(|pk| format!("c.{pk} = cc.{pk}"))
            .collect();

        let is_pk = |column: &Column| {
            topic_config
                .primary_keys
                .iter()
                .any(|pk| column.name().eq_ignore_ascii_case(pk))
        };
        let update_expr = |column: &Column| {
            let name = self.escaped(column);
            if column.is_toast() {
                format!("{name} = COALESCE(cc.{name}, c.{name})")
            } else {
                format!("{name} = cc.{name}")
            }
        };

        if topic_config.soft_delete {
            let set_exprs: Vec<String> = columns
                .iter()
                .filter(|column| !is_pk(column))
                .map(update_expr)
                .collect();
            let insert_names: Vec<String> =
                columns.iter().map(|column| self.escaped(column)).collect();
            let insert_values: Vec<String> = insert_names
                .iter()
                .map(|name| format!("cc.{name}"))
                .collect();

            return Ok(format!(
                "MERGE INTO {target} c USING (SELECT * FROM {temp_table}) AS cc ON {} \
                 WHEN MATCHED THEN UPDATE SET {} \
                 WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
                on_clause.join(" AND "),
                set_exprs.join(","),
                insert_names.join(","),
                insert_values.join(",")
            ));
        }

        let set_exprs: Vec<String> = columns
            .iter()
            .filter(|column| !is_pk(column) && column.name() != DELETE_COLUMN_MARKER)
            .map(update_expr)
            .collect();
        let insert_names: Vec<String> = columns
            .iter()
            .filter(|column| column.name() != DELETE_COLUMN_MARKER)
            .map(|column| self.escaped(column))
            .collect();
        let insert_values: Vec<String> = insert_names
            .iter()
            .map(|name| format!("cc.{name}"))
            .collect();

        Ok(format!(
            "MERGE INTO {target} c USING (SELECT * FROM {temp_table}) AS cc ON {} \
             WHEN MATCHED AND cc.{DELETE_COLUMN_MARKER} THEN DELETE \
             WHEN MATCHED AND IFNULL(cc.{DELETE_COLUMN_MARKER}, false) = false THEN UPDATE SET {} \
             WHEN NOT MATCHED AND IFNULL(cc.{DELETE_COLUMN_MARKER}, false) = false THEN INSERT ({}) VALUES ({})",
            on_clause.join(" AND "),
            set_exprs.join(","),
            insert_names.join(","),
            insert_values.join(",")
        ))
    }
}

impl<E: Executor> Destination for BigQueryDestination<E> {
    fn label(&self) -> DestinationKind {
        DestinationKind::BigQuery
    }

    /// `project.dataset.table`; the topic config's database is the dataset.
    fn to_fqn(&self, table_data: &TableData) -> String {
        format!(
            "{}.{}.{}",
            self.project_id,
            table_data.topic_config().database,
            table_data.table_name()
        )
    }

    async fn get_table_config(&self, table_data: &TableData) -> SiltResult<DwhTableConfig> {
        let fqn = self.to_fqn(table_data);
        let dataset = &table_data.topic_config().database;
        let table = table_rel_name(&fqn)?;

        shared::get_table_config(
            &self.executor,
            &self.config_map,
            shared::GetTableConfigArgs {
                fqn: &fqn,
                destination: DestinationKind::BigQuery,
                query: format!(
                    "SELECT column_name, data_type, description FROM `{}.{dataset}.INFORMATION_SCHEMA.COLUMN_FIELD_PATHS` WHERE table_name = '{table}';",
                    self.project_id
                ),
                column_name_label: "column_name",
                column_type_label: "data_type",
                column_comment_label: Some("description"),
                table_missing_markers: &["Not found"],
                drop_deleted_columns: table_data.topic_config().drop_deleted_columns,
            },
        )
        .await
    }

    async fn alter_table(&self, args: AlterTableArgs<'_>) -> SiltResult<()> {
        let statements = build_statements(&args, DestinationKind::BigQuery, false);
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
            DestinationKind::BigQuery,
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
            DestinationKind::BigQuery,
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
        let statement = self.build_merge_statement(table_data, &target, temp_table)?;
        self.executor.exec(&statement).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use silt::buffer::Row;
    use silt::destination::executor::RecordingExecutor;
    use silt::typing::value::Value;
    use silt::typing::KindDetails;
    use silt_config::shared::{CdcFormat, TableMode, TopicConfig};

    #[test]
    fn rel_name_drops_project_and_dataset() {
        assert_eq!(table_rel_name("project.dataset.table").unwrap(), "table");
        assert_eq!(
            table_rel_name("project.dataset.table.table").unwrap(),
            "table.table"
        );

        let err = table_rel_name("project.dataset").unwrap_err();
        assert!(err
            .to_string()
            .contains("invalid fully qualified name: project.dataset"));

        let err = table_rel_name("project").unwrap_err();
        assert!(err
            .to_string()
            .contains("invalid fully qualified name: project"));
    }

    fn bigquery_config() -> BigQueryConfig {
        BigQueryConfig {
            project_id: "proj".to_string(),
            default_dataset: "dataset".to_string(),
            location: None,
            path_to_credentials: None,
        }
    }

    fn topic_config() -> TopicConfig {
        TopicConfig {
            database: "dataset".to_string(),
            schema: "public".to_string(),
            table_name: None,
            topic: "dataset.orders".to_string(),
            cdc_format: CdcFormat::DebeziumPostgres,
            primary_keys: vec!["id".to_string()],
            drop_deleted_columns: false,
            soft_delete: false,
            include_artie_updated_at: false,
            include_database_updated_at: false,
        }
    }

    fn table_data() -> TableData {
        let mut td = TableData::new(TableMode::Replication, topic_config(), "orders");
        td.add_column(Column::new("id", KindDetails::Integer));
        td.add_column(Column::new("name", KindDetails::String));
        td.add_column(Column::new(DELETE_COLUMN_MARKER, KindDetails::Boolean));

        let mut row = Row::new();
        row.insert("id".to_string(), Value::Integer(1));
        row.insert("name".to_string(), Value::String("dusty".to_string()));
        row.insert(DELETE_COLUMN_MARKER.to_string(), Value::Boolean(false));
        td.insert_row(Some("id=1".to_string()), row, None);
        td
    }

    #[tokio::test]
    async fn fqn_uses_the_project_and_dataset() {
        let executor = RecordingExecutor::new();
        let dest = BigQueryDestination::new(executor, &bigquery_config(), Vec::new());
        assert_eq!(dest.to_fqn(&table_data()), "proj.dataset.orders");
    }

    #[tokio::test]
    async fn prepare_creates_then_bulk_loads() {
        let executor = RecordingExecutor::new();
        let dest = BigQueryDestination::new(executor.clone(), &bigquery_config(), Vec::new());
        let td = table_data();

        dest.prepare_temporary_table(&td, "proj.dataset.orders__artie_s_1")
            .await
            .unwrap();

        let executed = executor.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS proj.dataset.orders__artie_s_1 ("));

        let loads = executor.bulk_loads();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].0, "proj.dataset.orders__artie_s_1");
        // The staged file is cleaned up after the load.
        assert!(!loads[0].1.exists());
    }

    #[tokio::test]
    async fn merge_reads_the_stage_directly() {
        let executor = RecordingExecutor::new();
        let dest = BigQueryDestination::new(executor.clone(), &bigquery_config(), Vec::new());
        let td = table_data();

        dest.merge(&td, "proj.dataset.orders__artie_s_1")
            .await
            .unwrap();

        let merge = &executor.executed()[0];
        assert!(merge.starts_with(
            "MERGE INTO proj.dataset.orders c USING (SELECT * FROM proj.dataset.orders__artie_s_1) AS cc ON c.id = cc.id"
        ));
        assert!(merge.contains("WHEN MATCHED AND cc.__artie_delete THEN DELETE"));
    }

    #[tokio::test]
    async fn dedupe_is_not_supported() {
        let executor = RecordingExecutor::new();
        let dest = BigQueryDestination::new(executor, &bigquery_config(), Vec::new());
        let err = dest.dedupe("proj.dataset.orders", &[]).await.unwrap_err();
        assert!(err.to_string().contains("dedupe is not yet implemented"));
    }
}
