//! Snowflake destination.

pub mod cast;
pub mod staging;

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
use silt_config::shared::{DestinationKind, SnowflakeConfig};

use crate::shared;

/// Snowflake implementation of the destination contract, generic over the
/// SQL execution seam.
#[derive(Debug, Clone)]
pub struct SnowflakeDestination<E> {
    executor: E,
    config_map: DwhToTablesConfigMap,
    uppercase_escaped_names: bool,
    additional_date_formats: Vec<String>,
}

impl<E: Executor> SnowflakeDestination<E> {
    pub fn new(
        executor: E,
        config: &SnowflakeConfig,
        additional_date_formats: Vec<String>,
    ) -> Self {
        Self {
            executor,
            config_map: DwhToTablesConfigMap::new(),
            uppercase_escaped_names: config.uppercase_escaped_names,
            additional_date_formats,
        }
    }

    fn merge_columns(&self, table_data: &TableData) -> Vec<Column> {
        table_data
            .read_only_in_memory_cols()
            .iter()
            .filter(|column| {
                kind_to_dwh_type(&column.kind, DestinationKind::Snowflake).is_some()
            })
            .cloned()
            .collect()
    }

    fn escaped(&self, column: &Column) -> String {
        column.escaped_name(DestinationKind::Snowflake, self.uppercase_escaped_names)
    }

    /// Builds the merge statement from the stage table into the target.
    ///
    /// The stage subquery keeps one row per primary key (the buffer already
    /// guarantees this; `QUALIFY` guards against retried loads). With
    /// `softDelete` the delete branch becomes an update of the marker column.
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

        let columns = self.merge_columns(table_data);
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

        let pk_list = escaped_pks.join(",");
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

        let using = format!(
            "(SELECT * FROM {temp_table} QUALIFY ROW_NUMBER() OVER (PARTITION BY {pk_list} ORDER BY {pk_list}) = 1)"
        );

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
                "MERGE INTO {target} c USING {using} AS cc ON {} \
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
            "MERGE INTO {target} c USING {using} AS cc ON {} \
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

impl<E: Executor> Destination for SnowflakeDestination<E> {
    fn label(&self) -> DestinationKind {
        DestinationKind::Snowflake
    }

    fn to_fqn(&self, table_data: &TableData) -> String {
        table_data.fqn()
    }

    async fn get_table_config(&self, table_data: &TableData) -> SiltResult<DwhTableConfig> {
        let fqn = self.to_fqn(table_data);
        shared::get_table_config(
            &self.executor,
            &self.config_map,
            shared::GetTableConfigArgs {
                fqn: &fqn,
                destination: DestinationKind::Snowflake,
                query: format!("DESCRIBE TABLE {fqn}"),
                column_name_label: "name",
                column_type_label: "type",
                column_comment_label: Some("comment"),
                table_missing_markers: &["does not exist"],
                drop_deleted_columns: table_data.topic_config().drop_deleted_columns,
            },
        )
        .await
    }

    async fn alter_table(&self, args: AlterTableArgs<'_>) -> SiltResult<()> {
        let statements = build_statements(
            &args,
            DestinationKind::Snowflake,
            self.uppercase_escaped_names,
        );
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
            DestinationKind::Snowflake,
            self.uppercase_escaped_names,
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
        staging::prepare_temporary_table(
            &self.executor,
            table_data,
            temp_table,
            self.uppercase_escaped_names,
            &self.additional_date_formats,
        )
        .await
    }

    async fn merge(&self, table_data: &TableData, temp_table: &str) -> SiltResult<()> {
        let target = self.to_fqn(table_data);
        let statement = self.build_merge_statement(table_data, &target, temp_table)?;
        self.executor.exec(&statement).await
    }

    async fn append(&self, table_data: &TableData, temp_table: &str) -> SiltResult<()> {
        let target = self.to_fqn(table_data);
        let names: Vec<String> = self
            .merge_columns(table_data)
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

    async fn dedupe(&self, fqn: &str, _primary_keys: &[String]) -> SiltResult<()> {
        self.executor
            .exec(&format!(
                "CREATE OR REPLACE TABLE {fqn} AS SELECT DISTINCT * FROM {fqn}"
            ))
            .await
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

    fn snowflake_config() -> SnowflakeConfig {
        SnowflakeConfig {
            account: "acme".to_string(),
            username: "loader".to_string(),
            password: secrecy::SecretString::from("hunter2"),
            warehouse: "COMPUTE_WH".to_string(),
            region: None,
            host: None,
            uppercase_escaped_names: true,
        }
    }

    fn topic_config(soft_delete: bool) -> TopicConfig {
        TopicConfig {
            database: "db".to_string(),
            schema: "public".to_string(),
            table_name: None,
            topic: "db.public.orders".to_string(),
            cdc_format: CdcFormat::DebeziumPostgres,
            primary_keys: vec!["id".to_string()],
            drop_deleted_columns: false,
            soft_delete,
            include_artie_updated_at: false,
            include_database_updated_at: false,
        }
    }

    fn table_data(soft_delete: bool) -> TableData {
        let mut td = TableData::new(TableMode::Replication, topic_config(soft_delete), "orders");
        td.add_column(Column::new("id", KindDetails::Integer));
        td.add_column(Column::new("name", KindDetails::String));
        td.add_column(Column::new(DELETE_COLUMN_MARKER, KindDetails::Boolean));

        let mut row = Row::new();
        row.insert("id".to_string(), Value::Integer(7));
        row.insert("name".to_string(), Value::String("dusty".to_string()));
        row.insert(DELETE_COLUMN_MARKER.to_string(), Value::Boolean(false));
        td.insert_row(Some("id=7".to_string()), row, None);
        td
    }

    fn destination(executor: RecordingExecutor) -> SnowflakeDestination<RecordingExecutor> {
        SnowflakeDestination::new(executor, &snowflake_config(), Vec::new())
    }

    #[tokio::test]
    async fn hard_delete_merge_has_a_delete_branch() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());
        let td = table_data(false);

        dest.merge(&td, "db.public.orders__artie_suffix_1")
            .await
            .unwrap();

        let executed = executor.executed();
        assert_eq!(executed.len(), 1);
        let merge = &executed[0];

        assert!(merge.starts_with("MERGE INTO db.public.orders c USING"));
        assert!(merge.contains(
            "(SELECT * FROM db.public.orders__artie_suffix_1 QUALIFY ROW_NUMBER() OVER (PARTITION BY id ORDER BY id) = 1)"
        ));
        assert!(merge.contains("ON c.id = cc.id"));
        assert!(merge.contains("WHEN MATCHED AND cc.__artie_delete THEN DELETE"));
        assert!(merge.contains(
            "WHEN MATCHED AND IFNULL(cc.__artie_delete, false) = false THEN UPDATE SET name = cc.name"
        ));
        assert!(merge.contains(
            "WHEN NOT MATCHED AND IFNULL(cc.__artie_delete, false) = false THEN INSERT (id,name) VALUES (cc.id,cc.name)"
        ));
    }

    #[tokio::test]
    async fn soft_delete_merge_updates_instead_of_deleting() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());
        let td = table_data(true);

        dest.merge(&td, "db.public.orders__artie_suffix_1")
            .await
            .unwrap();

        let merge = &executor.executed()[0];
        assert!(!merge.contains("THEN DELETE"));
        assert!(merge.contains(
            "WHEN MATCHED THEN UPDATE SET name = cc.name,__artie_delete = cc.__artie_delete"
        ));
        assert!(merge.contains(
            "WHEN NOT MATCHED THEN INSERT (id,name,__artie_delete) VALUES (cc.id,cc.name,cc.__artie_delete)"
        ));
    }

    #[tokio::test]
    async fn toast_columns_merge_through_coalesce() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());
        let mut td = table_data(false);
        let mut toasted = Column::new("blob", KindDetails::Struct);
        toasted.set_toast(true);
        td.add_column(toasted);

        dest.merge(&td, "db.public.orders__artie_suffix_1")
            .await
            .unwrap();

        let merge = &executor.executed()[0];
        assert!(merge.contains("blob = COALESCE(cc.blob, c.blob)"));
    }

    #[tokio::test]
    async fn merge_without_primary_keys_is_rejected() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());
        let mut tc = topic_config(false);
        tc.primary_keys.clear();
        let td = TableData::new(TableMode::Replication, tc, "orders");

        let err = dest.merge(&td, "temp").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationSchemaMismatch);
    }

    #[tokio::test]
    async fn dedupe_rewrites_the_table_distinct() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());

        dest.dedupe("db.public.orders", &["id".to_string()])
            .await
            .unwrap();
        assert_eq!(
            executor.executed(),
            vec!["CREATE OR REPLACE TABLE db.public.orders AS SELECT DISTINCT * FROM db.public.orders"]
        );
    }

    #[tokio::test]
    async fn alter_table_updates_the_cached_config() {
        let executor = RecordingExecutor::new();
        let dest = destination(executor.clone());
        let td = table_data(false);

        // Seed the cache as a created table with no columns.
        executor.push_query_result(Ok(Vec::new()));
        let config = dest.get_table_config(&td).await.unwrap();
        assert!(config.create_table());

        dest.alter_table(AlterTableArgs {
            fqn: "db.public.orders",
            op: ColumnOp::Add,
            columns: &[Column::new("id", KindDetails::Integer)],
            create_table: true,
            create_suffix: "",
        })
        .await
        .unwrap();

        let config = dest.get_table_config(&td).await.unwrap();
        assert!(!config.create_table());
        assert!(config.columns().contains("id"));
    }
}
