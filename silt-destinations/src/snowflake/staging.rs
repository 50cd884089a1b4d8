//! Snowflake stage-table loading: local TSV file, `PUT`, `COPY INTO`.

use silt::buffer::TableData;
use silt::destination::ddl::{build_statements, AlterTableArgs, ColumnOp};
use silt::destination::executor::Executor;
use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt_config::shared::DestinationKind;
use tempfile::NamedTempFile;

use crate::snowflake::cast::cast_column_value_staging;

/// Stage options appended to temporary-table DDL. `PURGE = TRUE` drops staged
/// files after a successful `COPY`; the file format matches what
/// [`write_temporary_table_file`] produces.
pub const STAGE_CREATE_SUFFIX: &str = r#"STAGE_COPY_OPTIONS = ( PURGE = TRUE ) STAGE_FILE_FORMAT = ( TYPE = 'csv' FIELD_DELIMITER= '\t' FIELD_OPTIONALLY_ENCLOSED_BY='"' NULL_IF='\\N' EMPTY_FIELD_AS_NULL=FALSE)"#;

/// Prefixes the table segment of a dotted name, e.g. `db.schema.t` with `%`
/// becomes `db.schema.%t` (the table stage reference).
pub fn add_prefix_to_table_name(fqn: &str, prefix: &str) -> String {
    match fqn.rsplit_once('.') {
        Some((qualifier, table)) => format!("{qualifier}.{prefix}{table}"),
        None => format!("{prefix}{fqn}"),
    }
}

/// Columns that participate in staging: everything with a destination type
/// mapping. The same filter drives the create DDL, the file layout, and the
/// `COPY` column list so the three always agree.
fn stageable_columns(table_data: &TableData) -> Vec<silt::typing::columns::Column> {
    table_data
        .read_only_in_memory_cols()
        .iter()
        .filter(|column| {
            silt::typing::mapping::kind_to_dwh_type(&column.kind, DestinationKind::Snowflake)
                .is_some()
        })
        .cloned()
        .collect()
}

/// Writes the buffered rows as a tab-delimited staged file. Column order
/// follows the in-memory schema. The file is removed when the returned handle
/// drops, scoping it to the load attempt.
pub fn write_temporary_table_file(
    table_data: &TableData,
    temp_table: &str,
    additional_date_formats: &[String],
) -> SiltResult<NamedTempFile> {
    let mut staged_file = tempfile::Builder::new()
        .prefix(&format!("{}_", temp_table.replace('.', "_")))
        .suffix(".csv")
        .tempfile()?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(staged_file.as_file_mut());

    let columns = stageable_columns(table_data);
    for (_, row) in table_data.rows() {
        let mut record = Vec::with_capacity(columns.len());
        for column in &columns {
            record.push(cast_column_value_staging(
                row.get(column.name()),
                column,
                additional_date_formats,
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

/// Creates the stage table and loads the buffered rows into it.
///
/// Statement order: `CREATE TABLE IF NOT EXISTS … STAGE_FILE_FORMAT=(…)`,
/// then `PUT file://… @%table AUTO_COMPRESS=TRUE`, then
/// `COPY INTO table (cols) FROM (SELECT $1,… FROM @%table)`.
pub async fn prepare_temporary_table<E: Executor>(
    executor: &E,
    table_data: &TableData,
    temp_table: &str,
    uppercase_escaped_names: bool,
    additional_date_formats: &[String],
) -> SiltResult<()> {
    let columns = stageable_columns(table_data);
    let create_statements = build_statements(
        &AlterTableArgs {
            fqn: temp_table,
            op: ColumnOp::Add,
            columns: &columns,
            create_table: true,
            create_suffix: STAGE_CREATE_SUFFIX,
        },
        DestinationKind::Snowflake,
        uppercase_escaped_names,
    );
    for statement in create_statements {
        executor.exec(&statement).await?;
    }

    let staged_file =
        write_temporary_table_file(table_data, temp_table, additional_date_formats)?;
    let stage_reference = add_prefix_to_table_name(temp_table, "%");

    // The staged file lives until this load attempt ends; dropping the handle
    // removes it.
    load_staged_file(
        executor,
        table_data,
        temp_table,
        &stage_reference,
        staged_file.path(),
        uppercase_escaped_names,
    )
    .await
}

async fn load_staged_file<E: Executor>(
    executor: &E,
    table_data: &TableData,
    temp_table: &str,
    stage_reference: &str,
    staged_file: &std::path::Path,
    uppercase_escaped_names: bool,
) -> SiltResult<()> {
    executor
        .exec(&format!(
            "PUT file://{} @{stage_reference} AUTO_COMPRESS=TRUE",
            staged_file.display()
        ))
        .await?;

    let escaped_names: Vec<String> = stageable_columns(table_data)
        .iter()
        .map(|column| column.escaped_name(DestinationKind::Snowflake, uppercase_escaped_names))
        .collect();
    let positions: Vec<String> = (1..=escaped_names.len())
        .map(|position| format!("${position}"))
        .collect();

    executor
        .exec(&format!(
            "COPY INTO {temp_table} ({}) FROM (SELECT {} FROM @{stage_reference})",
            escaped_names.join(","),
            positions.join(",")
        ))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt::buffer::Row;
    use silt::destination::executor::RecordingExecutor;
    use silt::typing::columns::Column;
    use silt::typing::value::Value;
    use silt::typing::KindDetails;
    use silt_config::shared::{CdcFormat, TableMode, TopicConfig};

    fn topic_config() -> TopicConfig {
        TopicConfig {
            database: "db".to_string(),
            schema: "public".to_string(),
            table_name: None,
            topic: "db.public.users".to_string(),
            cdc_format: CdcFormat::DebeziumPostgres,
            primary_keys: vec!["user_id".to_string()],
            drop_deleted_columns: false,
            soft_delete: false,
            include_artie_updated_at: false,
            include_database_updated_at: false,
        }
    }

    fn table_data(rows: usize) -> TableData {
        let mut td = TableData::new(TableMode::Replication, topic_config(), "users");
        for name in ["user_id", "first_name", "last_name", "dusty"] {
            td.add_column(Column::new(name, KindDetails::String));
        }

        for i in 0..rows {
            let mut row = Row::new();
            row.insert("user_id".to_string(), Value::String(i.to_string()));
            row.insert(
                "first_name".to_string(),
                Value::String(format!("first_name {i}")),
            );
            row.insert(
                "last_name".to_string(),
                Value::String(format!("last_name {i}")),
            );
            row.insert(
                "dusty".to_string(),
                Value::String("the mini aussie".to_string()),
            );
            td.insert_row(Some(i.to_string()), row, None);
        }
        td
    }

    #[test]
    fn prefix_lands_on_the_table_segment() {
        assert_eq!(
            add_prefix_to_table_name("db.public.users", "%"),
            "db.public.%users"
        );
        assert_eq!(add_prefix_to_table_name("users", "%"), "%users");
    }

    #[tokio::test]
    async fn statement_order_is_create_put_copy() {
        let executor = RecordingExecutor::new();
        let td = table_data(10);
        let temp_table = "db.public.users__artie_abcdefghij_1700000000";

        prepare_temporary_table(&executor, &td, temp_table, true, &[])
            .await
            .unwrap();

        let executed = executor.executed();
        assert_eq!(executed.len(), 3);

        let expected_create_prefix = format!(
            "CREATE TABLE IF NOT EXISTS {temp_table} (user_id string,first_name string,last_name string,dusty string) STAGE_COPY_OPTIONS = ( PURGE = TRUE ) STAGE_FILE_FORMAT = ( TYPE = 'csv' FIELD_DELIMITER= '\\t' FIELD_OPTIONALLY_ENCLOSED_BY='\"' NULL_IF='\\\\N' EMPTY_FIELD_AS_NULL=FALSE)"
        );
        assert!(
            executed[0].starts_with(&expected_create_prefix),
            "create: {}",
            executed[0]
        );

        let stage_reference = "db.public.%users__artie_abcdefghij_1700000000".to_string();
        assert!(executed[1].starts_with("PUT file://"), "put: {}", executed[1]);
        assert!(
            executed[1].ends_with(&format!("@{stage_reference} AUTO_COMPRESS=TRUE")),
            "put: {}",
            executed[1]
        );

        assert_eq!(
            executed[2],
            format!(
                "COPY INTO {temp_table} (user_id,first_name,last_name,dusty) FROM (SELECT $1,$2,$3,$4 FROM @{stage_reference})"
            )
        );
    }

    #[test]
    fn staged_file_round_trips_through_a_csv_reader() {
        let td = table_data(100);
        let staged_file =
            write_temporary_table_file(&td, "db.public.users__artie_load_test", &[]).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(staged_file.path())
            .unwrap();

        let mut seen_user_ids = std::collections::HashSet::new();
        for record in reader.records() {
            let record = record.unwrap();
            assert_eq!(record.len(), 4);
            seen_user_ids.insert(record[0].to_string());
            assert_eq!(&record[3], "the mini aussie");
        }
        assert_eq!(seen_user_ids.len() as u64, td.number_of_rows());

        let path = staged_file.path().to_path_buf();
        drop(staged_file);
        assert!(!path.exists());
    }
}
