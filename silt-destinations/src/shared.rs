//! Destination-agnostic helpers: warehouse schema fetch and column backfill.

use silt_config::shared::DestinationKind;
use silt::destination::executor::Executor;
use silt::destination::types::{DwhTableConfig, DwhToTablesConfigMap};
use silt::error::SiltResult;
use silt::typing::columns::{Column, Columns};
use silt::typing::default::{render_default_value, DefaultValueArgs};
use silt::typing::mapping::dwh_type_to_kind;
use silt::typing::KindDetails;
use tracing::warn;

/// Durable marker stored in a column comment once its default has been
/// written into pre-existing NULL rows.
pub const BACKFILL_COMMENT: &str = r#"{"backfilled": true}"#;

/// How a destination describes its tables.
pub struct GetTableConfigArgs<'a> {
    pub fqn: &'a str,
    pub destination: DestinationKind,
    /// Describe/information-schema query returning one row per column.
    pub query: String,
    pub column_name_label: &'a str,
    pub column_type_label: &'a str,
    /// Label of the comment/description column, when the dialect exposes one.
    pub column_comment_label: Option<&'a str>,
    /// Error-text fragments that mean "table does not exist".
    pub table_missing_markers: &'a [&'a str],
    pub drop_deleted_columns: bool,
}

/// Fetches (and caches) the warehouse-side schema for one table.
///
/// A missing table is not an error: the returned config carries
/// `create_table` and the first flush creates it.
pub async fn get_table_config<E: Executor>(
    executor: &E,
    config_map: &DwhToTablesConfigMap,
    args: GetTableConfigArgs<'_>,
) -> SiltResult<DwhTableConfig> {
    if let Some(cached) = config_map.get(args.fqn) {
        return Ok(cached);
    }

    let rows = match executor.query(&args.query).await {
        Ok(rows) => rows,
        Err(err) => {
            let rendered = err.to_string();
            let table_missing = args
                .table_missing_markers
                .iter()
                .any(|marker| rendered.contains(marker));
            if !table_missing {
                return Err(err);
            }
            Vec::new()
        }
    };

    let mut columns = Columns::new();
    for row in &rows {
        let Some(name) = row.get(args.column_name_label) else {
            continue;
        };
        let Some(raw_type) = row.get(args.column_type_label) else {
            continue;
        };

        let kind = dwh_type_to_kind(raw_type, args.destination);
        if kind == KindDetails::Invalid {
            warn!(
                table = args.fqn,
                column = name.as_str(),
                raw_type = raw_type.as_str(),
                "unrecognized warehouse type, skipping column"
            );
            continue;
        }

        let mut column = Column::new(name.clone(), kind);
        if let Some(comment_label) = args.column_comment_label {
            if let Some(comment) = row.get(comment_label) {
                if comment_is_backfilled(comment) {
                    column.set_backfilled(true);
                }
            }
        }
        columns.add(column);
    }

    let create_table = columns.is_empty();
    let config = DwhTableConfig::new(columns, create_table, args.drop_deleted_columns);
    config_map.insert(args.fqn, config.clone());

    Ok(config)
}

fn comment_is_backfilled(comment: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(comment)
        .ok()
        .and_then(|value| value.get("backfilled").and_then(|b| b.as_bool()))
        .unwrap_or(false)
}

/// Writes a column's default into existing NULL rows and marks the column
/// backfilled through a durable comment.
///
/// A column without a usable default is a no-op. The assignment uses the raw
/// column name; only the `WHERE` reference is escaped, since reserved words
/// are legal on the left side of `SET`.
pub async fn backfill_column<E: Executor>(
    executor: &E,
    config_map: &DwhToTablesConfigMap,
    destination: DestinationKind,
    uppercase_escaped_names: bool,
    fqn: &str,
    column: &Column,
) -> SiltResult<()> {
    if !column.should_backfill() {
        return Ok(());
    }

    let default_value = render_default_value(
        column,
        Some(&DefaultValueArgs {
            escape: true,
            destination,
        }),
    )?;
    let Some(default_value) = default_value else {
        return Ok(());
    };

    let escaped = column.escaped_name(destination, uppercase_escaped_names);
    executor
        .exec(&format!(
            "UPDATE {fqn} SET {} = {default_value} WHERE {escaped} IS NULL;",
            column.name()
        ))
        .await?;

    let comment_statement = match destination {
        DestinationKind::BigQuery => format!(
            "ALTER TABLE {fqn} ALTER COLUMN {escaped} SET OPTIONS (description='{BACKFILL_COMMENT}')"
        ),
        _ => format!(
            "COMMENT ON COLUMN {fqn}.{} IS '{BACKFILL_COMMENT}';",
            column.name()
        ),
    };
    executor.exec(&comment_statement).await?;

    config_map.update(fqn, |config| {
        let mut backfilled = column.clone();
        backfilled.set_backfilled(true);
        config.add_columns(std::slice::from_ref(&backfilled));
    });

    Ok(())
}
