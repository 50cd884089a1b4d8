//! DDL statement builders shared by every destination dialect.

use silt_config::shared::DestinationKind;
use tracing::warn;

use crate::typing::columns::Column;
use crate::typing::mapping::kind_to_dwh_type;

/// Schema-change direction for [`AlterTableArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOp {
    Add,
    Drop,
}

/// One schema-change request handed to a destination.
#[derive(Debug, Clone, Copy)]
pub struct AlterTableArgs<'a> {
    pub fqn: &'a str,
    pub op: ColumnOp,
    pub columns: &'a [Column],
    /// Emit `CREATE TABLE IF NOT EXISTS` instead of `ALTER TABLE ADD`.
    pub create_table: bool,
    /// Trailing clause appended to `CREATE TABLE` (e.g. Snowflake stage file
    /// format options on temporary tables).
    pub create_suffix: &'a str,
}

/// Renders `name type` pairs for a column list, skipping columns whose kind
/// has no destination mapping.
pub fn column_definitions(
    columns: &[Column],
    destination: DestinationKind,
    uppercase_escaped_names: bool,
) -> Vec<String> {
    let mut definitions = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(dwh_type) = kind_to_dwh_type(&column.kind, destination) else {
            warn!(
                column = column.name(),
                "column kind has no destination mapping, skipping"
            );
            continue;
        };
        definitions.push(format!(
            "{} {dwh_type}",
            column.escaped_name(destination, uppercase_escaped_names)
        ));
    }
    definitions
}

/// Builds the statements for one alter request: a single `CREATE TABLE` or
/// one `ALTER TABLE` per column.
pub fn build_statements(
    args: &AlterTableArgs<'_>,
    destination: DestinationKind,
    uppercase_escaped_names: bool,
) -> Vec<String> {
    match (args.op, args.create_table) {
        (ColumnOp::Add, true) => {
            let definitions = column_definitions(args.columns, destination, uppercase_escaped_names);
            if definitions.is_empty() {
                return Vec::new();
            }
            let mut statement = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                args.fqn,
                definitions.join(",")
            );
            if !args.create_suffix.is_empty() {
                statement.push(' ');
                statement.push_str(args.create_suffix);
            }
            vec![statement]
        }
        (ColumnOp::Add, false) => {
            column_definitions(args.columns, destination, uppercase_escaped_names)
                .into_iter()
                .map(|definition| format!("ALTER TABLE {} ADD COLUMN {definition}", args.fqn))
                .collect()
        }
        (ColumnOp::Drop, _) => args
            .columns
            .iter()
            .map(|column| {
                format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    args.fqn,
                    column.escaped_name(destination, uppercase_escaped_names)
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::KindDetails;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", KindDetails::Integer),
            Column::new("name", KindDetails::String),
            Column::new("broken", KindDetails::Invalid),
        ]
    }

    #[test]
    fn create_table_skips_unmapped_kinds() {
        let columns = columns();
        let args = AlterTableArgs {
            fqn: "shop.public.orders",
            op: ColumnOp::Add,
            columns: &columns,
            create_table: true,
            create_suffix: "",
        };

        let statements = build_statements(&args, DestinationKind::Snowflake, true);
        assert_eq!(
            statements,
            vec!["CREATE TABLE IF NOT EXISTS shop.public.orders (id int,name string)"]
        );
    }

    #[test]
    fn add_emits_one_statement_per_column() {
        let columns = vec![
            Column::new("id", KindDetails::Integer),
            Column::new("default", KindDetails::Boolean),
        ];
        let args = AlterTableArgs {
            fqn: "shop.public.orders",
            op: ColumnOp::Add,
            columns: &columns,
            create_table: false,
            create_suffix: "",
        };

        let statements = build_statements(&args, DestinationKind::Snowflake, true);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE shop.public.orders ADD COLUMN id int",
                "ALTER TABLE shop.public.orders ADD COLUMN \"DEFAULT\" boolean",
            ]
        );
    }

    #[test]
    fn drop_emits_one_statement_per_column() {
        let columns = vec![Column::new("legacy", KindDetails::String)];
        let args = AlterTableArgs {
            fqn: "shop.public.orders",
            op: ColumnOp::Drop,
            columns: &columns,
            create_table: false,
            create_suffix: "",
        };

        let statements = build_statements(&args, DestinationKind::BigQuery, false);
        assert_eq!(
            statements,
            vec!["ALTER TABLE shop.public.orders DROP COLUMN legacy"]
        );
    }
}
