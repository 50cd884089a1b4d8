//! Default-value rendering for DDL and backfill statements.

use silt_config::shared::DestinationKind;

use crate::error::{ErrorKind, SiltResult};
use crate::silt_error;
use crate::typing::columns::Column;
use crate::typing::decimal;
use crate::typing::value::Value;
use crate::typing::KindDetails;

/// How a default value should be rendered.
#[derive(Debug, Clone, Copy)]
pub struct DefaultValueArgs {
    /// Escape for embedding into a SQL statement. When false the raw value is
    /// rendered without quoting.
    pub escape: bool,
    pub destination: DestinationKind,
}

/// Renders a column's default value, or `None` when the column has none.
///
/// Rendering is type-directed: strings are single-quoted with internal quotes
/// doubled, structs emit the destination's JSON literal, and time values
/// format through the column's own sub-kind.
pub fn render_default_value(
    column: &Column,
    args: Option<&DefaultValueArgs>,
) -> SiltResult<Option<String>> {
    let Some(value) = column.default_value() else {
        return Ok(None);
    };

    if value.is_null() {
        return Ok(None);
    }

    let Some(args) = args else {
        return Ok(Some(raw_render(value)));
    };
    if !args.escape {
        return Ok(Some(raw_render(value)));
    }
    let destination = args.destination;

    let rendered = match &column.kind {
        KindDetails::String => {
            let raw = raw_render(value);
            format!("'{}'", raw.replace('\'', "''"))
        }
        KindDetails::Struct => {
            let raw = raw_render(value);
            match destination {
                DestinationKind::BigQuery => format!("JSON'{raw}'"),
                DestinationKind::Redshift => format!("JSON_PARSE('{raw}')"),
                _ => format!("'{raw}'"),
            }
        }
        KindDetails::ETime(details) => match value {
            Value::Timestamp(ts) => format!("'{}'", ts.format_as(details.kind)),
            Value::String(s) => format!("'{s}'"),
            other => {
                return Err(silt_error!(
                    ErrorKind::ConversionFailed,
                    "default value is not a time value",
                    format!("column {}, value {other:?}", column.name())
                ))
            }
        },
        _ => raw_render(value),
    };

    Ok(Some(rendered))
}

fn raw_render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(int) => int.to_string(),
        Value::Float(float) => float.to_string(),
        Value::String(string) => string.clone(),
        Value::Decimal(dec) => decimal::to_plain_string(dec),
        Value::Timestamp(ts) => ts.to_layout_string(),
        Value::Struct(json) => json.to_string(),
        Value::Array(values) => serde_json::Value::Array(values.clone()).to_string(),
        Value::Toast => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::ext::{parse_extended_datetime, ExtendedTimeKind};

    const ALL_DESTINATIONS: &[DestinationKind] = &[
        DestinationKind::Snowflake,
        DestinationKind::BigQuery,
        DestinationKind::Redshift,
    ];

    fn escaped(destination: DestinationKind) -> DefaultValueArgs {
        DefaultValueArgs {
            escape: true,
            destination,
        }
    }

    #[test]
    fn absent_default_renders_none() {
        let column = Column::new("name", KindDetails::String);
        for destination in ALL_DESTINATIONS {
            let rendered = render_default_value(&column, Some(&escaped(*destination))).unwrap();
            assert_eq!(rendered, None);
        }
    }

    #[test]
    fn unescaped_string_renders_raw() {
        let mut column = Column::new("name", KindDetails::String);
        column.set_default_value(Value::String("abcdef".to_string()));

        assert_eq!(
            render_default_value(&column, None).unwrap(),
            Some("abcdef".to_string())
        );
        let unescaped = DefaultValueArgs {
            escape: false,
            destination: DestinationKind::Snowflake,
        };
        assert_eq!(
            render_default_value(&column, Some(&unescaped)).unwrap(),
            Some("abcdef".to_string())
        );
    }

    #[test]
    fn escaped_string_is_single_quoted() {
        let mut column = Column::new("name", KindDetails::String);
        column.set_default_value(Value::String("abcdef".to_string()));

        for destination in ALL_DESTINATIONS {
            let rendered = render_default_value(&column, Some(&escaped(*destination))).unwrap();
            assert_eq!(rendered, Some("'abcdef'".to_string()));
        }
    }

    #[test]
    fn struct_defaults_use_dialect_json_literals() {
        for (raw, bigquery, redshift, snowflake) in [
            ("{}", "JSON'{}'", "JSON_PARSE('{}')", "'{}'"),
            (
                r#"{"age": 0, "membership_level": "standard"}"#,
                r#"JSON'{"age": 0, "membership_level": "standard"}'"#,
                r#"JSON_PARSE('{"age": 0, "membership_level": "standard"}')"#,
                r#"'{"age": 0, "membership_level": "standard"}'"#,
            ),
        ] {
            let mut column = Column::new("payload", KindDetails::Struct);
            column.set_default_value(Value::String(raw.to_string()));

            let cases = [
                (DestinationKind::BigQuery, bigquery),
                (DestinationKind::Redshift, redshift),
                (DestinationKind::Snowflake, snowflake),
            ];
            for (destination, expected) in cases {
                let rendered =
                    render_default_value(&column, Some(&escaped(destination))).unwrap();
                assert_eq!(rendered, Some(expected.to_string()), "{destination:?}");
            }
        }
    }

    #[test]
    fn time_defaults_format_through_column_sub_kind() {
        let birthday = parse_extended_datetime("2022-09-06T03:19:24.942Z", &[]).unwrap();

        let cases = [
            (ExtendedTimeKind::Date, "'2022-09-06'"),
            (ExtendedTimeKind::Time, "'03:19:24'"),
            (ExtendedTimeKind::DateTime, "'2022-09-06T03:19:24Z'"),
        ];

        for (kind, expected) in cases {
            let mut column = Column::new("birthday", KindDetails::etime(kind));
            column.set_default_value(Value::Timestamp(birthday.clone()));

            for destination in ALL_DESTINATIONS {
                let rendered =
                    render_default_value(&column, Some(&escaped(*destination))).unwrap();
                assert_eq!(rendered, Some(expected.to_string()), "{kind:?}");
            }
        }
    }

    #[test]
    fn boolean_defaults_render_plainly() {
        let mut column = Column::new("active", KindDetails::Boolean);
        column.set_default_value(Value::Boolean(true));
        let rendered =
            render_default_value(&column, Some(&escaped(DestinationKind::Snowflake))).unwrap();
        assert_eq!(rendered, Some("true".to_string()));
    }
}
