//! Casting buffered values into Snowflake staged-file (TSV) literals.

use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt::typing::columns::Column;
use silt::typing::decimal::to_plain_string;
use silt::typing::ext::parse_extended_datetime;
use silt::typing::value::Value;
use silt::typing::KindDetails;

/// NULL sentinel written into the staged file; matches the stage file
/// format's `NULL_IF` option.
pub const NULL_SENTINEL: &str = r"\\N";

/// Renders one cell for the staged TSV file.
///
/// Unlike inference, casting is strict: a value that cannot be rendered under
/// its column's kind aborts the whole flush of the table.
pub fn cast_column_value_staging(
    value: Option<&Value>,
    column: &Column,
    additional_date_formats: &[String],
) -> SiltResult<String> {
    let Some(value) = value else {
        return Ok(NULL_SENTINEL.to_string());
    };

    match value {
        // TOAST columns stage as NULL so merge keeps the target's value.
        Value::Null | Value::Toast => Ok(NULL_SENTINEL.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Integer(int) => Ok(int.to_string()),
        Value::Float(float) => Ok(float.to_string()),
        Value::Decimal(dec) => Ok(to_plain_string(dec)),
        Value::Timestamp(ts) => Ok(match &column.kind {
            KindDetails::ETime(details) => ts.format_as(details.kind),
            _ => ts.to_layout_string(),
        }),
        Value::Struct(json) => Ok(json.to_string()),
        Value::Array(values) => Ok(serde_json::Value::Array(values.clone()).to_string()),
        Value::String(string) => match &column.kind {
            KindDetails::ETime(details) => {
                let parsed = parse_extended_datetime(string, additional_date_formats)
                    .map_err(|err| {
                        silt_error!(
                            ErrorKind::ConversionFailed,
                            "failed to cast value as time",
                            format!("column {}", column.name())
                        )
                        .with_source(err)
                    })?;
                Ok(parsed.format_as(details.kind))
            }
            // JSON arrived as text (schema-asserted struct columns).
            KindDetails::Struct | KindDetails::Array => Ok(string.clone()),
            _ => Ok(escape_string(string)),
        },
    }
}

/// Escapes control characters the TSV layer cares about, plus an exact NULL
/// sentinel collision.
fn escape_string(value: &str) -> String {
    let escaped = value
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r");

    if escaped == NULL_SENTINEL {
        escaped.replace('\\', "\\\\")
    } else {
        escaped
    }
}
