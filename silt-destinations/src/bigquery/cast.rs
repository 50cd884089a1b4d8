//! Casting buffered values into BigQuery row JSON for staged loads.

use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt::typing::columns::Column;
use silt::typing::decimal::to_plain_string;
use silt::typing::ext::parse_extended_datetime;
use silt::typing::value::Value;
use silt::typing::KindDetails;

/// Renders one cell as a JSON value for the newline-delimited staged file.
/// Absent and TOAST cells are JSON `null`.
pub fn cast_column_value(
    value: Option<&Value>,
    column: &Column,
    additional_date_formats: &[String],
) -> SiltResult<serde_json::Value> {
    let Some(value) = value else {
        return Ok(serde_json::Value::Null);
    };

    match value {
        Value::Null | Value::Toast => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Integer(int) => Ok(serde_json::json!(int)),
        Value::Float(float) => Ok(serde_json::json!(float)),
        Value::Decimal(dec) => Ok(serde_json::Value::String(to_plain_string(dec))),
        Value::Timestamp(ts) => Ok(serde_json::Value::String(match &column.kind {
            KindDetails::ETime(details) => ts.format_as(details.kind),
            _ => ts.to_layout_string(),
        })),
        Value::Struct(json) => Ok(json.clone()),
        Value::Array(values) => Ok(serde_json::Value::Array(values.clone())),
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
                Ok(serde_json::Value::String(parsed.format_as(details.kind)))
            }
            _ => Ok(serde_json::Value::String(string.clone())),
        },
    }
}
