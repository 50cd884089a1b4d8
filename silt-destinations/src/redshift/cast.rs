//! Casting buffered values into Redshift staged-file (CSV) literals.

use silt::error::{ErrorKind, SiltResult};
use silt::silt_error;
use silt::typing::columns::Column;
use silt::typing::decimal::to_plain_string;
use silt::typing::ext::parse_extended_datetime;
use silt::typing::value::Value;
use silt::typing::KindDetails;

/// Renders one cell for the staged CSV file.
///
/// NULLs stage as the empty field; the `COPY` issued by the executor runs
/// with `EMPTYASNULL`.
pub fn cast_column_value_staging(
    value: Option<&Value>,
    column: &Column,
    additional_date_formats: &[String],
) -> SiltResult<String> {
    let Some(value) = value else {
        return Ok(String::new());
    };

    match value {
        Value::Null | Value::Toast => Ok(String::new()),
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
            KindDetails::Struct | KindDetails::Array => Ok(string.clone()),
            _ => Ok(string.replace('\t', " ").replace(['\n', '\r'], " ")),
        },
    }
}
