//! Debezium JSON envelope parsing (PostgreSQL and MySQL variants).
//!
//! The envelope is `{schema, payload: {before, after, source, op, ts_ms}}`.
//! The schema block is translated into a caller-asserted column-kind map, and
//! logical payload values (epoch days/millis/micros, base64 decimals) are
//! decoded into canonical strings before ingestion.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta};
use serde::Deserialize;

use crate::cdc::{Event, FormatParser, Operation};
use crate::error::{ErrorKind, SiltResult};
use crate::queue::Message;
use crate::silt_error;
use crate::typing::decimal::{self, DecimalDetails};
use crate::typing::{KindDetails, OptionalSchema};

// Debezium logical type names.
pub const DATE: &str = "io.debezium.time.Date";
pub const TIME: &str = "io.debezium.time.Time";
pub const MICRO_TIME: &str = "io.debezium.time.MicroTime";
pub const TIMESTAMP: &str = "io.debezium.time.Timestamp";
pub const MICRO_TIMESTAMP: &str = "io.debezium.time.MicroTimestamp";
pub const ZONED_TIMESTAMP: &str = "io.debezium.time.ZonedTimestamp";
pub const ZONED_TIME: &str = "io.debezium.time.ZonedTime";
pub const DATE_KAFKA_CONNECT: &str = "org.apache.kafka.connect.data.Date";
pub const TIME_KAFKA_CONNECT: &str = "org.apache.kafka.connect.data.Time";
pub const DATETIME_KAFKA_CONNECT: &str = "org.apache.kafka.connect.data.Timestamp";
pub const KAFKA_DECIMAL_TYPE: &str = "org.apache.kafka.connect.data.Decimal";
pub const KAFKA_VARIABLE_NUMERIC_TYPE: &str = "io.debezium.data.VariableScaleDecimal";
pub const JSON_TYPE: &str = "io.debezium.data.Json";

/// Parameter key carrying a decimal field's precision.
pub const KAFKA_DECIMAL_PRECISION_KEY: &str = "connect.decimal.precision";

/// Envelope schema block.
#[derive(Debug, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<FieldsObject>,
}

impl Schema {
    /// Returns the field list describing the given envelope label
    /// (`after` / `before`).
    pub fn get_schema_from_label(&self, label: &str) -> Option<&FieldsObject> {
        self.fields
            .iter()
            .find(|f| f.field_label.as_deref() == Some(label))
    }
}

/// One entry of the schema block's top-level `fields` array.
#[derive(Debug, Default, Deserialize)]
pub struct FieldsObject {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(rename = "field", default)]
    pub field_label: Option<String>,
}

/// A single column description inside the schema block.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Field {
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Declared column default; feeds the backfill machinery downstream.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Debezium logical type name, when the column carries one.
    #[serde(rename = "name", default)]
    pub debezium_type: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "field", default)]
    pub field_name: String,
}

impl Field {
    /// Whether the raw payload value is a plain integer (not a logical
    /// temporal or decimal encoded as one).
    pub fn is_integer(&self) -> bool {
        matches!(self.field_type.as_str(), "int16" | "int32" | "int64")
            && self.debezium_type.is_empty()
    }

    /// Extracts `(scale, precision)` from the field parameters.
    pub fn get_scale_and_precision(&self) -> SiltResult<(i32, Option<i32>)> {
        let Some(parameters) = &self.parameters else {
            return Err(silt_error!(
                ErrorKind::SourceMessageInvalid,
                "object is empty"
            ));
        };
        if parameters.is_empty() {
            return Err(silt_error!(
                ErrorKind::SourceMessageInvalid,
                "object is empty"
            ));
        }

        let scale = parameter_as_int(parameters, "scale")?.ok_or_else(|| {
            silt_error!(
                ErrorKind::SourceMessageInvalid,
                "key: scale is missing from parameters"
            )
        })?;

        let precision = parameter_as_int(parameters, KAFKA_DECIMAL_PRECISION_KEY)?;

        Ok((scale, precision))
    }

    /// Maps this field description to a logical column kind.
    pub fn to_kind_details(&self) -> KindDetails {
        match self.debezium_type.as_str() {
            TIMESTAMP | MICRO_TIMESTAMP | DATETIME_KAFKA_CONNECT | ZONED_TIMESTAMP => {
                return KindDetails::etime(crate::typing::ext::ExtendedTimeKind::DateTime)
            }
            DATE | DATE_KAFKA_CONNECT => {
                return KindDetails::etime(crate::typing::ext::ExtendedTimeKind::Date)
            }
            TIME | MICRO_TIME | TIME_KAFKA_CONNECT | ZONED_TIME => {
                return KindDetails::etime(crate::typing::ext::ExtendedTimeKind::Time)
            }
            JSON_TYPE => return KindDetails::Struct,
            KAFKA_DECIMAL_TYPE => {
                return match self.get_scale_and_precision() {
                    Ok((scale, precision)) => {
                        KindDetails::EDecimal(DecimalDetails::new(precision, scale))
                    }
                    Err(_) => KindDetails::Invalid,
                }
            }
            KAFKA_VARIABLE_NUMERIC_TYPE => {
                let scale = self
                    .parameters
                    .as_ref()
                    .and_then(|p| p.get("scale"))
                    .and_then(|s| s.as_i64())
                    .map(|s| s as i32)
                    .unwrap_or(decimal::DEFAULT_SCALE);
                return KindDetails::EDecimal(DecimalDetails::new(None, scale));
            }
            _ => {}
        }

        match self.field_type.as_str() {
            "int16" | "int32" | "int64" => KindDetails::Integer,
            "float" | "double" => KindDetails::Float,
            "string" | "bytes" => KindDetails::String,
            "struct" | "map" => KindDetails::Struct,
            "boolean" => KindDetails::Boolean,
            "array" => KindDetails::Array,
            _ => KindDetails::Invalid,
        }
    }
}

fn parameter_as_int(
    parameters: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> SiltResult<Option<i32>> {
    let Some(raw) = parameters.get(key) else {
        return Ok(None);
    };

    let as_int = match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };

    match as_int {
        Some(value) => Ok(Some(value as i32)),
        None => Err(silt_error!(
            ErrorKind::SourceMessageInvalid,
            "parameter is not an integer",
            format!("key: {key} is not type integer")
        )),
    }
}

/// Decodes one payload value according to its field description.
///
/// Logical temporals arrive as epoch days/millis/micros and are rendered into
/// the canonical string layouts the typing kernel recognizes; decimals arrive
/// as base64 two's-complement bytes and are rendered as plain decimal strings.
pub fn decode_field_value(
    field: &Field,
    value: serde_json::Value,
) -> SiltResult<serde_json::Value> {
    if value.is_null() {
        return Ok(value);
    }

    match field.debezium_type.as_str() {
        DATE | DATE_KAFKA_CONNECT => {
            let Some(days) = value.as_i64() else {
                return Ok(value);
            };
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            let date = epoch
                .checked_add_signed(TimeDelta::days(days))
                .ok_or_else(|| {
                    silt_error!(
                        ErrorKind::ConversionFailed,
                        "date value out of range",
                        format!("field {}, days {days}", field.field_name)
                    )
                })?;
            Ok(serde_json::Value::String(
                date.format("%Y-%m-%d").to_string(),
            ))
        }
        TIME | TIME_KAFKA_CONNECT | MICRO_TIME => {
            let Some(raw) = value.as_i64() else {
                return Ok(value);
            };
            let micros = if field.debezium_type == MICRO_TIME {
                raw
            } else {
                raw * 1_000
            };
            let seconds = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1_000) as u32;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
                .ok_or_else(|| {
                    silt_error!(
                        ErrorKind::ConversionFailed,
                        "time value out of range",
                        format!("field {}, micros {micros}", field.field_name)
                    )
                })?;
            Ok(serde_json::Value::String(
                time.format("%H:%M:%S").to_string(),
            ))
        }
        TIMESTAMP | DATETIME_KAFKA_CONNECT | MICRO_TIMESTAMP => {
            let Some(raw) = value.as_i64() else {
                return Ok(value);
            };
            let timestamp = if field.debezium_type == MICRO_TIMESTAMP {
                DateTime::from_timestamp_micros(raw)
            } else {
                DateTime::from_timestamp_millis(raw)
            };
            let timestamp = timestamp.ok_or_else(|| {
                silt_error!(
                    ErrorKind::ConversionFailed,
                    "timestamp value out of range",
                    format!("field {}, raw {raw}", field.field_name)
                )
            })?;
            Ok(serde_json::Value::String(
                timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }
        KAFKA_DECIMAL_TYPE => {
            let Some(encoded) = value.as_str() else {
                return Ok(value);
            };
            let (scale, _) = field.get_scale_and_precision()?;
            decode_decimal(encoded, scale, &field.field_name)
        }
        KAFKA_VARIABLE_NUMERIC_TYPE => {
            let Some(object) = value.as_object() else {
                return Ok(value);
            };
            let scale = object.get("scale").and_then(|s| s.as_i64()).unwrap_or(0) as i32;
            let Some(encoded) = object.get("value").and_then(|v| v.as_str()) else {
                return Ok(serde_json::Value::Null);
            };
            decode_decimal(encoded, scale, &field.field_name)
        }
        _ => Ok(value),
    }
}

fn decode_decimal(encoded: &str, scale: i32, field_name: &str) -> SiltResult<serde_json::Value> {
    let bytes = BASE64.decode(encoded).map_err(|err| {
        silt_error!(
            ErrorKind::ConversionFailed,
            "decimal payload is not valid base64",
            format!("field {field_name}")
        )
        .with_source(err)
    })?;

    let unscaled = BigInt::from_signed_bytes_be(&bytes);
    let decimal = BigDecimal::new(unscaled, scale as i64);
    Ok(serde_json::Value::String(decimal::to_plain_string(
        &decimal,
    )))
}

/// Envelope payload block.
#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    before: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    after: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    source: Source,
    #[serde(default)]
    op: String,
    #[serde(default)]
    ts_ms: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct Source {
    #[serde(default)]
    table: String,
    #[serde(default)]
    ts_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    schema: Option<Schema>,
    payload: Payload,
}

/// Parser for the Debezium JSON envelope.
#[derive(Debug, Clone, Copy)]
pub struct DebeziumParser {
    label: &'static str,
}

impl DebeziumParser {
    pub fn postgres() -> Self {
        Self {
            label: "debezium.postgres",
        }
    }

    pub fn mysql() -> Self {
        Self {
            label: "debezium.mysql",
        }
    }
}

impl FormatParser for DebeziumParser {
    fn label(&self) -> &'static str {
        self.label
    }

    fn parse(&self, message: &Message) -> SiltResult<Event> {
        let pk = parse_key(message.key.as_deref())?;

        // A tombstone has a key and an empty value; it deletes the row.
        if message.value.is_empty() {
            return Ok(Event {
                table: String::new(),
                operation: Operation::Delete,
                deleted: true,
                pk,
                data: HashMap::new(),
                optional_schema: None,
                column_defaults: HashMap::new(),
                source_ts: None,
                execution_ts: chrono::Utc::now(),
            });
        }

        let envelope: Envelope = serde_json::from_slice(&message.value).map_err(|err| {
            silt_error!(
                ErrorKind::SourceMessageInvalid,
                "message value is not a Debezium envelope",
                format!("topic {}", message.topic)
            )
            .with_source(err)
        })?;

        let operation = match envelope.payload.op.as_str() {
            "c" | "r" => Operation::Create,
            "u" => Operation::Update,
            "d" => Operation::Delete,
            other => {
                return Err(silt_error!(
                    ErrorKind::SourceMessageInvalid,
                    "unsupported operation in envelope",
                    format!("op {other:?}, topic {}", message.topic)
                ))
            }
        };
        let deleted = operation == Operation::Delete;

        let after_fields = envelope
            .schema
            .as_ref()
            .and_then(|s| s.get_schema_from_label("after"));

        let optional_schema = after_fields.map(|fields_object| {
            let mut schema = OptionalSchema::new();
            for field in &fields_object.fields {
                let kind = field.to_kind_details();
                if kind != KindDetails::Invalid {
                    schema.insert(field.field_name.clone(), kind);
                }
            }
            schema
        });

        let mut column_defaults = HashMap::new();
        if let Some(fields_object) = after_fields {
            for field in &fields_object.fields {
                if let Some(default) = &field.default {
                    if !default.is_null() {
                        column_defaults.insert(field.field_name.clone(), default.clone());
                    }
                }
            }
        }

        let image = if deleted {
            envelope.payload.before.clone()
        } else {
            envelope.payload.after.clone()
        };

        let mut data = HashMap::new();
        if let Some(image) = image {
            for (name, raw) in image {
                let decoded = match after_fields
                    .and_then(|fo| fo.fields.iter().find(|f| f.field_name == name))
                {
                    Some(field) => decode_field_value(field, raw)?,
                    None => raw,
                };
                data.insert(name, decoded);
            }
        }

        // Deletes keep only the key image; the decoded before-image fills in
        // missing key values for sources that omit them from the message key.
        let (pk, data) = if deleted {
            let mut pk = pk;
            if pk.is_empty() {
                pk = data;
            }
            (pk, HashMap::new())
        } else {
            (pk, data)
        };

        let source_ts = envelope
            .payload
            .source
            .ts_ms
            .and_then(DateTime::from_timestamp_millis);
        let execution_ts = envelope
            .payload
            .ts_ms
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(chrono::Utc::now);

        Ok(Event {
            table: envelope.payload.source.table,
            operation,
            deleted,
            pk,
            data,
            optional_schema,
            column_defaults,
            source_ts,
            execution_ts,
        })
    }
}

/// Parses a message key into primary-key values.
///
/// Accepts a bare JSON object, a Debezium key envelope (`{schema, payload}`),
/// or the string converter's `Struct{id=1}` rendering.
fn parse_key(key: Option<&[u8]>) -> SiltResult<HashMap<String, serde_json::Value>> {
    let Some(key) = key else {
        return Ok(HashMap::new());
    };
    if key.is_empty() {
        return Ok(HashMap::new());
    }

    if let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(key) {
        if let serde_json::Value::Object(object) = parsed {
            if let Some(serde_json::Value::Object(payload)) = object.get("payload") {
                return Ok(payload.clone().into_iter().collect());
            }
            return Ok(object.into_iter().collect());
        }
    }

    let text = String::from_utf8_lossy(key);
    if let Some(inner) = text
        .strip_prefix("Struct{")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        let mut pk = HashMap::new();
        for pair in inner.split(',') {
            if let Some((name, value)) = pair.split_once('=') {
                pk.insert(
                    name.trim().to_string(),
                    serde_json::Value::String(value.trim().to_string()),
                );
            }
        }
        return Ok(pk);
    }

    Err(silt_error!(
        ErrorKind::SourceMessageInvalid,
        "message key is not a recognized primary-key encoding",
        text
    ))
}
