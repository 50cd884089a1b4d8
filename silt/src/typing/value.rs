//! The tagged union of warehouse-relevant row values.

use bigdecimal::BigDecimal;
use std::mem::size_of;

use crate::constants::TOAST_UNAVAILABLE_VALUE;
use crate::typing::decimal;
use crate::typing::ext::ExtendedTime;

/// A single cell value held in the table buffer.
///
/// Everything a CDC event can carry is narrowed to this closed set at ingest
/// time; anything unmappable is rejected there rather than at flush time.
/// `Toast` marks a column whose value was not shipped in the change event; it
/// stages as NULL so merge SQL can keep the destination's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Decimal(BigDecimal),
    Timestamp(ExtendedTime),
    Struct(serde_json::Value),
    Array(Vec<serde_json::Value>),
    Toast,
}

impl Value {
    /// Converts a raw JSON value into a [`Value`], recognizing the TOAST
    /// sentinel. Numbers outside `i64` degrade to floats.
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Value::Integer(int)
                } else {
                    Value::Float(number.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(string) => {
                if string == TOAST_UNAVAILABLE_VALUE {
                    Value::Toast
                } else {
                    Value::String(string)
                }
            }
            serde_json::Value::Array(values) => Value::Array(values),
            serde_json::Value::Object(_) => Value::Struct(value),
        }
    }

    /// Renders the value for use inside a primary-key string.
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(int) => int.to_string(),
            Value::Float(float) => float.to_string(),
            Value::String(string) => string.clone(),
            Value::Decimal(dec) => decimal::to_plain_string(dec),
            Value::Timestamp(ts) => ts.to_layout_string(),
            Value::Struct(json) => json.to_string(),
            Value::Array(values) => serde_json::Value::Array(values.clone()).to_string(),
            Value::Toast => TOAST_UNAVAILABLE_VALUE.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns an estimate of stack plus owned heap bytes, used for the
    /// byte-size flush trigger.
    pub fn size_hint(&self) -> usize {
        let mut total = size_of::<Value>();
        total = total.saturating_add(match self {
            Value::Null
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Toast => 0,
            Value::String(string) => string.capacity(),
            // Digits dominate; two digits per byte plus header slack.
            Value::Decimal(dec) => dec.digits() as usize / 2 + 16,
            Value::Timestamp(_) => 0,
            Value::Struct(json) => estimate_json_bytes(json),
            Value::Array(values) => {
                let mut bytes = values.capacity().saturating_mul(size_of::<serde_json::Value>());
                for value in values {
                    bytes = bytes.saturating_add(estimate_json_bytes(value));
                }
                bytes
            }
        });
        total
    }
}

/// Returns an estimate of additional heap bytes owned by a JSON value.
fn estimate_json_bytes(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(_) | serde_json::Value::Number(_) => 0,
        serde_json::Value::String(string) => string.capacity(),
        serde_json::Value::Array(values) => {
            let mut total = values.capacity().saturating_mul(size_of::<serde_json::Value>());
            for value in values {
                total = total.saturating_add(estimate_json_bytes(value));
            }
            total
        }
        serde_json::Value::Object(values) => values.iter().fold(0usize, |acc, (key, value)| {
            acc.saturating_add(key.capacity())
                .saturating_add(estimate_json_bytes(value))
        }),
    }
}
