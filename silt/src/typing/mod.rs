//! Value classification: the typing kernel.
//!
//! [`parse_value`] maps a raw event value to a [`KindDetails`], the logical
//! column type the destinations know how to create and cast. Inference never
//! fails; anything unrecognized degrades to `String`.

pub mod columns;
pub mod decimal;
pub mod default;
pub mod ext;
pub mod mapping;
pub mod value;

use std::collections::HashMap;

use crate::typing::decimal::DecimalDetails;
use crate::typing::ext::{ExtendedTimeDetails, ExtendedTimeKind};

/// Logical column type, inferred from values or asserted by a CDC schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindDetails {
    Invalid,
    String,
    Boolean,
    Integer,
    Float,
    Struct,
    Array,
    ETime(ExtendedTimeDetails),
    EDecimal(DecimalDetails),
}

impl KindDetails {
    /// Shorthand for an `ETime` kind with the given sub-kind.
    pub fn etime(kind: ExtendedTimeKind) -> Self {
        KindDetails::ETime(ExtendedTimeDetails::new(kind))
    }

    /// Returns the `ETime` sub-kind, when this is a time kind.
    pub fn etime_kind(&self) -> Option<ExtendedTimeKind> {
        match self {
            KindDetails::ETime(details) => Some(details.kind),
            _ => None,
        }
    }
}

/// Inference settings threaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Extra strftime datetime layouts consulted after the built-in table.
    pub additional_date_formats: Vec<String>,
}

/// Optional caller-asserted schema: column name to kind.
pub type OptionalSchema = HashMap<String, KindDetails>;

/// Classifies a raw value under the given column name.
///
/// A kind asserted by `optional_schema` wins over inference. `null` is
/// `Invalid` unless the schema knows the column, in which case it degrades to
/// `String` so NULL casting still works. String values are checked against the
/// timestamp layout table, then JSON detection, then default to `String`.
/// Parse failures are never surfaced from here.
pub fn parse_value(
    settings: &Settings,
    name: &str,
    optional_schema: Option<&OptionalSchema>,
    value: &serde_json::Value,
) -> KindDetails {
    if let Some(schema) = optional_schema {
        if let Some(kind) = schema.get(name) {
            return kind.clone();
        }
    }

    match value {
        serde_json::Value::Null => {
            if optional_schema.is_some_and(|schema| schema.contains_key(name)) {
                KindDetails::String
            } else {
                KindDetails::Invalid
            }
        }
        serde_json::Value::Bool(_) => KindDetails::Boolean,
        serde_json::Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                KindDetails::Integer
            } else {
                KindDetails::Float
            }
        }
        serde_json::Value::Array(_) => KindDetails::Array,
        serde_json::Value::Object(_) => KindDetails::Struct,
        serde_json::Value::String(string) => {
            if let Ok(parsed) =
                ext::parse_extended_datetime(string, &settings.additional_date_formats)
            {
                return KindDetails::etime(parsed.kind());
            }

            if is_json(string) {
                return KindDetails::Struct;
            }

            KindDetails::String
        }
    }
}

/// Whether a string is a well-formed JSON document (object or array).
///
/// The shape check runs before full parsing so bare scalars like `7` or
/// `"2023"` stay strings.
pub fn is_json(value: &str) -> bool {
    let trimmed = value.trim();

    let shaped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !shaped {
        return false;
    }

    serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> KindDetails {
        parse_value(&Settings::default(), "", None, &value)
    }

    #[test]
    fn null_without_hint_is_invalid() {
        assert_eq!(parse(serde_json::Value::Null), KindDetails::Invalid);
        assert_eq!(parse(json!("nil")), KindDetails::String);
    }

    #[test]
    fn null_in_known_column_is_string() {
        let mut schema = OptionalSchema::new();
        schema.insert("created_at".to_string(), KindDetails::String);
        let kind = parse_value(
            &Settings::default(),
            "created_at",
            Some(&schema),
            &serde_json::Value::Null,
        );
        assert_eq!(kind, KindDetails::String);
    }

    #[test]
    fn basic_scalars() {
        assert_eq!(parse(json!(7.5)), KindDetails::Float);
        assert_eq!(parse(json!(-7.4999999)), KindDetails::Float);
        assert_eq!(parse(json!(9)), KindDetails::Integer);
        assert_eq!(parse(json!(i64::MAX)), KindDetails::Integer);
        assert_eq!(parse(json!(i64::MIN)), KindDetails::Integer);
        assert_eq!(parse(json!(true)), KindDetails::Boolean);
        assert_eq!(parse(json!(false)), KindDetails::Boolean);
    }

    #[test]
    fn arrays_of_any_element_type() {
        assert_eq!(parse(json!(["a", "b", "c"])), KindDetails::Array);
        assert_eq!(parse(json!(["a", 123, "c"])), KindDetails::Array);
        assert_eq!(parse(json!([1])), KindDetails::Array);
        assert_eq!(parse(json!([false])), KindDetails::Array);
    }

    #[test]
    fn maps_are_structs() {
        assert_eq!(
            parse(json!({"foo": "bar", "dog": "dusty"})),
            KindDetails::Struct
        );
        assert_eq!(
            parse(json!({"food": {"pizza": "slice"}, "music": ["a", "b"]})),
            KindDetails::Struct
        );
    }

    #[test]
    fn json_detection() {
        assert!(is_json("{}"));
        assert!(is_json(r#"{"hello": "world"}"#));
        assert!(is_json(
            r#"{
                "hello": {"world": {"nested_value": true}},
                "add_a_list_here": [1, 2, 3, 4],
                "number": 7.5,
                "integerNum": 7
            }"#
        ));
        assert!(is_json("[]"));
        assert!(is_json("[1, 2, 3, 4]"));

        assert!(!is_json(r#"{"hello": "world""#));
        assert!(!is_json(r#"{"hello": "world"}}"#));
        assert!(!is_json("{null}"));
        assert!(!is_json("[1, 2, 3, 4"));
        assert!(!is_json(""));
        assert!(!is_json("   "));
    }

    #[test]
    fn json_strings_classify_as_struct() {
        assert_eq!(parse(json!("{}")), KindDetails::Struct);
        assert_eq!(parse(json!("[]")), KindDetails::Struct);
        assert_eq!(parse(json!("   ")), KindDetails::String);
        assert_eq!(parse(json!("{null}")), KindDetails::String);
        assert_eq!(parse(json!("[1,2,3,4")), KindDetails::String);
    }

    #[test]
    fn datetime_strings_classify_with_sub_kind() {
        let kind = parse(json!("2019-10-12T14:20:50.52+07:00"));
        assert_eq!(kind.etime_kind(), Some(ExtendedTimeKind::DateTime));

        let kind = parse(json!("00:18:11.13116+00"));
        assert_eq!(kind.etime_kind(), Some(ExtendedTimeKind::Time));

        let kind = parse(json!("2023-01-01"));
        assert_eq!(kind.etime_kind(), Some(ExtendedTimeKind::Date));
    }

    #[test]
    fn plain_strings_stay_strings() {
        for value in ["dusty", "robin", "abc"] {
            assert_eq!(parse(json!(value)), KindDetails::String);
        }
    }

    #[test]
    fn optional_schema_wins_over_inference() {
        let mut schema = OptionalSchema::new();
        schema.insert("created_at".to_string(), KindDetails::String);

        // Not in the schema: inferred as a date.
        let kind = parse_value(
            &Settings::default(),
            "updated_at",
            Some(&schema),
            &json!("2023-01-01"),
        );
        assert_eq!(kind.etime_kind(), Some(ExtendedTimeKind::Date));

        // In the schema: the asserted kind is returned verbatim.
        let kind = parse_value(
            &Settings::default(),
            "created_at",
            Some(&schema),
            &json!("2023-01-01"),
        );
        assert_eq!(kind, KindDetails::String);
    }
}
