//! Type-mapping tables between [`KindDetails`] and destination SQL types.

use silt_config::shared::DestinationKind;

use crate::typing::decimal::DecimalDetails;
use crate::typing::ext::ExtendedTimeKind;
use crate::typing::KindDetails;

/// Returns the destination SQL type for a column kind.
///
/// `Invalid` has no mapping; callers skip such columns with a warning.
pub fn kind_to_dwh_type(kind: &KindDetails, destination: DestinationKind) -> Option<String> {
    let mapped = match destination {
        DestinationKind::Snowflake | DestinationKind::Test | DestinationKind::S3 => match kind {
            KindDetails::Invalid => return None,
            KindDetails::String => "string".to_string(),
            KindDetails::Boolean => "boolean".to_string(),
            KindDetails::Integer => "int".to_string(),
            KindDetails::Float => "float".to_string(),
            KindDetails::Struct => "variant".to_string(),
            KindDetails::Array => "array".to_string(),
            KindDetails::ETime(details) => match details.kind {
                ExtendedTimeKind::Date => "date".to_string(),
                ExtendedTimeKind::Time => "time".to_string(),
                ExtendedTimeKind::DateTime => "timestamp_tz".to_string(),
            },
            KindDetails::EDecimal(details) => decimal_type(details, "string"),
        },
        DestinationKind::BigQuery => match kind {
            KindDetails::Invalid => return None,
            KindDetails::String => "string".to_string(),
            KindDetails::Boolean => "bool".to_string(),
            KindDetails::Integer => "int64".to_string(),
            KindDetails::Float => "float64".to_string(),
            KindDetails::Struct => "json".to_string(),
            KindDetails::Array => "array<json>".to_string(),
            KindDetails::ETime(details) => match details.kind {
                ExtendedTimeKind::Date => "date".to_string(),
                ExtendedTimeKind::Time => "time".to_string(),
                ExtendedTimeKind::DateTime => "datetime".to_string(),
            },
            KindDetails::EDecimal(details) => decimal_type(details, "string"),
        },
        DestinationKind::Redshift => match kind {
            KindDetails::Invalid => return None,
            KindDetails::String => "varchar(max)".to_string(),
            KindDetails::Boolean => "boolean".to_string(),
            KindDetails::Integer => "int8".to_string(),
            KindDetails::Float => "float8".to_string(),
            KindDetails::Struct => "super".to_string(),
            KindDetails::Array => "super".to_string(),
            KindDetails::ETime(details) => match details.kind {
                ExtendedTimeKind::Date => "date".to_string(),
                ExtendedTimeKind::Time => "time".to_string(),
                ExtendedTimeKind::DateTime => "timestamp".to_string(),
            },
            KindDetails::EDecimal(details) => decimal_type(details, "varchar(max)"),
        },
    };

    Some(mapped)
}

fn decimal_type(details: &DecimalDetails, string_fallback: &str) -> String {
    match details.precision {
        Some(precision) => format!("numeric({precision},{})", details.scale),
        // Variable-scale decimals have no NUMERIC mapping.
        None => string_fallback.to_string(),
    }
}

/// Maps a destination's reported column type back to a [`KindDetails`].
///
/// Used when reading the warehouse schema during table-config fetch. Unknown
/// types come back as `Invalid`; the caller logs and skips them.
pub fn dwh_type_to_kind(raw_type: &str, destination: DestinationKind) -> KindDetails {
    let normalized = raw_type.trim().to_lowercase();
    let (base, args) = split_type_args(&normalized);

    match destination {
        DestinationKind::Snowflake | DestinationKind::Test | DestinationKind::S3 => match base {
            "string" | "text" | "varchar" | "char" | "character" => KindDetails::String,
            "boolean" => KindDetails::Boolean,
            "int" | "integer" | "bigint" | "smallint" | "tinyint" => KindDetails::Integer,
            "float" | "float4" | "float8" | "double" | "double precision" | "real" => {
                KindDetails::Float
            }
            "variant" | "object" => KindDetails::Struct,
            "array" => KindDetails::Array,
            "date" => KindDetails::etime(ExtendedTimeKind::Date),
            "time" => KindDetails::etime(ExtendedTimeKind::Time),
            "datetime" | "timestamp" | "timestamp_tz" | "timestamp_ltz" | "timestamp_ntz" => {
                KindDetails::etime(ExtendedTimeKind::DateTime)
            }
            "number" | "numeric" | "decimal" => numeric_kind(args),
            _ => KindDetails::Invalid,
        },
        DestinationKind::BigQuery => match base {
            "string" => KindDetails::String,
            "bool" | "boolean" => KindDetails::Boolean,
            "int64" | "integer" | "int" => KindDetails::Integer,
            "float64" | "float" => KindDetails::Float,
            "json" | "struct" | "record" => KindDetails::Struct,
            _ if base.starts_with("array") => KindDetails::Array,
            "date" => KindDetails::etime(ExtendedTimeKind::Date),
            "time" => KindDetails::etime(ExtendedTimeKind::Time),
            "datetime" | "timestamp" => KindDetails::etime(ExtendedTimeKind::DateTime),
            "numeric" | "bignumeric" => numeric_kind(args),
            _ => KindDetails::Invalid,
        },
        DestinationKind::Redshift => match base {
            "varchar" | "character varying" | "char" | "text" => KindDetails::String,
            "boolean" | "bool" => KindDetails::Boolean,
            "int8" | "bigint" | "int4" | "integer" | "int" | "int2" | "smallint" => {
                KindDetails::Integer
            }
            "float8" | "double precision" | "float4" | "real" => KindDetails::Float,
            "super" => KindDetails::Struct,
            "date" => KindDetails::etime(ExtendedTimeKind::Date),
            "time" | "time without time zone" => KindDetails::etime(ExtendedTimeKind::Time),
            "timestamp" | "timestamp without time zone" | "timestamp with time zone"
            | "timestamptz" => KindDetails::etime(ExtendedTimeKind::DateTime),
            "numeric" | "decimal" => numeric_kind(args),
            _ => KindDetails::Invalid,
        },
    }
}

/// Splits `numeric(38,2)` into `("numeric", Some("38,2"))`.
fn split_type_args(raw: &str) -> (&str, Option<&str>) {
    match (raw.find('('), raw.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            (raw[..open].trim_end(), Some(&raw[open + 1..close]))
        }
        _ => (raw, None),
    }
}

fn numeric_kind(args: Option<&str>) -> KindDetails {
    let Some(args) = args else {
        return KindDetails::EDecimal(DecimalDetails::new(None, 0));
    };

    let mut parts = args.split(',').map(str::trim);
    let precision = parts.next().and_then(|p| p.parse::<i32>().ok());
    let scale = parts.next().and_then(|s| s.parse::<i32>().ok()).unwrap_or(0);

    if scale == 0 {
        // NUMERIC(p, 0) round-trips as an integer column.
        return KindDetails::Integer;
    }

    KindDetails::EDecimal(DecimalDetails::new(precision, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_types_follow_the_dialect_tables() {
        let cases = [
            (
                KindDetails::String,
                ["string", "string", "varchar(max)"],
            ),
            (KindDetails::Struct, ["variant", "json", "super"]),
            (KindDetails::Array, ["array", "array<json>", "super"]),
            (
                KindDetails::etime(ExtendedTimeKind::DateTime),
                ["timestamp_tz", "datetime", "timestamp"],
            ),
            (
                KindDetails::EDecimal(DecimalDetails::new(Some(10), 2)),
                ["numeric(10,2)", "numeric(10,2)", "numeric(10,2)"],
            ),
            (
                KindDetails::EDecimal(DecimalDetails::new(None, 5)),
                ["string", "string", "varchar(max)"],
            ),
        ];

        let destinations = [
            DestinationKind::Snowflake,
            DestinationKind::BigQuery,
            DestinationKind::Redshift,
        ];

        for (kind, expected) in cases {
            for (destination, expected_type) in destinations.iter().zip(expected) {
                assert_eq!(
                    kind_to_dwh_type(&kind, *destination).as_deref(),
                    Some(expected_type),
                    "{kind:?} on {destination:?}"
                );
            }
        }
    }

    #[test]
    fn invalid_kind_has_no_mapping() {
        assert_eq!(
            kind_to_dwh_type(&KindDetails::Invalid, DestinationKind::Snowflake),
            None
        );
    }

    #[test]
    fn warehouse_types_round_trip() {
        assert_eq!(
            dwh_type_to_kind("VARIANT", DestinationKind::Snowflake),
            KindDetails::Struct
        );
        assert_eq!(
            dwh_type_to_kind("NUMBER(38,0)", DestinationKind::Snowflake),
            KindDetails::Integer
        );
        assert_eq!(
            dwh_type_to_kind("NUMBER(10,2)", DestinationKind::Snowflake),
            KindDetails::EDecimal(DecimalDetails::new(Some(10), 2))
        );
        assert_eq!(
            dwh_type_to_kind("TIMESTAMP_TZ(9)", DestinationKind::Snowflake),
            KindDetails::etime(ExtendedTimeKind::DateTime)
        );
        assert_eq!(
            dwh_type_to_kind("ARRAY<JSON>", DestinationKind::BigQuery),
            KindDetails::Array
        );
        assert_eq!(
            dwh_type_to_kind("character varying(256)", DestinationKind::Redshift),
            KindDetails::String
        );
        assert_eq!(
            dwh_type_to_kind("definitely_not_a_type", DestinationKind::Redshift),
            KindDetails::Invalid
        );
    }
}
