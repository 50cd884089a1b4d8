//! Extended time values: a timestamp plus the sub-kind it was recognized as.
//!
//! One representation backs the `Date`, `Time`, and `DateTime` column kinds;
//! the sub-kind picks the output layout when the value is rendered for a
//! destination.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ErrorKind, SiltResult};
use crate::silt_error;

/// Sub-kind discriminator for extended time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedTimeKind {
    Date,
    Time,
    DateTime,
}

impl ExtendedTimeKind {
    /// Output layout used when rendering values of this sub-kind.
    pub fn format(&self) -> &'static str {
        match self {
            ExtendedTimeKind::Date => "%Y-%m-%d",
            ExtendedTimeKind::Time => "%H:%M:%S",
            ExtendedTimeKind::DateTime => "%Y-%m-%dT%H:%M:%SZ",
        }
    }
}

/// Type details carried by the `ETime` column kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtendedTimeDetails {
    pub kind: ExtendedTimeKind,
    /// Caller-asserted layout, when the schema carries one. Not consulted for
    /// output; rendering always uses the sub-kind's fixed layout.
    pub format: Option<String>,
}

impl ExtendedTimeDetails {
    pub fn new(kind: ExtendedTimeKind) -> Self {
        Self { kind, format: None }
    }
}

/// A concrete timestamp tagged with the sub-kind it parsed as.
///
/// Offsets are normalized to UTC at parse time; the naive value inside is
/// always UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTime {
    timestamp: NaiveDateTime,
    kind: ExtendedTimeKind,
}

impl ExtendedTime {
    pub fn new(timestamp: NaiveDateTime, kind: ExtendedTimeKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn kind(&self) -> ExtendedTimeKind {
        self.kind
    }

    /// Renders the value using its own sub-kind's layout.
    pub fn to_layout_string(&self) -> String {
        self.format_as(self.kind)
    }

    /// Renders the value using another sub-kind's layout, e.g. a `DateTime`
    /// default value rendered for a `Date` column.
    pub fn format_as(&self, kind: ExtendedTimeKind) -> String {
        self.timestamp.format(kind.format()).to_string()
    }
}

/// A datetime layout the parser recognizes, in priority order.
struct DateTimeLayout {
    format: &'static str,
    /// Layout carries a numeric UTC offset (`%z`).
    has_offset: bool,
    /// Layout originally carried a named zone abbreviation, which is stripped
    /// before parsing and interpreted as UTC.
    named_zone: bool,
}

/// Reference-time layouts, ordered so the stricter ones match first.
const DATETIME_LAYOUTS: &[DateTimeLayout] = &[
    // 01/02 03:04:05PM '06 -0700 (the reference time, in numerical order)
    DateTimeLayout {
        format: "%m/%d %I:%M:%S%p '%y %z",
        has_offset: true,
        named_zone: false,
    },
    // Mon Jan 2 15:04:05 2006
    DateTimeLayout {
        format: "%a %b %d %H:%M:%S %Y",
        has_offset: false,
        named_zone: false,
    },
    // Mon Jan 2 15:04:05 MST 2006
    DateTimeLayout {
        format: "%a %b %d %H:%M:%S %Y",
        has_offset: false,
        named_zone: true,
    },
    // Mon Jan 02 15:04:05 -0700 2006, optionally with fractional seconds
    DateTimeLayout {
        format: "%a %b %d %H:%M:%S%.f %z %Y",
        has_offset: true,
        named_zone: false,
    },
    // 02 Jan 06 15:04 MST
    DateTimeLayout {
        format: "%d %b %y %H:%M",
        has_offset: false,
        named_zone: true,
    },
    // 02 Jan 06 15:04 -0700
    DateTimeLayout {
        format: "%d %b %y %H:%M %z",
        has_offset: true,
        named_zone: false,
    },
    // Monday, 02-Jan-06 15:04:05 MST
    DateTimeLayout {
        format: "%A, %d-%b-%y %H:%M:%S",
        has_offset: false,
        named_zone: true,
    },
    // Mon, 02 Jan 2006 15:04:05 MST
    DateTimeLayout {
        format: "%a, %d %b %Y %H:%M:%S",
        has_offset: false,
        named_zone: true,
    },
    // Mon, 02 Jan 2006 15:04:05 -0700
    DateTimeLayout {
        format: "%a, %d %b %Y %H:%M:%S %z",
        has_offset: true,
        named_zone: false,
    },
    // 2006-01-02 15:04:05, with optional fractional seconds
    DateTimeLayout {
        format: "%Y-%m-%d %H:%M:%S%.f",
        has_offset: false,
        named_zone: false,
    },
];

const DATE_LAYOUT: &str = "%Y-%m-%d";
const TIME_LAYOUT: &str = "%H:%M:%S%.f";

/// Parses a string into an [`ExtendedTime`], trying datetime layouts first,
/// then date, then time. `additional_formats` are caller-provided strftime
/// datetime layouts consulted after the built-in table.
pub fn parse_extended_datetime(
    value: &str,
    additional_formats: &[String],
) -> SiltResult<ExtendedTime> {
    if let Some(timestamp) = parse_datetime(value, additional_formats) {
        return Ok(ExtendedTime::new(timestamp, ExtendedTimeKind::DateTime));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_LAYOUT) {
        let timestamp = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(ExtendedTime::new(timestamp, ExtendedTimeKind::Date));
    }

    if let Some(time) = parse_time(value) {
        let timestamp = NaiveDateTime::new(NaiveDate::default(), time);
        return Ok(ExtendedTime::new(timestamp, ExtendedTimeKind::Time));
    }

    Err(silt_error!(
        ErrorKind::ConversionFailed,
        "value is not a supported time layout",
        value
    ))
}

fn parse_datetime(value: &str, additional_formats: &[String]) -> Option<NaiveDateTime> {
    // RFC 3339 first; it covers the fractional-second and offset variants the
    // brokers actually produce.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }

    for layout in DATETIME_LAYOUTS {
        let candidate = if layout.named_zone {
            match strip_zone_abbreviation(value) {
                Some(stripped) => stripped,
                None => continue,
            }
        } else {
            value.to_string()
        };

        if layout.has_offset {
            if let Ok(parsed) = DateTime::parse_from_str(&candidate, layout.format) {
                return Some(parsed.naive_utc());
            }
        } else if let Ok(parsed) = NaiveDateTime::parse_from_str(&candidate, layout.format) {
            return Some(parsed);
        }
    }

    for format in additional_formats {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.naive_utc());
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }

    None
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    // Accept a trailing numeric offset ("00:18:11.13116+00") by truncating it;
    // time-of-day values are stored zone-less.
    let trimmed = match value.rfind(|c| c == '+' || c == '-') {
        Some(idx) if idx >= 2 => &value[..idx],
        _ => value,
    };

    NaiveTime::parse_from_str(trimmed, TIME_LAYOUT).ok()
}

/// Removes a single all-caps zone abbreviation token (2-4 letters), returning
/// the remaining string. Returns `None` when no such token exists so layouts
/// expecting one can be skipped.
fn strip_zone_abbreviation(value: &str) -> Option<String> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let zone_position = tokens.iter().position(|token| {
        token.len() >= 2
            && token.len() <= 4
            && token.chars().all(|c| c.is_ascii_uppercase() && c.is_ascii_alphabetic())
    })?;

    let mut remaining = Vec::with_capacity(tokens.len() - 1);
    for (i, token) in tokens.iter().enumerate() {
        if i != zone_position {
            remaining.push(*token);
        }
    }

    Some(remaining.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layouts_parse_as_datetime() {
        let possible_dates = [
            "01/02 03:04:05PM '06 -0700",
            "Mon Jan 2 15:04:05 2006",
            "Mon Jan 2 15:04:05 MST 2006",
            "Mon Jan 02 15:04:05 -0700 2006",
            "02 Jan 06 15:04 MST",
            "02 Jan 06 15:04 -0700",
            "Monday, 02-Jan-06 15:04:05 MST",
            "Mon, 02 Jan 2006 15:04:05 MST",
            "Mon, 02 Jan 2006 15:04:05 -0700",
            "2019-10-12T14:20:50.52+07:00",
        ];

        for value in possible_dates {
            let parsed = parse_extended_datetime(value, &[]).unwrap();
            assert_eq!(parsed.kind(), ExtendedTimeKind::DateTime, "{value}");
        }
    }

    #[test]
    fn unrecognized_value_is_an_error() {
        let err = parse_extended_datetime("random", &[]).unwrap_err();
        assert!(err.to_string().contains("not a supported time layout"));
    }

    #[test]
    fn fractional_fallback_does_not_round_trip_identically() {
        // The fractional-second variant has no exact layout of its own; the
        // match proves the fallback path ran and rendering drops the fraction.
        let value = "Mon Jan 02 15:04:05.69944 -0700 2006";
        let parsed = parse_extended_datetime(value, &[]).unwrap();
        assert_eq!(parsed.kind(), ExtendedTimeKind::DateTime);
        assert_ne!(parsed.to_layout_string(), value);
    }

    #[test]
    fn iso_date_parses_as_date() {
        let parsed = parse_extended_datetime("2023-01-01", &[]).unwrap();
        assert_eq!(parsed.kind(), ExtendedTimeKind::Date);
        assert_eq!(parsed.to_layout_string(), "2023-01-01");
    }

    #[test]
    fn time_with_numeric_offset_parses_as_time() {
        let parsed = parse_extended_datetime("00:18:11.13116+00", &[]).unwrap();
        assert_eq!(parsed.kind(), ExtendedTimeKind::Time);
        assert_eq!(parsed.to_layout_string(), "00:18:11");
    }

    #[test]
    fn offsets_normalize_to_utc() {
        let parsed = parse_extended_datetime("2019-10-12T14:20:50.52+07:00", &[]).unwrap();
        assert_eq!(parsed.format_as(ExtendedTimeKind::DateTime), "2019-10-12T07:20:50Z");
    }

    #[test]
    fn additional_formats_are_consulted() {
        let formats = vec!["%d.%m.%Y %H:%M".to_string()];
        let parsed = parse_extended_datetime("06.09.2022 03:19", &formats).unwrap();
        assert_eq!(parsed.format_as(ExtendedTimeKind::Date), "2022-09-06");
    }
}
