//! Decimal type details and rendering.

use bigdecimal::BigDecimal;

/// Default scale applied when a variable-scale decimal carries none.
pub const DEFAULT_SCALE: i32 = 5;

/// Type details carried by the `EDecimal` column kind.
///
/// `precision` is absent for variable-scale decimals; destinations fall back
/// to a string column in that case because `NUMERIC` requires a precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecimalDetails {
    pub precision: Option<i32>,
    pub scale: i32,
}

impl DecimalDetails {
    pub fn new(precision: Option<i32>, scale: i32) -> Self {
        Self { precision, scale }
    }
}

/// Renders a decimal as a plain string at full precision.
///
/// [`BigDecimal`]'s display is already plain notation (never scientific),
/// which is what every staged-file format here expects.
pub fn to_plain_string(value: &BigDecimal) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn plain_string_has_no_exponent() {
        let value = BigDecimal::from_str("1234567890.123456789012345678901234567890").unwrap();
        let rendered = to_plain_string(&value);
        assert!(!rendered.contains('e') && !rendered.contains('E'));
        assert_eq!(rendered, "1234567890.123456789012345678901234567890");
    }

    #[test]
    fn negative_values_render_plainly() {
        let value = BigDecimal::from_str("-0.00001").unwrap();
        assert_eq!(to_plain_string(&value), "-0.00001");
    }
}
