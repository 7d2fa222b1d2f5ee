//! Serde helper functions for lenient deserialization of exchange and backend payloads.
//!
//! Exchange responses encode numbers as strings, the bot backend encodes them as
//! JSON numbers, and either side occasionally sends `null` or omits a field.
//! The helpers here normalize all of those shapes; a missing or unparsable
//! numeric value becomes zero instead of failing the whole payload.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a `Decimal` out of a JSON string or number.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal_str(s),
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        _ => None,
    }
}

fn parse_decimal_str(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Parses an `f64` out of a JSON number or numeric string.
pub fn f64_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Deserializes a `Decimal` from a string, number or `null`; anything else is zero.
///
/// # Examples
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Fill {
///     #[serde(default, deserialize_with = "lenient_decimal")]
///     qty: Decimal,
/// }
/// ```
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO))
}

/// Deserializes an `f64` from a number, numeric string or `null`; anything else is zero.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(f64_from_value).unwrap_or(0.0))
}

/// Deserializes an optional `f64`; `null`, missing and unparsable values become `None`.
pub fn lenient_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(f64_from_value))
}

/// Deserializes a non-negative integer from a number, numeric string or `null`.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(f64_from_value)
        .filter(|v| *v >= 0.0)
        .map(|v| v as u64)
        .unwrap_or(0))
}

/// Deserializes an identifier that may arrive as a string or a number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// Normalizes a symbol string: trims whitespace and converts to uppercase.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_decimal")]
        price: Decimal,
        #[serde(default, deserialize_with = "lenient_f64")]
        pnl: f64,
        #[serde(default, deserialize_with = "lenient_u64")]
        time: u64,
        #[serde(default, deserialize_with = "string_or_number")]
        id: String,
    }

    #[test]
    fn test_lenient_fields_accept_strings_and_numbers() {
        let sample: Sample =
            serde_json::from_value(json!({"price": "64000.50", "pnl": "12.5", "time": 1700000000000u64, "id": 42}))
                .unwrap();
        assert_eq!(sample.price, dec!(64000.50));
        assert_eq!(sample.pnl, 12.5);
        assert_eq!(sample.time, 1_700_000_000_000);
        assert_eq!(sample.id, "42");
    }

    #[test]
    fn test_lenient_fields_default_to_zero() {
        let sample: Sample =
            serde_json::from_value(json!({"price": null, "pnl": "n/a"})).unwrap();
        assert_eq!(sample.price, Decimal::ZERO);
        assert_eq!(sample.pnl, 0.0);
        assert_eq!(sample.time, 0);
        assert_eq!(sample.id, "");
    }

    #[test]
    fn test_decimal_from_number_keeps_precision() {
        assert_eq!(decimal_from_value(&json!(0.1)), Some(dec!(0.1)));
        assert_eq!(decimal_from_value(&json!("1e-3")), Some(dec!(0.001)));
        assert_eq!(decimal_from_value(&json!(true)), None);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("  btcusdt "), "BTCUSDT");
    }
}
