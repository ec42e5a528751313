// src/actions/field.rs
//! Request fields that are parsed during validation instead of deserialization.
use std::str::FromStr;

use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::amount::parse_amount;
use crate::error::ChipInError;

/// A request field as it arrived over RPC.
///
/// Deserializing a `Field` never fails, so a bad value reaches the action and
/// is reported in the result object like any other invalid input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Missing,
    Present(T),
    /// The raw value could not be read as `T`.
    Malformed(String),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Missing
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Self::Present(value)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Self::Present)
    }
}

impl<T: Clone> Field<T> {
    /// `Ok(None)` when the field was absent or `null`.
    pub fn value(&self, name: &str) -> Result<Option<T>, ChipInError> {
        match self {
            Self::Missing => Ok(None),
            Self::Present(value) => Ok(Some(value.clone())),
            Self::Malformed(reason) => Err(ChipInError::invalid_input(format!(
                "Invalid {name}: {reason}"
            ))),
        }
    }
}

/// Types a [`Field`] can be read as.
pub trait FieldValue: Sized {
    fn from_json(value: &Value) -> Result<Self, String>;
}

impl FieldValue for Address {
    fn from_json(value: &Value) -> Result<Self, String> {
        let raw = value.as_str().ok_or("expected a hex address string")?;
        let digits = raw.trim().trim_start_matches("0x");
        if digits.len() != 40 {
            return Err(format!("{raw} is not a 20-byte address"));
        }
        Address::from_str(digits).map_err(|_| format!("{raw} is not a hex address"))
    }
}

/// Base units as a JSON integer or a decimal or `0x` hex string.
impl FieldValue for U256 {
    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| format!("{n} is not a whole non-negative amount")),
            Value::String(s) => parse_amount(s),
            other => Err(format!("expected an amount, got {other}")),
        }
    }
}

impl FieldValue for u64 {
    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("{n} is not a non-negative integer")),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("{s} is not a non-negative integer")),
            other => Err(format!("expected an integer, got {other}")),
        }
    }
}

impl FieldValue for String {
    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(format!("expected a string, got {other}")),
        }
    }
}

impl<'de, T: FieldValue> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Self::Missing,
            value => match T::from_json(&value) {
                Ok(parsed) => Self::Present(parsed),
                Err(reason) => Self::Malformed(reason),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Body {
        #[serde(default)]
        pool_id: Field<u64>,
        #[serde(default)]
        amount: Field<U256>,
        #[serde(default)]
        to: Field<Address>,
    }

    #[test]
    fn reads_numbers_and_strings() {
        let body: Body = serde_json::from_value(json!({
            "poolId": "3",
            "amount": "0xf4240",
            "to": "0x0101010101010101010101010101010101010101"
        }))
        .unwrap();
        assert_eq!(body.pool_id, Field::Present(3));
        assert_eq!(body.amount, Field::Present(U256::from(1_000_000u64)));
        assert_eq!(body.to, Field::Present(Address::repeat_byte(0x01)));

        let body: Body = serde_json::from_value(json!({ "poolId": 3, "amount": 1000000 })).unwrap();
        assert_eq!(body.pool_id, Field::Present(3));
        assert_eq!(body.amount, Field::Present(U256::from(1_000_000u64)));
        assert_eq!(body.to, Field::Missing);
    }

    #[rstest]
    #[case(json!({ "poolId": -1 }), "pool ID")]
    #[case(json!({ "poolId": "three" }), "pool ID")]
    #[case(json!({ "amount": "1.5" }), "amount")]
    #[case(json!({ "amount": true }), "amount")]
    #[case(json!({ "to": "0x1234" }), "recipient")]
    #[case(json!({ "to": 42 }), "recipient")]
    fn malformed_values_become_invalid_input(#[case] raw: Value, #[case] name: &str) {
        let body: Body = serde_json::from_value(raw).unwrap();
        let err = match name {
            "pool ID" => body.pool_id.value(name).unwrap_err(),
            "amount" => body.amount.value(name).unwrap_err(),
            _ => body.to.value(name).unwrap_err(),
        };
        assert!(matches!(err, ChipInError::InvalidInput(_)));
        assert!(err.to_string().starts_with(&format!("Invalid {name}: ")));
    }

    #[test]
    fn null_is_missing() {
        let body: Body = serde_json::from_value(json!({ "to": null })).unwrap();
        assert_eq!(body.to.value("recipient").unwrap(), None);
    }
}
