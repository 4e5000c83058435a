//! Dynamic-typed characteristic values (§3, §9 "Dynamic-typed characteristic
//! values"): a tagged union covering every HAP wire format, plus the JSON
//! coercion the router applies to incoming `PUT` bodies.

use serde_json::Value as Json;

use super::characteristic::{Format, NumericConstraints};

/// A characteristic's current value, or `Null` if it has none yet.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacteristicValue {
    Bool(bool),
    /// Unsigned integer plus its declared bit width (8/16/32/64), so a
    /// `Uint(300, 8)` can be range-checked against `u8::MAX` downstream.
    Uint(u64, u8),
    Int(i64),
    Float(f64),
    String(String),
    Tlv8(Vec<u8>),
    Data(Vec<u8>),
    Null,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValueError {
    #[error("value does not match declared format {0:?}")]
    FormatMismatch(Format),

    #[error("value {0} is outside [{1}, {2}]")]
    OutOfRange(f64, f64, f64),

    #[error("value is not one of the declared valid values")]
    NotAValidValue,

    #[error("value exceeds max length {0}")]
    TooLong(usize),

    #[error("malformed JSON value for format {0:?}")]
    Malformed(Format),
}

impl CharacteristicValue {
    #[must_use]
    pub fn format(&self) -> Format {
        match self {
            Self::Bool(_) => Format::Bool,
            Self::Uint(_, 8) => Format::Uint8,
            Self::Uint(_, 16) => Format::Uint16,
            Self::Uint(_, 32) => Format::Uint32,
            Self::Uint(_, _) => Format::Uint64,
            Self::Int(_) => Format::Int,
            Self::Float(_) => Format::Float,
            Self::String(_) => Format::String,
            Self::Tlv8(_) => Format::Tlv8,
            Self::Data(_) => Format::Data,
            Self::Null => Format::Bool, // never stored as a declared format
        }
    }

    /// Parse a JSON value from a `PUT /characteristics` body into the
    /// characteristic's declared format, applying range/length/valid-value
    /// constraints (§4.8).
    pub fn coerce(json: &Json, format: Format, constraints: &NumericConstraints) -> Result<Self, ValueError> {
        let value = match format {
            Format::Bool => Self::Bool(json.as_bool().or_else(|| json.as_u64().map(|n| n != 0)).ok_or(ValueError::Malformed(format))?),
            Format::Uint8 => Self::coerce_uint(json, 8, constraints)?,
            Format::Uint16 => Self::coerce_uint(json, 16, constraints)?,
            Format::Uint32 => Self::coerce_uint(json, 32, constraints)?,
            Format::Uint64 => Self::coerce_uint(json, 64, constraints)?,
            Format::Int => {
                let n = json.as_i64().ok_or(ValueError::Malformed(format))?;
                Self::check_range(n as f64, constraints)?;
                Self::Int(n)
            }
            Format::Float => {
                let n = json.as_f64().ok_or(ValueError::Malformed(format))?;
                Self::check_range(n, constraints)?;
                Self::Float(n)
            }
            Format::String => {
                let s = json.as_str().ok_or(ValueError::Malformed(format))?.to_string();
                if let Some(max) = constraints.max_len {
                    if s.len() > max {
                        return Err(ValueError::TooLong(max));
                    }
                }
                Self::String(s)
            }
            Format::Tlv8 | Format::Data => {
                let s = json.as_str().ok_or(ValueError::Malformed(format))?;
                let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s).map_err(|_| ValueError::Malformed(format))?;
                if let Some(max) = constraints.max_len {
                    if bytes.len() > max {
                        return Err(ValueError::TooLong(max));
                    }
                }
                if format == Format::Tlv8 { Self::Tlv8(bytes) } else { Self::Data(bytes) }
            }
        };
        Ok(value)
    }

    fn coerce_uint(json: &Json, width: u8, constraints: &NumericConstraints) -> Result<Self, ValueError> {
        let n = json
            .as_u64()
            .or_else(|| json.as_bool().map(u64::from))
            .ok_or(ValueError::Malformed(match width {
                8 => Format::Uint8,
                16 => Format::Uint16,
                32 => Format::Uint32,
                _ => Format::Uint64,
            }))?;
        Self::check_range(n as f64, constraints)?;
        if !constraints.valid_values.is_empty() && !constraints.valid_values.contains(&n) {
            return Err(ValueError::NotAValidValue);
        }
        if !constraints.valid_values_ranges.is_empty() && !constraints.valid_values_ranges.iter().any(|(lo, hi)| n >= *lo && n <= *hi) {
            return Err(ValueError::NotAValidValue);
        }
        Ok(Self::Uint(n, width))
    }

    fn check_range(n: f64, constraints: &NumericConstraints) -> Result<(), ValueError> {
        let min = constraints.min_value.unwrap_or(f64::MIN);
        let max = constraints.max_value.unwrap_or(f64::MAX);
        if n < min || n > max {
            return Err(ValueError::OutOfRange(n, min, max));
        }
        Ok(())
    }

    /// Render to the JSON shape a `GET` response embeds (`value` field).
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Bool(b) => Json::Bool(*b),
            Self::Uint(n, _) => Json::from(*n),
            Self::Int(n) => Json::from(*n),
            Self::Float(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Tlv8(bytes) | Self::Data(bytes) => Json::String(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)),
            Self::Null => Json::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_constraints() -> NumericConstraints {
        NumericConstraints::default()
    }

    #[test]
    fn coerces_bool() {
        let v = CharacteristicValue::coerce(&Json::Bool(true), Format::Bool, &no_constraints()).unwrap();
        assert_eq!(v, CharacteristicValue::Bool(true));
    }

    #[test]
    fn rejects_out_of_range_uint8() {
        let constraints = NumericConstraints { max_value: Some(100.0), ..Default::default() };
        let err = CharacteristicValue::coerce(&Json::from(200u64), Format::Uint8, &constraints).unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange(..)));
    }

    #[test]
    fn rejects_value_outside_valid_values() {
        let constraints = NumericConstraints { valid_values: vec![0, 1, 2], ..Default::default() };
        let err = CharacteristicValue::coerce(&Json::from(5u64), Format::Uint8, &constraints).unwrap_err();
        assert!(matches!(err, ValueError::NotAValidValue));
    }

    #[test]
    fn string_respects_max_length() {
        let constraints = NumericConstraints { max_len: Some(3), ..Default::default() };
        let err = CharacteristicValue::coerce(&Json::String("abcd".into()), Format::String, &constraints).unwrap_err();
        assert!(matches!(err, ValueError::TooLong(3)));
    }

    #[test]
    fn json_round_trip_for_string() {
        let v = CharacteristicValue::String("hello".into());
        assert_eq!(v.to_json(), Json::String("hello".into()));
    }
}
