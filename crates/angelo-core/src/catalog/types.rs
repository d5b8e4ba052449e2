//! Column type definitions for the catalog.

use crate::value::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// Scalar column types.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Number of digits after decimal point.
        scale: u8,
    },
    /// UTF-8 string, optionally length-limited.
    String {
        /// Maximum length in characters.
        max_len: Option<u32>,
    },
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

/// Column types.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An enumeration restricted to a fixed set of variants.
    Enum {
        /// Name of the enum type.
        name: String,
        /// Allowed variant values.
        variants: Vec<String>,
    },
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float64 | ScalarType::Decimal { .. }
        )
    }

    /// Check whether a value can be stored in a column of this type.
    ///
    /// Null is accepted here; nullability is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::Bool, Value::Bool(_)) => true,
            (ScalarType::Int32, Value::Int32(_)) => true,
            (ScalarType::Int64, Value::Int32(_) | Value::Int64(_)) => true,
            (ScalarType::Float64, Value::Float64(_) | Value::Int32(_) | Value::Int64(_)) => true,
            (
                ScalarType::Decimal { scale, .. },
                Value::Decimal {
                    scale: value_scale,
                    ..
                },
            ) => value_scale <= scale,
            (ScalarType::Decimal { .. }, Value::Int32(_) | Value::Int64(_)) => true,
            (ScalarType::String { max_len }, Value::String(s)) => match max_len {
                Some(max) => s.chars().count() <= *max as usize,
                None => true,
            },
            (ScalarType::Bytes, Value::Bytes(_)) => true,
            (ScalarType::Timestamp, Value::Timestamp(_) | Value::Int64(_)) => true,
            _ => false,
        }
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// 64-bit integer column.
    pub fn integer() -> Self {
        FieldType::Scalar(ScalarType::Int64)
    }

    /// Unbounded string column.
    pub fn text() -> Self {
        FieldType::Scalar(ScalarType::String { max_len: None })
    }

    /// String column limited to `max_len` characters.
    pub fn string(max_len: u32) -> Self {
        FieldType::Scalar(ScalarType::String {
            max_len: Some(max_len),
        })
    }

    /// Money amounts: decimals with two fractional digits.
    pub fn money() -> Self {
        FieldType::Scalar(ScalarType::Decimal {
            precision: 18,
            scale: 2,
        })
    }

    /// Percentages: decimals with two fractional digits.
    pub fn percentage() -> Self {
        FieldType::Scalar(ScalarType::Decimal {
            precision: 5,
            scale: 2,
        })
    }

    /// Create an enum field type.
    pub fn enum_type(name: impl Into<String>, variants: Vec<String>) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants,
        }
    }

    /// Get the inner scalar type if this is a scalar type.
    pub fn scalar_type(&self) -> Option<&ScalarType> {
        match self {
            FieldType::Scalar(s) => Some(s),
            FieldType::Enum { .. } => None,
        }
    }

    /// Check whether a value can be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Scalar(s) => s.accepts(value),
            FieldType::Enum { variants, .. } => match value {
                Value::Null => true,
                Value::String(s) => variants.iter().any(|v| v == s),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_checks() {
        assert!(ScalarType::Int32.is_numeric());
        assert!(ScalarType::Decimal {
            precision: 10,
            scale: 2
        }
        .is_numeric());
        assert!(!ScalarType::String { max_len: None }.is_numeric());
        assert!(!ScalarType::Bool.is_numeric());
    }

    #[test]
    fn test_string_length_limit() {
        let abbr = FieldType::string(6);
        assert!(abbr.accepts(&Value::from("HRM")));
        assert!(!abbr.accepts(&Value::from("TOO LONG")));
        assert!(abbr.accepts(&Value::Null));
        assert!(!abbr.accepts(&Value::Int64(1)));
    }

    #[test]
    fn test_money_scale() {
        let money = FieldType::money();
        assert!(money.accepts(&Value::decimal(1999, 2)));
        assert!(money.accepts(&Value::Int64(20)));
        assert!(!money.accepts(&Value::decimal(19999, 3)));
    }

    #[test]
    fn test_enum_type() {
        let status = FieldType::enum_type("identity", vec!["User".into(), "Employee".into()]);
        assert!(status.accepts(&Value::from("Employee")));
        assert!(!status.accepts(&Value::from("Manager")));
        assert!(status.scalar_type().is_none());
    }
}
