// crates/autoschema-core/src/value.rs
// ============================================================================
// Module: Value Coercion
// Description: Field values, storable values, type inference, and coercion.
// Purpose: Turn arbitrary item values into column-typed storable values.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Items carry [`FieldValue`]s of any shape. [`infer_type`] picks the column
//! type for a sample value and [`coerce`] converts later values into the
//! representation required by a column whose type is already locked in. Both
//! are pure functions; callers decide what to do with a [`CoercionError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::CoercionError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest float that converts to `i64` without saturating.
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;
/// Smallest float that converts to `i64` without saturating.
const I64_LOWER_BOUND: f64 = -9_223_372_036_854_775_808.0;

// ============================================================================
// SECTION: Primitive Types
// ============================================================================

/// Semantic column type inferred from a sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    /// Signed 64-bit integer.
    Integer,
    /// Boolean flag.
    Boolean,
    /// Double precision float.
    Float,
    /// Timestamp with offset.
    DateTime,
    /// Free text (fallback for everything unrecognized).
    #[default]
    Text,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Float => "float",
            Self::DateTime => "datetime",
            Self::Text => "text",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Field Values
// ============================================================================

/// Value read from an item field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Float value.
    Float(f64),
    /// Timestamp value.
    DateTime(OffsetDateTime),
    /// Text value.
    Text(String),
    /// Sequence value; stored as delimited text.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Returns true when the value is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::DateTime(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::List(values) => {
                f.write_str("(")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                if values.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Boolean(flag),
            serde_json::Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Self::Integer(integer)
                } else if let Some(float) = number.as_f64() {
                    Self::Float(float)
                } else {
                    Self::Text(number.to_string())
                }
            }
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(values) => {
                Self::List(values.into_iter().map(Self::from).collect())
            }
            object @ serde_json::Value::Object(_) => Self::Text(object.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Storable Values
// ============================================================================

/// Database-storable value bound to statement parameters or read from rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Integer column value.
    Integer(i64),
    /// Floating point column value.
    Real(f64),
    /// Boolean column value.
    Boolean(bool),
    /// Text column value.
    Text(String),
    /// Timestamp column value.
    DateTime(OffsetDateTime),
    /// Raw bytes (only produced by query results).
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the value as an integer when it holds one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as text when it holds text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true when the value is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::DateTime(value) => write!(f, "{value}"),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ============================================================================
// SECTION: Inference
// ============================================================================

/// Maps a sample value to the column type it should create.
///
/// Nulls and sequences carry no scalar type and map to [`PrimitiveType::Text`].
#[must_use]
pub const fn infer_type(value: &FieldValue) -> PrimitiveType {
    match value {
        FieldValue::Integer(_) => PrimitiveType::Integer,
        FieldValue::Boolean(_) => PrimitiveType::Boolean,
        FieldValue::Float(_) => PrimitiveType::Float,
        FieldValue::DateTime(_) => PrimitiveType::DateTime,
        FieldValue::Null | FieldValue::Text(_) | FieldValue::List(_) => PrimitiveType::Text,
    }
}

// ============================================================================
// SECTION: Coercion
// ============================================================================

/// Converts a value into the representation required by `target`.
///
/// Integer, boolean, and float targets parse or cast and fail when the value
/// is not convertible. Text and datetime targets pass scalars through and
/// serialize sequences to a delimited tuple form.
///
/// # Errors
///
/// Returns [`CoercionError`] when the value cannot be cast to `target`.
pub fn coerce(value: &FieldValue, target: PrimitiveType) -> Result<SqlValue, CoercionError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match target {
        PrimitiveType::Integer => coerce_integer(value).map(SqlValue::Integer),
        PrimitiveType::Boolean => coerce_boolean(value).map(SqlValue::Boolean),
        PrimitiveType::Float => coerce_float(value).map(SqlValue::Real),
        PrimitiveType::DateTime | PrimitiveType::Text => Ok(pass_through(value)),
    }
}

/// Casts a value to an integer.
fn coerce_integer(value: &FieldValue) -> Result<i64, CoercionError> {
    match value {
        FieldValue::Integer(integer) => Ok(*integer),
        FieldValue::Boolean(flag) => Ok(i64::from(*flag)),
        FieldValue::Float(float) => float_to_integer(*float)
            .ok_or_else(|| rejected(value, PrimitiveType::Integer, "float out of integer range")),
        FieldValue::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|err| rejected(value, PrimitiveType::Integer, &err.to_string())),
        FieldValue::Null | FieldValue::DateTime(_) | FieldValue::List(_) => {
            Err(rejected(value, PrimitiveType::Integer, "unsupported source type"))
        }
    }
}

/// Casts a value to a boolean.
fn coerce_boolean(value: &FieldValue) -> Result<bool, CoercionError> {
    match value {
        FieldValue::Boolean(flag) => Ok(*flag),
        FieldValue::Integer(integer) => Ok(*integer != 0),
        FieldValue::Float(float) => Ok(*float != 0.0),
        FieldValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(rejected(value, PrimitiveType::Boolean, "not a boolean literal")),
        },
        FieldValue::Null | FieldValue::DateTime(_) | FieldValue::List(_) => {
            Err(rejected(value, PrimitiveType::Boolean, "unsupported source type"))
        }
    }
}

/// Casts a value to a float.
fn coerce_float(value: &FieldValue) -> Result<f64, CoercionError> {
    match value {
        FieldValue::Float(float) => Ok(*float),
        FieldValue::Integer(integer) => Ok(integer_to_float(*integer)),
        FieldValue::Boolean(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        FieldValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| rejected(value, PrimitiveType::Float, &err.to_string())),
        FieldValue::Null | FieldValue::DateTime(_) | FieldValue::List(_) => {
            Err(rejected(value, PrimitiveType::Float, "unsupported source type"))
        }
    }
}

/// Truncates a finite float toward zero when it fits in an `i64`.
fn float_to_integer(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if !(I64_LOWER_BOUND..I64_UPPER_BOUND).contains(&truncated) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, reason = "Range is checked above.")]
    let integer = truncated as i64;
    Some(integer)
}

/// Widens an integer into a float column value.
#[allow(clippy::cast_precision_loss, reason = "Float columns accept rounded integers.")]
fn integer_to_float(value: i64) -> f64 {
    value as f64
}

/// Maps a value to its storable form without changing its type.
fn pass_through(value: &FieldValue) -> SqlValue {
    match value {
        FieldValue::Null => SqlValue::Null,
        FieldValue::Integer(integer) => SqlValue::Integer(*integer),
        FieldValue::Boolean(flag) => SqlValue::Boolean(*flag),
        FieldValue::Float(float) => SqlValue::Real(*float),
        FieldValue::DateTime(timestamp) => SqlValue::DateTime(*timestamp),
        FieldValue::Text(text) => SqlValue::Text(text.clone()),
        list @ FieldValue::List(_) => SqlValue::Text(list.to_string()),
    }
}

/// Builds a coercion error for a rejected value.
fn rejected(value: &FieldValue, target: PrimitiveType, reason: &str) -> CoercionError {
    CoercionError {
        field: None,
        target,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use proptest::prelude::*;
    use time::OffsetDateTime;

    use super::FieldValue;
    use super::PrimitiveType;
    use super::SqlValue;
    use super::coerce;
    use super::infer_type;

    #[test]
    fn infer_type_covers_every_scalar() {
        assert_eq!(infer_type(&FieldValue::Integer(1)), PrimitiveType::Integer);
        assert_eq!(infer_type(&FieldValue::Boolean(true)), PrimitiveType::Boolean);
        assert_eq!(infer_type(&FieldValue::Float(2.2)), PrimitiveType::Float);
        assert_eq!(
            infer_type(&FieldValue::DateTime(OffsetDateTime::UNIX_EPOCH)),
            PrimitiveType::DateTime
        );
        assert_eq!(infer_type(&FieldValue::from("s")), PrimitiveType::Text);
        assert_eq!(infer_type(&FieldValue::from(vec![1, 2])), PrimitiveType::Text);
        assert_eq!(infer_type(&FieldValue::Null), PrimitiveType::Text);
    }

    #[test]
    fn coerce_keeps_native_types() {
        assert_eq!(coerce(&FieldValue::Integer(1), PrimitiveType::Integer), Ok(SqlValue::Integer(1)));
        assert_eq!(
            coerce(&FieldValue::Boolean(false), PrimitiveType::Boolean),
            Ok(SqlValue::Boolean(false))
        );
        assert_eq!(coerce(&FieldValue::Float(1.1), PrimitiveType::Float), Ok(SqlValue::Real(1.1)));
    }

    #[test]
    fn coerce_parses_numeric_text() {
        assert_eq!(coerce(&FieldValue::from(" 42 "), PrimitiveType::Integer), Ok(SqlValue::Integer(42)));
        assert_eq!(coerce(&FieldValue::from("2.5"), PrimitiveType::Float), Ok(SqlValue::Real(2.5)));
        assert_eq!(coerce(&FieldValue::from("no"), PrimitiveType::Boolean), Ok(SqlValue::Boolean(false)));
    }

    #[test]
    fn coerce_truncates_floats_into_integer_columns() {
        assert_eq!(coerce(&FieldValue::Float(2.9), PrimitiveType::Integer), Ok(SqlValue::Integer(2)));
        assert!(coerce(&FieldValue::Float(f64::NAN), PrimitiveType::Integer).is_err());
        assert!(coerce(&FieldValue::Float(1e300), PrimitiveType::Integer).is_err());
    }

    #[test]
    fn coerce_rejects_unparseable_text() {
        let error = coerce(&FieldValue::from("abc"), PrimitiveType::Integer).unwrap_err();
        assert_eq!(error.target, PrimitiveType::Integer);
        assert_eq!(error.value, "'abc'");
        assert!(coerce(&FieldValue::from("maybe"), PrimitiveType::Boolean).is_err());
    }

    #[test]
    fn coerce_serializes_lists_for_text_columns() {
        let value = FieldValue::from(vec![1, 1]);
        assert_eq!(coerce(&value, PrimitiveType::Text), Ok(SqlValue::Text("(1, 1)".to_string())));
        let single = FieldValue::from(vec!["a"]);
        assert_eq!(coerce(&single, PrimitiveType::Text), Ok(SqlValue::Text("('a',)".to_string())));
        assert!(coerce(&value, PrimitiveType::Integer).is_err());
    }

    #[test]
    fn coerce_passes_nulls_through_every_target() {
        for target in [
            PrimitiveType::Integer,
            PrimitiveType::Boolean,
            PrimitiveType::Float,
            PrimitiveType::DateTime,
            PrimitiveType::Text,
        ] {
            assert_eq!(coerce(&FieldValue::Null, target), Ok(SqlValue::Null));
        }
    }

    #[test]
    fn json_values_convert_to_field_values() {
        let value = serde_json::json!({"a": [1, 2.5, "x", null], "b": {"c": true}});
        let serde_json::Value::Object(map) = value else {
            panic!("expected object");
        };
        assert_eq!(
            FieldValue::from(map["a"].clone()),
            FieldValue::List(vec![
                FieldValue::Integer(1),
                FieldValue::Float(2.5),
                FieldValue::from("x"),
                FieldValue::Null,
            ])
        );
        assert_eq!(FieldValue::from(map["b"].clone()), FieldValue::from(r#"{"c":true}"#));
    }

    proptest! {
        #[test]
        fn integer_text_round_trips_through_integer_columns(value in any::<i64>()) {
            let coerced = coerce(&FieldValue::Text(value.to_string()), PrimitiveType::Integer);
            prop_assert_eq!(coerced, Ok(SqlValue::Integer(value)));
        }

        #[test]
        fn text_targets_never_fail(text in ".*", integer in any::<i64>(), flag in any::<bool>()) {
            prop_assert!(coerce(&FieldValue::Text(text), PrimitiveType::Text).is_ok());
            prop_assert!(coerce(&FieldValue::Integer(integer), PrimitiveType::Text).is_ok());
            prop_assert!(coerce(&FieldValue::Boolean(flag), PrimitiveType::DateTime).is_ok());
        }
    }
}
