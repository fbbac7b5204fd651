//! Runtime values produced by evaluating compiled expressions.

use crate::error::{Error, Result};
use crate::projection::ProjectionInstance;
use crate::types::{EnumType, NumericKind, RecordType, Type};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(Arc<str>),
    DateTime(NaiveDateTime),
    Enum { ty: Arc<EnumType>, value: i64 },
    Sequence { element: Type, items: Arc<[Value]> },
    Record(Arc<RecordValue>),
    Projection(Arc<ProjectionInstance>),
}

/// Numeric view of a value, wide enough to hold every kind without loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i128),
    Float(f64),
    Decimal(Decimal),
}

impl Number {
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn sequence(element: Type, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence {
            element,
            items: items.into_iter().collect(),
        }
    }

    pub fn zero(kind: NumericKind) -> Self {
        match kind {
            NumericKind::I8 => Value::I8(0),
            NumericKind::U8 => Value::U8(0),
            NumericKind::I16 => Value::I16(0),
            NumericKind::U16 => Value::U16(0),
            NumericKind::I32 => Value::I32(0),
            NumericKind::U32 => Value::U32(0),
            NumericKind::I64 => Value::I64(0),
            NumericKind::U64 => Value::U64(0),
            NumericKind::F32 => Value::F32(0.0),
            NumericKind::F64 => Value::F64(0.0),
            NumericKind::Decimal => Value::Decimal(Decimal::ZERO),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.to_number()? {
            Number::Int(i) => i64::try_from(i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.numeric_kind()?;
        self.to_number().map(Number::to_f64)
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_projection(&self) -> Option<&ProjectionInstance> {
        match self {
            Value::Projection(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            Value::I8(_) => Some(NumericKind::I8),
            Value::U8(_) => Some(NumericKind::U8),
            Value::I16(_) => Some(NumericKind::I16),
            Value::U16(_) => Some(NumericKind::U16),
            Value::I32(_) => Some(NumericKind::I32),
            Value::U32(_) => Some(NumericKind::U32),
            Value::I64(_) => Some(NumericKind::I64),
            Value::U64(_) => Some(NumericKind::U64),
            Value::F32(_) => Some(NumericKind::F32),
            Value::F64(_) => Some(NumericKind::F64),
            Value::Decimal(_) => Some(NumericKind::Decimal),
            _ => None,
        }
    }

    /// The runtime type of this value. `Null` reports [`Type::Null`].
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::String(_) => Type::String,
            Value::DateTime(_) => Type::DateTime,
            Value::Enum { ty, .. } => Type::Enum(ty.clone()),
            Value::Sequence { element, .. } => Type::sequence(element.clone()),
            Value::Record(record) => Type::Record(record.record_type().clone()),
            Value::Projection(instance) => Type::Projection(instance.projection_type().clone()),
            numeric => match numeric.numeric_kind() {
                Some(kind) => Type::Numeric(kind),
                None => Type::Any,
            },
        }
    }

    /// Numeric view of numeric, char and enum values.
    pub(crate) fn to_number(&self) -> Option<Number> {
        Some(match self {
            Value::I8(v) => Number::Int(*v as i128),
            Value::U8(v) => Number::Int(*v as i128),
            Value::I16(v) => Number::Int(*v as i128),
            Value::U16(v) => Number::Int(*v as i128),
            Value::I32(v) => Number::Int(*v as i128),
            Value::U32(v) => Number::Int(*v as i128),
            Value::I64(v) => Number::Int(*v as i128),
            Value::U64(v) => Number::Int(*v as i128),
            Value::F32(v) => Number::Float(*v as f64),
            Value::F64(v) => Number::Float(*v),
            Value::Decimal(d) => Number::Decimal(*d),
            Value::Char(c) => Number::Int(*c as u32 as i128),
            Value::Enum { value, .. } => Number::Int(*value as i128),
            _ => return None,
        })
    }

    /// Build a value of `kind` from `number`, failing when it does not fit.
    /// Fractions are truncated toward zero when the target is an integer kind.
    pub(crate) fn from_number(number: Number, kind: NumericKind) -> Result<Value> {
        match kind {
            NumericKind::F64 => Ok(Value::F64(number.to_f64())),
            NumericKind::F32 => {
                let wide = number.to_f64();
                let narrow = wide as f32;
                if wide.is_finite() && !narrow.is_finite() {
                    return Err(Error::overflow(wide, kind));
                }
                Ok(Value::F32(narrow))
            }
            NumericKind::Decimal => {
                let decimal = match number {
                    Number::Int(i) => Decimal::try_from_i128_with_scale(i, 0).ok(),
                    Number::Float(f) => Decimal::from_f64(f),
                    Number::Decimal(d) => Some(d),
                };
                decimal
                    .map(Value::Decimal)
                    .ok_or_else(|| Error::overflow(number.to_f64(), kind))
            }
            _ => {
                let int = match number {
                    Number::Int(i) => i,
                    Number::Float(f) => {
                        let truncated = f.trunc();
                        if !truncated.is_finite() || truncated.abs() > 1e38 {
                            return Err(Error::overflow(f, kind));
                        }
                        truncated as i128
                    }
                    Number::Decimal(d) => d
                        .trunc()
                        .to_i128()
                        .ok_or_else(|| Error::overflow(d, kind))?,
                };
                Self::from_integer(int, kind)
            }
        }
    }

    fn from_integer(int: i128, kind: NumericKind) -> Result<Value> {
        let overflow = || Error::overflow(int, kind);
        Ok(match kind {
            NumericKind::I8 => Value::I8(i8::try_from(int).map_err(|_| overflow())?),
            NumericKind::U8 => Value::U8(u8::try_from(int).map_err(|_| overflow())?),
            NumericKind::I16 => Value::I16(i16::try_from(int).map_err(|_| overflow())?),
            NumericKind::U16 => Value::U16(u16::try_from(int).map_err(|_| overflow())?),
            NumericKind::I32 => Value::I32(i32::try_from(int).map_err(|_| overflow())?),
            NumericKind::U32 => Value::U32(u32::try_from(int).map_err(|_| overflow())?),
            NumericKind::I64 => Value::I64(i64::try_from(int).map_err(|_| overflow())?),
            NumericKind::U64 => Value::U64(u64::try_from(int).map_err(|_| overflow())?),
            other => return Self::from_number(Number::Int(int), other),
        })
    }

    /// Type a numeric literal from its source text.
    ///
    /// Integers take the first of `i32`, `u32`, `i64`, `u64` that holds them,
    /// then `decimal`. Literals with a fraction or exponent become `decimal`
    /// when representable and `f64` otherwise.
    pub fn parse_numeric_literal(text: &str) -> Result<Value> {
        let text = text.trim();
        let malformed = || Error::MalformedExpression(format!("invalid numeric literal '{text}'"));
        if text.is_empty() {
            return Err(malformed());
        }

        if !text.contains(['.', 'e', 'E']) {
            if let Ok(int) = text.parse::<i128>() {
                for kind in [
                    NumericKind::I32,
                    NumericKind::U32,
                    NumericKind::I64,
                    NumericKind::U64,
                ] {
                    if let Ok(value) = Self::from_integer(int, kind) {
                        return Ok(value);
                    }
                }
                if let Ok(d) = Decimal::try_from_i128_with_scale(int, 0) {
                    return Ok(Value::Decimal(d));
                }
            }
        }

        if let Ok(d) = Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)) {
            return Ok(Value::Decimal(d));
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::F64(f)),
            _ => Err(malformed()),
        }
    }

    /// Parse `YYYY-MM-DD[ HH:MM[:SS[.fff]]]`. A `T` may separate date and time.
    pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        const FORMATS: [&str; 6] = [
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%dT%H:%M",
        ];
        FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::Enum { ty, value } => match ty.variant_name(*value) {
                Some(name) => write!(f, "{}.{name}", ty.name()),
                None => write!(f, "{}({value})", ty.name()),
            },
            Value::Sequence { items, .. } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(record) => write!(f, "{}{{..}}", record.record_type().name()),
            Value::Projection(instance) => {
                f.write_str("{")?;
                for (i, (name, value)) in instance.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<RecordValue> for Value {
    fn from(record: RecordValue) -> Self {
        Value::Record(Arc::new(record))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Records
// ============================================================================

/// An instance of a [`RecordType`]; one slot per member.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    ty: Arc<RecordType>,
    fields: Vec<Value>,
}

impl RecordValue {
    pub fn new(ty: &Arc<RecordType>) -> Self {
        Self {
            ty: ty.clone(),
            fields: ty
                .members()
                .iter()
                .map(|m| m.ty().default_value())
                .collect(),
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    pub fn with(mut self, member: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(member, value.into())?;
        Ok(self)
    }

    pub fn set(&mut self, member: &str, value: Value) -> Result<()> {
        let index = self.ty.member_index(member).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "record type '{}' has no member '{member}'",
                self.ty.name()
            ))
        })?;
        let ty = self.ty.members()[index].ty();
        if !crate::conversion::conforms(&value, ty) {
            return Err(Error::TypeError(format!(
                "cannot store {} value in member '{member}' of type {ty}",
                value.type_of()
            )));
        }
        self.fields[index] = value;
        Ok(())
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.ty.member_index(member).map(|i| &self.fields[i])
    }

    /// Field values in member declaration order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub(crate) fn field(&self, index: usize) -> &Value {
        &self.fields[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_literals_take_smallest_kind() {
        assert_eq!(Value::parse_numeric_literal("42").unwrap(), Value::I32(42));
        assert_eq!(
            Value::parse_numeric_literal("3000000000").unwrap(),
            Value::U32(3_000_000_000)
        );
        assert_eq!(
            Value::parse_numeric_literal("-3000000000").unwrap(),
            Value::I64(-3_000_000_000)
        );
        assert_eq!(
            Value::parse_numeric_literal("18446744073709551615").unwrap(),
            Value::U64(u64::MAX)
        );
        assert!(matches!(
            Value::parse_numeric_literal("18446744073709551616").unwrap(),
            Value::Decimal(_)
        ));
    }

    #[test]
    fn test_fraction_literals_prefer_decimal() {
        assert_eq!(
            Value::parse_numeric_literal("1.5").unwrap(),
            Value::Decimal(Decimal::new(15, 1))
        );
        assert_eq!(
            Value::parse_numeric_literal("1e2").unwrap(),
            Value::Decimal(Decimal::new(100, 0))
        );
        assert_eq!(
            Value::parse_numeric_literal("1e300").unwrap(),
            Value::F64(1e300)
        );
        assert!(Value::parse_numeric_literal("abc").is_err());
        assert!(Value::parse_numeric_literal("").is_err());
    }

    #[test]
    fn test_from_number_range_checks() {
        assert_eq!(
            Value::from_number(Number::Int(255), NumericKind::U8).unwrap(),
            Value::U8(255)
        );
        assert!(matches!(
            Value::from_number(Number::Int(256), NumericKind::U8),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(
            Value::from_number(Number::Float(-2.9), NumericKind::I32).unwrap(),
            Value::I32(-2)
        );
        assert!(Value::from_number(Number::Float(f64::NAN), NumericKind::I64).is_err());
        assert!(Value::from_number(Number::Float(1e300), NumericKind::F32).is_err());
        assert_eq!(
            Value::from_number(Number::Decimal(Decimal::new(75, 1)), NumericKind::I16).unwrap(),
            Value::I16(7)
        );
    }

    #[test]
    fn test_parse_datetime_formats() {
        let full = Value::parse_datetime("2024-02-29 13:45:10.250").unwrap();
        assert_eq!(full.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2024-02-29 13:45:10.250");
        assert!(Value::parse_datetime("2024-02-29 13:45").is_some());
        assert!(Value::parse_datetime("2024-02-29T13:45:10").is_some());
        let date = Value::parse_datetime("2024-02-29").unwrap();
        assert_eq!(date.format("%H:%M").to_string(), "00:00");
        assert!(Value::parse_datetime("2023-02-29").is_none());
        assert!(Value::parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Null.type_of(), Type::Null);
        assert_eq!(Value::from(1u16).type_of(), Type::U16);
        assert_eq!(
            Value::sequence(Type::String, ["a".into()]).type_of(),
            Type::sequence(Type::String)
        );
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_record_value_checks_member_types() {
        let ty = RecordType::builder("Item")
            .field("qty", Type::I32)
            .field("note", Type::String)
            .build()
            .unwrap();
        let record = RecordValue::new(&ty).with("qty", 3).unwrap();
        assert_eq!(record.get("qty"), Some(&Value::I32(3)));
        assert_eq!(record.get("note"), Some(&Value::Null));

        let mut record = record;
        assert!(matches!(
            record.set("qty", Value::string("x")),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            record.set("missing", Value::I32(1)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(record.set("note", Value::Null).is_ok());
    }
}
