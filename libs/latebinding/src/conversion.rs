//! Type conversion rules.
//!
//! Decides whether a value of one type may be converted to another and how.
//! Implicit conversions are the ones the compiler inserts on its own while
//! resolving overloads: lossless numeric widening, lifting into nullable,
//! upcasts and user conversions declared implicit. Explicit mode admits
//! every conversion between numeric, char and enum types as well.

use crate::error::{Error, Result};
use crate::types::{ConversionDirection, EnumType, NumericKind, Type, UserConversion};
use crate::value::{Number, Value};
use std::sync::Arc;

/// How a value is transformed when converted between two types.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// No change in representation: upcasts, boxing and `T` to `T?`.
    Reference,
    Numeric(NumericKind),
    ToChar,
    ToEnum(Arc<EnumType>),
    /// `T?` to `U?`; null passes through.
    Lifted(Box<Conversion>),
    /// `T?` to `U`; null is an error.
    Unwrap(Box<Conversion>),
    User(Arc<UserConversion>),
}

/// Implicit numeric widening table.
pub fn is_implicit_numeric(from: NumericKind, to: NumericKind) -> bool {
    use NumericKind::*;
    let targets: &[NumericKind] = match from {
        U8 => &[U16, I16, U32, I32, U64, I64, F32, F64, Decimal],
        I8 => &[I16, I32, I64, F32, F64, Decimal],
        I16 => &[I32, I64, F32, F64, Decimal],
        U16 => &[U32, I32, U64, I64, F32, F64, Decimal],
        I32 => &[I64, F32, F64, Decimal],
        U32 => &[U64, I64, F32, F64, Decimal],
        I64 | U64 => &[F32, F64, Decimal],
        F32 => &[F64],
        F64 | Decimal => &[],
    };
    targets.contains(&to)
}

fn char_widens_to(to: NumericKind) -> bool {
    use NumericKind::*;
    matches!(to, U16 | U32 | I32 | U64 | I64 | F32 | F64 | Decimal)
}

/// Whether a value of type `from` can be used where `to` is expected without
/// any change in representation.
pub fn is_assignable(from: &Type, to: &Type) -> bool {
    if from == to || *to == Type::Any {
        return true;
    }
    match (from, to) {
        (Type::Null, to) => to.is_nullable_capable(),
        (from, Type::Nullable(inner)) => from == inner.as_ref(),
        (Type::Sequence(_), Type::Enumerable) => true,
        (Type::Sequence(a), Type::Sequence(b)) => a.is_reference_type() && is_assignable(a, b),
        (Type::Record(a), Type::Record(b)) => a.is_subtype_of(b),
        _ => false,
    }
}

/// Whether `from` converts to `to`. With `implicit_only` only the
/// conversions the compiler may insert silently are considered.
pub fn can_convert(from: &Type, to: &Type, implicit_only: bool) -> bool {
    plan(from, to, implicit_only).is_some()
}

/// Work out how to convert `from` into `to`, or `None` when no conversion
/// exists in the requested mode.
pub fn plan(from: &Type, to: &Type, implicit_only: bool) -> Option<Conversion> {
    if is_assignable(from, to) {
        return Some(Conversion::Reference);
    }
    if *from == Type::Null {
        return None;
    }

    match (from, to) {
        (Type::Nullable(a), Type::Nullable(b)) => {
            return plan(a, b, implicit_only).map(|c| Conversion::Lifted(Box::new(c)));
        }
        (from, Type::Nullable(b)) => return plan(from, b, implicit_only),
        (Type::Nullable(a), to) => {
            if implicit_only {
                return None;
            }
            return plan(a, to, false).map(|c| Conversion::Unwrap(Box::new(c)));
        }
        _ => {}
    }

    if is_primitive(from) && is_primitive(to) {
        return primitive(from, to, implicit_only);
    }

    user_conversion(from, to, implicit_only).map(Conversion::User)
}

fn is_primitive(ty: &Type) -> bool {
    matches!(ty, Type::Char | Type::Numeric(_) | Type::Enum(_))
}

fn primitive(from: &Type, to: &Type, implicit_only: bool) -> Option<Conversion> {
    let target = match to {
        Type::Numeric(kind) => Conversion::Numeric(*kind),
        Type::Char => Conversion::ToChar,
        Type::Enum(ty) => Conversion::ToEnum(ty.clone()),
        _ => return None,
    };
    if !implicit_only {
        return Some(target);
    }
    let widens = match (from, to) {
        (Type::Numeric(a), Type::Numeric(b)) => is_implicit_numeric(*a, *b),
        (Type::Char, Type::Numeric(b)) => char_widens_to(*b),
        _ => false,
    };
    widens.then_some(target)
}

/// Find a user conversion declared on either side. Conversions into `to`
/// must be declared on `to` itself; conversions out of `from` may be
/// declared on `from` or any of its bases.
fn user_conversion(from: &Type, to: &Type, implicit_only: bool) -> Option<Arc<UserConversion>> {
    let usable = |c: &&Arc<UserConversion>| !implicit_only || c.is_implicit();

    if let Type::Record(record) = from {
        let found = record.ancestry().find_map(|ty| {
            ty.conversions()
                .iter()
                .filter(usable)
                .find(|c| matches!(c.direction(), ConversionDirection::Into(target) if target == to))
                .cloned()
        });
        if found.is_some() {
            return found;
        }
    }

    if let Type::Record(record) = to {
        return record
            .conversions()
            .iter()
            .filter(usable)
            .find(|c| {
                matches!(c.direction(), ConversionDirection::From(source) if is_assignable(from, source))
            })
            .cloned();
    }

    None
}

/// Whether `value` may be stored in a slot of type `ty` as is.
pub fn conforms(value: &Value, ty: &Type) -> bool {
    is_assignable(&value.type_of(), ty)
}

/// Convert a constant to `ty` when the constant's value is representable in
/// it. Unlike [`plan`] this inspects the value, so `300` fits `u16` but not
/// `u8`, and a string holding a date becomes a date-time.
pub fn convert_literal(value: &Value, ty: &Type) -> Option<Value> {
    if conforms(value, ty) {
        return Some(value.clone());
    }
    if value.is_null() {
        return None;
    }
    match ty {
        Type::Nullable(inner) => convert_literal(value, inner),
        Type::Numeric(kind) => {
            let number = match value {
                Value::Char(_) | Value::Enum { .. } | Value::Bool(_) => return None,
                other => other.to_number()?,
            };
            if kind.is_integer() && !is_integral(number) {
                return None;
            }
            Value::from_number(number, *kind).ok()
        }
        Type::DateTime => value
            .as_str()
            .and_then(Value::parse_datetime)
            .map(Value::DateTime),
        Type::Char => {
            let s = value.as_str()?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Value::Char(c)),
                _ => None,
            }
        }
        Type::Enum(enum_type) => {
            let discriminant = match value {
                Value::String(s) => enum_type.value_of(s)?,
                other => {
                    let number = other.numeric_kind().and(other.to_number())?;
                    match number {
                        Number::Int(i) => i64::try_from(i).ok()?,
                        _ => return None,
                    }
                }
            };
            Some(Value::Enum {
                ty: enum_type.clone(),
                value: discriminant,
            })
        }
        _ => None,
    }
}

fn is_integral(number: Number) -> bool {
    match number {
        Number::Int(_) => true,
        Number::Float(f) => f.fract() == 0.0,
        Number::Decimal(d) => d.fract().is_zero(),
    }
}

/// Apply a planned conversion to a runtime value.
pub fn apply(value: Value, conversion: &Conversion) -> Result<Value> {
    match conversion {
        Conversion::Reference => Ok(value),
        Conversion::Lifted(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                apply(value, inner)
            }
        }
        Conversion::Unwrap(inner) => {
            if value.is_null() {
                Err(Error::NullReference("nullable value".into()))
            } else {
                apply(value, inner)
            }
        }
        Conversion::User(user) => {
            if value.is_null() {
                return Err(Error::NullReference("user conversion operand".into()));
            }
            user.apply(&value)
        }
        Conversion::Numeric(kind) => {
            let number = numeric_operand(&value)?;
            Value::from_number(number, *kind)
        }
        Conversion::ToChar => {
            let number = numeric_operand(&value)?;
            Value::from_number(number, NumericKind::U16)?
                .as_i64()
                .and_then(|code| u32::try_from(code).ok())
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(|| Error::overflow(number.to_f64(), NumericKind::U16))
        }
        Conversion::ToEnum(ty) => {
            let number = numeric_operand(&value)?;
            let discriminant = Value::from_number(number, ty.underlying())?
                .as_i64()
                .ok_or_else(|| Error::overflow(number.to_f64(), ty.underlying()))?;
            Ok(Value::Enum {
                ty: ty.clone(),
                value: discriminant,
            })
        }
    }
}

fn numeric_operand(value: &Value) -> Result<Number> {
    match value {
        Value::Null => Err(Error::NullReference("conversion operand".into())),
        other => other.to_number().ok_or_else(|| {
            Error::TypeError(format!("cannot convert {} numerically", other.type_of()))
        }),
    }
}
