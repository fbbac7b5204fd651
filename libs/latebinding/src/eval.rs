//! Tree-walking evaluation of compiled expressions.
//!
//! Integer arithmetic is checked: results that do not fit the operand kind
//! are reported as [`Error::Overflow`]. Arithmetic and comparisons over a
//! null operand follow the lifted rules: arithmetic yields null, ordering
//! comparisons yield `false`, and equality treats two nulls as equal.

use crate::conversion;
use crate::error::{Error, Result};
use crate::expr::{BinaryOp, ExprKind, TypedExpr, UnaryOp};
use crate::types::{Intrinsic, MemberRef, NumericKind};
use crate::value::{Number, Value};
use chrono::{Datelike, Timelike};
use std::cmp::Ordering;
use std::sync::Arc;

pub fn evaluate(expr: &TypedExpr, target: &Value) -> Result<Value> {
    match expr.kind() {
        ExprKind::Target => Ok(target.clone()),
        ExprKind::Constant(value) => Ok(value.clone()),
        ExprKind::Member {
            target: owner,
            member,
        } => {
            let owner_value = evaluate(owner, target)?;
            read_member(&owner_value, member, expr)
        }
        ExprKind::Convert {
            operand,
            conversion,
        } => conversion::apply(evaluate(operand, target)?, conversion),
        ExprKind::Unary { op, operand } => unary(*op, evaluate(operand, target)?),
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                if !truthy(&evaluate(left, target)?, op.symbol())? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&evaluate(right, target)?, op.symbol())?))
            }
            BinaryOp::Or => {
                if truthy(&evaluate(left, target)?, op.symbol())? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&evaluate(right, target)?, op.symbol())?))
            }
            _ => binary(
                *op,
                &evaluate(left, target)?,
                &evaluate(right, target)?,
            ),
        },
        ExprKind::Conditional {
            test,
            if_true,
            if_false,
        } => {
            if truthy(&evaluate(test, target)?, "condition")? {
                evaluate(if_true, target)
            } else {
                evaluate(if_false, target)
            }
        }
        ExprKind::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, target))
                .collect::<Result<Vec<_>>>()?;
            function.invoke(&values)
        }
        ExprKind::New {
            projection,
            bindings,
        } => {
            let mut instance = projection.new_instance();
            for (slot, binding) in bindings {
                instance.set_slot(*slot, evaluate(binding, target)?)?;
            }
            Ok(Value::Projection(Arc::new(instance)))
        }
    }
}

fn read_member(owner: &Value, member: &MemberRef, expr: &TypedExpr) -> Result<Value> {
    if let MemberRef::Intrinsic {
        member: Intrinsic::HasValue,
        ..
    } = member
    {
        return Ok(Value::Bool(!owner.is_null()));
    }
    if owner.is_null() {
        return Err(Error::NullReference(expr.to_string()));
    }

    match member {
        MemberRef::Record { index, .. } => match owner {
            Value::Record(record) => Ok(record.field(*index).clone()),
            other => Err(mismatch(other, expr)),
        },
        MemberRef::Projection { index, .. } => match owner {
            Value::Projection(instance) => Ok(instance.slot(*index).clone()),
            other => Err(mismatch(other, expr)),
        },
        MemberRef::Intrinsic { member, .. } => intrinsic(owner, *member, expr),
    }
}

fn intrinsic(owner: &Value, member: Intrinsic, expr: &TypedExpr) -> Result<Value> {
    // Date parts are small enough for i32.
    let as_i32 = |v: u32| Value::I32(v as i32);
    Ok(match (member, owner) {
        (Intrinsic::StringLength, Value::String(s)) => length(s.chars().count())?,
        (Intrinsic::Count, Value::Sequence { items, .. }) => length(items.len())?,
        (Intrinsic::NullableValue, value) => value.clone(),
        (Intrinsic::Year, Value::DateTime(dt)) => Value::I32(dt.year()),
        (Intrinsic::Month, Value::DateTime(dt)) => as_i32(dt.month()),
        (Intrinsic::Day, Value::DateTime(dt)) => as_i32(dt.day()),
        (Intrinsic::Hour, Value::DateTime(dt)) => as_i32(dt.hour()),
        (Intrinsic::Minute, Value::DateTime(dt)) => as_i32(dt.minute()),
        (Intrinsic::Second, Value::DateTime(dt)) => as_i32(dt.second()),
        (Intrinsic::Millisecond, Value::DateTime(dt)) => {
            as_i32(dt.nanosecond() / 1_000_000)
        }
        (Intrinsic::DayOfYear, Value::DateTime(dt)) => as_i32(dt.ordinal()),
        (_, other) => return Err(mismatch(other, expr)),
    })
}

fn length(len: usize) -> Result<Value> {
    i32::try_from(len)
        .map(Value::I32)
        .map_err(|_| Error::overflow(len, NumericKind::I32))
}

fn mismatch(value: &Value, expr: &TypedExpr) -> Error {
    Error::TypeError(format!(
        "value of type {} cannot be accessed as '{expr}'",
        value.type_of()
    ))
}

fn truthy(value: &Value, context: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        Error::TypeError(format!("{context} expects bool, got {}", value.type_of()))
    })
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(&operand, "!")?)),
        UnaryOp::Negate => {
            if operand.is_null() {
                return Ok(Value::Null);
            }
            let kind = numeric_kind(&operand, "-")?;
            let negated = match number(&operand)? {
                Number::Int(i) => Number::Int(-i),
                Number::Float(f) => Number::Float(-f),
                Number::Decimal(d) => Number::Decimal(-d),
            };
            Value::from_number(negated, kind)
        }
    }
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let symbol = op.symbol();
    Ok(Value::Bool(match op {
        BinaryOp::Equal => values_equal(left, right),
        BinaryOp::NotEqual => !values_equal(left, right),
        BinaryOp::LessThan => compare(left, right) == Some(Ordering::Less),
        BinaryOp::LessThanOrEqual => matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        BinaryOp::GreaterThan => compare(left, right) == Some(Ordering::Greater),
        BinaryOp::GreaterThanOrEqual => matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        BinaryOp::And => truthy(left, symbol)? && truthy(right, symbol)?,
        BinaryOp::Or => truthy(left, symbol)? || truthy(right, symbol)?,
        BinaryOp::Xor => truthy(left, symbol)? ^ truthy(right, symbol)?,
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => return arithmetic(op, left, right),
    }))
}

fn numeric_kind(value: &Value, symbol: &str) -> Result<NumericKind> {
    value.numeric_kind().ok_or_else(|| {
        Error::TypeError(format!(
            "operator {symbol} is not defined for {}",
            value.type_of()
        ))
    })
}

fn number(value: &Value) -> Result<Number> {
    value
        .to_number()
        .ok_or_else(|| Error::TypeError(format!("{} is not numeric", value.type_of())))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let kind = numeric_kind(left, op.symbol())?;
    let overflow = || Error::overflow(format!("{left} {} {right}", op.symbol()), kind);

    let result = match (number(left)?, number(right)?) {
        (Number::Int(a), Number::Int(b)) => {
            let value = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                    return Err(Error::DivideByZero)
                }
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => None,
            };
            Number::Int(value.ok_or_else(overflow)?)
        }
        (Number::Decimal(a), Number::Decimal(b)) => {
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b.is_zero() {
                return Err(Error::DivideByZero);
            }
            let value = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => None,
            };
            Number::Decimal(value.ok_or_else(overflow)?)
        }
        (a, b) => {
            let (a, b) = (a.to_f64(), b.to_f64());
            Number::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(overflow()),
            })
        }
    };
    Value::from_number(result, kind)
}

/// Equality used by `==`, `!=` and sequence membership. Two nulls are equal,
/// null never equals a non-null value.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match compare(left, right) {
            Some(ordering) => ordering == Ordering::Equal,
            None => left == right,
        },
    }
}

/// Ordering of two values of comparable types. `None` when either is null or
/// the types do not order against each other.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Enum { ty: ta, value: a }, Value::Enum { ty: tb, value: b }) if ta == tb => {
            Some(a.cmp(b))
        }
        _ => {
            left.numeric_kind()?;
            right.numeric_kind()?;
            match (left.to_number()?, right.to_number()?) {
                (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
                (Number::Decimal(a), Number::Decimal(b)) => Some(a.cmp(&b)),
                (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
            }
        }
    }
}

/// Total order used for sorting: nulls first, incomparable values equal.
pub fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_integer_arithmetic_is_checked() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::I32(2), &Value::I32(3)).unwrap(),
            Value::I32(5)
        );
        assert!(matches!(
            binary(BinaryOp::Add, &Value::I32(i32::MAX), &Value::I32(1)),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::Subtract, &Value::U8(0), &Value::U8(1)),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::Divide, &Value::I64(1), &Value::I64(0)),
            Err(Error::DivideByZero)
        ));
        assert_eq!(
            binary(BinaryOp::Divide, &Value::I32(-7), &Value::I32(2)).unwrap(),
            Value::I32(-3)
        );
        assert_eq!(
            binary(BinaryOp::Modulo, &Value::I32(-7), &Value::I32(2)).unwrap(),
            Value::I32(-1)
        );
    }

    #[test]
    fn test_decimal_and_float_arithmetic() {
        let a = Value::Decimal(Decimal::new(1999, 2));
        let b = Value::Decimal(Decimal::new(1, 0));
        assert_eq!(
            binary(BinaryOp::Add, &a, &b).unwrap(),
            Value::Decimal(Decimal::new(2099, 2))
        );
        assert!(matches!(
            binary(BinaryOp::Divide, &a, &Value::Decimal(Decimal::ZERO)),
            Err(Error::DivideByZero)
        ));
        assert_eq!(
            binary(BinaryOp::Divide, &Value::F64(1.0), &Value::F64(0.0)).unwrap(),
            Value::F64(f64::INFINITY)
        );
        assert_eq!(
            binary(BinaryOp::Multiply, &Value::F32(1.5), &Value::F32(2.0)).unwrap(),
            Value::F32(3.0)
        );
    }

    #[test]
    fn test_null_propagation() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Null, &Value::I32(1)).unwrap(),
            Value::Null
        );
        assert_eq!(
            binary(BinaryOp::Equal, &Value::Null, &Value::Null).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(BinaryOp::NotEqual, &Value::Null, &Value::I32(1)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(BinaryOp::LessThan, &Value::Null, &Value::I32(1)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_length_beyond_i32_overflows() {
        assert_eq!(length(3).unwrap(), Value::I32(3));
        assert_eq!(length(i32::MAX as usize).unwrap(), Value::I32(i32::MAX));
        assert!(matches!(
            length(i32::MAX as usize + 1),
            Err(Error::Overflow {
                target: NumericKind::I32,
                ..
            })
        ));
    }

    #[test]
    fn test_sort_order_puts_nulls_first() {
        let mut values = vec![Value::I32(3), Value::Null, Value::I32(1)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![Value::Null, Value::I32(1), Value::I32(3)]);
    }

    #[test]
    fn test_compare_strings_and_dates() {
        assert_eq!(
            compare(&Value::string("a"), &Value::string("b")),
            Some(Ordering::Less)
        );
        assert_eq!(compare(&Value::string("a"), &Value::I32(1)), None);
        assert!(values_equal(&Value::string("x"), &Value::string("x")));
    }
}
