//! The standard builder set.
//!
//! Numeric kinds are registered narrowest first, so a call whose arguments
//! only match through widening lands on the smallest kind that holds both.
//! Each kind's plain builders are followed by their nullable variants.

use super::FunctionRegistry;
use crate::config::FunctionsConfig;
use crate::error::{Error, Result};
use crate::eval;
use crate::expr::{BinaryOp, Function, TypedExpr, UnaryOp};
use crate::types::{NumericKind, Type};
use crate::value::{Number, Value};
use chrono::{Datelike, Months, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use std::cmp::Ordering;

const NUMERIC_ORDER: [NumericKind; 11] = [
    NumericKind::I8,
    NumericKind::U8,
    NumericKind::I16,
    NumericKind::U16,
    NumericKind::I32,
    NumericKind::U32,
    NumericKind::I64,
    NumericKind::U64,
    NumericKind::F32,
    NumericKind::F64,
    NumericKind::Decimal,
];

const NUMERIC_OPERATORS: [BinaryOp; 11] = [
    BinaryOp::Add,
    BinaryOp::Subtract,
    BinaryOp::Multiply,
    BinaryOp::Divide,
    BinaryOp::Modulo,
    BinaryOp::Equal,
    BinaryOp::NotEqual,
    BinaryOp::GreaterThan,
    BinaryOp::GreaterThanOrEqual,
    BinaryOp::LessThan,
    BinaryOp::LessThanOrEqual,
];

const COMPARISONS: [BinaryOp; 6] = [
    BinaryOp::Equal,
    BinaryOp::NotEqual,
    BinaryOp::GreaterThan,
    BinaryOp::GreaterThanOrEqual,
    BinaryOp::LessThan,
    BinaryOp::LessThanOrEqual,
];

/// Register the builders `config` selects.
pub fn register(registry: &mut FunctionRegistry, config: &FunctionsConfig) {
    if config.standard_library {
        for kind in NUMERIC_ORDER {
            register_math(registry, kind);
        }
        register_strings(registry);
        register_enumerable(registry);
        register_datetime(registry);
        register_conditional(registry);
    } else {
        tracing::debug!("Standard function library disabled");
    }
    if config.include_boolean {
        register_boolean(registry);
    }
    tracing::debug!("Registered {} standard builders", registry.len());
}

fn operator(op: BinaryOp) -> impl Fn(&[TypedExpr]) -> Result<Option<TypedExpr>> + Send + Sync {
    move |args| TypedExpr::binary(op, args[0].clone(), args[1].clone()).map(Some)
}

fn negate(args: &[TypedExpr]) -> Result<Option<TypedExpr>> {
    TypedExpr::unary(UnaryOp::Negate, args[0].clone()).map(Some)
}

// ============================================================================
// Math
// ============================================================================

pub fn register_math(registry: &mut FunctionRegistry, kind: NumericKind) {
    let ty = Type::Numeric(kind);
    let signed = !kind.is_unsigned();

    for operand in [ty.clone(), Type::nullable(ty.clone())] {
        for op in NUMERIC_OPERATORS {
            registry.define(op.symbol(), [operand.clone(), operand.clone()], operator(op));
        }
        if signed {
            registry.define("-", [operand.clone()], negate);
        }
    }

    if signed {
        registry.define_function("abs", [ty.clone()], ty.clone(), move |args| {
            let number = match number_arg(args, 0, "abs")? {
                Number::Int(i) => Number::Int(i.abs()),
                Number::Float(f) => Number::Float(f.abs()),
                Number::Decimal(d) => Number::Decimal(d.abs()),
            };
            Value::from_number(number, kind)
        });
        registry.define_function("sign", [ty.clone()], Type::I32, |args| {
            let sign = match number_arg(args, 0, "sign")? {
                Number::Int(i) => i.signum() as i32,
                Number::Float(f) if f.is_nan() => {
                    return Err(Error::InvalidArgument("sign of NaN".into()))
                }
                Number::Float(f) if f == 0.0 => 0,
                Number::Float(f) => f.signum() as i32,
                Number::Decimal(d) if d.is_zero() => 0,
                Number::Decimal(d) if d.is_sign_negative() => -1,
                Number::Decimal(_) => 1,
            };
            Ok(Value::I32(sign))
        });
    }

    if matches!(kind, NumericKind::F64 | NumericKind::Decimal) {
        register_rounding(registry, kind);
    }

    if kind == NumericKind::F64 {
        registry.define_function("pow", [Type::F64, Type::F64], Type::F64, |args| {
            let (x, y) = (f64_arg(args, 0, "pow")?, f64_arg(args, 1, "pow")?);
            Ok(Value::F64(x.powf(y)))
        });
        registry.define_function("log", [Type::F64, Type::F64], Type::F64, |args| {
            let (x, base) = (f64_arg(args, 0, "log")?, f64_arg(args, 1, "log")?);
            Ok(Value::F64(x.log(base)))
        });
    }

    registry.define_function("min", [ty.clone(), ty.clone()], ty.clone(), |args| {
        pick(&args[0], &args[1], Ordering::Less)
    });
    registry.define_function("max", [ty.clone(), ty.clone()], ty.clone(), |args| {
        pick(&args[0], &args[1], Ordering::Greater)
    });
    registry.define_function("clamp", [ty.clone(), ty.clone(), ty.clone()], ty, |args| {
        let (value, min, max) = (&args[0], &args[1], &args[2]);
        if eval::compare(min, max) == Some(Ordering::Greater) {
            return Err(Error::InvalidArgument(format!(
                "clamp bounds are inverted: {min} > {max}"
            )));
        }
        let upper = pick(value, max, Ordering::Less)?;
        pick(&upper, min, Ordering::Greater)
    });
}

fn register_rounding(registry: &mut FunctionRegistry, kind: NumericKind) {
    let ty = Type::Numeric(kind);
    let rounding: [(&str, fn(f64) -> f64, fn(Decimal) -> Decimal); 3] = [
        ("round", f64::round_ties_even, |d| d.round()),
        ("floor", f64::floor, |d| d.floor()),
        ("ceiling", f64::ceil, |d| d.ceil()),
    ];
    for (method, float, decimal) in rounding {
        registry.define_function(method, [ty.clone()], ty.clone(), move |args| {
            Ok(match number_arg(args, 0, method)? {
                Number::Decimal(d) => Value::Decimal(decimal(d)),
                other => Value::F64(float(other.to_f64())),
            })
        });
    }
}

/// Return whichever of `a` and `b` sits on the `wanted` side. NaN wins.
fn pick(a: &Value, b: &Value, wanted: Ordering) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Err(Error::NullReference(format!("comparison of {a} and {b}")));
    }
    Ok(match eval::compare(a, b) {
        Some(ordering) if ordering == wanted.reverse() => b.clone(),
        Some(_) => a.clone(),
        None if a.as_f64().is_some_and(f64::is_nan) => a.clone(),
        None => b.clone(),
    })
}

fn number_arg(args: &[Value], index: usize, method: &str) -> Result<Number> {
    match args.get(index) {
        Some(Value::Null) | None => Err(Error::NullReference(format!(
            "argument {index} of {method}"
        ))),
        Some(value) => value.to_number().ok_or_else(|| {
            Error::TypeError(format!(
                "{method} expects a number, got {}",
                value.type_of()
            ))
        }),
    }
}

fn f64_arg(args: &[Value], index: usize, method: &str) -> Result<f64> {
    number_arg(args, index, method).map(Number::to_f64)
}

// ============================================================================
// Strings
// ============================================================================

pub fn register_strings(registry: &mut FunctionRegistry) {
    let s = || Type::String;

    registry.define("==", [s(), s()], operator(BinaryOp::Equal));
    registry.define("!=", [s(), s()], operator(BinaryOp::NotEqual));

    registry.define_function("length", [s()], Type::I32, |args| {
        let text = str_arg(args, 0, "length")?;
        Ok(Value::I32(char_count(text, "length")?))
    });
    registry.define_function("charat", [s(), Type::I32], Type::Char, |args| {
        let text = str_arg(args, 0, "charat")?;
        let index = i32_arg(args, 1, "charat")?;
        usize::try_from(index)
            .ok()
            .and_then(|i| text.chars().nth(i))
            .map(Value::Char)
            .ok_or_else(|| out_of_range("charat", index))
    });
    registry.define_function("contains", [s(), s()], Type::Bool, |args| {
        let (outer, inner) = (str_arg(args, 0, "contains")?, str_arg(args, 1, "contains")?);
        Ok(Value::Bool(outer.contains(inner)))
    });
    registry.define_function("indexof", [s(), s()], Type::I32, |args| {
        let (outer, inner) = (str_arg(args, 0, "indexof")?, str_arg(args, 1, "indexof")?);
        match outer.find(inner) {
            Some(byte) => Ok(Value::I32(char_count(&outer[..byte], "indexof")?)),
            None => Ok(Value::I32(-1)),
        }
    });
    registry.define_function("startswith", [s(), s()], Type::Bool, |args| {
        let (outer, prefix) = (
            str_arg(args, 0, "startswith")?,
            str_arg(args, 1, "startswith")?,
        );
        Ok(Value::Bool(outer.starts_with(prefix)))
    });
    registry.define_function(
        "substring",
        [s(), Type::I32, Type::I32],
        Type::String,
        |args| {
            let text = str_arg(args, 0, "substring")?;
            let start = i32_arg(args, 1, "substring")?;
            let length = i32_arg(args, 2, "substring")?;
            let from = byte_offset(text, start).ok_or_else(|| out_of_range("substring", start))?;
            let end = start
                .checked_add(length)
                .filter(|_| length >= 0)
                .and_then(|end| byte_offset(text, end))
                .ok_or_else(|| out_of_range("substring", length))?;
            Ok(Value::string(&text[from..end]))
        },
    );
    registry.define_function("substring", [s(), Type::I32], Type::String, |args| {
        let text = str_arg(args, 0, "substring")?;
        let start = i32_arg(args, 1, "substring")?;
        let from = byte_offset(text, start).ok_or_else(|| out_of_range("substring", start))?;
        Ok(Value::string(&text[from..]))
    });
    registry.define_function("concat", [s(), s()], Type::String, |args| {
        // Null concatenates as the empty string.
        let left = args[0].as_str().unwrap_or_default();
        let right = args[1].as_str().unwrap_or_default();
        Ok(Value::string(format!("{left}{right}")))
    });
    registry.define_function("replace", [s(), s(), s()], Type::String, |args| {
        let text = str_arg(args, 0, "replace")?;
        let old = str_arg(args, 1, "replace")?;
        if old.is_empty() {
            return Err(Error::InvalidArgument(
                "replace: the value to replace must not be empty".into(),
            ));
        }
        let new = args[2].as_str().unwrap_or_default();
        Ok(Value::string(text.replace(old, new)))
    });
    registry.define_function("insert", [s(), Type::I32, s()], Type::String, |args| {
        let outer = str_arg(args, 0, "insert")?;
        let index = i32_arg(args, 1, "insert")?;
        let inner = str_arg(args, 2, "insert")?;
        let at = byte_offset(outer, index).ok_or_else(|| out_of_range("insert", index))?;
        let mut result = String::with_capacity(outer.len() + inner.len());
        result.push_str(&outer[..at]);
        result.push_str(inner);
        result.push_str(&outer[at..]);
        Ok(Value::string(result))
    });

    let transforms: [(&str, fn(&str) -> String); 5] = [
        ("trim", |t| t.trim().to_string()),
        ("ltrim", |t| t.trim_start().to_string()),
        ("rtrim", |t| t.trim_end().to_string()),
        ("upper", str::to_uppercase),
        ("lower", str::to_lowercase),
    ];
    for (method, transform) in transforms {
        registry.define_function(method, [s()], Type::String, move |args| {
            Ok(Value::string(transform(str_arg(args, 0, method)?)))
        });
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, method: &str) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::NullReference(format!("argument {index} of {method}")))
}

fn i32_arg(args: &[Value], index: usize, method: &str) -> Result<i32> {
    match args.get(index) {
        Some(Value::I32(i)) => Ok(*i),
        _ => Err(Error::TypeError(format!(
            "argument {index} of {method} must be i32"
        ))),
    }
}

fn char_count(text: &str, method: &str) -> Result<i32> {
    i32::try_from(text.chars().count())
        .map_err(|_| Error::InvalidArgument(format!("{method}: string too long")))
}

/// Byte offset of the `index`th character; `index` may equal the length.
fn byte_offset(text: &str, index: i32) -> Option<usize> {
    let index = usize::try_from(index).ok()?;
    text.char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

fn out_of_range(method: &str, index: i32) -> Error {
    Error::InvalidArgument(format!("{method}: index {index} is out of range"))
}

// ============================================================================
// Sequences
// ============================================================================

pub fn register_enumerable(registry: &mut FunctionRegistry) {
    registry.define_with_context("contains", [Type::Enumerable, Type::Any], |ctx| {
        let sequence = &ctx.natural_args()[0];
        let Some(element) = sequence.ty().element_type() else {
            return Ok(None);
        };
        let Some(item) = ctx.try_build_argument_as(1, element)? else {
            return Ok(None);
        };
        let function = Function::new("contains", |args: &[Value]| {
            let items = sequence_arg(args, "contains")?;
            Ok(Value::Bool(
                items.iter().any(|candidate| eval::values_equal(candidate, &args[1])),
            ))
        });
        Ok(Some(TypedExpr::call(
            function,
            vec![sequence.clone(), item],
            Type::Bool,
        )))
    });

    registry.define_with_context("count", [Type::Enumerable], |ctx| {
        let sequence = &ctx.natural_args()[0];
        if sequence.ty().element_type().is_none() {
            return Ok(None);
        }
        let function = Function::new("count", |args: &[Value]| {
            let items = sequence_arg(args, "count")?;
            i32::try_from(items.len())
                .map(Value::I32)
                .map_err(|_| Error::overflow(items.len(), NumericKind::I32))
        });
        Ok(Some(TypedExpr::call(
            function,
            vec![sequence.clone()],
            Type::I32,
        )))
    });
}

fn sequence_arg<'a>(args: &'a [Value], method: &str) -> Result<&'a [Value]> {
    args.first()
        .and_then(Value::items)
        .ok_or_else(|| Error::NullReference(format!("sequence argument of {method}")))
}

// ============================================================================
// Booleans
// ============================================================================

pub fn register_boolean(registry: &mut FunctionRegistry) {
    registry.define("!", [Type::Bool], |args| {
        TypedExpr::unary(UnaryOp::Not, args[0].clone()).map(Some)
    });
    registry.define("==", [Type::Bool, Type::Bool], operator(BinaryOp::Equal));
    registry.define("!=", [Type::Bool, Type::Bool], operator(BinaryOp::NotEqual));
    registry.define("and", [Type::Bool, Type::Bool], operator(BinaryOp::And));
    registry.define("or", [Type::Bool, Type::Bool], operator(BinaryOp::Or));
    registry.define("xor", [Type::Bool, Type::Bool], operator(BinaryOp::Xor));
}

/// `if(test, a, b)`. The branches must agree on a type: either they already
/// do, one converts implicitly to the other, or one is null and the other
/// becomes nullable.
pub fn register_conditional(registry: &mut FunctionRegistry) {
    registry.define_with_context("if", [Type::Bool, Type::Any, Type::Any], |ctx| {
        let test = ctx.args()[0].clone();
        let (a, b) = (&ctx.natural_args()[1], &ctx.natural_args()[2]);

        if a.ty() == b.ty() {
            return TypedExpr::conditional(test, a.clone(), b.clone()).map(Some);
        }
        if let Some(b) = ctx.try_build_argument_as(2, a.ty())? {
            return TypedExpr::conditional(test, a.clone(), b).map(Some);
        }
        if let Some(a) = ctx.try_build_argument_as(1, b.ty())? {
            return TypedExpr::conditional(test, a, b.clone()).map(Some);
        }
        let widened = match (a.ty(), b.ty()) {
            (Type::Null, other) | (other, Type::Null) => Type::nullable(other.clone()),
            _ => return Ok(None),
        };
        let a = ctx.try_build_argument_as(1, &widened)?;
        let b = ctx.try_build_argument_as(2, &widened)?;
        match (a, b) {
            (Some(a), Some(b)) => TypedExpr::conditional(test, a, b).map(Some),
            _ => Ok(None),
        }
    });
}

// ============================================================================
// Date and time
// ============================================================================

pub fn register_datetime(registry: &mut FunctionRegistry) {
    let dt = || Type::DateTime;

    registry.define_function("now", Vec::<Type>::new(), dt(), |_| {
        Ok(Value::DateTime(chrono::Local::now().naive_local()))
    });
    for op in COMPARISONS {
        registry.define(op.symbol(), [dt(), dt()], operator(op));
    }

    let additions: [(&str, f64); 5] = [
        ("add_milliseconds", 1.0),
        ("add_seconds", 1_000.0),
        ("add_minutes", 60_000.0),
        ("add_hours", 3_600_000.0),
        ("add_days", 86_400_000.0),
    ];
    for (method, millis_per_unit) in additions {
        registry.define_function(method, [dt(), Type::F64], dt(), move |args| {
            let start = datetime_arg(args, 0, method)?;
            let amount = f64_arg(args, 1, method)?;
            add_millis(start, amount * millis_per_unit, method).map(Value::DateTime)
        });
    }
    registry.define_function("add_months", [dt(), Type::I32], dt(), |args| {
        let start = datetime_arg(args, 0, "add_months")?;
        add_months(start, i32_arg(args, 1, "add_months")?, "add_months").map(Value::DateTime)
    });
    registry.define_function("add_years", [dt(), Type::I32], dt(), |args| {
        let start = datetime_arg(args, 0, "add_years")?;
        let years = i32_arg(args, 1, "add_years")?;
        let months = years
            .checked_mul(12)
            .ok_or_else(|| date_out_of_range("add_years"))?;
        add_months(start, months, "add_years").map(Value::DateTime)
    });

    let differences: [(&str, fn(TimeDelta) -> i64); 5] = [
        ("diff_milliseconds", |d| d.num_milliseconds()),
        ("diff_seconds", |d| d.num_seconds()),
        ("diff_minutes", |d| d.num_minutes()),
        ("diff_hours", |d| d.num_hours()),
        ("diff_days", |d| d.num_days()),
    ];
    for (method, units) in differences {
        registry.define_function(method, [dt(), dt()], Type::I32, move |args| {
            let left = datetime_arg(args, 0, method)?;
            let right = datetime_arg(args, 1, method)?;
            let elapsed = units(left.signed_duration_since(right));
            i32::try_from(elapsed)
                .map(Value::I32)
                .map_err(|_| Error::overflow(elapsed, NumericKind::I32))
        });
    }
    registry.define_function("diff_months", [dt(), dt()], Type::I32, |args| {
        let left = datetime_arg(args, 0, "diff_months")?;
        let right = datetime_arg(args, 1, "diff_months")?;
        Ok(Value::I32(month_difference(left, right)))
    });
    registry.define_function("diff_years", [dt(), dt()], Type::I32, |args| {
        let left = datetime_arg(args, 0, "diff_years")?;
        let right = datetime_arg(args, 1, "diff_years")?;
        Ok(Value::I32(month_difference(left, right) / 12))
    });
}

fn datetime_arg(args: &[Value], index: usize, method: &str) -> Result<NaiveDateTime> {
    args.get(index)
        .and_then(Value::as_datetime)
        .ok_or_else(|| Error::NullReference(format!("argument {index} of {method}")))
}

fn date_out_of_range(method: &str) -> Error {
    Error::InvalidArgument(format!("{method}: result is outside the date-time range"))
}

/// Add a fractional number of milliseconds, rounded to the nearest one.
fn add_millis(start: NaiveDateTime, millis: f64, method: &str) -> Result<NaiveDateTime> {
    let rounded = millis.round();
    if !rounded.is_finite() || rounded.abs() > i64::MAX as f64 {
        return Err(date_out_of_range(method));
    }
    TimeDelta::try_milliseconds(rounded as i64)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(|| date_out_of_range(method))
}

/// Calendar month arithmetic; the day is clamped to the end of a shorter month.
fn add_months(start: NaiveDateTime, months: i32, method: &str) -> Result<NaiveDateTime> {
    let delta = Months::new(months.unsigned_abs());
    let moved = if months >= 0 {
        start.checked_add_months(delta)
    } else {
        start.checked_sub_months(delta)
    };
    moved.ok_or_else(|| date_out_of_range(method))
}

/// Whole calendar months from `right` to `left`. A month only counts once
/// the day of month has been reached; the sign follows `left - right`.
fn month_difference(left: NaiveDateTime, right: NaiveDateTime) -> i32 {
    let (start, end, sign) = if left >= right {
        (right, left, 1)
    } else {
        (left, right, -1)
    };
    let years = end.year() - start.year();
    let mut months = years * 12 + end.month() as i32 - start.month() as i32 - 1;
    if end.day() >= start.day() {
        months += 1;
    }
    months * sign
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LateBinding;
    use crate::compiler::ExpressionCompiler;
    use crate::types::RecordType;
    use crate::value::RecordValue;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn sample() -> Arc<RecordType> {
        RecordType::builder("Sample")
            .field("small", Type::U8)
            .field("count", Type::I32)
            .field("total", Type::I64)
            .field("ratio", Type::F64)
            .field("amount", Type::DECIMAL)
            .field("discount", Type::nullable(Type::I32))
            .field("name", Type::String)
            .field("tags", Type::sequence(Type::String))
            .field("scores", Type::sequence(Type::I32))
            .field("created", Type::DateTime)
            .build()
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn record() -> Value {
        RecordValue::new(&sample())
            .with("small", 7u8)
            .unwrap()
            .with("count", 3)
            .unwrap()
            .with("total", 10i64)
            .unwrap()
            .with("ratio", 2.5)
            .unwrap()
            .with("amount", Decimal::new(255, 1))
            .unwrap()
            .with("name", "  Widget  ")
            .unwrap()
            .with(
                "tags",
                Value::sequence(Type::String, [Value::string("a"), Value::string("b")]),
            )
            .unwrap()
            .with(
                "scores",
                Value::sequence(Type::I32, [Value::I32(5), Value::I32(9)]),
            )
            .unwrap()
            .with("created", date(2024, 1, 31))
            .unwrap()
            .into()
    }

    fn compile(expr: &LateBinding) -> Result<TypedExpr> {
        let compiler = ExpressionCompiler::new(Arc::new(FunctionRegistry::standard()));
        compiler.build(&TypedExpr::target(Type::Record(sample())), expr)
    }

    fn run(expr: LateBinding) -> Result<Value> {
        compile(&expr)?.evaluate(&record())
    }

    fn call<const N: usize>(method: &str, args: [LateBinding; N]) -> LateBinding {
        LateBinding::call(method, args)
    }

    fn f(path: &str) -> LateBinding {
        LateBinding::field(path)
    }

    fn c(value: impl Into<Value>) -> LateBinding {
        LateBinding::constant(value)
    }

    #[test]
    fn test_mixed_widths_pick_narrowest_common_kind() {
        let expr = compile(&call("+", [f("count"), f("total")])).unwrap();
        assert_eq!(expr.ty(), &Type::I64);
        assert_eq!(run(call("+", [f("count"), f("total")])).unwrap(), Value::I64(13));

        let expr = compile(&call("*", [f("small"), c(2)])).unwrap();
        assert_eq!(expr.ty(), &Type::U8);
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(
            run(call("/", [f("count"), c(0)])).unwrap_err(),
            Error::DivideByZero
        );
        assert!(matches!(
            run(call("*", [f("small"), c(100)])),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn test_nullable_operands() {
        let expr = compile(&call("+", [f("discount"), f("count")])).unwrap();
        assert_eq!(expr.ty(), &Type::nullable(Type::I32));
        assert_eq!(run(call("+", [f("discount"), f("count")])).unwrap(), Value::Null);
        assert_eq!(
            run(call("==", [f("discount"), LateBinding::null()])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run(call(">", [f("discount"), c(1)])).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(run(call("abs", [c(-4)])).unwrap(), Value::I32(4));
        assert!(matches!(
            run(call("abs", [c(i32::MIN)])),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(run(call("sign", [f("ratio")])).unwrap(), Value::I32(1));
        assert_eq!(run(call("-", [f("count")])).unwrap(), Value::I32(-3));
        assert_eq!(run(call("round", [f("ratio")])).unwrap(), Value::F64(2.0));
        assert_eq!(
            run(call("round", [f("amount")])).unwrap(),
            Value::Decimal(Decimal::new(26, 0))
        );
        assert_eq!(
            run(call("floor", [f("amount")])).unwrap(),
            Value::Decimal(Decimal::new(25, 0))
        );
        assert_eq!(run(call("ceiling", [f("ratio")])).unwrap(), Value::F64(3.0));
        assert_eq!(run(call("pow", [f("ratio"), c(2)])).unwrap(), Value::F64(6.25));
        assert_eq!(run(call("max", [f("count"), c(8)])).unwrap(), Value::I32(8));
        assert_eq!(run(call("min", [f("count"), c(8)])).unwrap(), Value::I32(3));
        assert_eq!(
            run(call("clamp", [f("count"), c(5), c(10)])).unwrap(),
            Value::I32(5)
        );
        assert!(matches!(
            run(call("clamp", [f("count"), c(10), c(5)])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rounding_is_to_even() {
        assert_eq!(run(call("round", [c(2.5f64)])).unwrap(), Value::F64(2.0));
        assert_eq!(run(call("round", [c(3.5f64)])).unwrap(), Value::F64(4.0));
    }

    #[test]
    fn test_string_functions() {
        let trimmed = call("trim", [f("name")]);
        assert_eq!(run(trimmed.clone()).unwrap(), Value::string("Widget"));
        assert_eq!(run(call("length", [trimmed.clone()])).unwrap(), Value::I32(6));
        assert_eq!(run(call("upper", [trimmed.clone()])).unwrap(), Value::string("WIDGET"));
        assert_eq!(run(call("charat", [trimmed.clone(), c(1)])).unwrap(), Value::Char('i'));
        assert_eq!(run(call("indexof", [trimmed.clone(), c("dg")])).unwrap(), Value::I32(2));
        assert_eq!(run(call("indexof", [trimmed.clone(), c("x")])).unwrap(), Value::I32(-1));
        assert_eq!(
            run(call("substring", [trimmed.clone(), c(1), c(3)])).unwrap(),
            Value::string("idg")
        );
        assert_eq!(
            run(call("substring", [trimmed.clone(), c(4)])).unwrap(),
            Value::string("et")
        );
        assert_eq!(
            run(call("insert", [trimmed.clone(), c(0), c(">")])).unwrap(),
            Value::string(">Widget")
        );
        assert_eq!(
            run(call("replace", [trimmed.clone(), c("W"), c("G")])).unwrap(),
            Value::string("Gidget")
        );
        assert_eq!(
            run(call("contains", [trimmed.clone(), c("dge")])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run(call("concat", [c("a"), LateBinding::null()])).unwrap(),
            Value::string("a")
        );
    }

    #[test]
    fn test_string_argument_errors() {
        assert!(matches!(
            run(call("substring", [f("name"), c(20)])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            run(call("charat", [f("name"), c(-1)])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            run(call("replace", [f("name"), c(""), c("x")])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            run(call("upper", [LateBinding::null()])),
            Err(Error::NullReference(_))
        ));
    }

    #[test]
    fn test_sequence_contains_rebuilds_item() {
        assert_eq!(run(call("contains", [f("tags"), c("b")])).unwrap(), Value::Bool(true));
        assert_eq!(run(call("contains", [f("scores"), c(9)])).unwrap(), Value::Bool(true));
        assert_eq!(run(call("contains", [f("scores"), f("small")])).unwrap(), Value::Bool(false));
        // A string item cannot be an i32, so every overload declines.
        assert!(matches!(
            compile(&call("contains", [f("scores"), c("nine")])),
            Err(Error::NoApplicableOverload { .. })
        ));
        assert_eq!(run(call("count", [f("tags")])).unwrap(), Value::I32(2));
    }

    #[test]
    fn test_boolean_operators() {
        let positive = call(">", [f("count"), c(0)]);
        assert_eq!(
            run(call("and", [positive.clone(), call("!", [c(false)])])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run(call("xor", [positive.clone(), c(true)])).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_boolean_can_be_left_out() {
        let mut registry = FunctionRegistry::new();
        register(
            &mut registry,
            &FunctionsConfig {
                standard_library: true,
                include_boolean: false,
            },
        );
        assert!(!registry.contains("and"));
        assert!(registry.contains("+"));

        let mut only_boolean = FunctionRegistry::new();
        register(
            &mut only_boolean,
            &FunctionsConfig {
                standard_library: false,
                include_boolean: true,
            },
        );
        assert!(only_boolean.contains("xor"));
        assert!(!only_boolean.contains("+"));
        assert_eq!(only_boolean.len(), 6);
    }

    #[test]
    fn test_conditional() {
        let expr = call("if", [call(">", [f("count"), c(1)]), f("total"), c(0)]);
        assert_eq!(compile(&expr).unwrap().ty(), &Type::I64);
        assert_eq!(run(expr).unwrap(), Value::I64(10));

        let expr = call("if", [c(false), f("count"), LateBinding::null()]);
        assert_eq!(compile(&expr).unwrap().ty(), &Type::nullable(Type::I32));
        assert_eq!(run(expr).unwrap(), Value::Null);
    }

    #[test]
    fn test_datetime_arithmetic() {
        assert_eq!(
            run(call("add_months", [f("created"), c(1)])).unwrap(),
            Value::DateTime(date(2024, 2, 29))
        );
        assert_eq!(
            run(call("add_years", [f("created"), c(-1)])).unwrap(),
            Value::DateTime(date(2023, 1, 31))
        );
        assert_eq!(
            run(call("add_days", [f("created"), c(1.5f64)])).unwrap(),
            Value::DateTime(date(2024, 2, 1) + TimeDelta::hours(12))
        );
        assert_eq!(
            run(call("diff_days", [c("2024-03-01"), f("created")])).unwrap(),
            Value::I32(30)
        );
        assert_eq!(
            run(call("<", [f("created"), c("2024-02-01")])).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_month_difference() {
        assert_eq!(month_difference(date(2024, 3, 15), date(2024, 1, 15)), 2);
        assert_eq!(month_difference(date(2024, 3, 14), date(2024, 1, 15)), 1);
        assert_eq!(month_difference(date(2024, 1, 15), date(2024, 3, 15)), -2);
        assert_eq!(month_difference(date(2026, 1, 1), date(2024, 1, 1)) / 12, 2);
        assert_eq!(month_difference(date(2025, 12, 31), date(2024, 1, 1)) / 12, 1);
    }
}
