//! Conversion between runtime values and JSON.
//!
//! # Design
//!
//! - Trait `ToJson` turns a [`Value`] into a `serde_json::Value`
//! - [`from_json`] goes the other way, guided by the static [`Type`] the
//!   value must have
//!
//! Records and projections become objects with their members in declaration
//! order. Date-times are written as `YYYY-MM-DDTHH:MM:SS.fff`, decimals as
//! JSON numbers and enum values by variant name.
//!
//! # Example
//!
//! ```rust,ignore
//! use latebinding::json::ToJson;
//!
//! let value = Value::string("hello");
//! assert_eq!(value.to_json(), serde_json::json!("hello"));
//! ```

use crate::conversion;
use crate::error::{Error, Result};
use crate::types::{NumericKind, Type};
use crate::value::{RecordValue, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub trait ToJson {
    fn to_json(&self) -> JsonValue;
}

impl ToJson for Value {
    fn to_json(&self) -> JsonValue {
        value_to_json(self)
    }
}

impl ToJson for [Value] {
    fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.iter().map(value_to_json).collect())
    }
}

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Char(c) => JsonValue::String(c.to_string()),
        Value::I8(v) => serde_json::json!(v),
        Value::U8(v) => serde_json::json!(v),
        Value::I16(v) => serde_json::json!(v),
        Value::U16(v) => serde_json::json!(v),
        Value::I32(v) => serde_json::json!(v),
        Value::U32(v) => serde_json::json!(v),
        Value::I64(v) => serde_json::json!(v),
        Value::U64(v) => serde_json::json!(v),
        // Non-finite floats have no JSON form and become null.
        Value::F32(v) => serde_json::json!(v),
        Value::F64(v) => serde_json::json!(v),
        Value::Decimal(d) => d
            .to_f64()
            .map(|f| serde_json::json!(f))
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
        Value::Enum { ty, value } => match ty.variant_name(*value) {
            Some(name) => JsonValue::String(name.to_string()),
            None => serde_json::json!(value),
        },
        Value::Sequence { items, .. } => items.to_json(),
        Value::Record(record) => {
            let mut map = Map::new();
            for (member, field) in record.record_type().members().iter().zip(record.fields()) {
                map.insert(member.name().to_string(), value_to_json(field));
            }
            JsonValue::Object(map)
        }
        Value::Projection(instance) => {
            let mut map = Map::new();
            for (name, slot) in instance.iter() {
                map.insert(name.to_string(), value_to_json(slot));
            }
            JsonValue::Object(map)
        }
    }
}

/// Decode `json` as a value of type `ty`.
///
/// Object keys are matched to record members ignoring case; members missing
/// from the object keep their default value, unknown keys are rejected.
/// Projection types cannot be decoded.
pub fn from_json(json: &JsonValue, ty: &Type) -> Result<Value> {
    let mismatch = || {
        Error::TypeError(format!("JSON value {json} cannot be read as {ty}"))
    };

    if json.is_null() {
        return if ty.is_nullable_capable() {
            Ok(Value::Null)
        } else {
            Err(mismatch())
        };
    }

    match ty {
        Type::Nullable(inner) => from_json(json, inner),
        Type::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
        Type::Numeric(kind) => number_from_json(json, *kind).ok_or_else(mismatch)?,
        Type::String => json.as_str().map(Value::string).ok_or_else(mismatch),
        Type::Char | Type::DateTime | Type::Enum(_) => {
            let text = json.as_str().ok_or_else(mismatch)?;
            conversion::convert_literal(&Value::string(text), ty).ok_or_else(mismatch)
        }
        Type::Sequence(element) => {
            let items = json
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|item| from_json(item, element))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::sequence((**element).clone(), items))
        }
        Type::Record(record_type) => {
            let object = json.as_object().ok_or_else(mismatch)?;
            let mut record = RecordValue::new(record_type);
            for (key, field) in object {
                let member = record_type
                    .members()
                    .iter()
                    .find(|m| m.name().eq_ignore_ascii_case(key))
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "{} has no member '{key}'",
                            record_type.name()
                        ))
                    })?;
                let value = from_json(field, member.ty())?;
                record.set(member.name(), value)?;
            }
            Ok(Value::Record(std::sync::Arc::new(record)))
        }
        Type::Any | Type::Enumerable => untyped_from_json(json),
        Type::Null | Type::Projection(_) => Err(mismatch()),
    }
}

fn number_from_json(json: &JsonValue, kind: NumericKind) -> Option<Result<Value>> {
    let number = json.as_number()?;
    let literal = if let Some(i) = number.as_i64() {
        Value::I64(i)
    } else if let Some(u) = number.as_u64() {
        Value::U64(u)
    } else if kind == NumericKind::Decimal {
        // Keep the digits as written rather than going through f64.
        Value::Decimal(Decimal::from_str(&number.to_string()).ok()?)
    } else {
        Value::F64(number.as_f64()?)
    };
    Some(
        conversion::convert_literal(&literal, &Type::Numeric(kind))
            .ok_or_else(|| Error::overflow(number, kind)),
    )
}

/// Values for slots typed `Any`: JSON's own types map onto the closest value.
fn untyped_from_json(json: &JsonValue) -> Result<Value> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::I64(i),
            None => n
                .as_f64()
                .and_then(Decimal::from_f64)
                .map(Value::Decimal)
                .unwrap_or(Value::F64(n.as_f64().unwrap_or(f64::NAN))),
        },
        JsonValue::String(s) => Value::string(s.as_str()),
        JsonValue::Array(items) => Value::sequence(
            Type::Any,
            items
                .iter()
                .map(untyped_from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        JsonValue::Object(_) => {
            return Err(Error::TypeError(
                "objects can only be read into a record type".into(),
            ))
        }
    })
}
