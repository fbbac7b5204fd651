//! Untyped late-binding expressions.
//!
//! A [`LateBinding`] names fields and functions by string. Nothing is
//! resolved until the tree is compiled against a concrete target type.

use crate::error::Result;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LateBinding {
    /// A literal value.
    Constant(Value),
    /// A dotted member path relative to the target, e.g. `customer.address.city`.
    Field(String),
    /// A function or operator applied to argument expressions.
    Call {
        method: String,
        args: Vec<LateBinding>,
    },
}

impl LateBinding {
    pub fn constant(value: impl Into<Value>) -> Self {
        LateBinding::Constant(value.into())
    }

    pub fn null() -> Self {
        LateBinding::Constant(Value::Null)
    }

    /// A numeric literal typed from its source text.
    pub fn number(text: &str) -> Result<Self> {
        Value::parse_numeric_literal(text).map(LateBinding::Constant)
    }

    pub fn field(path: impl Into<String>) -> Self {
        LateBinding::Field(path.into())
    }

    pub fn call(method: impl Into<String>, args: impl IntoIterator<Item = LateBinding>) -> Self {
        LateBinding::Call {
            method: method.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, LateBinding::Constant(_))
    }
}

impl fmt::Display for LateBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LateBinding::Constant(value) => write!(f, "{value}"),
            LateBinding::Field(path) => f.write_str(path),
            LateBinding::Call { method, args } => {
                write!(f, "{method}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// JSON wire shape of a late-binding expression.
///
/// ```json
/// {"call": "+", "args": [{"field": "price"}, {"const": 1.5}]}
/// ```
///
/// Numbers are typed with [`Value::parse_numeric_literal`]; strings, booleans
/// and `null` map to the matching constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LateBindingJson {
    Constant {
        #[serde(rename = "const")]
        value: serde_json::Value,
    },
    Field {
        field: String,
    },
    Call {
        call: String,
        #[serde(default)]
        args: Vec<LateBindingJson>,
    },
}

impl LateBindingJson {
    pub fn into_late_binding(self) -> Result<LateBinding> {
        use crate::error::Error;
        Ok(match self {
            LateBindingJson::Field { field } => LateBinding::Field(field),
            LateBindingJson::Call { call, args } => LateBinding::Call {
                method: call,
                args: args
                    .into_iter()
                    .map(LateBindingJson::into_late_binding)
                    .collect::<Result<_>>()?,
            },
            LateBindingJson::Constant { value } => LateBinding::Constant(match value {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::Bool(b),
                serde_json::Value::String(s) => Value::from(s),
                serde_json::Value::Number(n) => Value::parse_numeric_literal(&n.to_string())?,
                other => {
                    return Err(Error::MalformedExpression(format!(
                        "unsupported constant {other}"
                    )))
                }
            }),
        })
    }
}

impl LateBinding {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let wire: LateBindingJson = serde_json::from_str(json)
            .map_err(|e| crate::error::Error::MalformedExpression(e.to_string()))?;
        wire.into_late_binding()
    }
}
