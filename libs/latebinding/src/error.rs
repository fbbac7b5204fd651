//! Error types for expression compilation, evaluation and projection generation.

use crate::types::NumericKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// `BadQuery` errors are caused by the expression or query handed to the
/// compiler and are safe to report back to whoever wrote it. `Internal`
/// errors point at a misconfigured host (type model, builders, config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    BadQuery,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("type '{ty}' has no member named '{member}' (in path '{path}')")]
    MemberNotFound {
        ty: String,
        member: String,
        path: String,
    },

    #[error("member '{member}' on type '{ty}' is ambiguous: {count} members match ignoring case")]
    AmbiguousMember {
        ty: String,
        member: String,
        count: usize,
    },

    #[error("no applicable overload of '{method}' for arguments ({})", .argument_types.join(", "))]
    NoApplicableOverload {
        method: String,
        argument_types: Vec<String>,
    },

    #[error("expression '{expression}' of type '{found}' cannot be converted to '{expected}'")]
    IncompatibleType {
        expression: String,
        expected: String,
        found: String,
    },

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("null reference while evaluating '{0}'")]
    NullReference(String),

    #[error("value {value} is out of range for {target}")]
    Overflow { value: String, target: NumericKind },

    #[error("division by zero")]
    DivideByZero,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MemberNotFound { .. }
            | Error::AmbiguousMember { .. }
            | Error::NoApplicableOverload { .. }
            | Error::IncompatibleType { .. }
            | Error::MalformedExpression(_)
            | Error::InvalidProjection(_)
            | Error::NullReference(_)
            | Error::Overflow { .. }
            | Error::DivideByZero => ErrorCategory::BadQuery,
            Error::InvalidArgument(_)
            | Error::Config(_)
            | Error::TypeError(_) => ErrorCategory::Internal,
        }
    }

    pub(crate) fn overflow(value: impl ToString, target: NumericKind) -> Self {
        Error::Overflow {
            value: value.to_string(),
            target,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_message_lists_argument_types() {
        let err = Error::NoApplicableOverload {
            method: "+".into(),
            argument_types: vec!["string".into(), "bool".into()],
        };
        assert_eq!(
            err.to_string(),
            "no applicable overload of '+' for arguments (string, bool)"
        );
        assert_eq!(err.category(), ErrorCategory::BadQuery);
    }

    #[test]
    fn test_configuration_errors_are_internal() {
        assert_eq!(
            Error::Config("bad".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_bad_selection_names_are_a_bad_query() {
        assert_eq!(
            Error::InvalidProjection("dup".into()).category(),
            ErrorCategory::BadQuery
        );
    }
}
