//! Late-binding expression compiler.
//!
//! Turns a [`LateBinding`] tree into a [`TypedExpr`] against a concrete
//! target. Field paths are resolved member by member, ignoring case.
//! Calls are resolved against the [`FunctionRegistry`]:
//!
//! 1. Every argument is compiled once without an expected type.
//! 2. For each builder whose arity matches, an argument whose natural type
//!    equals the parameter type is used as is. Any other argument is compiled
//!    again against the parameter type: a literal must be representable in
//!    it, a field must convert implicitly, and a nested call resolves its own
//!    overload with the parameter as its expected type.
//! 3. Builders where every argument matched exactly are tried first, then
//!    the rest, each group in registration order. A builder that declines
//!    passes the call on to the next candidate.

use crate::ast::LateBinding;
use crate::conversion;
use crate::error::{Error, Result};
use crate::expr::TypedExpr;
use crate::functions::{BuildContext, Builder, FunctionRegistry};
use crate::types::{MemberKey, MemberRef, RecordType, Type};
use std::collections::HashMap;
use std::sync::Arc;

pub type OverrideFn = dyn Fn(TypedExpr) -> Result<TypedExpr> + Send + Sync;

#[derive(Clone)]
struct MemberOverride {
    rewrite: Arc<OverrideFn>,
    only_on_direct: bool,
}

/// Result of compiling one node: either an expression, or a soft failure
/// that the caller may recover from by trying something else.
enum Built {
    Expr(TypedExpr),
    Declined(Error),
}

#[derive(Clone)]
pub struct ExpressionCompiler {
    functions: Arc<FunctionRegistry>,
    overrides: HashMap<MemberKey, MemberOverride>,
}

impl ExpressionCompiler {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            functions,
            overrides: HashMap::new(),
        }
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Replace every access to `member` of `owner` with the expression
    /// `rewrite` builds from the owning expression.
    ///
    /// With `only_on_direct` the override applies only where the member is
    /// the last segment of a field path; intermediate uses resolve normally.
    pub fn define_member_override<F>(
        &mut self,
        owner: &Arc<RecordType>,
        member: &str,
        only_on_direct: bool,
        rewrite: F,
    ) -> Result<&mut Self>
    where
        F: Fn(TypedExpr) -> Result<TypedExpr> + Send + Sync + 'static,
    {
        let key = record_member_key(owner, member)?;
        let replaced = self.overrides.insert(
            key,
            MemberOverride {
                rewrite: Arc::new(rewrite),
                only_on_direct,
            },
        );
        if replaced.is_some() {
            tracing::debug!("Overwriting member override for {}.{}", owner.name(), member);
        }
        Ok(self)
    }

    pub fn remove_member_override(&mut self, owner: &Arc<RecordType>, member: &str) -> bool {
        record_member_key(owner, member)
            .map(|key| self.overrides.remove(&key).is_some())
            .unwrap_or(false)
    }

    /// Compile `expr` with its natural type.
    pub fn build(&self, target: &TypedExpr, expr: &LateBinding) -> Result<TypedExpr> {
        match self.build_node(target, expr, None)? {
            Built::Expr(built) => Ok(built),
            Built::Declined(err) => Err(err),
        }
    }

    /// Compile `expr` so that it produces a value of type `ty`.
    pub fn build_as(&self, target: &TypedExpr, expr: &LateBinding, ty: &Type) -> Result<TypedExpr> {
        match self.build_node(target, expr, Some(ty))? {
            Built::Expr(built) => Ok(built),
            Built::Declined(err) => Err(err),
        }
    }

    /// Like [`build_as`](Self::build_as), but `Ok(None)` when `expr` is
    /// well formed yet cannot be made into `ty`.
    pub fn try_build_as(
        &self,
        target: &TypedExpr,
        expr: &LateBinding,
        ty: &Type,
    ) -> Result<Option<TypedExpr>> {
        match self.build_node(target, expr, Some(ty))? {
            Built::Expr(built) => Ok(Some(built)),
            Built::Declined(err) => {
                tracing::trace!("Could not build {} as {}: {}", expr, ty, err);
                Ok(None)
            }
        }
    }

    fn build_node(
        &self,
        target: &TypedExpr,
        expr: &LateBinding,
        required: Option<&Type>,
    ) -> Result<Built> {
        match expr {
            LateBinding::Constant(value) => match required {
                None => Ok(Built::Expr(TypedExpr::constant(value.clone()))),
                Some(ty) => Ok(
                    match conversion::convert_literal(value, ty)
                        .map(|converted| TypedExpr::constant_typed(converted, ty.clone()))
                    {
                        Some(Ok(built)) => Built::Expr(built),
                        Some(Err(err)) => Built::Declined(err),
                        None => Built::Declined(incompatible(expr, ty, &value.type_of())),
                    },
                ),
            },
            LateBinding::Field(path) => {
                let resolved = self.resolve_field_path(target, path)?;
                Ok(match required {
                    None => Built::Expr(resolved),
                    Some(ty) => {
                        let found = resolved.ty().clone();
                        match resolved.convert_to(ty, true) {
                            Some(converted) => Built::Expr(converted),
                            None => Built::Declined(incompatible(expr, ty, &found)),
                        }
                    }
                })
            }
            LateBinding::Call { method, args } => self.resolve_call(target, method, args, required),
        }
    }

    /// Resolve a dotted member path starting at `target`.
    pub fn resolve_field_path(&self, target: &TypedExpr, path: &str) -> Result<TypedExpr> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::MalformedExpression(format!(
                "field path '{path}' has an empty segment"
            )));
        }

        let mut current = target.clone();
        for (i, segment) in segments.iter().enumerate() {
            let member = unique_member(current.ty(), segment, path)?;
            let is_last = i + 1 == segments.len();
            let member_override = member
                .key()
                .and_then(|key| self.overrides.get(&key))
                .filter(|o| !o.only_on_direct || is_last);

            current = match member_override {
                Some(o) => (o.rewrite)(current)?,
                None => TypedExpr::member(current, member),
            };
        }
        Ok(current)
    }

    fn resolve_call(
        &self,
        target: &TypedExpr,
        method: &str,
        args: &[LateBinding],
        required: Option<&Type>,
    ) -> Result<Built> {
        let natural = args
            .iter()
            .map(|arg| self.build(target, arg))
            .collect::<Result<Vec<_>>>()?;
        let no_overload = || {
            Built::Declined(Error::NoApplicableOverload {
                method: method.to_string(),
                argument_types: natural.iter().map(|arg| arg.ty().to_string()).collect(),
            })
        };

        let mut perfect: Vec<(&Arc<Builder>, Vec<TypedExpr>)> = Vec::new();
        let mut partial: Vec<(&Arc<Builder>, Vec<TypedExpr>)> = Vec::new();
        for builder in self.functions.lookup(method) {
            if builder.arity() != natural.len() {
                continue;
            }
            match self.coerce_arguments(target, args, &natural, builder.parameter_types())? {
                Some((coerced, true)) => perfect.push((builder, coerced)),
                Some((coerced, false)) => partial.push((builder, coerced)),
                None => {}
            }
        }

        for (builder, coerced) in perfect.into_iter().chain(partial) {
            let ctx = BuildContext::new(self, target, method, args, &natural, coerced);
            let Some(built) = builder.build(&ctx)? else {
                tracing::trace!("Builder {} declined", builder.signature());
                continue;
            };
            match required {
                None => return Ok(Built::Expr(built)),
                Some(ty) => match built.convert_to(ty, true) {
                    Some(converted) => return Ok(Built::Expr(converted)),
                    None => {
                        tracing::trace!("Builder {} result is not convertible to {}", builder.signature(), ty);
                    }
                },
            }
        }

        tracing::debug!(
            "No applicable overload of {} for {} arguments",
            method,
            natural.len()
        );
        Ok(no_overload())
    }

    /// Make `args` fit `params`. The flag is true when every natural type
    /// already matched; `None` when some argument cannot be made to fit.
    fn coerce_arguments(
        &self,
        target: &TypedExpr,
        args: &[LateBinding],
        natural: &[TypedExpr],
        params: &[Type],
    ) -> Result<Option<(Vec<TypedExpr>, bool)>> {
        let mut exact = true;
        let mut coerced = Vec::with_capacity(params.len());
        for ((arg, built), param) in args.iter().zip(natural).zip(params) {
            if built.ty() == param {
                coerced.push(built.clone());
                continue;
            }
            exact = false;
            match self.try_build_as(target, arg, param)? {
                Some(converted) => coerced.push(converted),
                None => return Ok(None),
            }
        }
        Ok(Some((coerced, exact)))
    }
}

fn unique_member(ty: &Type, name: &str, path: &str) -> Result<MemberRef> {
    let mut found = ty.find_members(name);
    match found.len() {
        0 => Err(Error::MemberNotFound {
            ty: ty.to_string(),
            member: name.to_string(),
            path: path.to_string(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(Error::AmbiguousMember {
            ty: ty.to_string(),
            member: name.to_string(),
            count,
        }),
    }
}

fn record_member_key(owner: &Arc<RecordType>, member: &str) -> Result<MemberKey> {
    let member_ref = unique_member(&Type::Record(owner.clone()), member, member)?;
    member_ref.key().ok_or_else(|| {
        Error::InvalidArgument(format!("{}.{member} cannot be overridden", owner.name()))
    })
}

fn incompatible(expr: &LateBinding, expected: &Type, found: &Type) -> Error {
    Error::IncompatibleType {
        expression: expr.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
