//! Function registry.
//!
//! Functions and operators are not built in: every `method` a late-binding
//! call can name is backed by one or more [`Builder`]s registered here. A
//! builder declares the parameter types it accepts and turns coerced
//! arguments into a typed expression, or declines by returning `Ok(None)`.
//!
//! Method names are matched ignoring case. Registering a builder with the
//! same name and parameter types as an existing one replaces it.

pub mod standard;

use crate::ast::LateBinding;
use crate::compiler::ExpressionCompiler;
use crate::config::FunctionsConfig;
use crate::error::{Error, Result};
use crate::expr::{Function, TypedExpr};
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type BuildFn = dyn Fn(&BuildContext<'_>) -> Result<Option<TypedExpr>> + Send + Sync;

/// One overload of a method.
#[derive(Clone)]
pub struct Builder {
    method: Arc<str>,
    parameter_types: Vec<Type>,
    build: Arc<BuildFn>,
}

impl Builder {
    pub fn new<F>(method: impl Into<Arc<str>>, parameter_types: impl Into<Vec<Type>>, build: F) -> Self
    where
        F: Fn(&BuildContext<'_>) -> Result<Option<TypedExpr>> + Send + Sync + 'static,
    {
        Self {
            method: method.into(),
            parameter_types: parameter_types.into(),
            build: Arc::new(build),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameter_types(&self) -> &[Type] {
        &self.parameter_types
    }

    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameter_types.iter().map(Type::to_string).collect();
        format!("{}({})", self.method, params.join(", "))
    }

    pub fn build(&self, ctx: &BuildContext<'_>) -> Result<Option<TypedExpr>> {
        (self.build)(ctx)
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builder({})", self.signature())
    }
}

/// What a builder sees when it is asked to build a call.
pub struct BuildContext<'a> {
    compiler: &'a ExpressionCompiler,
    target: &'a TypedExpr,
    method: &'a str,
    arguments: &'a [LateBinding],
    natural: &'a [TypedExpr],
    args: Vec<TypedExpr>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        compiler: &'a ExpressionCompiler,
        target: &'a TypedExpr,
        method: &'a str,
        arguments: &'a [LateBinding],
        natural: &'a [TypedExpr],
        args: Vec<TypedExpr>,
    ) -> Self {
        Self {
            compiler,
            target,
            method,
            arguments,
            natural,
            args,
        }
    }

    /// The method name as written in the call.
    pub fn method(&self) -> &str {
        self.method
    }

    /// Arguments converted to this builder's parameter types.
    pub fn args(&self) -> &[TypedExpr] {
        &self.args
    }

    /// Arguments as compiled without any expected type.
    pub fn natural_args(&self) -> &[TypedExpr] {
        self.natural
    }

    /// The uncompiled argument expressions.
    pub fn arguments(&self) -> &[LateBinding] {
        self.arguments
    }

    pub fn target(&self) -> &TypedExpr {
        self.target
    }

    pub fn compiler(&self) -> &ExpressionCompiler {
        self.compiler
    }

    fn argument(&self, index: usize) -> Result<&LateBinding> {
        self.arguments.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} has no argument {index}",
                self.method
            ))
        })
    }

    /// Compile argument `index` again, this time against `ty`.
    pub fn build_argument_as(&self, index: usize, ty: &Type) -> Result<TypedExpr> {
        self.compiler
            .build_as(self.target, self.argument(index)?, ty)
    }

    /// Like [`build_argument_as`](Self::build_argument_as), but `Ok(None)`
    /// when the argument cannot be made into `ty`.
    pub fn try_build_argument_as(&self, index: usize, ty: &Type) -> Result<Option<TypedExpr>> {
        self.compiler
            .try_build_as(self.target, self.argument(index)?, ty)
    }
}

fn key(method: &str) -> String {
    method.to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    builders: HashMap<String, Vec<Arc<Builder>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard library selected by `config`.
    pub fn with_config(config: &FunctionsConfig) -> Self {
        let mut registry = Self::new();
        standard::register(&mut registry, config);
        registry
    }

    pub fn standard() -> Self {
        Self::with_config(&FunctionsConfig::default())
    }

    /// Register `builder`, replacing any builder with the same method and
    /// parameter types. The new builder goes to the end of the method's list.
    pub fn add(&mut self, builder: Builder) -> Arc<Builder> {
        let builder = Arc::new(builder);
        let list = self.builders.entry(key(builder.method())).or_default();
        if let Some(i) = list
            .iter()
            .position(|b| b.parameter_types == builder.parameter_types)
        {
            tracing::debug!("Overwriting builder for function {}", builder.signature());
            list.remove(i);
        }
        list.push(builder.clone());
        builder
    }

    /// Register a builder that only looks at its coerced arguments.
    pub fn define<F>(
        &mut self,
        method: &str,
        parameter_types: impl Into<Vec<Type>>,
        build: F,
    ) -> Arc<Builder>
    where
        F: Fn(&[TypedExpr]) -> Result<Option<TypedExpr>> + Send + Sync + 'static,
    {
        self.add(Builder::new(method, parameter_types, move |ctx| {
            build(ctx.args())
        }))
    }

    /// Register a builder with access to the whole [`BuildContext`].
    pub fn define_with_context<F>(
        &mut self,
        method: &str,
        parameter_types: impl Into<Vec<Type>>,
        build: F,
    ) -> Arc<Builder>
    where
        F: Fn(&BuildContext<'_>) -> Result<Option<TypedExpr>> + Send + Sync + 'static,
    {
        self.add(Builder::new(method, parameter_types, build))
    }

    /// Register a host function: the compiled call evaluates its arguments
    /// and hands them to `invoke`.
    pub fn define_function<F>(
        &mut self,
        method: &str,
        parameter_types: impl Into<Vec<Type>>,
        return_type: Type,
        invoke: F,
    ) -> Arc<Builder>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let function = Function::new(method, invoke);
        self.define(method, parameter_types, move |args| {
            Ok(Some(TypedExpr::call(
                function.clone(),
                args.to_vec(),
                return_type.clone(),
            )))
        })
    }

    /// Remove exactly this builder. Returns whether it was registered.
    pub fn remove(&mut self, builder: &Arc<Builder>) -> bool {
        let method = key(builder.method());
        let Some(list) = self.builders.get_mut(&method) else {
            return false;
        };
        let before = list.len();
        list.retain(|b| !Arc::ptr_eq(b, builder));
        let removed = list.len() != before;
        if list.is_empty() {
            self.builders.remove(&method);
        }
        removed
    }

    /// Remove every builder for `method`. Returns how many were removed.
    pub fn undefine(&mut self, method: &str) -> usize {
        let removed = self
            .builders
            .remove(&key(method))
            .map(|list| list.len())
            .unwrap_or(0);
        tracing::trace!("Undefined {} builders for function {}", removed, method);
        removed
    }

    /// Remove the builder for `method` with exactly these parameter types.
    pub fn undefine_signature(&mut self, method: &str, parameter_types: &[Type]) -> bool {
        let method = key(method);
        let Some(list) = self.builders.get_mut(&method) else {
            return false;
        };
        let before = list.len();
        list.retain(|b| b.parameter_types != parameter_types);
        let removed = list.len() != before;
        if list.is_empty() {
            self.builders.remove(&method);
        }
        removed
    }

    /// Builders for `method` in registration order.
    pub fn lookup(&self, method: &str) -> &[Arc<Builder>] {
        self.builders
            .get(&key(method))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, method: &str) -> bool {
        self.builders.contains_key(&key(method))
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Total number of registered builders.
    pub fn len(&self) -> usize {
        self.builders.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
