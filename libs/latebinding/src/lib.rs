//! Late-binding expression compiler.
//!
//! # Architecture
//!
//! ```text
//! LateBinding (untyped) → ExpressionCompiler → TypedExpr (resolved) → evaluate / backend
//!                                 ↑
//!                          FunctionRegistry
//! ```
//!
//! - [`LateBinding`] trees name fields by dotted path and functions by
//!   string. They arrive from outside (typically JSON) and mean nothing until
//!   compiled against a target type.
//! - The [`ExpressionCompiler`] resolves every member and picks a function
//!   overload from the [`FunctionRegistry`], inserting conversions where the
//!   argument types call for them.
//! - A selection compiles into a projection: a record type fabricated at
//!   runtime by a [`ProjectionTypeGenerator`], cached per property set and
//!   periodically rotated so fabricated types do not pile up.
//!
//! [`Engine`] ties these together and is built once from a
//! [`LateBindingConfig`], then shared by reference.
//!
//! # Example
//!
//! ```rust,ignore
//! use latebinding::{Engine, LateBinding, LateBindingConfig, RecordType, Type};
//!
//! let order = RecordType::builder("Order")
//!     .field("price", Type::DECIMAL)
//!     .field("tax", Type::I32)
//!     .build()?;
//! let engine = Engine::new(LateBindingConfig::default())?;
//! let total = engine.compile(
//!     &Type::Record(order),
//!     &LateBinding::call("+", [LateBinding::field("price"), LateBinding::field("tax")]),
//! )?;
//! assert_eq!(total.ty(), &Type::DECIMAL);
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod conversion;
mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod json;
pub mod projection;
pub mod query;
pub mod types;
pub mod value;

pub use ast::{LateBinding, LateBindingJson};
pub use compiler::ExpressionCompiler;
pub use config::{FunctionsConfig, LateBindingConfig, LateBindingConfigBuilder, ProjectionConfig};
pub use error::{Error, ErrorCategory, Result};
pub use expr::{BinaryOp, ExprKind, Function, TypedExpr, UnaryOp};
pub use functions::{BuildContext, Builder, FunctionRegistry};
pub use json::ToJson;
pub use projection::{
    CachingTypeGenerator, NamespaceTypeGenerator, ProjectionInstance, ProjectionType,
    ProjectionTypeGenerator, PropertyAccessor, PropertyDefinition, SelfResettingTypeGenerator,
};
pub use query::{CompiledQuery, LateBindingQuery, OrderBy, Projection};
pub use types::{EnumType, MemberKind, NumericKind, RecordType, Type, Visibility};
pub use value::{RecordValue, Value};

use indexmap::IndexMap;
use std::sync::Arc;

type RegistryHook = Box<dyn FnOnce(&mut FunctionRegistry)>;
type CompilerHook = Box<dyn FnOnce(&mut ExpressionCompiler) -> Result<()>>;

/// Compiler, function registry and projection generator, configured once.
#[derive(Clone)]
pub struct Engine {
    config: LateBindingConfig,
    compiler: ExpressionCompiler,
    projections: Arc<dyn ProjectionTypeGenerator>,
}

impl Engine {
    pub fn new(config: LateBindingConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &LateBindingConfig {
        &self.config
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        self.compiler.functions()
    }

    pub fn compiler(&self) -> &ExpressionCompiler {
        &self.compiler
    }

    pub fn projections(&self) -> &Arc<dyn ProjectionTypeGenerator> {
        &self.projections
    }

    /// Compile `expr` against records of type `source`.
    pub fn compile(&self, source: &Type, expr: &LateBinding) -> Result<TypedExpr> {
        self.compiler
            .build(&TypedExpr::target(source.clone()), expr)
    }

    /// Compile `expr` so that it produces a value of type `ty`.
    pub fn compile_as(&self, source: &Type, expr: &LateBinding, ty: &Type) -> Result<TypedExpr> {
        self.compiler
            .build_as(&TypedExpr::target(source.clone()), expr, ty)
    }

    /// Compile a selection into a projection over `source`.
    pub fn select(
        &self,
        source: &Type,
        selection: &IndexMap<String, LateBinding>,
    ) -> Result<Projection> {
        query::compile_projection(
            &self.compiler,
            self.projections.as_ref(),
            &TypedExpr::target(source.clone()),
            selection,
        )
    }

    pub fn compile_query(&self, source: &Type, query: &LateBindingQuery) -> Result<CompiledQuery> {
        CompiledQuery::compile(&self.compiler, self.projections.as_ref(), source, query)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("functions", &self.functions().len())
            .finish()
    }
}

/// Assembles an [`Engine`]. Builders and member overrides registered here
/// are applied before the registry is shared.
#[derive(Default)]
pub struct EngineBuilder {
    config: LateBindingConfig,
    registry_hooks: Vec<RegistryHook>,
    compiler_hooks: Vec<CompilerHook>,
    projections: Option<Arc<dyn ProjectionTypeGenerator>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: LateBindingConfig) -> Self {
        self.config = config;
        self
    }

    /// Add or replace builders on top of the configured standard library.
    pub fn functions<F>(mut self, register: F) -> Self
    where
        F: FnOnce(&mut FunctionRegistry) + 'static,
    {
        self.registry_hooks.push(Box::new(register));
        self
    }

    /// See [`ExpressionCompiler::define_member_override`].
    pub fn member_override<F>(
        mut self,
        owner: &Arc<RecordType>,
        member: &str,
        only_on_direct: bool,
        rewrite: F,
    ) -> Self
    where
        F: Fn(TypedExpr) -> Result<TypedExpr> + Send + Sync + 'static,
    {
        let owner = owner.clone();
        let member = member.to_string();
        self.compiler_hooks.push(Box::new(move |compiler| {
            compiler.define_member_override(&owner, &member, only_on_direct, rewrite)?;
            Ok(())
        }));
        self
    }

    /// Use `generator` instead of the chain built from the projection config.
    pub fn projection_generator(mut self, generator: Arc<dyn ProjectionTypeGenerator>) -> Self {
        self.projections = Some(generator);
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let mut registry = FunctionRegistry::with_config(&self.config.functions);
        for hook in self.registry_hooks {
            hook(&mut registry);
        }
        let mut compiler = ExpressionCompiler::new(Arc::new(registry));
        for hook in self.compiler_hooks {
            hook(&mut compiler)?;
        }

        let projections = match self.projections {
            Some(generator) => generator,
            None => projection::default_generator(&self.config.projection)?,
        };

        tracing::debug!(
            "Built late-binding engine with {} builders",
            compiler.functions().len()
        );
        Ok(Engine {
            config: self.config,
            compiler,
            projections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = LateBindingConfig::default();
        config.projection.reset_threshold = 0;
        assert!(matches!(Engine::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_registry_hooks_run_before_sharing() {
        let engine = Engine::builder()
            .functions(|registry| {
                registry.define_function("twice", [Type::I32], Type::I32, |args| {
                    match &args[0] {
                        Value::I32(v) => Ok(Value::I32(v * 2)),
                        other => Err(Error::TypeError(format!("unexpected {other}"))),
                    }
                });
            })
            .build()
            .unwrap();
        let expr = engine
            .compile(&Type::I32, &LateBinding::call("twice", [LateBinding::constant(4)]))
            .unwrap();
        assert_eq!(expr.evaluate(&Value::Null).unwrap(), Value::I32(8));
    }

    #[test]
    fn test_override_for_unknown_member_fails_build() {
        let owner = RecordType::builder("Thing")
            .field("a", Type::I32)
            .build()
            .unwrap();
        let result = Engine::builder()
            .member_override(&owner, "b", false, Ok)
            .build();
        assert!(matches!(result, Err(Error::MemberNotFound { .. })));
    }
}
