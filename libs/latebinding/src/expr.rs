//! Typed expression trees.
//!
//! A [`TypedExpr`] is the output of compilation: every node carries its
//! static type and every member and function reference is resolved. Nodes
//! are immutable and reference counted, so cloning a subtree is cheap.

use crate::conversion::{self, Conversion};
use crate::error::{Error, Result};
use crate::projection::ProjectionType;
use crate::types::{MemberRef, Type};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

pub type InvokeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A host function embedded in a compiled tree.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    invoke: Arc<InvokeFn>,
}

impl Function {
    pub fn new<F>(name: impl Into<Arc<str>>, invoke: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            invoke: Arc::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.invoke)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// The value the expression is evaluated against.
    Target,
    Constant(Value),
    Member {
        target: TypedExpr,
        member: MemberRef,
    },
    Convert {
        operand: TypedExpr,
        conversion: Conversion,
    },
    Unary {
        op: UnaryOp,
        operand: TypedExpr,
    },
    Binary {
        op: BinaryOp,
        left: TypedExpr,
        right: TypedExpr,
    },
    Conditional {
        test: TypedExpr,
        if_true: TypedExpr,
        if_false: TypedExpr,
    },
    Call {
        function: Function,
        args: Vec<TypedExpr>,
    },
    /// Construct a projection instance, binding each slot to an expression.
    New {
        projection: Arc<ProjectionType>,
        bindings: Vec<(usize, TypedExpr)>,
    },
}

#[derive(Debug, PartialEq)]
struct ExprNode {
    kind: ExprKind,
    ty: Type,
}

#[derive(Clone, PartialEq)]
pub struct TypedExpr(Arc<ExprNode>);

impl TypedExpr {
    fn node(kind: ExprKind, ty: Type) -> Self {
        TypedExpr(Arc::new(ExprNode { kind, ty }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn target(ty: Type) -> Self {
        Self::node(ExprKind::Target, ty)
    }

    /// A constant typed by its own value.
    pub fn constant(value: Value) -> Self {
        let ty = value.type_of();
        Self::node(ExprKind::Constant(value), ty)
    }

    /// A constant given an explicit static type. The value must conform to it.
    pub fn constant_typed(value: Value, ty: Type) -> Result<Self> {
        if !conversion::conforms(&value, &ty) {
            return Err(Error::TypeError(format!(
                "constant {value} does not conform to {ty}"
            )));
        }
        Ok(Self::node(ExprKind::Constant(value), ty))
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self.kind() {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.as_constant(), Some(Value::Null))
    }

    pub fn member(target: TypedExpr, member: MemberRef) -> Self {
        let ty = member.ty().clone();
        Self::node(ExprKind::Member { target, member }, ty)
    }

    /// Access the single member of `target` named `name`, ignoring case.
    pub fn field(target: TypedExpr, name: &str) -> Result<Self> {
        let mut found = target.ty().find_members(name);
        match found.len() {
            0 => Err(Error::MemberNotFound {
                ty: target.ty().to_string(),
                member: name.to_string(),
                path: name.to_string(),
            }),
            1 => Ok(Self::member(target, found.remove(0))),
            count => Err(Error::AmbiguousMember {
                ty: target.ty().to_string(),
                member: name.to_string(),
                count,
            }),
        }
    }

    pub fn convert(operand: TypedExpr, ty: Type, conversion: Conversion) -> Self {
        Self::node(ExprKind::Convert { operand, conversion }, ty)
    }

    /// Convert `self` to `ty`, inserting a conversion node only when the
    /// types differ. `None` when no conversion exists in the given mode.
    pub fn convert_to(self, ty: &Type, implicit_only: bool) -> Option<Self> {
        if self.ty() == ty {
            return Some(self);
        }
        let conversion = conversion::plan(self.ty(), ty, implicit_only)?;
        Some(Self::convert(self, ty.clone(), conversion))
    }

    pub fn unary(op: UnaryOp, operand: TypedExpr) -> Result<Self> {
        let ty = operand.ty().clone();
        let valid = match op {
            UnaryOp::Not => ty == Type::Bool,
            UnaryOp::Negate => ty
                .underlying()
                .numeric_kind()
                .is_some_and(|kind| !kind.is_unsigned()),
        };
        if !valid {
            let symbol = match op {
                UnaryOp::Not => "!",
                UnaryOp::Negate => "-",
            };
            return Err(Error::TypeError(format!(
                "operator {symbol} is not defined for {ty}"
            )));
        }
        Ok(Self::node(ExprKind::Unary { op, operand }, ty))
    }

    /// Both operands must already share a type; arithmetic keeps it,
    /// comparisons and logical operators produce `bool`.
    pub fn binary(op: BinaryOp, left: TypedExpr, right: TypedExpr) -> Result<Self> {
        if left.ty() != right.ty() {
            return Err(Error::TypeError(format!(
                "operands of {} must share a type, got {} and {}",
                op.symbol(),
                left.ty(),
                right.ty()
            )));
        }
        let operand = left.ty().clone();
        let base = operand.underlying();
        let valid = if op.is_arithmetic() {
            matches!(base, Type::Numeric(_))
        } else if op.is_ordering() {
            matches!(
                base,
                Type::Numeric(_) | Type::Char | Type::DateTime | Type::Enum(_)
            )
        } else if op.is_logical() {
            operand == Type::Bool
        } else {
            true
        };
        if !valid {
            return Err(Error::TypeError(format!(
                "operator {} is not defined for {operand}",
                op.symbol()
            )));
        }
        let ty = if op.is_arithmetic() {
            operand
        } else {
            Type::Bool
        };
        Ok(Self::node(ExprKind::Binary { op, left, right }, ty))
    }

    pub fn conditional(test: TypedExpr, if_true: TypedExpr, if_false: TypedExpr) -> Result<Self> {
        if *test.ty() != Type::Bool {
            return Err(Error::TypeError(format!(
                "condition must be bool, got {}",
                test.ty()
            )));
        }
        if if_true.ty() != if_false.ty() {
            return Err(Error::TypeError(format!(
                "conditional branches differ: {} and {}",
                if_true.ty(),
                if_false.ty()
            )));
        }
        let ty = if_true.ty().clone();
        Ok(Self::node(
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            },
            ty,
        ))
    }

    pub fn call(function: Function, args: Vec<TypedExpr>, return_type: Type) -> Self {
        Self::node(ExprKind::Call { function, args }, return_type)
    }

    /// Construct an instance of `projection`. Every binding must target an
    /// existing slot and its expression must be assignable to the slot type.
    pub fn new_projection(
        projection: Arc<ProjectionType>,
        bindings: Vec<(usize, TypedExpr)>,
    ) -> Result<Self> {
        for (slot, expr) in &bindings {
            let def = projection.definitions().get(*slot).ok_or_else(|| {
                Error::InvalidProjection(format!(
                    "slot {slot} does not exist on {}",
                    projection.name()
                ))
            })?;
            if !conversion::is_assignable(expr.ty(), def.ty()) {
                return Err(Error::TypeError(format!(
                    "cannot bind {} to '{}' of type {}",
                    expr.ty(),
                    def.name(),
                    def.ty()
                )));
            }
        }
        let ty = Type::Projection(projection.clone());
        Ok(Self::node(
            ExprKind::New {
                projection,
                bindings,
            },
            ty,
        ))
    }

    /// Evaluate against `target`.
    pub fn evaluate(&self, target: &Value) -> Result<Value> {
        crate::eval::evaluate(self, target)
    }
}

impl fmt::Debug for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedExpr({self}: {})", self.ty())
    }
}

impl fmt::Display for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Target => f.write_str("target"),
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Member { target, member } => write!(f, "{target}.{}", member.name()),
            ExprKind::Convert { operand, .. } => write!(f, "({}){operand}", self.ty()),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Negate => write!(f, "-{operand}"),
            },
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            ExprKind::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ExprKind::New {
                projection,
                bindings,
            } => {
                write!(f, "new {} {{", projection.name())?;
                for (i, (slot, expr)) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    let name = projection
                        .definitions()
                        .get(*slot)
                        .map(|d| d.name())
                        .unwrap_or("?");
                    write!(f, " {name} = {expr}")?;
                }
                f.write_str(" }")
            }
        }
    }
}
