//! Type descriptors used by the compiler.
//!
//! Types are compared structurally, except for records, enums and
//! projections which are nominal: two record types are the same type when
//! they carry the same name.

use crate::error::{Error, Result};
use crate::projection::ProjectionType;
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
}

impl NumericKind {
    pub const ALL: [NumericKind; 11] = [
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

    pub fn name(self) -> &'static str {
        match self {
            NumericKind::I8 => "i8",
            NumericKind::U8 => "u8",
            NumericKind::I16 => "i16",
            NumericKind::U16 => "u16",
            NumericKind::I32 => "i32",
            NumericKind::U32 => "u32",
            NumericKind::I64 => "i64",
            NumericKind::U64 => "u64",
            NumericKind::F32 => "f32",
            NumericKind::F64 => "f64",
            NumericKind::Decimal => "decimal",
        }
    }

    pub fn is_integer(self) -> bool {
        self.integer_range().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericKind::F32 | NumericKind::F64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            NumericKind::U8 | NumericKind::U16 | NumericKind::U32 | NumericKind::U64
        )
    }

    /// Inclusive bounds of an integer kind, `None` for floating and decimal kinds.
    pub fn integer_range(self) -> Option<(i128, i128)> {
        match self {
            NumericKind::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            NumericKind::U8 => Some((0, u8::MAX as i128)),
            NumericKind::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            NumericKind::U16 => Some((0, u16::MAX as i128)),
            NumericKind::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            NumericKind::U32 => Some((0, u32::MAX as i128)),
            NumericKind::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            NumericKind::U64 => Some((0, u64::MAX as i128)),
            NumericKind::F32 | NumericKind::F64 | NumericKind::Decimal => None,
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static type of a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Type of the untyped `null` literal.
    Null,
    Bool,
    Char,
    Numeric(NumericKind),
    String,
    DateTime,
    /// Universal supertype; every value converts to it without change.
    Any,
    /// Supertype of every sequence type.
    Enumerable,
    /// Nullable wrapper over a value type.
    Nullable(Box<Type>),
    Sequence(Box<Type>),
    Enum(Arc<EnumType>),
    Record(Arc<RecordType>),
    Projection(Arc<ProjectionType>),
}

impl Type {
    pub const I8: Type = Type::Numeric(NumericKind::I8);
    pub const U8: Type = Type::Numeric(NumericKind::U8);
    pub const I16: Type = Type::Numeric(NumericKind::I16);
    pub const U16: Type = Type::Numeric(NumericKind::U16);
    pub const I32: Type = Type::Numeric(NumericKind::I32);
    pub const U32: Type = Type::Numeric(NumericKind::U32);
    pub const I64: Type = Type::Numeric(NumericKind::I64);
    pub const U64: Type = Type::Numeric(NumericKind::U64);
    pub const F32: Type = Type::Numeric(NumericKind::F32);
    pub const F64: Type = Type::Numeric(NumericKind::F64);
    pub const DECIMAL: Type = Type::Numeric(NumericKind::Decimal);

    /// Wrap a value type into its nullable form. Types that already admit
    /// null are returned unchanged.
    pub fn nullable(inner: Type) -> Type {
        if inner.is_nullable_capable() {
            inner
        } else {
            Type::Nullable(Box::new(inner))
        }
    }

    pub fn sequence(element: Type) -> Type {
        Type::Sequence(Box::new(element))
    }

    /// Whether `null` is a legal value of this type.
    pub fn is_nullable_capable(&self) -> bool {
        !self.is_value_type() || matches!(self, Type::Nullable(_))
    }

    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char
                | Type::Numeric(_)
                | Type::DateTime
                | Type::Enum(_)
                | Type::Nullable(_)
        )
    }

    pub fn is_reference_type(&self) -> bool {
        !self.is_value_type() && *self != Type::Null
    }

    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            Type::Numeric(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The wrapped type of a nullable, or the type itself.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Sequence(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<RecordType>> {
        match self {
            Type::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Value a freshly constructed slot of this type holds.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::Char => Value::Char('\0'),
            Type::Numeric(kind) => Value::zero(*kind),
            Type::DateTime => Value::DateTime(chrono::NaiveDateTime::default()),
            Type::Enum(ty) => Value::Enum {
                ty: ty.clone(),
                value: 0,
            },
            _ => Value::Null,
        }
    }

    /// Members named `name` ignoring case, in declaration order.
    pub fn find_members(&self, name: &str) -> Vec<MemberRef> {
        match self {
            Type::Record(record) => record
                .members()
                .iter()
                .enumerate()
                .filter(|(_, member)| names_match(member.name(), name))
                .map(|(index, _)| MemberRef::Record {
                    record: record.clone(),
                    index,
                })
                .collect(),
            Type::Projection(projection) => projection
                .definitions()
                .iter()
                .enumerate()
                .filter(|(_, def)| names_match(def.name(), name))
                .map(|(index, _)| MemberRef::Projection {
                    projection: projection.clone(),
                    index,
                })
                .collect(),
            _ => Intrinsic::lookup(self, name)
                .map(|(member, ty)| MemberRef::Intrinsic { member, ty })
                .into_iter()
                .collect(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => f.write_str("null"),
            Type::Bool => f.write_str("bool"),
            Type::Char => f.write_str("char"),
            Type::Numeric(kind) => write!(f, "{kind}"),
            Type::String => f.write_str("string"),
            Type::DateTime => f.write_str("datetime"),
            Type::Any => f.write_str("any"),
            Type::Enumerable => f.write_str("enumerable"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Sequence(element) => write!(f, "[{element}]"),
            Type::Enum(ty) => f.write_str(ty.name()),
            Type::Record(ty) => f.write_str(ty.name()),
            Type::Projection(ty) => f.write_str(ty.name()),
        }
    }
}

pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    NonPublic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    name: Arc<str>,
    ty: Type,
    kind: MemberKind,
    visibility: Visibility,
    declaring_type: Arc<str>,
}

impl Member {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }
}

/// Identifies a member independently of the path that reached it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub declaring_type: Arc<str>,
    pub member: Arc<str>,
}

/// Built-in members of non-record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    StringLength,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    DayOfYear,
    HasValue,
    NullableValue,
    Count,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::StringLength => "length",
            Intrinsic::Year => "year",
            Intrinsic::Month => "month",
            Intrinsic::Day => "day",
            Intrinsic::Hour => "hour",
            Intrinsic::Minute => "minute",
            Intrinsic::Second => "second",
            Intrinsic::Millisecond => "millisecond",
            Intrinsic::DayOfYear => "dayofyear",
            Intrinsic::HasValue => "hasvalue",
            Intrinsic::NullableValue => "value",
            Intrinsic::Count => "count",
        }
    }

    fn lookup(owner: &Type, name: &str) -> Option<(Intrinsic, Type)> {
        let candidates: &[Intrinsic] = match owner {
            Type::String => &[Intrinsic::StringLength],
            Type::DateTime => &[
                Intrinsic::Year,
                Intrinsic::Month,
                Intrinsic::Day,
                Intrinsic::Hour,
                Intrinsic::Minute,
                Intrinsic::Second,
                Intrinsic::Millisecond,
                Intrinsic::DayOfYear,
            ],
            Type::Nullable(_) => &[Intrinsic::HasValue, Intrinsic::NullableValue],
            Type::Sequence(_) => &[Intrinsic::Count],
            _ => &[],
        };
        let member = candidates
            .iter()
            .copied()
            .find(|m| names_match(m.name(), name))?;
        let ty = match member {
            Intrinsic::HasValue => Type::Bool,
            Intrinsic::NullableValue => owner.underlying().clone(),
            _ => Type::I32,
        };
        Some((member, ty))
    }
}

/// A resolved member access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRef {
    Record {
        record: Arc<RecordType>,
        index: usize,
    },
    Projection {
        projection: Arc<ProjectionType>,
        index: usize,
    },
    Intrinsic {
        member: Intrinsic,
        ty: Type,
    },
}

impl MemberRef {
    pub fn name(&self) -> &str {
        match self {
            MemberRef::Record { record, index } => record.members()[*index].name(),
            MemberRef::Projection { projection, index } => projection.definitions()[*index].name(),
            MemberRef::Intrinsic { member, .. } => member.name(),
        }
    }

    pub fn ty(&self) -> &Type {
        match self {
            MemberRef::Record { record, index } => record.members()[*index].ty(),
            MemberRef::Projection { projection, index } => projection.definitions()[*index].ty(),
            MemberRef::Intrinsic { ty, .. } => ty,
        }
    }

    /// Key used to attach member overrides. Only record members carry one.
    pub fn key(&self) -> Option<MemberKey> {
        match self {
            MemberRef::Record { record, index } => {
                let member = &record.members()[*index];
                Some(MemberKey {
                    declaring_type: member.declaring_type.clone(),
                    member: member.name.clone(),
                })
            }
            _ => None,
        }
    }
}

// ============================================================================
// User conversions
// ============================================================================

pub type ConvertFn = dyn Fn(&Value) -> Result<Value> + Send + Sync;

/// Direction of a conversion declared on a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversionDirection {
    /// Converts values of the given type into the declaring record.
    From(Type),
    /// Converts the declaring record into the given type.
    Into(Type),
}

pub struct UserConversion {
    direction: ConversionDirection,
    implicit: bool,
    convert: Arc<ConvertFn>,
}

impl UserConversion {
    pub fn direction(&self) -> &ConversionDirection {
        &self.direction
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn apply(&self, value: &Value) -> Result<Value> {
        (self.convert)(value)
    }
}

impl PartialEq for UserConversion {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for UserConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConversion")
            .field("direction", &self.direction)
            .field("implicit", &self.implicit)
            .finish()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Host-defined record type with named members.
pub struct RecordType {
    name: Arc<str>,
    base: Option<Arc<RecordType>>,
    members: Vec<Member>,
    conversions: Vec<Arc<UserConversion>>,
}

impl RecordType {
    pub fn builder(name: impl Into<Arc<str>>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.into(),
            base: None,
            members: Vec::new(),
            conversions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<RecordType>> {
        self.base.as_ref()
    }

    /// All members, inherited ones first.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name() == name)
    }

    pub(crate) fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name() == name)
    }

    /// Conversions declared directly on this type.
    pub fn conversions(&self) -> &[Arc<UserConversion>] {
        &self.conversions
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subtype_of(&self, other: &RecordType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.base.as_deref();
        }
        false
    }

    /// This type followed by its bases.
    pub fn ancestry(&self) -> impl Iterator<Item = &RecordType> {
        std::iter::successors(Some(self), |ty| ty.base.as_deref())
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field(
                "members",
                &self.members.iter().map(Member::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct RecordTypeBuilder {
    name: Arc<str>,
    base: Option<Arc<RecordType>>,
    members: Vec<Member>,
    conversions: Vec<Arc<UserConversion>>,
}

impl RecordTypeBuilder {
    /// Inherit every member of `base`. Members added afterwards with the
    /// same exact name shadow the inherited one.
    pub fn extends(mut self, base: &Arc<RecordType>) -> Self {
        self.members = base.members.clone();
        self.base = Some(base.clone());
        self
    }

    pub fn field(self, name: &str, ty: Type) -> Self {
        self.member(name, ty, MemberKind::Field, Visibility::Public)
    }

    pub fn property(self, name: &str, ty: Type) -> Self {
        self.member(name, ty, MemberKind::Property, Visibility::Public)
    }

    pub fn private_field(self, name: &str, ty: Type) -> Self {
        self.member(name, ty, MemberKind::Field, Visibility::NonPublic)
    }

    pub fn member(mut self, name: &str, ty: Type, kind: MemberKind, visibility: Visibility) -> Self {
        let member = Member {
            name: name.into(),
            ty,
            kind,
            visibility,
            declaring_type: self.name.clone(),
        };
        match self.members.iter().position(|m| m.name() == name) {
            Some(i) if self.members[i].declaring_type != self.name => self.members[i] = member,
            _ => self.members.push(member),
        }
        self
    }

    /// Declare a conversion from `source` into this record.
    pub fn conversion_from<F>(self, source: Type, implicit: bool, convert: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.conversion(ConversionDirection::From(source), implicit, convert)
    }

    /// Declare a conversion from this record into `target`.
    pub fn conversion_into<F>(self, target: Type, implicit: bool, convert: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.conversion(ConversionDirection::Into(target), implicit, convert)
    }

    fn conversion<F>(mut self, direction: ConversionDirection, implicit: bool, convert: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.conversions.push(Arc::new(UserConversion {
            direction,
            implicit,
            convert: Arc::new(convert),
        }));
        self
    }

    pub fn build(self) -> Result<Arc<RecordType>> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("record type name is blank".into()));
        }
        for (i, member) in self.members.iter().enumerate() {
            if member.name().trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "record type '{}' has a member with a blank name",
                    self.name
                )));
            }
            if self.members[..i].iter().any(|m| m.name() == member.name()) {
                return Err(Error::InvalidArgument(format!(
                    "record type '{}' declares member '{}' twice",
                    self.name,
                    member.name()
                )));
            }
        }
        Ok(Arc::new(RecordType {
            name: self.name,
            base: self.base,
            members: self.members,
            conversions: self.conversions,
        }))
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Host-defined enumeration over an integer underlying kind.
#[derive(Debug)]
pub struct EnumType {
    name: Arc<str>,
    underlying: NumericKind,
    variants: Vec<(Arc<str>, i64)>,
}

impl EnumType {
    pub fn new(
        name: impl Into<Arc<str>>,
        underlying: NumericKind,
        variants: impl IntoIterator<Item = (&'static str, i64)>,
    ) -> Result<Arc<EnumType>> {
        let name = name.into();
        if !underlying.is_integer() {
            return Err(Error::InvalidArgument(format!(
                "enum '{name}' must have an integer underlying type, got {underlying}"
            )));
        }
        let variants = variants
            .into_iter()
            .map(|(variant, value)| (Arc::<str>::from(variant), value))
            .collect();
        Ok(Arc::new(EnumType {
            name,
            underlying,
            variants,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn underlying(&self) -> NumericKind {
        self.underlying
    }

    pub fn variants(&self) -> &[(Arc<str>, i64)] {
        &self.variants
    }

    pub fn value_of(&self, variant: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(name, _)| names_match(name, variant))
            .map(|(_, value)| *value)
    }

    pub fn variant_name(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_ref())
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EnumType {}

impl Hash for EnumType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
