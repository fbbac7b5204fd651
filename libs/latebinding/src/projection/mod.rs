//! Projection types.
//!
//! A projection is a record type fabricated at runtime from a list of
//! property definitions, used as the result shape of `select`. Generators
//! compose:
//!
//! - [`NamespaceTypeGenerator`] fabricates a fresh type on every call and
//!   registers it in the current namespace.
//! - [`SelfResettingTypeGenerator`] discards the namespace after a fixed
//!   number of fabrications so it cannot grow without bound.
//! - [`CachingTypeGenerator`] returns the same type for the same set of
//!   definitions for as long as a caller holds on to it.

mod caching;
mod generator;
mod resetting;

pub use caching::CachingTypeGenerator;
pub use generator::{NamespaceTypeGenerator, TypeNamespace};
pub use resetting::SelfResettingTypeGenerator;

use crate::config::ProjectionConfig;
use crate::conversion;
use crate::error::{Error, Result};
use crate::types::Type;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// A named, typed slot of a projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyDefinition {
    name: Arc<str>,
    ty: Type,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<Arc<str>>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

impl fmt::Display for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

pub trait ProjectionTypeGenerator: Send + Sync {
    /// Produce a projection type with exactly the given properties.
    fn generate(&self, definitions: &[PropertyDefinition]) -> Result<Arc<ProjectionType>>;

    /// Discard generator state. Types handed out earlier stay usable.
    fn reset(&self);

    /// Incremented on every reset of the underlying namespace.
    fn epoch(&self) -> u64 {
        0
    }
}

impl<G: ProjectionTypeGenerator + ?Sized> ProjectionTypeGenerator for Arc<G> {
    fn generate(&self, definitions: &[PropertyDefinition]) -> Result<Arc<ProjectionType>> {
        (**self).generate(definitions)
    }

    fn reset(&self) {
        (**self).reset()
    }

    fn epoch(&self) -> u64 {
        (**self).epoch()
    }
}

/// The generator chain `config` describes: namespace fabrication, reset after
/// `reset_threshold` types, and a cache in front unless caching is disabled.
/// The cache must sit outside the resetting wrapper so it observes resets.
pub fn default_generator(config: &ProjectionConfig) -> Result<Arc<dyn ProjectionTypeGenerator>> {
    let resetting = SelfResettingTypeGenerator::new(
        NamespaceTypeGenerator::new(config),
        config.reset_threshold,
    )?;
    if config.caching {
        Ok(Arc::new(CachingTypeGenerator::new(resetting)))
    } else {
        Ok(Arc::new(resetting))
    }
}

/// Reject blank names and names used twice.
pub(crate) fn validate_definitions(definitions: &[PropertyDefinition]) -> Result<()> {
    let mut seen = HashSet::with_capacity(definitions.len());
    for def in definitions {
        if def.name().trim().is_empty() {
            return Err(Error::InvalidProjection(
                "property names must not be blank".into(),
            ));
        }
        if !seen.insert(def.name()) {
            return Err(Error::InvalidProjection(format!(
                "property '{}' is defined more than once",
                def.name()
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Projection types
// ============================================================================

/// Descriptor of a fabricated projection type.
///
/// Equality is identity: two descriptors are equal only if they came out of
/// the same fabrication, even when their properties match.
pub struct ProjectionType {
    id: Uuid,
    name: String,
    namespace: Arc<TypeNamespace>,
    definitions: Vec<PropertyDefinition>,
    slots: IndexMap<Arc<str>, usize>,
}

impl ProjectionType {
    pub(crate) fn new(
        name: String,
        namespace: Arc<TypeNamespace>,
        definitions: &[PropertyDefinition],
    ) -> Self {
        let slots = definitions
            .iter()
            .enumerate()
            .map(|(i, def)| (def.name.clone(), i))
            .collect();
        Self {
            id: Uuid::new_v4(),
            name,
            namespace,
            definitions: definitions.to_vec(),
            slots,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Arc<TypeNamespace> {
        &self.namespace
    }

    /// Properties in definition order.
    pub fn definitions(&self) -> &[PropertyDefinition] {
        &self.definitions
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(|k| k.as_ref())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Getter and setter for the property named exactly `name`.
    pub fn accessor(self: &Arc<Self>, name: &str) -> Option<PropertyAccessor> {
        let index = self.slot_of(name)?;
        Some(PropertyAccessor {
            owner: self.clone(),
            index,
        })
    }

    pub fn accessors(self: &Arc<Self>) -> Vec<PropertyAccessor> {
        (0..self.len())
            .map(|index| PropertyAccessor {
                owner: self.clone(),
                index,
            })
            .collect()
    }

    /// A new instance with every slot holding its type's default value.
    pub fn new_instance(self: &Arc<Self>) -> ProjectionInstance {
        ProjectionInstance {
            ty: self.clone(),
            slots: self
                .definitions
                .iter()
                .map(|def| def.ty.default_value())
                .collect(),
        }
    }
}

impl PartialEq for ProjectionType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProjectionType {}

impl Hash for ProjectionType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionType")
            .field("name", &self.name)
            .field("namespace", &self.namespace.name())
            .field("definitions", &self.definitions)
            .finish()
    }
}

/// Typed access to one property of a projection type.
#[derive(Debug, Clone)]
pub struct PropertyAccessor {
    owner: Arc<ProjectionType>,
    index: usize,
}

impl PropertyAccessor {
    pub fn name(&self) -> &str {
        self.owner.definitions[self.index].name()
    }

    pub fn ty(&self) -> &Type {
        self.owner.definitions[self.index].ty()
    }

    pub fn get<'a>(&self, instance: &'a ProjectionInstance) -> Result<&'a Value> {
        self.check_owner(instance)?;
        Ok(&instance.slots[self.index])
    }

    pub fn set(&self, instance: &mut ProjectionInstance, value: Value) -> Result<()> {
        self.check_owner(instance)?;
        instance.set_slot(self.index, value)
    }

    fn check_owner(&self, instance: &ProjectionInstance) -> Result<()> {
        if *instance.ty != *self.owner {
            return Err(Error::TypeError(format!(
                "accessor for {} used on an instance of {}",
                self.owner.name, instance.ty.name
            )));
        }
        Ok(())
    }
}

/// An instance of a projection type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionInstance {
    ty: Arc<ProjectionType>,
    slots: Vec<Value>,
}

impl ProjectionInstance {
    pub fn projection_type(&self) -> &Arc<ProjectionType> {
        &self.ty
    }

    /// Value of the property named exactly `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ty.slot_of(name).map(|i| &self.slots[i])
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self.ty.slot_of(name).ok_or_else(|| {
            Error::InvalidArgument(format!("{} has no property '{name}'", self.ty.name))
        })?;
        self.set_slot(index, value)
    }

    pub(crate) fn slot(&self, index: usize) -> &Value {
        &self.slots[index]
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) -> Result<()> {
        let def = &self.ty.definitions[index];
        if !conversion::conforms(&value, def.ty()) {
            return Err(Error::TypeError(format!(
                "cannot store {} value in '{}' of type {}",
                value.type_of(),
                def.name(),
                def.ty()
            )));
        }
        self.slots[index] = value;
        Ok(())
    }

    /// Property names and values in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty.keys().zip(self.slots.iter())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionConfig;

    fn generator() -> NamespaceTypeGenerator {
        NamespaceTypeGenerator::new(&ProjectionConfig::default())
    }

    #[test]
    fn test_validate_definitions() {
        let ok = [
            PropertyDefinition::new("a", Type::I32),
            PropertyDefinition::new("A", Type::I32),
        ];
        assert!(validate_definitions(&ok).is_ok());

        let blank = [PropertyDefinition::new("  ", Type::I32)];
        assert!(matches!(
            validate_definitions(&blank),
            Err(Error::InvalidProjection(_))
        ));

        let dup = [
            PropertyDefinition::new("a", Type::I32),
            PropertyDefinition::new("a", Type::String),
        ];
        assert!(matches!(
            validate_definitions(&dup),
            Err(Error::InvalidProjection(_))
        ));
    }

    #[test]
    fn test_instance_defaults_and_accessors() {
        let ty = generator()
            .generate(&[
                PropertyDefinition::new("total", Type::DECIMAL),
                PropertyDefinition::new("label", Type::String),
                PropertyDefinition::new("count", Type::nullable(Type::I32)),
            ])
            .unwrap();
        assert_eq!(ty.keys().collect::<Vec<_>>(), vec!["total", "label", "count"]);

        let mut instance = ty.new_instance();
        assert_eq!(instance.get("total"), Some(&Value::Decimal(0.into())));
        assert_eq!(instance.get("label"), Some(&Value::Null));
        assert_eq!(instance.get("count"), Some(&Value::Null));

        let label = ty.accessor("label").unwrap();
        label.set(&mut instance, Value::string("x")).unwrap();
        assert_eq!(label.get(&instance).unwrap(), &Value::string("x"));
        assert!(label.set(&mut instance, Value::I32(1)).is_err());

        instance.set("count", Value::I32(4)).unwrap();
        assert!(instance.set("missing", Value::Null).is_err());
        assert_eq!(ty.accessors().len(), 3);
    }

    #[test]
    fn test_accessor_rejects_foreign_instance() {
        let gen = generator();
        let defs = [PropertyDefinition::new("a", Type::I32)];
        let first = gen.generate(&defs).unwrap();
        let second = gen.generate(&defs).unwrap();
        assert_ne!(first, second);

        let instance = second.new_instance();
        let accessor = first.accessor("a").unwrap();
        assert!(matches!(
            accessor.get(&instance),
            Err(Error::TypeError(_))
        ));
    }
}
