use super::{validate_definitions, ProjectionType, ProjectionTypeGenerator, PropertyDefinition};
use crate::config::ProjectionConfig;
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Container every fabricated projection type is registered in.
///
/// The registry only grows; resetting a generator swaps in a new namespace
/// and lets the old one go once no type refers to it.
#[derive(Debug)]
pub struct TypeNamespace {
    id: Uuid,
    name: String,
    generation: u64,
    types: Mutex<Vec<String>>,
}

impl TypeNamespace {
    fn new(prefix: &str, generation: u64) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: format!("{prefix}{id}"),
            generation,
            types: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of types fabricated into this namespace.
    pub fn type_count(&self) -> usize {
        self.types.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn register(&self, type_name: &str) {
        self.types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(type_name.to_string());
    }
}

/// Fabricates a new projection type on every call.
pub struct NamespaceTypeGenerator {
    type_name_prefix: String,
    namespace_prefix: String,
    current: RwLock<Arc<TypeNamespace>>,
    epoch: AtomicU64,
}

impl NamespaceTypeGenerator {
    pub fn new(config: &ProjectionConfig) -> Self {
        Self {
            type_name_prefix: config.type_name_prefix.clone(),
            namespace_prefix: config.namespace_prefix.clone(),
            current: RwLock::new(Arc::new(TypeNamespace::new(&config.namespace_prefix, 0))),
            epoch: AtomicU64::new(0),
        }
    }

    /// The namespace new types are currently registered in.
    pub fn namespace(&self) -> Arc<TypeNamespace> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProjectionTypeGenerator for NamespaceTypeGenerator {
    fn generate(&self, definitions: &[PropertyDefinition]) -> Result<Arc<ProjectionType>> {
        validate_definitions(definitions)?;

        let namespace = self.namespace();
        let name = format!("{}{}", self.type_name_prefix, Uuid::new_v4());
        namespace.register(&name);
        tracing::debug!(
            "Fabricated projection type {} with {} properties in {}",
            name,
            definitions.len(),
            namespace.name()
        );

        Ok(Arc::new(ProjectionType::new(name, namespace, definitions)))
    }

    fn reset(&self) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(TypeNamespace::new(
            &self.namespace_prefix,
            current.generation() + 1,
        ));
        tracing::debug!(
            "Switching projection namespace from {} ({} types) to {}",
            current.name(),
            current.type_count(),
            next.name()
        );
        *current = next;
        self.epoch.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(AtomicOrdering::SeqCst)
    }
}
