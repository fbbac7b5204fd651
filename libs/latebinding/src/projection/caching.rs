use super::{validate_definitions, ProjectionType, ProjectionTypeGenerator, PropertyDefinition};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Order-independent identity of a definition set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey(Vec<PropertyDefinition>);

impl CacheKey {
    fn new(definitions: &[PropertyDefinition]) -> Self {
        let mut defs = definitions.to_vec();
        defs.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.ty().to_string().cmp(&b.ty().to_string()))
        });
        defs.dedup();
        CacheKey(defs)
    }
}

struct CacheEntry {
    projection: Weak<ProjectionType>,
    epoch: u64,
}

/// Hands out one projection type per distinct definition set.
///
/// Entries hold the type weakly: once every caller has dropped it the next
/// request fabricates a new one. Entries fabricated before the inner
/// generator was reset are discarded, since their namespace is gone.
///
/// A returned type may list its properties in a different order than the
/// request when an equal set was cached first; look slots up by name.
pub struct CachingTypeGenerator<G> {
    inner: G,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    generate_lock: Mutex<()>,
}

impl<G: ProjectionTypeGenerator> CachingTypeGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            generate_lock: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Number of entries whose type is still alive and current.
    pub fn cached_len(&self) -> usize {
        let epoch = self.inner.epoch();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| entry.epoch == epoch && entry.projection.strong_count() > 0)
            .count()
    }

    /// Drop entries whose type is gone or stale. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let epoch = self.inner.epoch();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.epoch == epoch && entry.projection.strong_count() > 0);
        before - entries.len()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<ProjectionType>> {
        let stale = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            let entry = entries.get(key)?;
            if entry.epoch == self.inner.epoch() {
                if let Some(projection) = entry.projection.upgrade() {
                    return Some(projection);
                }
            }
            entry.projection.clone()
        };
        self.evict(key, &stale);
        None
    }

    /// Remove the entry for `key` only if it still refers to `stale`; a
    /// concurrent caller may already have replaced it.
    fn evict(&self, key: &CacheKey, stale: &Weak<ProjectionType>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries
            .get(key)
            .is_some_and(|entry| Weak::ptr_eq(&entry.projection, stale))
        {
            entries.remove(key);
            tracing::debug!("Evicted stale projection cache entry");
        }
    }
}

impl<G: ProjectionTypeGenerator> ProjectionTypeGenerator for CachingTypeGenerator<G> {
    fn generate(&self, definitions: &[PropertyDefinition]) -> Result<Arc<ProjectionType>> {
        validate_definitions(definitions)?;
        let key = CacheKey::new(definitions);

        if let Some(projection) = self.lookup(&key) {
            tracing::trace!("Projection cache hit: {}", projection.name());
            return Ok(projection);
        }

        let _guard = self.generate_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(projection) = self.lookup(&key) {
            tracing::trace!("Projection cache hit after wait: {}", projection.name());
            return Ok(projection);
        }

        tracing::debug!("Projection cache miss for {} properties", definitions.len());
        let projection = self.inner.generate(definitions)?;
        let epoch = self.inner.epoch();

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.epoch == epoch && entry.projection.strong_count() > 0);
        entries.insert(
            key,
            CacheEntry {
                projection: Arc::downgrade(&projection),
                epoch,
            },
        );
        Ok(projection)
    }

    fn reset(&self) {
        let _guard = self.generate_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.inner.reset();
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch()
    }
}
