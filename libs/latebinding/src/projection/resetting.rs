use super::{ProjectionType, ProjectionTypeGenerator, PropertyDefinition};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

/// Resets the wrapped generator after `threshold` fabrications.
///
/// The check happens before each call: once `threshold` types have been
/// produced since the last reset, the inner generator is reset and the
/// count starts over. A failed fabrication is not counted.
pub struct SelfResettingTypeGenerator<G> {
    inner: G,
    threshold: usize,
    count: Mutex<usize>,
}

impl<G: ProjectionTypeGenerator> SelfResettingTypeGenerator<G> {
    pub fn new(inner: G, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::Config(
                "reset threshold must be greater than zero".into(),
            ));
        }
        Ok(Self {
            inner,
            threshold,
            count: Mutex::new(0),
        })
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn generated_since_reset(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<G: ProjectionTypeGenerator> ProjectionTypeGenerator for SelfResettingTypeGenerator<G> {
    fn generate(&self, definitions: &[PropertyDefinition]) -> Result<Arc<ProjectionType>> {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count >= self.threshold {
            tracing::debug!(
                "Projection threshold of {} reached, resetting generator",
                self.threshold
            );
            self.inner.reset();
            *count = 0;
        }
        let projection = self.inner.generate(definitions)?;
        *count += 1;
        Ok(projection)
    }

    fn reset(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.reset();
        *count = 0;
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionConfig;
    use crate::projection::NamespaceTypeGenerator;
    use crate::types::Type;

    fn defs() -> Vec<PropertyDefinition> {
        vec![PropertyDefinition::new("v", Type::I32)]
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let inner = NamespaceTypeGenerator::new(&ProjectionConfig::default());
        assert!(matches!(
            SelfResettingTypeGenerator::new(inner, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_namespace_never_exceeds_threshold() {
        let inner = NamespaceTypeGenerator::new(&ProjectionConfig::default());
        let gen = SelfResettingTypeGenerator::new(inner, 3).unwrap();

        for _ in 0..3 {
            gen.generate(&defs()).unwrap();
        }
        assert_eq!(gen.epoch(), 0);
        assert_eq!(gen.inner().namespace().type_count(), 3);

        gen.generate(&defs()).unwrap();
        assert_eq!(gen.epoch(), 1);
        assert_eq!(gen.inner().namespace().type_count(), 1);
        assert_eq!(gen.generated_since_reset(), 1);

        for _ in 0..20 {
            gen.generate(&defs()).unwrap();
            assert!(gen.inner().namespace().type_count() <= 3);
        }
    }

    #[test]
    fn test_failures_do_not_count() {
        let inner = NamespaceTypeGenerator::new(&ProjectionConfig::default());
        let gen = SelfResettingTypeGenerator::new(inner, 2).unwrap();
        let blank = [PropertyDefinition::new(" ", Type::I32)];
        assert!(gen.generate(&blank).is_err());
        assert_eq!(gen.generated_since_reset(), 0);
    }

    #[test]
    fn test_manual_reset_clears_count() {
        let inner = NamespaceTypeGenerator::new(&ProjectionConfig::default());
        let gen = SelfResettingTypeGenerator::new(inner, 5).unwrap();
        gen.generate(&defs()).unwrap();
        gen.reset();
        assert_eq!(gen.generated_since_reset(), 0);
        assert_eq!(gen.epoch(), 1);
    }
}
