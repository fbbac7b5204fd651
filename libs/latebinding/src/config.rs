//! Engine configuration.
//!
//! Every section is optional when deserializing; missing fields fall back to
//! the defaults below.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LateBindingConfig {
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub functions: FunctionsConfig,
}

// ============================================================================
// Section Configs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Number of projection types fabricated before the type namespace is
    /// discarded and a fresh one is started.
    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: usize,
    #[serde(default = "default_type_name_prefix")]
    pub type_name_prefix: String,
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,
    /// When disabled every selection fabricates a fresh projection type.
    #[serde(default = "default_true")]
    pub caching: bool,
}

fn default_reset_threshold() -> usize {
    100
}

fn default_type_name_prefix() -> String {
    "<projection>".to_string()
}

fn default_namespace_prefix() -> String {
    "<projection-namespace>".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            reset_threshold: default_reset_threshold(),
            type_name_prefix: default_type_name_prefix(),
            namespace_prefix: default_namespace_prefix(),
            caching: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionsConfig {
    /// Register the math, string, date-time and enumerable builders.
    #[serde(default = "default_true")]
    pub standard_library: bool,
    /// Register the boolean operators (`!`, `and`, `or`, `xor`, `==`, `!=`).
    #[serde(default = "default_true")]
    pub include_boolean: bool,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            standard_library: true,
            include_boolean: true,
        }
    }
}

impl LateBindingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.projection.reset_threshold == 0 {
            return Err(Error::Config(
                "projection.reset_threshold must be greater than zero".into(),
            ));
        }
        if self.projection.type_name_prefix.trim().is_empty() {
            return Err(Error::Config(
                "projection.type_name_prefix must not be blank".into(),
            ));
        }
        if self.projection.namespace_prefix.trim().is_empty() {
            return Err(Error::Config(
                "projection.namespace_prefix must not be blank".into(),
            ));
        }
        Ok(())
    }

    pub fn builder() -> LateBindingConfigBuilder {
        LateBindingConfigBuilder::default()
    }
}

// ============================================================================
// Builder Pattern
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct LateBindingConfigBuilder {
    cfg: LateBindingConfig,
}

impl LateBindingConfigBuilder {
    pub fn reset_threshold(mut self, threshold: usize) -> Self {
        self.cfg.projection.reset_threshold = threshold;
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.cfg.projection.caching = enabled;
        self
    }

    pub fn type_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cfg.projection.type_name_prefix = prefix.into();
        self
    }

    pub fn namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cfg.projection.namespace_prefix = prefix.into();
        self
    }

    pub fn standard_library(mut self, enabled: bool) -> Self {
        self.cfg.functions.standard_library = enabled;
        self
    }

    pub fn include_boolean(mut self, enabled: bool) -> Self {
        self.cfg.functions.include_boolean = enabled;
        self
    }

    pub fn build(self) -> Result<LateBindingConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
