/*!
 * Aspect Registry
 * Discriminator tag -> factory, with typed descriptor configuration
 */

use super::Aspect;
use crate::core::errors::StageError;
use crate::core::types::InlineString;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Typed configuration handed to an aspect factory
///
/// Replaces runtime-validated positional constructor arguments: parameters are
/// named, plain data, fixed at descriptor-authoring time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectConfig {
    params: BTreeMap<InlineString, serde_json::Value>,
}

impl AspectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<InlineString>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }
}

/// Factory producing an aspect instance from its descriptor configuration
pub type AspectFactory = Arc<dyn Fn(&AspectConfig) -> Arc<dyn Aspect> + Send + Sync>;

/// Process-wide table of aspect factories keyed by discriminator tag
pub struct AspectRegistry {
    factories: DashMap<InlineString, AspectFactory, RandomState>,
}

impl AspectRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn register<F>(&self, tag: impl Into<InlineString>, factory: F)
    where
        F: Fn(&AspectConfig) -> Arc<dyn Aspect> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Instantiate one aspect; unknown tags fail fast before any side effect
    pub fn instantiate(
        &self,
        tag: &str,
        config: &AspectConfig,
    ) -> Result<Arc<dyn Aspect>, StageError> {
        match self.factories.get(tag) {
            Some(factory) => Ok(factory(config)),
            None => Err(StageError::UnknownAspect(InlineString::from(tag))),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
