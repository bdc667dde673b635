/*!
 * Method Registry
 * Maps method identity to declared parameters and the executable body
 */

use crate::aspect::JoinPoint;
use crate::core::errors::MethodError;
use crate::core::types::{InlineString, MethodId, Value};
use ahash::RandomState;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Executable method body
pub type MethodBody =
    Arc<dyn Fn(&mut JoinPoint) -> Result<Value, MethodError> + Send + Sync + 'static>;

/// A registered method: identity, declared parameter names, and body
pub struct MethodSpec {
    id: MethodId,
    params: Vec<InlineString>,
    body: MethodBody,
}

impl MethodSpec {
    pub fn id(&self) -> &MethodId {
        &self.id
    }

    pub fn params(&self) -> &[InlineString] {
        &self.params
    }

    /// Position of a declared parameter by name
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    /// Run the body against the join point's current arguments
    pub fn invoke(&self, jp: &mut JoinPoint) -> Result<Value, MethodError> {
        (self.body)(jp)
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish()
    }
}

/// Process-wide table of interceptable methods
///
/// The queue consumer and worker pool execute durable/forwarded jobs by
/// looking their bodies up here.
pub struct MethodRegistry {
    methods: DashMap<MethodId, Arc<MethodSpec>, RandomState>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            methods: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn register<F>(&self, id: MethodId, params: &[&str], body: F)
    where
        F: Fn(&mut JoinPoint) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        debug!("Registering method {}", id);
        let spec = MethodSpec {
            id: id.clone(),
            params: params.iter().map(|p| InlineString::from(*p)).collect(),
            body: Arc::new(body),
        };
        self.methods.insert(id, Arc::new(spec));
    }

    pub fn get(&self, id: &MethodId) -> Option<Arc<MethodSpec>> {
        self.methods.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &MethodId) -> bool {
        self.methods.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TargetRef;

    #[test]
    fn test_register_and_invoke() {
        let registry = MethodRegistry::new();
        let id = MethodId::new("Calc", "add");
        registry.register(id.clone(), &["a", "b"], |jp| {
            let a = match jp.arg(0) {
                Some(Value::Int(v)) => *v,
                _ => 0,
            };
            let b = match jp.arg(1) {
                Some(Value::Int(v)) => *v,
                _ => 0,
            };
            Ok(Value::Int(a + b))
        });

        let spec = registry.get(&id).unwrap();
        assert_eq!(spec.param_index("b"), Some(1));

        let mut jp = JoinPoint::new(
            TargetRef::Static,
            Arc::clone(&spec),
            vec![Value::Int(2), Value::Int(3)],
        );
        assert_eq!(spec.invoke(&mut jp).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_missing_method() {
        let registry = MethodRegistry::new();
        assert!(registry.get(&MethodId::new("Nope", "missing")).is_none());
    }
}
