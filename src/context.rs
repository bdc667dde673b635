/*!
 * Execution Context
 * Per-call state handed to the pipeline, plus spawn-time snapshots
 */

use crate::core::types::{InlineString, MethodId, OpaqueRef, Value};
use ahash::RandomState;
use std::collections::{HashMap, HashSet};

/// Call target: a live instance or a static (type-level) call
#[derive(Debug, Clone)]
pub enum TargetRef {
    Instance(OpaqueRef),
    Static,
}

/// One reified call entering the pipeline
///
/// Target identity and method are fixed at construction; arguments stay
/// replaceable until dispatch. The context bag carries call-scoped values,
/// some of which are marked unit-of-work-scoped and excluded from snapshots
/// handed to spawned tasks.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    target: TargetRef,
    method: MethodId,
    proxy_method: InlineString,
    is_static: bool,
    args: Vec<Value>,
    bag: HashMap<InlineString, Value, RandomState>,
    unit_of_work_keys: HashSet<InlineString, RandomState>,
    is_worker: bool,
}

impl ExecutionContext {
    /// Context for a static (type-level) call
    pub fn new(method: MethodId) -> Self {
        let proxy_method = method.method.clone();
        Self {
            target: TargetRef::Static,
            method,
            proxy_method,
            is_static: true,
            args: Vec::new(),
            bag: HashMap::with_hasher(RandomState::new()),
            unit_of_work_keys: HashSet::with_hasher(RandomState::new()),
            is_worker: false,
        }
    }

    /// Context for a call on a live instance
    pub fn for_instance(target: OpaqueRef, method: MethodId) -> Self {
        let mut ctx = Self::new(method);
        ctx.target = TargetRef::Instance(target);
        ctx.is_static = false;
        ctx
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_proxy_method(mut self, name: impl Into<InlineString>) -> Self {
        self.proxy_method = name.into();
        self
    }

    /// Mark this context as running inside a worker process
    ///
    /// Task dispatch executes inline for worker contexts to avoid
    /// worker-to-worker dead-lock.
    pub fn mark_worker(mut self) -> Self {
        self.is_worker = true;
        self
    }

    /// Replace arguments; legal any time before dispatch
    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn take_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.args)
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn proxy_method(&self) -> &str {
        &self.proxy_method
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_worker(&self) -> bool {
        self.is_worker
    }

    /// Store a call-scoped value
    pub fn put(&mut self, key: impl Into<InlineString>, value: Value) {
        self.bag.insert(key.into(), value);
    }

    /// Store a unit-of-work-scoped value (open transaction handle, session
    /// state). Excluded from every snapshot: a spawned task must never touch
    /// a transaction it does not own.
    pub fn put_unit_of_work(&mut self, key: impl Into<InlineString>, value: Value) {
        let key = key.into();
        self.unit_of_work_keys.insert(key.clone());
        self.bag.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bag.get(key)
    }

    /// Snapshot for hand-off to another task, unit-of-work keys excluded
    pub fn snapshot(&self) -> ContextSnapshot {
        let values = self
            .bag
            .iter()
            .filter(|(k, _)| !self.unit_of_work_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ContextSnapshot { values }
    }

    /// Full copy of the bag for same-coroutine execution
    pub(crate) fn full_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            values: self.bag.clone(),
        }
    }
}

/// Immutable value bag captured at spawn time
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    values: HashMap<InlineString, Value, RandomState>,
}

impl ContextSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
