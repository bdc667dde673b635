/*!
 * Stage Resolution & Caching
 * (declaring type, method) -> validated plan, memoized for process lifetime
 */

use super::descriptor::{
    AspectDesc, CoroutineDesc, LockDesc, QueueDesc, StageDescriptor, StageKind, TaskDesc,
    TransactionDesc,
};
use crate::core::errors::StageError;
use crate::core::types::{InlineString, MethodId};
use ahash::RandomState;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Terminal stage selected for a method, if any
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalDesc {
    Queue(QueueDesc),
    Task(TaskDesc),
    Coroutine(CoroutineDesc),
}

/// Validated execution plan for one method
///
/// Aspects keep declaration order; outer stages were priority-sorted before
/// validation. Invariants enforced here: at most one transaction, at most one
/// lock, at most one terminal, and lock/terminal never together.
#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    pub aspects: Vec<AspectDesc>,
    pub transaction: Option<TransactionDesc>,
    pub lock: Option<LockDesc>,
    pub terminal: Option<TerminalDesc>,
}

impl StagePlan {
    /// Empty plans take the fast path: a plain direct call
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
            && self.transaction.is_none()
            && self.lock.is_none()
            && self.terminal.is_none()
    }

    fn from_descriptors(method: &MethodId, declared: &[StageDescriptor]) -> Result<Self, StageError> {
        let mut plan = StagePlan::default();

        // Outer stages honor priority; aspects stay in declaration order.
        let mut outer: Vec<&StageDescriptor> = declared
            .iter()
            .filter(|d| !matches!(d.kind, StageKind::Aspect(_)))
            .collect();
        outer.sort_by_key(|d| d.priority);

        for desc in declared {
            if let StageKind::Aspect(aspect) = &desc.kind {
                plan.aspects.push(aspect.clone());
            }
        }

        for desc in outer {
            match &desc.kind {
                StageKind::Aspect(_) => {}
                StageKind::Transaction(t) => {
                    if plan.transaction.is_some() {
                        return Err(conflict(method, "multiple transaction stages"));
                    }
                    plan.transaction = Some(t.clone());
                }
                StageKind::Lock(l) => {
                    if plan.lock.is_some() {
                        return Err(conflict(method, "multiple lock stages"));
                    }
                    plan.lock = Some(l.clone());
                }
                StageKind::Queue(q) => {
                    set_terminal(method, &mut plan, desc, TerminalDesc::Queue(q.clone()))?
                }
                StageKind::Task(t) => {
                    set_terminal(method, &mut plan, desc, TerminalDesc::Task(t.clone()))?
                }
                StageKind::Coroutine(c) => {
                    set_terminal(method, &mut plan, desc, TerminalDesc::Coroutine(c.clone()))?
                }
            }
        }

        // Lock and terminal are mutually exclusive redirect points
        if plan.lock.is_some() && plan.terminal.is_some() {
            return Err(conflict(method, "lock combined with a terminal stage"));
        }

        Ok(plan)
    }
}

fn set_terminal(
    method: &MethodId,
    plan: &mut StagePlan,
    desc: &StageDescriptor,
    terminal: TerminalDesc,
) -> Result<(), StageError> {
    if !desc.asynchronous {
        return Err(conflict(method, "terminal stage marked synchronous"));
    }
    if plan.terminal.is_some() {
        return Err(conflict(method, "multiple terminal stages"));
    }
    plan.terminal = Some(terminal);
    Ok(())
}

fn conflict(method: &MethodId, what: &str) -> StageError {
    StageError::ConflictingDescriptors(InlineString::from(
        format!("{} on {}", what, method).as_str(),
    ))
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStats {
    pub declared_methods: usize,
    pub cached_plans: usize,
}

/// Process-wide stage metadata table with memoized resolution
///
/// Plans are resolved lazily on first invocation and never invalidated at
/// runtime. Concurrent first resolutions may both construct a plan; the
/// descriptors are pure data so the duplicate is harmless and one copy wins.
pub struct StageRegistry {
    declared: DashMap<MethodId, Vec<StageDescriptor>, RandomState>,
    plans: DashMap<MethodId, Arc<StagePlan>, RandomState>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            declared: DashMap::with_hasher(RandomState::new()),
            plans: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Attach descriptors to a method, in declaration order
    pub fn annotate(&self, method: MethodId, descriptors: Vec<StageDescriptor>) {
        self.declared.insert(method, descriptors);
    }

    /// Resolve the cached plan for a method; unannotated methods get the
    /// empty plan (direct-call fast path)
    pub fn resolve(&self, method: &MethodId) -> Result<Arc<StagePlan>, StageError> {
        if let Some(plan) = self.plans.get(method) {
            return Ok(Arc::clone(plan.value()));
        }

        let plan = match self.declared.get(method) {
            Some(descriptors) => Arc::new(StagePlan::from_descriptors(method, &descriptors)?),
            None => Arc::new(StagePlan::default()),
        };

        debug!(
            "Resolved stage plan for {} ({} aspects, txn={}, lock={}, terminal={})",
            method,
            plan.aspects.len(),
            plan.transaction.is_some(),
            plan.lock.is_some(),
            plan.terminal.is_some()
        );

        // Losing a resolution race is fine: both plans are identical data
        self.plans.insert(method.clone(), Arc::clone(&plan));
        Ok(plan)
    }

    pub fn stats(&self) -> PlanStats {
        PlanStats {
            declared_methods: self.declared.len(),
            cached_plans: self.plans.len(),
        }
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::AspectConfig;

    fn method() -> MethodId {
        MethodId::new("Order", "place")
    }

    #[test]
    fn test_unannotated_method_resolves_empty() {
        let registry = StageRegistry::new();
        let plan = registry.resolve(&method()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_is_cached() {
        let registry = StageRegistry::new();
        registry.annotate(
            method(),
            vec![StageDescriptor::aspect("audit", AspectConfig::new())],
        );
        let first = registry.resolve(&method()).unwrap();
        let second = registry.resolve(&method()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.stats().cached_plans, 1);
    }

    #[test]
    fn test_annotation_after_resolution_is_ignored() {
        let registry = StageRegistry::new();
        let before = registry.resolve(&method()).unwrap();
        assert!(before.is_empty());

        registry.annotate(
            method(),
            vec![StageDescriptor::transaction(TransactionDesc::default())],
        );
        // Cache is never invalidated at runtime
        let after = registry.resolve(&method()).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_duplicate_transaction_rejected() {
        let registry = StageRegistry::new();
        registry.annotate(
            method(),
            vec![
                StageDescriptor::transaction(TransactionDesc::default()),
                StageDescriptor::transaction(TransactionDesc::default()),
            ],
        );
        assert!(matches!(
            registry.resolve(&method()),
            Err(StageError::ConflictingDescriptors(_))
        ));
    }

    #[test]
    fn test_lock_with_terminal_rejected() {
        let registry = StageRegistry::new();
        registry.annotate(
            method(),
            vec![
                StageDescriptor::lock(LockDesc::default()),
                StageDescriptor::queue(QueueDesc::default()),
            ],
        );
        assert!(registry.resolve(&method()).is_err());
    }

    #[test]
    fn test_two_terminals_rejected() {
        let registry = StageRegistry::new();
        registry.annotate(
            method(),
            vec![
                StageDescriptor::queue(QueueDesc::default()),
                StageDescriptor::coroutine(CoroutineDesc { name: "c".into() }),
            ],
        );
        assert!(registry.resolve(&method()).is_err());
    }

    #[test]
    fn test_aspects_keep_declaration_order_despite_priority() {
        let registry = StageRegistry::new();
        registry.annotate(
            method(),
            vec![
                StageDescriptor::aspect("first", AspectConfig::new()).with_priority(100),
                StageDescriptor::aspect("second", AspectConfig::new()).with_priority(-100),
            ],
        );
        let plan = registry.resolve(&method()).unwrap();
        let tags: Vec<&str> = plan.aspects.iter().map(|a| a.tag.as_str()).collect();
        assert_eq!(tags, vec!["first", "second"]);
    }
}
