/*!
 * Coroutine Dispatch
 * Fire-and-forget hand-off to a lightweight in-process task
 */

use crate::aspect::JoinPoint;
use crate::context::{ContextSnapshot, TargetRef};
use crate::core::errors::{PipelineError, StageError};
use crate::core::types::{InlineString, MethodId, Value};
use crate::method::MethodRegistry;
use crate::stage::CoroutineDesc;
use log::error;
use std::sync::Arc;

/// Schedules calls on separate cooperative tasks in the same process
///
/// The spawned task inherits a snapshot of the caller's call-scoped context
/// with unit-of-work-scoped entries already excluded, so it cannot silently
/// touch a transaction it does not own. Only "scheduled after" ordering is
/// guaranteed; there is no result channel.
#[derive(Clone)]
pub struct CoroutineDispatcher {
    methods: Arc<MethodRegistry>,
}

impl CoroutineDispatcher {
    pub fn new(methods: Arc<MethodRegistry>) -> Self {
        Self { methods }
    }

    pub fn spawn(
        &self,
        desc: &CoroutineDesc,
        snapshot: ContextSnapshot,
        method: MethodId,
        args: Vec<Value>,
    ) -> Result<(), PipelineError> {
        // Resolve before spawning so a missing method fails fast in the caller
        let spec = self.methods.get(&method).ok_or_else(|| {
            StageError::MethodNotFound(InlineString::from(method.to_string().as_str()))
        })?;

        let name = desc.name.clone();
        tokio::spawn(async move {
            let mut jp = JoinPoint::with_context(TargetRef::Static, spec.clone(), args, snapshot);
            if let Err(e) = spec.invoke(&mut jp) {
                error!("Coroutine '{}' ({}) failed: {}", name, method, e);
            }
        });
        Ok(())
    }
}
