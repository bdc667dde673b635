/*!
 * JoinPoint
 * The reified call passed through the aspect lifecycle
 */

use crate::context::{ContextSnapshot, TargetRef};
use crate::core::errors::StageError;
use crate::core::types::{InlineString, MethodId, Value};
use crate::method::MethodSpec;
use std::sync::Arc;
use std::sync::OnceLock;

/// One intercepted call: target, resolved method handle, and mutable arguments
///
/// Argument mutation by one aspect is visible to later aspects and to the
/// inner call. Signature text is derived lazily and cached.
pub struct JoinPoint {
    target: TargetRef,
    spec: Arc<MethodSpec>,
    args: Vec<Value>,
    context: ContextSnapshot,
    signature: OnceLock<String>,
}

impl JoinPoint {
    pub fn new(target: TargetRef, spec: Arc<MethodSpec>, args: Vec<Value>) -> Self {
        Self {
            target,
            spec,
            args,
            context: ContextSnapshot::default(),
            signature: OnceLock::new(),
        }
    }

    /// Join point carrying an inherited context snapshot (spawned tasks)
    pub fn with_context(
        target: TargetRef,
        spec: Arc<MethodSpec>,
        args: Vec<Value>,
        context: ContextSnapshot,
    ) -> Self {
        Self {
            target,
            spec,
            args,
            context,
            signature: OnceLock::new(),
        }
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn method(&self) -> &MethodId {
        self.spec.id()
    }

    /// The cached method handle resolved for this call
    pub fn spec(&self) -> &Arc<MethodSpec> {
        &self.spec
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Argument lookup by declared parameter name
    pub fn arg_named(&self, name: &str) -> Option<&Value> {
        self.spec.param_index(name).and_then(|i| self.args.get(i))
    }

    /// Replace one argument in place; later aspects and the inner call see it
    pub fn set_arg(&mut self, index: usize, value: Value) -> Result<(), StageError> {
        match self.args.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StageError::ArgumentIndex {
                index,
                method: InlineString::from(self.spec.id().to_string().as_str()),
            }),
        }
    }

    pub fn replace_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub fn param_names(&self) -> &[InlineString] {
        self.spec.params()
    }

    /// Context inherited from the dispatching call, if any
    pub fn context(&self) -> &ContextSnapshot {
        &self.context
    }

    /// Lazily derived "Type::method(a, b)" signature text
    pub fn signature(&self) -> &str {
        self.signature.get_or_init(|| {
            let params: Vec<&str> = self.spec.params().iter().map(|p| p.as_str()).collect();
            format!("{}({})", self.spec.id(), params.join(", "))
        })
    }
}
