/*!
 * Aspect Module
 * Before/around/after/afterThrowing interception contract
 */

mod joinpoint;
mod lifecycle;
mod registry;

pub use joinpoint::JoinPoint;
pub use lifecycle::run_lifecycle;
pub use registry::{AspectConfig, AspectFactory, AspectRegistry};

use crate::core::errors::MethodError;
use crate::core::types::Value;

/// Classic aspect contract; every hook has a no-op default
///
/// Hooks run in declared order, never re-sorted. `around` may short-circuit
/// the call by returning `Some(result)`. `after_throwing` observes the
/// business error but cannot replace or suppress it.
pub trait Aspect: Send + Sync {
    fn before(&self, _jp: &mut JoinPoint) -> Result<(), MethodError> {
        Ok(())
    }

    fn around(&self, _jp: &mut JoinPoint) -> Result<Option<Value>, MethodError> {
        Ok(None)
    }

    fn after(&self, _jp: &mut JoinPoint, _result: &Value) -> Result<(), MethodError> {
        Ok(())
    }

    fn after_throwing(&self, _jp: &mut JoinPoint, _error: &MethodError) {}
}
