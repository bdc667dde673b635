/*!
 * Aspect Lifecycle
 * Fixed before/around/after/afterThrowing protocol around an inner call
 */

use super::{Aspect, JoinPoint};
use crate::core::errors::{PipelineError, Result};
use crate::core::types::Value;
use log::debug;
use std::sync::Arc;

/// Run the full aspect protocol in declared order around `inner`.
///
/// 1. `before` on every aspect; a failure here propagates immediately and
///    `after_throwing` is NOT invoked for it.
/// 2. `around` in order; the first `Some` result short-circuits: remaining
///    arounds are skipped and the inner call never runs.
/// 3. The inner call with the (possibly before-mutated) arguments.
/// 4. `after` in order with the result.
/// 5. On failure from 2-3: `after_throwing` in order, then the original
///    business error is re-raised unmodified.
pub fn run_lifecycle<F>(aspects: &[Arc<dyn Aspect>], jp: &mut JoinPoint, inner: F) -> Result<Value>
where
    F: FnOnce(&mut JoinPoint) -> Result<Value>,
{
    for aspect in aspects {
        aspect.before(jp).map_err(PipelineError::from)?;
    }

    let outcome = run_around_and_inner(aspects, jp, inner);

    match outcome {
        Ok(result) => {
            for aspect in aspects {
                aspect.after(jp, &result).map_err(PipelineError::from)?;
            }
            Ok(result)
        }
        Err(error) => {
            // Infrastructure failures (lock, transaction setup) bypass the
            // hooks; only business errors reach after_throwing.
            if let Some(inner_err) = error.as_inner() {
                debug!("{} raised '{}', running after_throwing hooks", jp.signature(), inner_err);
                for aspect in aspects {
                    aspect.after_throwing(jp, inner_err);
                }
            }
            Err(error)
        }
    }
}

fn run_around_and_inner<F>(
    aspects: &[Arc<dyn Aspect>],
    jp: &mut JoinPoint,
    inner: F,
) -> Result<Value>
where
    F: FnOnce(&mut JoinPoint) -> Result<Value>,
{
    for aspect in aspects {
        if let Some(result) = aspect.around(jp).map_err(PipelineError::from)? {
            return Ok(result);
        }
    }
    inner(jp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TargetRef;
    use crate::core::errors::MethodError;
    use crate::core::types::MethodId;
    use crate::method::MethodRegistry;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        around_result: Option<Value>,
        fail_before: bool,
    }

    impl Recording {
        fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log,
                around_result: None,
                fail_before: false,
            }
        }
    }

    impl Aspect for Recording {
        fn before(&self, _jp: &mut JoinPoint) -> std::result::Result<(), MethodError> {
            self.log.lock().push(format!("{}:before", self.name));
            if self.fail_before {
                return Err(MethodError::new("before", format!("{} refused", self.name)));
            }
            Ok(())
        }

        fn around(&self, _jp: &mut JoinPoint) -> std::result::Result<Option<Value>, MethodError> {
            self.log.lock().push(format!("{}:around", self.name));
            Ok(self.around_result.clone())
        }

        fn after(&self, _jp: &mut JoinPoint, _result: &Value) -> std::result::Result<(), MethodError> {
            self.log.lock().push(format!("{}:after", self.name));
            Ok(())
        }

        fn after_throwing(&self, _jp: &mut JoinPoint, _error: &MethodError) {
            self.log.lock().push(format!("{}:throwing", self.name));
        }
    }

    fn join_point() -> JoinPoint {
        let registry = MethodRegistry::new();
        let id = MethodId::new("T", "m");
        registry.register(id.clone(), &[], |_| Ok(Value::Null));
        JoinPoint::new(TargetRef::Static, registry.get(&id).unwrap(), vec![])
    }

    #[test]
    fn test_order_all_before_then_around_then_after() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let aspects: Vec<Arc<dyn Aspect>> = vec![
            Arc::new(Recording::new("a", Arc::clone(&log))),
            Arc::new(Recording::new("b", Arc::clone(&log))),
        ];
        let mut jp = join_point();

        let result = run_lifecycle(&aspects, &mut jp, |_| Ok(Value::Int(1))).unwrap();
        assert_eq!(result, Value::Int(1));
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "a:around", "b:around", "a:after", "b:after"]
        );
    }

    #[test]
    fn test_around_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = Recording::new("a", Arc::clone(&log));
        first.around_result = Some(Value::Int(99));
        let aspects: Vec<Arc<dyn Aspect>> = vec![
            Arc::new(first),
            Arc::new(Recording::new("b", Arc::clone(&log))),
        ];
        let mut jp = join_point();

        let result = run_lifecycle(&aspects, &mut jp, |_| {
            panic!("inner must not run after a short-circuit")
        })
        .unwrap();
        assert_eq!(result, Value::Int(99));
        // b's around skipped, both afters still run
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "a:around", "a:after", "b:after"]
        );
    }

    #[test]
    fn test_inner_failure_runs_after_throwing_and_rethrows() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let aspects: Vec<Arc<dyn Aspect>> = vec![
            Arc::new(Recording::new("a", Arc::clone(&log))),
            Arc::new(Recording::new("b", Arc::clone(&log))),
        ];
        let mut jp = join_point();

        let error = run_lifecycle(&aspects, &mut jp, |_| {
            Err(MethodError::new("biz", "exploded").into())
        })
        .unwrap_err();

        let inner = error.as_inner().unwrap();
        assert_eq!(inner.kind, "biz");
        assert_eq!(inner.message, "exploded");
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "a:around", "b:around", "a:throwing", "b:throwing"]
        );
    }

    #[test]
    fn test_before_failure_skips_after_throwing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut failing = Recording::new("b", Arc::clone(&log));
        failing.fail_before = true;
        let aspects: Vec<Arc<dyn Aspect>> = vec![
            Arc::new(Recording::new("a", Arc::clone(&log))),
            Arc::new(failing),
        ];
        let mut jp = join_point();

        let error = run_lifecycle(&aspects, &mut jp, |_| Ok(Value::Null)).unwrap_err();
        assert_eq!(error.as_inner().unwrap().kind, "before");
        // No around, no after, and crucially no after_throwing
        assert_eq!(*log.lock(), vec!["a:before", "b:before"]);
    }
}
