/*!
 * Dispatch Integration Tests
 * Coroutine and task terminal stages through the executor
 */

use crosscut::pipeline::Dispatch;
use crosscut::stage::{CoroutineDesc, StageDescriptor, TaskDesc};
use crosscut::{
    ExecutionContext, MethodId, MethodRegistry, Outcome, PipelineBuilder, PipelineExecutor,
    StageRegistry, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    executor: PipelineExecutor,
    method: MethodId,
    seen: Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>>,
}

/// Registers `Audit::record`, which captures its first argument plus the
/// `request_id` and `txn` context entries visible at run time.
fn fixture(descriptor: StageDescriptor, worker_count: usize) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let methods = Arc::new(MethodRegistry::new());
    let stages = Arc::new(StageRegistry::new());
    let seen: Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>> = Arc::new(Mutex::new(Vec::new()));

    let method = MethodId::new("Audit", "record");
    {
        let seen = Arc::clone(&seen);
        methods.register(method.clone(), &["entry"], move |jp| {
            seen.lock().push((
                jp.context().get("request_id").cloned(),
                jp.context().get("txn").cloned(),
            ));
            Ok(Value::Null)
        });
    }
    stages.annotate(method.clone(), vec![descriptor]);

    let executor = PipelineBuilder::new()
        .methods(methods)
        .stages(stages)
        .workers(worker_count)
        .build();

    Fixture {
        executor,
        method,
        seen,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_coroutine_returns_sentinel_and_runs_detached() {
    let f = fixture(
        StageDescriptor::coroutine(CoroutineDesc {
            name: "audit".into(),
        }),
        0,
    );

    let ctx = ExecutionContext::new(f.method.clone()).with_args(vec![Value::Str("login".into())]);
    let outcome = f.executor.invoke(ctx).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Dispatched(Dispatch::Coroutine {
            name: "audit".into()
        })
    );
    settle().await;
    assert_eq!(f.seen.lock().len(), 1);
}

#[tokio::test]
async fn test_coroutine_inherits_snapshot_without_unit_of_work_entries() {
    let f = fixture(
        StageDescriptor::coroutine(CoroutineDesc {
            name: "audit".into(),
        }),
        0,
    );

    let mut ctx = ExecutionContext::new(f.method.clone()).with_args(vec![Value::Null]);
    ctx.put("request_id", Value::Str("req-7".into()));
    ctx.put_unit_of_work("txn", Value::Str("session-handle".into()));

    f.executor.invoke(ctx).await.unwrap();
    settle().await;

    let seen = f.seen.lock();
    assert_eq!(seen.len(), 1);
    // Call-scoped entry crosses the spawn boundary; the open unit of work does not
    assert_eq!(seen[0].0, Some(Value::Str("req-7".into())));
    assert_eq!(seen[0].1, None);
}

#[tokio::test]
async fn test_coroutine_unknown_method_fails_in_caller() {
    let stages = Arc::new(StageRegistry::new());
    let method = MethodId::new("Ghost", "run");
    stages.annotate(
        method.clone(),
        vec![StageDescriptor::coroutine(CoroutineDesc { name: "x".into() })],
    );
    let executor = PipelineBuilder::new().stages(stages).build();

    let error = executor
        .invoke(ExecutionContext::new(method))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("Ghost::run"));
}

#[tokio::test]
async fn test_task_forwards_to_worker_pool() {
    let f = fixture(
        StageDescriptor::task(TaskDesc {
            timeout_secs: Some(30),
            name: "audit".into(),
        }),
        2,
    );

    let ctx = ExecutionContext::new(f.method.clone()).with_args(vec![Value::Str("login".into())]);
    let outcome = f.executor.invoke(ctx).await.unwrap();

    assert_eq!(outcome, Outcome::Dispatched(Dispatch::Task { inline: false }));
    settle().await;
    assert_eq!(f.seen.lock().len(), 1);
}

#[tokio::test]
async fn test_task_runs_inline_when_caller_is_worker() {
    // No workers spawned: a forwarded job would never execute
    let f = fixture(
        StageDescriptor::task(TaskDesc {
            timeout_secs: None,
            name: "audit".into(),
        }),
        0,
    );

    let ctx = ExecutionContext::new(f.method.clone())
        .with_args(vec![Value::Str("login".into())])
        .mark_worker();
    let outcome = f.executor.invoke(ctx).await.unwrap();

    assert_eq!(outcome, Outcome::Dispatched(Dispatch::Task { inline: true }));
    // Already executed, no settling needed
    assert_eq!(f.seen.lock().len(), 1);
}
