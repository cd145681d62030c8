//! Dispatcher-level behavior through the public API: pool saturation,
//! custom dispatchers, span lifecycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use modflow::{
    Caster, Dispatcher, FlowError, Module, RecordingTracer, SpanOutcome, TraceEvent, WorkerPool,
    WorkerPoolConfig,
};

struct StringsOnly;

impl Caster for StringsOnly {
    fn cast(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::String(_) => Ok(value),
            other => Err(format!("expected a string, got {other}")),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_saturated_pool_rejects_instead_of_queueing_unbounded() {
    init_tracing();
    let pool = Arc::new(WorkerPool::with_config(WorkerPoolConfig {
        max_workers: 1,
        max_queue: 0,
    }));
    let dispatcher = Arc::new(Dispatcher::new().with_pool(Arc::clone(&pool)));

    let gate = Arc::new((std::sync::Mutex::new(false), std::sync::Condvar::new()));
    let hold = Arc::clone(&gate);
    let slow = Module::from_blocking("slow", move |v, _| {
        let (lock, cvar) = &*hold;
        let mut released = lock.lock().unwrap();
        while !*released {
            let (guard, timed_out) = cvar
                .wait_timeout(released, Duration::from_secs(5))
                .unwrap();
            released = guard;
            if timed_out.timed_out() {
                break;
            }
        }
        Ok(v)
    })
    .with_dispatcher(Arc::clone(&dispatcher));
    let quick = Module::from_blocking("quick", |v, _| Ok(v)).with_dispatcher(dispatcher);

    let occupant = tokio::spawn(async move { slow.call(json!(null)).await });
    // Let the occupant take the only worker slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = quick.call(json!(null)).await.unwrap_err();
    assert!(matches!(err, FlowError::PoolSaturated));
    assert_eq!(pool.stats().rejected, 1);

    *gate.0.lock().unwrap() = true;
    gate.1.notify_all();
    occupant.await.unwrap().unwrap();
    assert_eq!(pool.stats().completed, 1);
}

#[tokio::test]
async fn test_composite_spans_nest_under_parent() {
    init_tracing();
    let tracer = Arc::new(RecordingTracer::new());
    let dispatcher = Arc::new(Dispatcher::new().with_tracer(Arc::clone(&tracer) as _));

    let leaf = Module::from_blocking("leaf", |v, _| Ok(v)).with_dispatcher(Arc::clone(&dispatcher));
    let pipeline =
        Module::sequential("pipeline", vec![leaf]).with_dispatcher(Arc::clone(&dispatcher));

    pipeline.call(json!(1)).await.unwrap();

    let events = tracer.events();
    let (outer_span, leaf_parent) = match (&events[0], &events[1]) {
        (
            TraceEvent::Started { span, parent: None, .. },
            TraceEvent::Started { parent, .. },
        ) => (*span, *parent),
        other => panic!("unexpected leading events: {other:?}"),
    };
    // The leaf's span opened under the composite's span.
    assert_eq!(leaf_parent, Some(outer_span));
    assert!(events.iter().any(|e| matches!(
        e,
        TraceEvent::Ended { span, outcome: SpanOutcome::Completed } if *span == outer_span
    )));
}

#[tokio::test]
async fn test_failed_invocation_closes_span_as_failed() {
    let tracer = Arc::new(RecordingTracer::new());
    let dispatcher = Arc::new(Dispatcher::new().with_tracer(Arc::clone(&tracer) as _));

    let module = Module::from_blocking("boom", |_, _| Err(FlowError::work("bad")))
        .with_dispatcher(dispatcher);
    module.call(json!(null)).await.unwrap_err();

    let events = tracer.events();
    assert!(matches!(
        events.last(),
        Some(TraceEvent::Ended {
            outcome: SpanOutcome::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_output_cast_rejection_closes_span_as_failed() {
    let tracer = Arc::new(RecordingTracer::new());
    let dispatcher = Arc::new(Dispatcher::new().with_tracer(Arc::clone(&tracer) as _));

    let module = Module::from_blocking("object-maker", |_, _| Ok(json!({"x": 1})))
        .with_output_caster(Arc::new(StringsOnly))
        .with_dispatcher(dispatcher);

    let err = module.call(json!(null)).await.unwrap_err();
    assert!(matches!(err, FlowError::TypeValidation(_)));
    assert!(matches!(
        tracer.events().last(),
        Some(TraceEvent::Ended {
            outcome: SpanOutcome::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_input_cast_rejection_closes_span_as_failed() {
    let tracer = Arc::new(RecordingTracer::new());
    let dispatcher = Arc::new(Dispatcher::new().with_tracer(Arc::clone(&tracer) as _));

    let module = Module::from_blocking("strict", |v, _| Ok(v))
        .with_input_caster(Arc::new(StringsOnly))
        .with_dispatcher(dispatcher);

    let err = module.call(json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, FlowError::TypeValidation(_)));

    let events = tracer.events();
    // The span opened and then closed as failed; no dangling span.
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        TraceEvent::Ended {
            outcome: SpanOutcome::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_modules_without_dispatcher_share_the_default() {
    // Two independent modules on the default dispatcher run fine back to
    // back; the default pool is process-wide.
    let a = Module::from_blocking("a", |v, _| Ok(v));
    let b = Module::from_blocking("b", |v, _| Ok(v));
    assert_eq!(a.call(json!(1)).await.unwrap(), json!(1));
    assert_eq!(b.call(json!(2)).await.unwrap(), json!(2));
}
