//! The invocable unit: [`Module`].
//!
//! A module wraps a work function, owns a static configuration overlay, and
//! drives the dispatcher. Work is tagged at construction as inherently
//! suspending ([`Work::Future`]) or ordinary blocking ([`Work::Blocking`]);
//! that tag decides how the dispatcher runs it. Invocation follows a fixed
//! state machine: `Idle → ConfigMerged → ContextEstablished → Dispatching →
//! Completed | Failed`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use crate::core::config::{merge, CallOptions, ModuleConfig};
use crate::core::context::Context;
use crate::core::dispatcher::{shared_dispatcher, Dispatcher};
use crate::error::FlowResult;

/// Inherently suspending work: runs inline on the cooperative scheduler,
/// suspension points are its own awaits.
#[async_trait]
pub trait FutureWork: Send + Sync {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value>;
}

/// Ordinary blocking work: offloaded to the worker pool.
pub type BlockingFn = dyn Fn(Value, Context) -> FlowResult<Value> + Send + Sync;

/// A unit of work with its execution mode fixed at construction.
#[derive(Clone)]
pub enum Work {
    Future(Arc<dyn FutureWork>),
    Blocking(Arc<BlockingFn>),
}

/// Validation/casting collaborator: coerce a raw value to a declared shape
/// or reject it. Applied to input immediately before the work runs and to
/// output immediately after it returns.
pub trait Caster: Send + Sync {
    fn cast(&self, value: Value) -> Result<Value, String>;
}

/// Invocation state machine positions, traced at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    ConfigMerged,
    ContextEstablished,
    Dispatching,
    Completed,
    Failed,
}

struct FnFutureWork<F>(F);

#[async_trait]
impl<F> FutureWork for FnFutureWork<F>
where
    F: Fn(Value, Context) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync,
{
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        (self.0)(input, ctx).await
    }
}

#[derive(Clone)]
pub(crate) struct ModuleInner {
    pub(crate) name: String,
    pub(crate) config: ModuleConfig,
    pub(crate) work: Work,
    pub(crate) input_caster: Option<Arc<dyn Caster>>,
    pub(crate) output_caster: Option<Arc<dyn Caster>>,
    pub(crate) dispatcher: Option<Arc<Dispatcher>>,
}

/// A named invocable with attached static configuration.
///
/// `Module` is a cheap handle (`Clone` shares the underlying definition).
/// Configuration attachment composes a new module; sharing one across
/// pipelines is explicit via `clone`.
///
/// ```rust,no_run
/// use modflow::{Module, ModuleConfig};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let upper = Module::from_blocking("upper", |input, _ctx| {
///         let text = input.as_str().unwrap_or_default().to_uppercase();
///         Ok(json!(text))
///     })
///     .with(ModuleConfig::new().timeout_secs(10.0));
///
///     let out = upper.call(json!("hello")).await.unwrap();
///     assert_eq!(out, json!("HELLO"));
/// }
/// ```
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    /// Module around inherently suspending work.
    pub fn from_future(name: impl Into<String>, work: impl FutureWork + 'static) -> Self {
        Self::from_work(name, Work::Future(Arc::new(work)))
    }

    /// Module around a suspending closure returning a boxed future.
    pub fn from_async_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Context) -> BoxFuture<'static, FlowResult<Value>> + Send + Sync + 'static,
    {
        Self::from_future(name, FnFutureWork(f))
    }

    /// Module around an ordinary blocking function; the dispatcher offloads
    /// it to the worker pool so the scheduler stays responsive.
    pub fn from_blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Context) -> FlowResult<Value> + Send + Sync + 'static,
    {
        Self::from_work(name, Work::Blocking(Arc::new(f)))
    }

    pub(crate) fn from_work(name: impl Into<String>, work: Work) -> Self {
        Module {
            inner: Arc::new(ModuleInner {
                name: name.into(),
                config: ModuleConfig::default(),
                work,
                input_caster: None,
                output_caster: None,
                dispatcher: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach static configuration. Later attachments overwrite earlier ones
    /// per key; the result is a new module, the receiver is consumed.
    pub fn with(self, config: ModuleConfig) -> Self {
        let mut inner = (*self.inner).clone();
        inner.config = inner.config.merged(config);
        Module {
            inner: Arc::new(inner),
        }
    }

    /// Coerce input through `caster` before the work function runs.
    pub fn with_input_caster(self, caster: Arc<dyn Caster>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.input_caster = Some(caster);
        Module {
            inner: Arc::new(inner),
        }
    }

    /// Coerce output through `caster` after the work function returns.
    pub fn with_output_caster(self, caster: Arc<dyn Caster>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.output_caster = Some(caster);
        Module {
            inner: Arc::new(inner),
        }
    }

    /// Use a dedicated dispatcher instead of the process-wide default.
    pub fn with_dispatcher(self, dispatcher: Arc<Dispatcher>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.dispatcher = Some(dispatcher);
        Module {
            inner: Arc::new(inner),
        }
    }

    /// Invoke with no per-call overrides.
    pub async fn call(&self, input: impl Into<Value>) -> FlowResult<Value> {
        self.call_with(input, CallOptions::new()).await
    }

    /// Invoke with per-call overrides layered over the static configuration.
    pub async fn call_with(
        &self,
        input: impl Into<Value>,
        opts: CallOptions,
    ) -> FlowResult<Value> {
        let inner = &self.inner;
        self.trace_state(InvocationState::Idle, None);

        let merged = merge(&inner.config, opts)?;
        self.trace_state(InvocationState::ConfigMerged, None);

        // An explicit context is reused verbatim (same step identity, no
        // fork); otherwise the ambient context is forked into a fresh one.
        let ctx = match merged.context {
            Some(explicit) => explicit.adopt(merged.timeout, &merged.metadata),
            None => Context::current().derive(merged.timeout, &merged.metadata),
        };
        self.trace_state(InvocationState::ContextEstablished, Some(&ctx));

        self.trace_state(InvocationState::Dispatching, Some(&ctx));
        let dispatcher = inner
            .dispatcher
            .clone()
            .unwrap_or_else(shared_dispatcher);
        // Casting happens inside the dispatch so the span closes with the
        // real outcome even when a cast rejects.
        let result = dispatcher.dispatch(inner, input.into(), ctx.clone()).await;

        match result {
            Ok(output) => {
                self.trace_state(InvocationState::Completed, Some(&ctx));
                Ok(output)
            }
            Err(err) => {
                self.trace_state(InvocationState::Failed, Some(&ctx));
                Err(err)
            }
        }
    }

    fn trace_state(&self, state: InvocationState, ctx: Option<&Context>) {
        match ctx {
            Some(ctx) => trace!(
                module = %self.inner.name,
                step = %ctx.step_id(),
                state = ?state,
                "invocation state"
            ),
            None => trace!(module = %self.inner.name, state = ?state, "invocation state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use serde_json::json;

    struct StringCaster;

    impl Caster for StringCaster {
        fn cast(&self, value: Value) -> Result<Value, String> {
            match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                other => Err(format!("expected string-like value, got {other}")),
            }
        }
    }

    #[tokio::test]
    async fn test_call_runs_blocking_work() {
        let double = Module::from_blocking("double", |input, _ctx| {
            let n = input.as_i64().ok_or_else(|| FlowError::work("not a number"))?;
            Ok(json!(n * 2))
        });
        assert_eq!(double.call(json!(21)).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_call_runs_future_work() {
        let echo = Module::from_async_fn("echo", |input, _ctx| Box::pin(async move { Ok(input) }));
        assert_eq!(echo.call(json!("hi")).await.unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn test_two_invocations_get_distinct_step_ids_same_metadata() {
        let observer = Module::from_blocking("observer", |_input, ctx| {
            Ok(json!({
                "step": ctx.step_id().as_str(),
                "metadata": Value::Object(ctx.metadata().clone()),
            }))
        })
        .with(ModuleConfig::new().meta("tenant", "acme"));

        let a = observer.call(json!(null)).await.unwrap();
        let b = observer.call(json!(null)).await.unwrap();

        assert_ne!(a["step"], b["step"]);
        assert_eq!(a["metadata"], b["metadata"]);
        assert_eq!(a["metadata"]["tenant"], json!("acme"));
    }

    #[tokio::test]
    async fn test_with_applied_twice_takes_later_values() {
        let observer = Module::from_blocking("cfg", |_input, ctx| {
            Ok(Value::Object(ctx.metadata().clone()))
        })
        .with(ModuleConfig::new().meta("model", "small").meta("lang", "en"))
        .with(ModuleConfig::new().meta("model", "large").meta("top_k", 3));

        let meta = observer.call(json!(null)).await.unwrap();
        assert_eq!(meta["model"], json!("large"));
        assert_eq!(meta["lang"], json!("en"));
        assert_eq!(meta["top_k"], json!(3));
    }

    #[tokio::test]
    async fn test_input_caster_coerces_and_rejects() {
        let shout = Module::from_blocking("shout", |input, _ctx| {
            Ok(json!(input.as_str().unwrap_or_default().to_uppercase()))
        })
        .with_input_caster(Arc::new(StringCaster));

        assert_eq!(shout.call(json!(12)).await.unwrap(), json!("12"));

        let err = shout.call(json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, FlowError::TypeValidation(_)));
    }

    #[tokio::test]
    async fn test_output_caster_rejects_bad_shape() {
        let bad = Module::from_blocking("bad-shape", |_input, _ctx| Ok(json!({"x": 1})))
            .with_output_caster(Arc::new(StringCaster));

        let err = bad.call(json!(null)).await.unwrap_err();
        assert!(matches!(err, FlowError::TypeValidation(_)));
    }

    #[tokio::test]
    async fn test_invalid_timeout_fails_before_work_runs() {
        let never = Module::from_blocking("never", |_input, _ctx| {
            panic!("must not run with invalid configuration")
        })
        .with(ModuleConfig::new().timeout_secs(-3.0));

        let err = never.call(json!(null)).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfiguration(_)));
    }
}
