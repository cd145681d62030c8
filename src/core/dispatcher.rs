//! Execution dispatcher — decides how a unit of work runs.
//!
//! The [`Dispatcher`] takes a [`Work`](crate::module::Work) and a
//! [`Context`] and produces a result or failure, honoring the context's
//! deadline. Suspending work runs inline on the cooperative scheduler;
//! blocking work is offloaded to the bounded [`WorkerPool`]. For the
//! duration of the call the context is installed as "current" for the task
//! and uninstalled on every exit path.

use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use crate::core::context::Context;
use crate::core::trace::{LogTracer, SpanOutcome, Tracer};
use crate::core::worker_pool::WorkerPool;
use crate::error::{FlowError, FlowResult};
use crate::module::{Caster, ModuleInner, Work};

/// Runs work units under a context, with deadline enforcement and span
/// lifecycle. One process-wide default instance backs modules that were not
/// given their own.
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    tracer: Arc<dyn Tracer>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            pool: Arc::new(WorkerPool::new()),
            tracer: Arc::new(LogTracer::new()),
        }
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Execute the module's work under `ctx`. Opens a span when the context
    /// is established and closes it with the outcome at terminal state.
    /// Input and output casting runs inside the span, so a cast rejection
    /// closes it as failed like any other failure.
    pub(crate) async fn dispatch(
        &self,
        module: &ModuleInner,
        input: Value,
        ctx: Context,
    ) -> FlowResult<Value> {
        let span = self.tracer.start_span(ctx.step_id(), ctx.span());
        let ctx = ctx.with_span(span.clone());

        let result = self.run_under_deadline(module, input, &ctx).await;

        let outcome = match &result {
            Ok(_) => SpanOutcome::Completed,
            Err(_) => SpanOutcome::Failed,
        };
        self.tracer.end_span(&span, outcome);
        result
    }

    async fn run_under_deadline(
        &self,
        module: &ModuleInner,
        input: Value,
        ctx: &Context,
    ) -> FlowResult<Value> {
        if ctx.is_expired() || ctx.is_cancelled() {
            debug!(module = %module.name, step = %ctx.step_id(), "deadline elapsed before dispatch");
            return Err(FlowError::DeadlineExceeded);
        }

        let fut = Context::scope(ctx.clone(), self.run_work(module, input, ctx.clone()));

        match ctx.deadline() {
            None => fut.await,
            Some(deadline) => match timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => {
                    // Best-effort cancellation; work that ignores the flag
                    // keeps running in the background, result discarded.
                    ctx.cancel();
                    warn!(module = %module.name, step = %ctx.step_id(), "deadline exceeded");
                    Err(FlowError::DeadlineExceeded)
                }
            },
        }
    }

    async fn run_work(&self, module: &ModuleInner, input: Value, ctx: Context) -> FlowResult<Value> {
        let input = cast_through(&module.input_caster, input)?;
        let output = match &module.work {
            Work::Future(work) => work.run(input, ctx).await?,
            Work::Blocking(job) => {
                let job = Arc::clone(job);
                self.pool.run(move || job(input, ctx)).await??
            }
        };
        cast_through(&module.output_caster, output)
    }
}

fn cast_through(caster: &Option<Arc<dyn Caster>>, value: Value) -> FlowResult<Value> {
    match caster {
        Some(caster) => caster.cast(value).map_err(FlowError::TypeValidation),
        None => Ok(value),
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide default dispatcher, built lazily.
pub(crate) fn shared_dispatcher() -> Arc<Dispatcher> {
    static SHARED: OnceLock<Arc<Dispatcher>> = OnceLock::new();
    Arc::clone(SHARED.get_or_init(|| Arc::new(Dispatcher::new())))
}
