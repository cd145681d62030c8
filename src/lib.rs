//! modflow — a composable module execution core.
//!
//! A [`Module`] wraps a unit of work (async or blocking) behind one uniform
//! invocation contract: configuration layers merge, an execution [`Context`]
//! is established, and a [`Dispatcher`] runs the work with deadline
//! enforcement. Composites (sequential, parallel, conditional, delay, retry)
//! are modules themselves, so pipelines nest arbitrarily.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use modflow::{Backoff, Module, ModuleConfig, RetryPolicy};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), modflow::FlowError> {
//!     let normalize = Module::from_blocking("normalize", |input, _ctx| {
//!         Ok(json!(input.as_str().unwrap_or_default().trim().to_lowercase()))
//!     });
//!
//!     let enrich = Module::from_async_fn("enrich", |input, ctx| {
//!         Box::pin(async move {
//!             Ok(json!({ "text": input, "tenant": ctx.meta("tenant") }))
//!         })
//!     })
//!     .with(ModuleConfig::new().timeout_secs(5.0));
//!
//!     let pipeline = Module::retry(
//!         "pipeline",
//!         Module::sequential("steps", vec![normalize, enrich]),
//!         RetryPolicy::new(2).backoff(Backoff::Fixed(Duration::from_millis(100))),
//!     );
//!
//!     let out = pipeline.call(json!("  Hello World  ")).await?;
//!     println!("{out}");
//!     Ok(())
//! }
//! ```

pub mod composite;
pub mod core;
pub mod error;
pub mod module;

pub use composite::{Backoff, DelayMode, Predicate, RetryPolicy};
pub use crate::core::{
    CallOptions, Context, Dispatcher, LogTracer, ModuleConfig, NoopTracer, RecordingTracer,
    SpanHandle, SpanOutcome, StepId, TimeoutSpec, TraceEvent, Tracer, WorkerPool,
    WorkerPoolConfig, WorkerPoolStats,
};
pub use error::{BranchFailure, FlowError, FlowResult, Retryability, WorkFailure};
pub use module::{Caster, FutureWork, InvocationState, Module, Work};
