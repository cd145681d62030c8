//! Execution core: context, configuration, dispatch, worker pool, tracing seam.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod trace;
pub mod worker_pool;

pub use config::{CallOptions, ModuleConfig, TimeoutSpec};
pub use context::{Context, StepId};
pub use dispatcher::Dispatcher;
pub use trace::{LogTracer, NoopTracer, RecordingTracer, SpanHandle, SpanOutcome, TraceEvent, Tracer};
pub use worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};
