//! Tracing collaborator seam.
//!
//! The core does not implement a tracing backend; it drives one through the
//! [`Tracer`] trait. The dispatcher opens a span when a context is
//! established and closes it with an outcome at terminal state, on every
//! exit path.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::context::StepId;

/// Span outcome reported at terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanOutcome {
    Completed,
    Failed,
}

/// Opaque reference to a tracer-owned span. The context only references it;
/// the tracer owns its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanHandle {
    id: u64,
}

impl SpanHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Span creation interface implemented by a tracing backend.
pub trait Tracer: Send + Sync {
    fn start_span(&self, step_id: &StepId, parent: Option<&SpanHandle>) -> SpanHandle;
    fn end_span(&self, span: &SpanHandle, outcome: SpanOutcome);
}

// --- Real implementation ---

/// Default tracer: emits span lifecycle as `tracing` debug events.
pub struct LogTracer {
    next_id: AtomicU64,
}

impl LogTracer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for LogTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, step_id: &StepId, parent: Option<&SpanHandle>) -> SpanHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            span = id,
            step = %step_id,
            parent = parent.map(|p| p.id()),
            "span started"
        );
        SpanHandle::new(id)
    }

    fn end_span(&self, span: &SpanHandle, outcome: SpanOutcome) {
        debug!(span = span.id(), outcome = ?outcome, "span ended");
    }
}

/// Tracer that drops everything.
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_span(&self, _step_id: &StepId, _parent: Option<&SpanHandle>) -> SpanHandle {
        SpanHandle::new(0)
    }

    fn end_span(&self, _span: &SpanHandle, _outcome: SpanOutcome) {}
}

// --- Fake implementation ---

/// Recorded span lifecycle event, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Started {
        span: u64,
        step: String,
        parent: Option<u64>,
    },
    Ended {
        span: u64,
        outcome: SpanOutcome,
    },
}

/// Tracer that records every span event in memory.
#[derive(Default)]
pub struct RecordingTracer {
    next_id: AtomicU64,
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, step_id: &StepId, parent: Option<&SpanHandle>) -> SpanHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(TraceEvent::Started {
            span: id,
            step: step_id.as_str().to_string(),
            parent: parent.map(|p| p.id()),
        });
        SpanHandle::new(id)
    }

    fn end_span(&self, span: &SpanHandle, outcome: SpanOutcome) {
        self.events.lock().push(TraceEvent::Ended {
            span: span.id(),
            outcome,
        });
    }
}
