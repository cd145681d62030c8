//! Request-scoped execution context.
//!
//! [`Context`] carries the cross-cutting state of one invocation — deadline,
//! free-form metadata, retry count, step identity, and a span reference —
//! without appearing in work-function signatures. It is an immutable value:
//! every "update" produces a new `Context`, so concurrent branches forked
//! from the same parent can never observe each other's writes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::trace::SpanHandle;

/// Opaque step identifier, fresh per top-level invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepId(Arc<str>);

impl StepId {
    pub(crate) fn fresh() -> Self {
        StepId(Uuid::new_v4().simple().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best-effort cancellation flag, chained parent-to-child so that
/// cancellation propagates downward only: cancelling a parent is visible to
/// every descendant, cancelling a branch never touches siblings.
#[derive(Clone)]
pub(crate) struct CancelFlag {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    parent: Option<CancelFlag>,
}

impl CancelFlag {
    fn new() -> Self {
        CancelFlag {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    fn child(&self) -> Self {
        CancelFlag {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    fn set(&self) {
        self.inner.flag.store(true, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        if self.inner.flag.load(Ordering::Acquire) {
            return true;
        }
        self.inner.parent.as_ref().is_some_and(|p| p.is_set())
    }
}

impl fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelFlag")
            .field("set", &self.is_set())
            .finish()
    }
}

tokio::task_local! {
    static CURRENT_CTX: Context;
}

/// Immutable carrier of deadline, metadata, retry count, step identity, and
/// span reference.
#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    metadata: Arc<Map<String, Value>>,
    retry_count: u32,
    step_id: StepId,
    span: Option<SpanHandle>,
    cancel: CancelFlag,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Fresh unbounded context with a new step identity.
    pub fn new() -> Self {
        Context {
            deadline: None,
            metadata: Arc::new(Map::new()),
            retry_count: 0,
            step_id: StepId::fresh(),
            span: None,
            cancel: CancelFlag::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn span(&self) -> Option<&SpanHandle> {
        self.span.as_ref()
    }

    // ------------------------------------------------------------------
    // Value updates (each returns a new Context)
    // ------------------------------------------------------------------

    /// New context with one metadata entry added. The receiver is untouched.
    pub fn with_meta(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut metadata = (*self.metadata).clone();
        metadata.insert(key.into(), value.into());
        Context {
            metadata: Arc::new(metadata),
            ..self.clone()
        }
    }

    pub fn with_retry_count(&self, retry_count: u32) -> Self {
        Context {
            retry_count,
            ..self.clone()
        }
    }

    pub(crate) fn with_span(&self, span: SpanHandle) -> Self {
        Context {
            span: Some(span),
            ..self.clone()
        }
    }

    /// Branch snapshot for a concurrent child: same deadline, metadata, and
    /// retry count at fork time, fresh step identity and cancellation link.
    /// Writes by the branch are never observable by the parent or siblings.
    pub fn fork(&self) -> Self {
        Context {
            deadline: self.deadline,
            metadata: Arc::clone(&self.metadata),
            retry_count: self.retry_count,
            step_id: StepId::fresh(),
            span: self.span.clone(),
            cancel: self.cancel.child(),
        }
    }

    /// Context for a new invocation derived from this one: fresh step
    /// identity, deadline tightened by the configured timeout, metadata
    /// merged with the invocation's additions.
    pub(crate) fn derive(&self, timeout: Option<Duration>, extra: &Map<String, Value>) -> Self {
        Context {
            deadline: tighten(self.deadline, timeout),
            metadata: merge_metadata(&self.metadata, extra),
            retry_count: self.retry_count,
            step_id: StepId::fresh(),
            span: self.span.clone(),
            cancel: self.cancel.child(),
        }
    }

    /// Reuse this context verbatim for an invocation that was handed it
    /// explicitly: step identity, span, and cancellation link are preserved,
    /// but a configured timeout still tightens the deadline and configured
    /// metadata is still merged. Deadlines only tighten while descending.
    pub(crate) fn adopt(&self, timeout: Option<Duration>, extra: &Map<String, Value>) -> Self {
        Context {
            deadline: tighten(self.deadline, timeout),
            metadata: merge_metadata(&self.metadata, extra),
            ..self.clone()
        }
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    pub(crate) fn cancel(&self) {
        self.cancel.set();
    }

    /// True once this invocation path has been cancelled (deadline-driven).
    /// Blocking work may poll this to stop early; results produced after
    /// cancellation are discarded either way.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }

    // ------------------------------------------------------------------
    // Ambient access
    // ------------------------------------------------------------------

    /// The context installed by the dispatcher for the current task, or a
    /// fresh default outside any invocation.
    pub fn current() -> Context {
        CURRENT_CTX
            .try_with(|ctx| ctx.clone())
            .unwrap_or_default()
    }

    /// Run `fut` with `ctx` installed as current; the previous value is
    /// restored on every exit path, including failure.
    pub(crate) async fn scope<F>(ctx: Context, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT_CTX.scope(ctx, fut).await
    }
}

fn tighten(current: Option<Instant>, timeout: Option<Duration>) -> Option<Instant> {
    let Some(timeout) = timeout else {
        return current;
    };
    let candidate = Instant::now().checked_add(timeout);
    match (current, candidate) {
        (Some(existing), Some(new)) => Some(existing.min(new)),
        (Some(existing), None) => Some(existing),
        (None, new) => new,
    }
}

fn merge_metadata(base: &Arc<Map<String, Value>>, extra: &Map<String, Value>) -> Arc<Map<String, Value>> {
    if extra.is_empty() {
        return Arc::clone(base);
    }
    let mut merged = (**base).clone();
    for (key, value) in extra {
        merged.insert(key.clone(), value.clone());
    }
    Arc::new(merged)
}
