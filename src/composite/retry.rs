//! Retry wrapper with classification and backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::config::CallOptions;
use crate::core::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::module::{FutureWork, Module};

/// Wait strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `cap`. Attempt 0 is the first retry.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, cap } => {
                let factor = 2u32.saturating_pow(attempt.min(31));
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

/// Retry behavior: how many retries beyond the first attempt, how long to
/// wait between them, and which failures qualify.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    classify: Option<Arc<dyn Fn(&FlowError) -> bool + Send + Sync>>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            backoff: Backoff::None,
            classify: None,
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the default classification (deadline expiry and failures
    /// explicitly marked retryable).
    pub fn classify<F>(mut self, f: F) -> Self
    where
        F: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        self.classify = Some(Arc::new(f));
        self
    }

    fn is_retryable(&self, err: &FlowError) -> bool {
        match &self.classify {
            Some(f) => f(err),
            None => err.is_retryable(),
        }
    }
}

pub(crate) struct RetryWork {
    child: Module,
    policy: RetryPolicy,
}

impl RetryWork {
    pub(crate) fn new(child: Module, policy: RetryPolicy) -> Self {
        RetryWork { child, policy }
    }
}

#[async_trait]
impl FutureWork for RetryWork {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        let base_count = ctx.retry_count();
        let mut attempt: u32 = 0;
        loop {
            // The child observes the attempt index through its context, so a
            // nested retry stacks counts rather than resetting them.
            let attempt_ctx = ctx.with_retry_count(base_count + attempt);
            let result = self
                .child
                .call_with(
                    input.clone(),
                    CallOptions::new().context(attempt_ctx),
                )
                .await;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.is_retryable(&err) {
                return Err(err);
            }
            if attempt >= self.policy.max_retries {
                return Err(FlowError::RetryExhausted {
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }

            let wait = self.policy.backoff.delay_for(attempt);
            if !wait.is_zero() {
                if let Some(remaining) = ctx.remaining() {
                    if wait > remaining {
                        return Err(FlowError::DeadlineExceeded);
                    }
                }
                tokio::time::sleep(wait).await;
            }
            attempt += 1;
            debug!(
                module = %self.child.name(),
                attempt,
                error = %err,
                "retrying after failure"
            );
        }
    }
}
