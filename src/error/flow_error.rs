//! Top-level error type for module invocation.

use std::fmt;

use thiserror::Error;

use super::WorkFailure;

/// One branch's failure inside a parallel aggregate.
///
/// Branch order matches the order branches were declared; the wrapped error
/// keeps its original kind and metadata.
#[derive(Debug)]
pub struct BranchFailure {
    pub branch: usize,
    pub error: FlowError,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {}: {}", self.branch, self.error)
    }
}

/// Errors surfaced by module invocation and composition
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Type validation error: {0}")]
    TypeValidation(String),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Predicate error: {0}")]
    Predicate(String),
    #[error("Parallel failure: {} branch(es) failed", .0.len())]
    Aggregate(Vec<BranchFailure>),
    #[error("Retry exhausted after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<FlowError>,
    },
    #[error("Work failed: {0}")]
    Work(WorkFailure),
    #[error("Worker pool saturated")]
    PoolSaturated,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Shorthand for a non-retryable work failure.
    pub fn work(message: impl Into<String>) -> Self {
        FlowError::Work(WorkFailure::fatal(message))
    }

    /// Shorthand for a work failure explicitly marked retryable.
    pub fn retryable_work(message: impl Into<String>) -> Self {
        FlowError::Work(WorkFailure::retryable(message))
    }

    /// Default retry classification: deadline expiry and work failures
    /// explicitly marked retryable. Structural wrappers are never retryable
    /// as a whole.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::DeadlineExceeded => true,
            FlowError::Work(failure) => failure.is_retryable(),
            _ => false,
        }
    }
}

impl From<WorkFailure> for FlowError {
    fn from(failure: WorkFailure) -> Self {
        FlowError::Work(failure)
    }
}
