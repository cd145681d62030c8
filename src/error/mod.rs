//! Error types for the execution core.
//!
//! - [`FlowError`] — Top-level errors for module invocation and composition.
//! - [`WorkFailure`] — Structured user-work failure (message, retryability, metadata).
//! - [`BranchFailure`] — A single branch's error inside a parallel aggregate.

pub mod failure;
pub mod flow_error;

pub use failure::{Retryability, WorkFailure};
pub use flow_error::{BranchFailure, FlowError};

/// Convenience alias for invocation results.
pub type FlowResult<T> = Result<T, FlowError>;
