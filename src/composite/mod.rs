//! Composite modules: structured combinations of child modules that are
//! themselves modules. Composition nests freely since every composite
//! implements the same invocation contract as a leaf.

pub mod conditional;
pub mod delay;
pub mod parallel;
pub mod retry;
pub mod sequential;

pub use conditional::Predicate;
pub use delay::DelayMode;
pub use retry::{Backoff, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use crate::module::{Module, Work};

impl Module {
    /// Run `children` in declared order, feeding each output to the next
    /// input. The first failure stops the chain and surfaces unchanged.
    pub fn sequential(name: impl Into<String>, children: Vec<Module>) -> Self {
        Module::from_work(name, Work::Future(Arc::new(sequential::SequentialWork::new(children))))
    }

    /// Run `children` concurrently on the same input, each in an isolated
    /// forked context. Waits for every branch; failures aggregate in branch
    /// order, success yields an array of outputs in branch order.
    pub fn parallel(name: impl Into<String>, children: Vec<Module>) -> Self {
        Module::from_work(name, Work::Future(Arc::new(parallel::ParallelWork::new(children))))
    }

    /// Evaluate `predicate` against the input and route to exactly one of
    /// the two branches.
    pub fn conditional(
        name: impl Into<String>,
        predicate: Predicate,
        then_branch: Module,
        otherwise: Module,
    ) -> Self {
        Module::from_work(
            name,
            Work::Future(Arc::new(conditional::ConditionalWork::new(
                predicate,
                then_branch,
                otherwise,
            ))),
        )
    }

    /// Pause for `duration`, then pass the input through unchanged. A delay
    /// longer than the remaining deadline budget fails immediately.
    pub fn delay(name: impl Into<String>, duration: Duration, mode: DelayMode) -> Self {
        Module::from_work(name, delay::delay_work(duration, mode))
    }

    /// Re-invoke `child` on retryable failures per `policy`, surfacing the
    /// attempt index to the child through its context.
    pub fn retry(name: impl Into<String>, child: Module, policy: RetryPolicy) -> Self {
        Module::from_work(name, Work::Future(Arc::new(retry::RetryWork::new(child, policy))))
    }
}
