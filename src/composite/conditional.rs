//! Predicate-routed branching.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::CallOptions;
use crate::core::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::module::{FutureWork, Module};

/// Routing predicate over the input value. Evaluated exactly once per
/// invocation; an `Err` fails the composite without running any branch.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<bool, String> + Send + Sync>;

pub(crate) struct ConditionalWork {
    predicate: Predicate,
    then_branch: Module,
    otherwise: Module,
}

impl ConditionalWork {
    pub(crate) fn new(predicate: Predicate, then_branch: Module, otherwise: Module) -> Self {
        ConditionalWork {
            predicate,
            then_branch,
            otherwise,
        }
    }
}

#[async_trait]
impl FutureWork for ConditionalWork {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        let taken = (self.predicate)(&input).map_err(FlowError::Predicate)?;
        let branch = if taken { &self.then_branch } else { &self.otherwise };
        branch
            .call_with(input, CallOptions::new().context(ctx))
            .await
    }
}
