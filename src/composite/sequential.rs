//! Ordered pipeline: each child's output becomes the next child's input.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::CallOptions;
use crate::core::context::Context;
use crate::error::FlowResult;
use crate::module::{FutureWork, Module};

pub(crate) struct SequentialWork {
    children: Vec<Module>,
}

impl SequentialWork {
    pub(crate) fn new(children: Vec<Module>) -> Self {
        SequentialWork { children }
    }
}

#[async_trait]
impl FutureWork for SequentialWork {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        let mut value = input;
        for child in &self.children {
            // Children share the pipeline context so deadline and metadata
            // flow through; the first failure stops the chain unchanged.
            value = child
                .call_with(value, CallOptions::new().context(ctx.clone()))
                .await?;
        }
        Ok(value)
    }
}
