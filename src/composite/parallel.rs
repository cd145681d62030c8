//! Fan-out over the same input with isolated per-branch contexts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::core::config::CallOptions;
use crate::core::context::Context;
use crate::error::{BranchFailure, FlowError, FlowResult};
use crate::module::{FutureWork, Module};

pub(crate) struct ParallelWork {
    children: Vec<Module>,
}

impl ParallelWork {
    pub(crate) fn new(children: Vec<Module>) -> Self {
        ParallelWork { children }
    }
}

#[async_trait]
impl FutureWork for ParallelWork {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        let mut set = JoinSet::new();
        let mut branch_of_task = HashMap::new();
        for (index, child) in self.children.iter().enumerate() {
            let child = child.clone();
            let input = input.clone();
            // Each branch gets a fork: shared deadline and metadata snapshot,
            // distinct step identity, no cross-branch mutation channel.
            let branch_ctx = ctx.fork();
            let handle = set.spawn(async move {
                let result = child
                    .call_with(input, CallOptions::new().context(branch_ctx))
                    .await;
                (index, result)
            });
            branch_of_task.insert(handle.id(), index);
        }

        let mut outputs: Vec<Option<Value>> = (0..self.children.len()).map(|_| None).collect();
        let mut failures: Vec<BranchFailure> = Vec::new();

        // Wait for every branch even after a failure; slow siblings run to
        // completion before the aggregate verdict.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(value))) => outputs[index] = Some(value),
                Ok((index, Err(error))) => failures.push(BranchFailure { branch: index, error }),
                Err(join_err) => {
                    let branch = branch_of_task
                        .get(&join_err.id())
                        .copied()
                        .unwrap_or(self.children.len());
                    failures.push(BranchFailure {
                        branch,
                        error: FlowError::Internal(format!(
                            "branch task failed to join: {join_err}"
                        )),
                    });
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.branch);
            return Err(FlowError::Aggregate(failures));
        }

        let values = outputs
            .into_iter()
            .map(|slot| slot.ok_or_else(|| FlowError::Internal("branch produced no output".into())))
            .collect::<FlowResult<Vec<Value>>>()?;
        Ok(Value::Array(values))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::core::context::Context;
    use crate::error::{FlowError, FlowResult};
    use crate::module::{FutureWork, Module};

    #[tokio::test]
    async fn test_outputs_in_branch_order() {
        let fan = Module::parallel(
            "fan",
            vec![
                Module::from_async_fn("slow", |v, _| {
                    Box::pin(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(json!(format!("slow:{v}")))
                    })
                }),
                Module::from_blocking("fast", |v, _| Ok(json!(format!("fast:{v}")))),
            ],
        );

        let out = fan.call(json!(7)).await.unwrap();
        assert_eq!(out, json!(["slow:7", "fast:7"]));
    }

    #[tokio::test]
    async fn test_failures_aggregate_in_branch_order() {
        let fan = Module::parallel(
            "fan",
            vec![
                Module::from_blocking("ok", |v, _| Ok(v)),
                Module::from_blocking("b1", |_, _| Err(FlowError::work("first failure"))),
                Module::from_blocking("b2", |_, _| Err(FlowError::work("second failure"))),
            ],
        );

        let err = fan.call(json!(null)).await.unwrap_err();
        match err {
            FlowError::Aggregate(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].branch, 1);
                assert_eq!(failures[1].branch, 2);
            }
            other => panic!("expected aggregate failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_fan_out_yields_empty_array() {
        let fan = Module::parallel("empty", vec![]);
        assert_eq!(fan.call(json!("ignored")).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_panicking_branch_reports_its_index() {
        struct PanicWork;

        #[async_trait]
        impl FutureWork for PanicWork {
            async fn run(&self, _input: Value, _ctx: Context) -> FlowResult<Value> {
                panic!("branch blew up")
            }
        }

        let fan = Module::parallel(
            "fan",
            vec![
                Module::from_blocking("ok", |v, _| Ok(v)),
                Module::from_future("panics", PanicWork),
            ],
        );

        let err = fan.call(json!(null)).await.unwrap_err();
        match err {
            FlowError::Aggregate(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].branch, 1);
                assert!(matches!(failures[0].error, FlowError::Internal(_)));
            }
            other => panic!("expected aggregate failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_branches_see_isolated_step_ids() {
        let observe = || {
            Module::from_blocking("observe", |_, ctx| Ok(json!(ctx.step_id().as_str())))
        };
        let fan = Module::parallel("fan", vec![observe(), observe()]);

        let out = fan.call(json!(null)).await.unwrap();
        let ids = out.as_array().unwrap();
        assert_ne!(ids[0], ids[1]);
    }
}
