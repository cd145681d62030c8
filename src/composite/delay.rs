//! Timed pause that forwards its input unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::module::{FutureWork, Work};

/// How the pause occupies time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    /// Suspend on the scheduler; other tasks keep running.
    Cooperative,
    /// Hold a worker-pool thread for the full duration.
    Holding,
}

pub(crate) fn delay_work(duration: Duration, mode: DelayMode) -> Work {
    match mode {
        DelayMode::Cooperative => Work::Future(Arc::new(CooperativeDelay { duration })),
        DelayMode::Holding => Work::Blocking(Arc::new(move |input, ctx| {
            check_budget(duration, &ctx)?;
            std::thread::sleep(duration);
            Ok(input)
        })),
    }
}

// A pause that cannot finish inside the remaining budget fails up front
// instead of burning the budget down.
fn check_budget(duration: Duration, ctx: &Context) -> FlowResult<()> {
    if let Some(remaining) = ctx.remaining() {
        if duration > remaining {
            return Err(FlowError::DeadlineExceeded);
        }
    }
    Ok(())
}

struct CooperativeDelay {
    duration: Duration,
}

#[async_trait]
impl FutureWork for CooperativeDelay {
    async fn run(&self, input: Value, ctx: Context) -> FlowResult<Value> {
        check_budget(self.duration, &ctx)?;
        tokio::time::sleep(self.duration).await;
        Ok(input)
    }
}
