//! Typed configuration overlay for modules and calls.
//!
//! A module carries a static [`ModuleConfig`] attached via the chainable
//! [`Module::with`](crate::module::Module::with); each call may add
//! [`CallOptions`]. At invocation the layers merge, later layers winning per
//! key, and the recognized control options (timeout, explicit context) are
//! consumed before anything reaches the work function. Everything else is
//! free-form metadata propagated on the context.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::context::Context;
use crate::error::{FlowError, FlowResult};

/// Timeout as configured; float seconds are validated at merge time, before
/// any work runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutSpec {
    Duration(Duration),
    Secs(f64),
}

impl TimeoutSpec {
    fn resolve(self) -> FlowResult<Duration> {
        match self {
            TimeoutSpec::Duration(d) => Ok(d),
            TimeoutSpec::Secs(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                FlowError::InvalidConfiguration(format!(
                    "timeout must be a non-negative finite number of seconds, got {secs}"
                ))
            }),
        }
    }
}

/// Static configuration attached to a module.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    pub(crate) timeout: Option<TimeoutSpec>,
    pub(crate) metadata: Map<String, Value>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(TimeoutSpec::Duration(timeout));
        self
    }

    /// Timeout in seconds. Negative or non-finite values are rejected at
    /// merge time with `InvalidConfiguration`.
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Some(TimeoutSpec::Secs(secs));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overlay `later` on top of `self`: later values win per key, metadata
    /// maps union with later-wins.
    pub(crate) fn merged(mut self, later: ModuleConfig) -> Self {
        if later.timeout.is_some() {
            self.timeout = later.timeout;
        }
        for (key, value) in later.metadata {
            self.metadata.insert(key, value);
        }
        self
    }
}

/// Per-call overrides, merged on top of the module's static configuration.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub(crate) timeout: Option<TimeoutSpec>,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) context: Option<Context>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(TimeoutSpec::Duration(timeout));
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Some(TimeoutSpec::Secs(secs));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Supply the context explicitly. It is reused verbatim (no fork, same
    /// step identity); a configured timeout still tightens its deadline.
    pub fn context(mut self, ctx: Context) -> Self {
        self.context = Some(ctx);
        self
    }
}

/// The fully merged invocation parameters, control options resolved.
#[derive(Debug)]
pub(crate) struct MergedInvocation {
    pub timeout: Option<Duration>,
    pub metadata: Map<String, Value>,
    pub context: Option<Context>,
}

pub(crate) fn merge(static_cfg: &ModuleConfig, call: CallOptions) -> FlowResult<MergedInvocation> {
    let timeout = call
        .timeout
        .or(static_cfg.timeout)
        .map(TimeoutSpec::resolve)
        .transpose()?;

    let mut metadata = static_cfg.metadata.clone();
    for (key, value) in call.metadata {
        metadata.insert(key, value);
    }

    Ok(MergedInvocation {
        timeout,
        metadata,
        context: call.context,
    })
}
