use std::fmt;

use serde::{Deserialize, Serialize};

/// Retryability marker attached to user-work failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retryability {
    Retryable,
    NonRetryable,
    Unknown,
}

/// Structured failure raised by a work function.
///
/// Carries the human-readable message, a retryability classification consumed
/// by the retry composite, and optional free-form metadata that survives any
/// structural wrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkFailure {
    pub message: String,
    pub retryability: Retryability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WorkFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryability: Retryability::Retryable,
            metadata: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryability: Retryability::NonRetryable,
            metadata: None,
        }
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryability: Retryability::Unknown,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryability == Retryability::Retryable
    }
}

impl fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
