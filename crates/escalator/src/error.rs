//! Error type for escalation runs

use durable::{DurableError, RegistryError};

/// Error type for escalation orchestration
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("Durable execution error: {0}")]
    Durable(#[from] DurableError),

    #[error("Run registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Alert '{0}' not found at run start")]
    AlertMissing(String),

    #[error("Alert store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Coverage resolver error: {0}")]
    Resolver(#[source] anyhow::Error),
}

/// Result type for escalation orchestration
pub type EscalationResult<T> = Result<T, EscalationError>;

impl EscalationError {
    /// Classify a durable error from an alert-store activity: the
    /// store's own failure is fatal as `Store`, anything else stays a
    /// substrate error.
    pub fn from_store_activity(err: DurableError) -> Self {
        match err {
            DurableError::Activity { source, .. } => Self::Store(source),
            other => Self::Durable(other),
        }
    }

    /// Classify a durable error from the coverage-resolver activity.
    pub fn from_resolver_activity(err: DurableError) -> Self {
        match err {
            DurableError::Activity { source, .. } => Self::Resolver(source),
            other => Self::Durable(other),
        }
    }
}
