//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::alert::AlertStatus;
use crate::coverage::EscalationPolicy;

/// Days of rotation data the horizon extender keeps ahead.
pub const DEFAULT_HORIZON_DAYS: i64 = 45;

/// Configuration for the escalation engine and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Policy applied when a rotation carries none of its own.
    pub default_policy: EscalationPolicy,
    /// Statuses that mean "handled externally, stop escalating".
    /// Kept as configuration rather than code: deployments disagree on
    /// the exact acknowledged/accepted/resolved vocabulary.
    pub handled_statuses: Vec<AlertStatus>,
    /// Horizon target for the daily schedule extension job.
    pub horizon_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_policy: EscalationPolicy::default(),
            handled_statuses: vec![AlertStatus::Accepted, AlertStatus::Resolved],
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

impl EngineConfig {
    /// Whether an alert in this status no longer needs escalation.
    pub fn is_handled(&self, status: AlertStatus) -> bool {
        self.handled_statuses.contains(&status)
    }
}
