//! Alert model — the subject of escalation
//!
//! An alert carries a status that advances monotonically toward a
//! terminal state, except that `Escalated` and `Pending` may alternate
//! as the run moves across tiers. The timeline is an append-only audit
//! trail: every observable transition and every notification attempt
//! lands there, never to be mutated or removed.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor name used for entries written by the escalation run itself.
pub const ENGINE_ACTOR: &str = "escalation-engine";

/// Alert lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Created by ingestion, not yet picked up.
    Received,
    /// The run is resolving coverage.
    Checking,
    /// A notification is out, waiting for acknowledgment.
    Pending,
    /// Moved past a tier without a response (or no tier to page).
    Escalated,
    /// A human acknowledged the alert — terminal.
    Accepted,
    /// The underlying condition cleared — terminal.
    Resolved,
    /// The run hit an unrecoverable error — terminal.
    Failed,
}

impl AlertStatus {
    /// Whether this status stops all further orchestrator activity.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Resolved | Self::Failed)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Checking => write!(f, "checking"),
            Self::Pending => write!(f, "pending"),
            Self::Escalated => write!(f, "escalated"),
            Self::Accepted => write!(f, "accepted"),
            Self::Resolved => write!(f, "resolved"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One append-only timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub actor: String,
    pub comment: String,
    pub previous_status: AlertStatus,
    pub new_status: AlertStatus,
    pub timestamp: DateTime<Utc>,
}

/// An infrastructure health alert under escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub customer_id: String,
    pub resource_id: String,
    pub status: AlertStatus,
    pub severity: String,
    pub title: String,
    pub description: String,
    /// Notification attempts issued so far; never decreases.
    pub escalation_attempts: u32,
    /// User currently being paged, if any.
    pub current_escalation_target: Option<String>,
    pub timeline: Vec<TimelineEntry>,
}

impl Alert {
    /// Append a timeline entry and advance the status.
    pub fn apply_transition(
        &mut self,
        actor: &str,
        comment: impl Into<String>,
        new_status: AlertStatus,
        at: DateTime<Utc>,
    ) {
        self.timeline.push(TimelineEntry {
            actor: actor.to_string(),
            comment: comment.into(),
            previous_status: self.status,
            new_status,
            timestamp: at,
        });
        self.status = new_status;
    }

    /// Append a timeline entry without changing the status.
    pub fn annotate(&mut self, actor: &str, comment: impl Into<String>, at: DateTime<Utc>) {
        self.timeline.push(TimelineEntry {
            actor: actor.to_string(),
            comment: comment.into(),
            previous_status: self.status,
            new_status: self.status,
            timestamp: at,
        });
    }
}

/// Persistence contract for alert records.
///
/// Owned by the ingestion layer; the escalation core only gets and
/// updates. Failures here are fatal for a run.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Fetch an alert by id; `None` if it no longer exists.
    async fn get(&self, alert_id: &str) -> Result<Option<Alert>>;

    /// Persist the full alert record, returning the stored version.
    async fn update(&self, alert: &Alert) -> Result<Alert>;
}

/// In-memory alert store for the CLI and tests.
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<HashMap<String, Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an alert directly, bypassing the update path.
    pub fn insert(&self, alert: Alert) {
        self.alerts
            .lock()
            .expect("alert store lock poisoned")
            .insert(alert.id.clone(), alert);
    }

    /// Snapshot an alert synchronously (test convenience).
    pub fn snapshot(&self, alert_id: &str) -> Option<Alert> {
        self.alerts
            .lock()
            .expect("alert store lock poisoned")
            .get(alert_id)
            .cloned()
    }

    /// Delete an alert, as the out-of-band cleanup path would.
    pub fn delete(&self, alert_id: &str) {
        self.alerts
            .lock()
            .expect("alert store lock poisoned")
            .remove(alert_id);
    }

    /// Flip an alert's status out of band, as the external
    /// acknowledge action does.
    pub fn set_status(&self, alert_id: &str, status: AlertStatus) {
        if let Some(alert) = self
            .alerts
            .lock()
            .expect("alert store lock poisoned")
            .get_mut(alert_id)
        {
            alert.status = status;
        }
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn get(&self, alert_id: &str) -> Result<Option<Alert>> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow::anyhow!("alert store lock poisoned"))?;
        Ok(alerts.get(alert_id).cloned())
    }

    async fn update(&self, alert: &Alert) -> Result<Alert> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|_| anyhow::anyhow!("alert store lock poisoned"))?;
        alerts.insert(alert.id.clone(), alert.clone());
        Ok(alert.clone())
    }
}
