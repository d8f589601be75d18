//! Top-level alert orchestrator
//!
//! Entry point invoked once per alert: acquires the per-alert run
//! lease, resolves coverage at logical now, takes the no-on-call early
//! exit when both tiers are empty, and otherwise hands the alert to
//! the escalation state machine. Any uncaught error lands the alert in
//! `Failed` with the error on the timeline — a failed run must never
//! leave an alert silently stuck.

use std::sync::Arc;

use chrono::Utc;
use durable::{RunContext, SharedJournalStore, SharedRunRegistry};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::alert::{Alert, AlertStatus, AlertStore, ENGINE_ACTOR};
use crate::config::EngineConfig;
use crate::coverage::{CoverageResolver, OnCallCoverage};
use crate::engine::{EscalationEngine, RunOutcome};
use crate::error::{EscalationError, EscalationResult};
use crate::notify::NotificationDispatcher;

/// How a top-level orchestration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    /// The state machine ran to one of its terminal states.
    Completed(RunOutcome),
    /// Both tiers were empty; nobody was paged and the alert was
    /// marked `Escalated` so the gap is visible, not silent.
    NoOnCall,
}

impl std::fmt::Display for OrchestrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(outcome) => write!(f, "completed ({outcome})"),
            Self::NoOnCall => write!(f, "no_on_call"),
        }
    }
}

/// Per-alert orchestration entry point.
pub struct AlertOrchestrator {
    resolver: Arc<dyn CoverageResolver>,
    alerts: Arc<dyn AlertStore>,
    journal: SharedJournalStore,
    registry: SharedRunRegistry,
    engine: EscalationEngine,
}

impl AlertOrchestrator {
    pub fn new(
        resolver: Arc<dyn CoverageResolver>,
        alerts: Arc<dyn AlertStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        journal: SharedJournalStore,
        registry: SharedRunRegistry,
        config: EngineConfig,
    ) -> Self {
        let engine = EscalationEngine::new(alerts.clone(), dispatcher, config);
        Self {
            resolver,
            alerts,
            journal,
            registry,
            engine,
        }
    }

    /// Run (or resume) the escalation for one alert.
    ///
    /// Rejects the call if a run for this alert id is already live.
    pub async fn run(&self, alert: &Alert) -> EscalationResult<OrchestrationOutcome> {
        let _lease = self.registry.acquire(&alert.id)?;
        info!(alert_id = %alert.id, customer_id = %alert.customer_id, "Starting escalation run");

        let mut ctx = RunContext::resume(self.journal.clone(), &alert.id)?;
        match self.drive(&mut ctx, alert).await {
            Ok(outcome) => {
                info!(alert_id = %alert.id, %outcome, "Escalation run finished");
                Ok(outcome)
            }
            Err(err) => {
                error!(alert_id = %alert.id, error = %err, "Escalation run failed");
                self.mark_failed(&alert.id, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &mut RunContext,
        alert: &Alert,
    ) -> EscalationResult<OrchestrationOutcome> {
        let now = ctx.now().await?;
        let coverage: OnCallCoverage = ctx
            .call_activity("resolve_coverage", &(alert.customer_id.as_str(), now), || async {
                self.resolver.resolve(&alert.customer_id, now).await
            })
            .await
            .map_err(EscalationError::from_resolver_activity)?;

        if coverage.is_empty() {
            let fresh: Option<Alert> = ctx
                .call_activity("fetch_alert", &alert.id.as_str(), || async {
                    self.alerts.get(&alert.id).await
                })
                .await
                .map_err(EscalationError::from_store_activity)?;
            let Some(mut fresh) = fresh else {
                return Ok(OrchestrationOutcome::Completed(RunOutcome::HandledExternally));
            };

            let at = ctx.now().await?;
            fresh.apply_transition(
                ENGINE_ACTOR,
                "no on-call users configured",
                AlertStatus::Escalated,
                at,
            );
            ctx.call_activity("mark_unstaffed", &fresh, || async {
                self.alerts.update(&fresh).await
            })
            .await
            .map_err(EscalationError::from_store_activity)?;

            warn!(
                alert_id = %alert.id,
                customer_id = %alert.customer_id,
                "No on-call users configured, nobody to page"
            );
            return Ok(OrchestrationOutcome::NoOnCall);
        }

        let outcome = self.engine.run(ctx, &alert.id, &coverage).await?;
        Ok(OrchestrationOutcome::Completed(outcome))
    }

    /// Catch-all terminal bookkeeping. Runs outside the journal: the
    /// run is already broken, so this is a best-effort direct write.
    async fn mark_failed(&self, alert_id: &str, err: &EscalationError) {
        match self.alerts.get(alert_id).await {
            Ok(Some(mut alert)) if !alert.status.is_terminal() => {
                alert.apply_transition(
                    ENGINE_ACTOR,
                    format!("escalation run failed: {err}"),
                    AlertStatus::Failed,
                    Utc::now(),
                );
                if let Err(store_err) = self.alerts.update(&alert).await {
                    error!(alert_id, error = %store_err, "Could not record run failure on alert");
                }
            }
            Ok(_) => {}
            Err(store_err) => {
                error!(alert_id, error = %store_err, "Could not load alert to record run failure");
            }
        }
    }
}
