//! Escalation state machine — who to notify next, how long to wait,
//! when to escalate tiers, when to stop
//!
//! The run walks the primary tier, then (only if the alert is still
//! unhandled) the backup tier, member by member in tier order:
//!
//! ```text
//! for tier in [primary, backup]:
//!     entering backup → liveness check, mark Escalated
//!     for member in tier (capped by max_attempts_per_tier):
//!         liveness check  → handled/missing? stop: HandledExternally
//!         record attempt  → attempts += 1, target = member, Pending
//!         dispatch        → one attempt, every channel the member has
//!         liveness check  → acknowledged mid-send? stop: HandledExternally
//!         journal outcome → timeline entry naming channel results
//!         delivered?      → durable wait of ack_timeout
//!         all failed?     → next member immediately, no wait
//! all tiers exhausted → final timeline entry, Exhausted
//! ```
//!
//! Every side effect, wall-clock read, and wait goes through the
//! `RunContext`, so a restarted process replays to exactly where it
//! left off without re-paging anyone.

use std::sync::Arc;

use durable::RunContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alert::{Alert, AlertStatus, AlertStore, ENGINE_ACTOR};
use crate::config::EngineConfig;
use crate::coverage::{OnCallCoverage, OnCallMember};
use crate::error::{EscalationError, EscalationResult};
use crate::notify::{NotificationDispatcher, SendOutcome};

/// Escalation tier being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Primary,
    Backup,
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

/// How an escalation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The alert was acknowledged, resolved, or deleted out of band.
    HandledExternally,
    /// Every tier was walked without a response. The alert status is
    /// deliberately left as-is: exhaustion is an operational signal,
    /// not a processing error.
    Exhausted,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandledExternally => write!(f, "handled_externally"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// The escalation state machine.
pub struct EscalationEngine {
    alerts: Arc<dyn AlertStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: EngineConfig,
}

impl EscalationEngine {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            alerts,
            dispatcher,
            config,
        }
    }

    /// Drive one alert through the tiered notify/wait protocol.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        alert_id: &str,
        coverage: &OnCallCoverage,
    ) -> EscalationResult<RunOutcome> {
        let policy = &coverage.policy;
        let tiers = [
            (EscalationTier::Primary, &coverage.primary_tier),
            (EscalationTier::Backup, &coverage.backup_tier),
        ];
        let mut total_attempts: u32 = 0;

        for (tier, members) in tiers {
            if members.is_empty() {
                debug!(alert_id, %tier, "Tier has no members, skipping");
                continue;
            }

            if tier == EscalationTier::Backup && !coverage.primary_tier.is_empty() {
                // Primary was walked without a response; re-check before
                // escalating in case a human got there in the meantime.
                let Some(mut alert) = self.fetch_live(ctx, alert_id).await? else {
                    return Ok(RunOutcome::HandledExternally);
                };
                let at = ctx.now().await?;
                alert.apply_transition(
                    ENGINE_ACTOR,
                    "primary tier did not respond, escalating to backup",
                    AlertStatus::Escalated,
                    at,
                );
                self.persist(ctx, "mark_escalated", &alert).await?;
                info!(alert_id, "Escalated to backup tier");
            }

            let cap = policy.max_attempts_per_tier as usize;
            for member in members.iter().take(cap) {
                // Time has passed since the member list was computed;
                // the alert may have been handled concurrently.
                let Some(mut alert) = self.fetch_live(ctx, alert_id).await? else {
                    return Ok(RunOutcome::HandledExternally);
                };

                let at = ctx.now().await?;
                alert.escalation_attempts += 1;
                alert.current_escalation_target = Some(member.user_id.clone());
                alert.apply_transition(
                    ENGINE_ACTOR,
                    format!("paging {} ({tier} tier)", member.display_name),
                    AlertStatus::Pending,
                    at,
                );
                let alert = self.persist(ctx, "record_attempt", &alert).await?;
                total_attempts += 1;

                let outcome = self.dispatch(ctx, &alert, member).await?;

                // The member may have acknowledged while the send was
                // in flight; writing the pre-dispatch record back would
                // clobber that. Annotate a fresh read instead.
                let Some(mut alert) = self.fetch_live(ctx, alert_id).await? else {
                    return Ok(RunOutcome::HandledExternally);
                };
                let at = ctx.now().await?;
                alert.annotate(
                    ENGINE_ACTOR,
                    format!("notification to {}: {}", member.display_name, outcome.summary()),
                    at,
                );
                self.persist(ctx, "record_outcome", &alert).await?;

                if outcome.delivered() {
                    debug!(
                        alert_id,
                        user_id = %member.user_id,
                        wait_secs = policy.ack_timeout.as_secs(),
                        "Delivered, waiting for acknowledgment"
                    );
                    ctx.delay(policy.ack_timeout).await?;
                } else {
                    // Nobody was actually reached; burning the ack
                    // timeout would only slow the escalation down.
                    info!(
                        alert_id,
                        user_id = %member.user_id,
                        "All channels failed, moving to next member without waiting"
                    );
                }
            }
        }

        let Some(mut alert) = self.fetch_live(ctx, alert_id).await? else {
            return Ok(RunOutcome::HandledExternally);
        };
        let at = ctx.now().await?;
        alert.annotate(
            ENGINE_ACTOR,
            format!("all {total_attempts} attempts completed without response"),
            at,
        );
        self.persist(ctx, "record_exhausted", &alert).await?;
        info!(alert_id, total_attempts, "Escalation exhausted without response");
        Ok(RunOutcome::Exhausted)
    }

    /// Liveness check: a fresh read of the alert. `None` means the run
    /// should stop — the alert is gone or was handled out of band.
    async fn fetch_live(
        &self,
        ctx: &mut RunContext,
        alert_id: &str,
    ) -> EscalationResult<Option<Alert>> {
        let alert: Option<Alert> = ctx
            .call_activity("fetch_alert", &alert_id, || async {
                self.alerts.get(alert_id).await
            })
            .await
            .map_err(EscalationError::from_store_activity)?;

        match alert {
            None => {
                info!(alert_id, "Alert no longer exists, stopping escalation");
                Ok(None)
            }
            Some(alert) if self.config.is_handled(alert.status) => {
                info!(alert_id, status = %alert.status, "Alert handled externally, stopping escalation");
                Ok(None)
            }
            Some(alert) => Ok(Some(alert)),
        }
    }

    async fn persist(
        &self,
        ctx: &mut RunContext,
        step: &str,
        alert: &Alert,
    ) -> EscalationResult<Alert> {
        ctx.call_activity(step, alert, || async { self.alerts.update(alert).await })
            .await
            .map_err(EscalationError::from_store_activity)
    }

    async fn dispatch(
        &self,
        ctx: &mut RunContext,
        alert: &Alert,
        member: &OnCallMember,
    ) -> EscalationResult<SendOutcome> {
        let subject = format!("[{}] {}", alert.severity, alert.title);
        let input = (member.user_id.as_str(), alert.escalation_attempts);
        let outcome = ctx
            .call_activity("send_notification", &input, || async {
                self.dispatcher
                    .send(
                        &member.user_id,
                        member.email.as_deref(),
                        member.phone.as_deref(),
                        &subject,
                        &alert.description,
                    )
                    .await
            })
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertStore;
    use crate::coverage::EscalationPolicy;
    use anyhow::Result;
    use async_trait::async_trait;
    use durable::{MemoryJournalStore, StepKind};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingDispatcher {
        sends: Mutex<Vec<String>>,
        fail_all_for: Vec<String>,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                fail_all_for: Vec::new(),
            }
        }

        fn failing_for(users: &[&str]) -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                fail_all_for: users.iter().map(|u| u.to_string()).collect(),
            }
        }

        fn sends(&self) -> Vec<String> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            user_id: &str,
            _email: Option<&str>,
            _phone: Option<&str>,
            _subject: &str,
            _body: &str,
        ) -> Result<SendOutcome> {
            self.sends.lock().unwrap().push(user_id.to_string());
            if self.fail_all_for.iter().any(|u| u == user_id) {
                Ok(SendOutcome {
                    email_sent: false,
                    sms_sent: false,
                    error: Some("provider timeout".to_string()),
                })
            } else {
                Ok(SendOutcome {
                    email_sent: true,
                    sms_sent: false,
                    error: None,
                })
            }
        }
    }

    fn member(user_id: &str) -> OnCallMember {
        OnCallMember {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            phone: None,
        }
    }

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            customer_id: "cust-1".to_string(),
            resource_id: "web-1".to_string(),
            status: AlertStatus::Received,
            severity: "critical".to_string(),
            title: "API 5xx spike".to_string(),
            description: "Error rate above 20% for 5 minutes".to_string(),
            escalation_attempts: 0,
            current_escalation_target: None,
            timeline: Vec::new(),
        }
    }

    fn coverage(primary: &[&str], backup: &[&str], max_attempts: u32) -> OnCallCoverage {
        OnCallCoverage {
            primary_tier: primary.iter().map(|u| member(u)).collect(),
            backup_tier: backup.iter().map(|u| member(u)).collect(),
            policy: EscalationPolicy {
                ack_timeout: Duration::from_secs(300),
                max_attempts_per_tier: max_attempts,
                retry_delay: Duration::from_secs(300),
            },
        }
    }

    fn harness(
        dispatcher: RecordingDispatcher,
    ) -> (Arc<MemoryAlertStore>, Arc<RecordingDispatcher>, EscalationEngine) {
        let alerts = Arc::new(MemoryAlertStore::new());
        let dispatcher = Arc::new(dispatcher);
        let engine = EscalationEngine::new(
            alerts.clone(),
            dispatcher.clone(),
            EngineConfig::default(),
        );
        (alerts, dispatcher, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_members_tried_in_tier_order() {
        let (alerts, dispatcher, engine) = harness(RecordingDispatcher::new());
        alerts.insert(alert("a-1"));
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal, "a-1").unwrap();

        let outcome = engine
            .run(&mut ctx, "a-1", &coverage(&["alice", "bob"], &["carol"], 3))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(dispatcher.sends(), vec!["alice", "bob", "carol"]);
        assert_eq!(alerts.snapshot("a-1").unwrap().escalation_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap_limits_members_per_tier() {
        let (alerts, dispatcher, engine) = harness(RecordingDispatcher::new());
        alerts.insert(alert("a-1"));
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal, "a-1").unwrap();

        engine
            .run(&mut ctx, "a-1", &coverage(&["alice", "bob", "carol"], &[], 2))
            .await
            .unwrap();

        // Only the first two primary members are tried.
        assert_eq!(dispatcher.sends(), vec!["alice", "bob"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_dispatch_failure_skips_wait() {
        let (alerts, _dispatcher, engine) = harness(RecordingDispatcher::failing_for(&["alice"]));
        alerts.insert(alert("a-1"));
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal.clone(), "a-1").unwrap();

        engine
            .run(&mut ctx, "a-1", &coverage(&["alice", "bob"], &[], 3))
            .await
            .unwrap();

        // One delay journaled (bob, delivered), none for alice.
        let delays = journal
            .load("a-1")
            .unwrap()
            .into_iter()
            .filter(|s| s.kind == StepKind::Delay)
            .count();
        assert_eq!(delays, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_entry_marks_escalated() {
        let (alerts, _dispatcher, engine) = harness(RecordingDispatcher::new());
        alerts.insert(alert("a-1"));
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal, "a-1").unwrap();

        engine
            .run(&mut ctx, "a-1", &coverage(&["alice"], &["bob"], 3))
            .await
            .unwrap();

        let stored = alerts.snapshot("a-1").unwrap();
        let escalated: Vec<_> = stored
            .timeline
            .iter()
            .filter(|e| e.new_status == AlertStatus::Escalated)
            .collect();
        assert_eq!(escalated.len(), 1);
        assert!(escalated[0].comment.contains("primary tier did not respond"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_during_send_is_not_clobbered() {
        // Acknowledges the alert out of band while the send is in
        // flight, like a human clicking accept as the page lands.
        struct AckingDispatcher {
            alerts: Arc<MemoryAlertStore>,
            sends: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl NotificationDispatcher for AckingDispatcher {
            async fn send(
                &self,
                user_id: &str,
                _email: Option<&str>,
                _phone: Option<&str>,
                _subject: &str,
                _body: &str,
            ) -> Result<SendOutcome> {
                self.sends.lock().unwrap().push(user_id.to_string());
                self.alerts.set_status("a-1", AlertStatus::Accepted);
                Ok(SendOutcome {
                    email_sent: true,
                    sms_sent: false,
                    error: None,
                })
            }
        }

        let alerts = Arc::new(MemoryAlertStore::new());
        alerts.insert(alert("a-1"));
        let dispatcher = Arc::new(AckingDispatcher {
            alerts: alerts.clone(),
            sends: Mutex::new(Vec::new()),
        });
        let engine =
            EscalationEngine::new(alerts.clone(), dispatcher.clone(), EngineConfig::default());
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal, "a-1").unwrap();

        let outcome = engine
            .run(&mut ctx, "a-1", &coverage(&["alice"], &["bob"], 3))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::HandledExternally);
        assert_eq!(dispatcher.sends.lock().unwrap().clone(), vec!["alice"]);
        // The acknowledgment survives; no stale Pending write over it.
        assert_eq!(alerts.snapshot("a-1").unwrap().status, AlertStatus::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_primary_goes_straight_to_backup() {
        let (alerts, dispatcher, engine) = harness(RecordingDispatcher::new());
        alerts.insert(alert("a-1"));
        let journal = MemoryJournalStore::new().shared();
        let mut ctx = RunContext::resume(journal, "a-1").unwrap();

        engine
            .run(&mut ctx, "a-1", &coverage(&[], &["bob"], 3))
            .await
            .unwrap();

        assert_eq!(dispatcher.sends(), vec!["bob"]);
        // No "primary did not respond" entry when primary was empty.
        let stored = alerts.snapshot("a-1").unwrap();
        assert!(stored
            .timeline
            .iter()
            .all(|e| !e.comment.contains("primary tier did not respond")));
    }
}
