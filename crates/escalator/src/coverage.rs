//! On-call coverage — who is primary/backup right now, under what policy
//!
//! Coverage is resolved from pre-generated rotation slices; generating
//! the slices themselves belongs to the roster layer. A resolver query
//! inside the generated horizon always answers: a gap yields empty
//! tiers and the system default policy rather than an error, while an
//! unavailable upstream store is a hard error for the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One on-call member of a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCallMember {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Escalation policy attached to a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// How long to wait for acknowledgment after a delivered page.
    pub ack_timeout: Duration,
    /// Caps attempts per tier independent of member-list length.
    pub max_attempts_per_tier: u32,
    /// Reserved; not consulted by the wait logic today.
    pub retry_delay: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5 * 60),
            max_attempts_per_tier: 3,
            retry_delay: Duration::from_secs(5 * 60),
        }
    }
}

/// Resolved coverage for a customer at an instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCallCoverage {
    pub primary_tier: Vec<OnCallMember>,
    pub backup_tier: Vec<OnCallMember>,
    pub policy: EscalationPolicy,
}

impl OnCallCoverage {
    /// Whether there is nobody to page at all.
    pub fn is_empty(&self) -> bool {
        self.primary_tier.is_empty() && self.backup_tier.is_empty()
    }
}

/// Pre-generated roster data: who covers `[start, end)` for a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSlice {
    pub customer_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub primary_tier: Vec<OnCallMember>,
    pub backup_tier: Vec<OnCallMember>,
    /// Absent means the system default applies.
    pub policy: Option<EscalationPolicy>,
}

impl RotationSlice {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Storage contract for rotation slices.
#[async_trait]
pub trait RotationStore: Send + Sync {
    /// The slice covering `at` for a customer, if any.
    async fn slice_at(&self, customer_id: &str, at: DateTime<Utc>) -> Result<Option<RotationSlice>>;

    /// End of the generated horizon for a customer, if any data exists.
    async fn horizon_end(&self, customer_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Ensure coverage through `[from, to)`. Idempotent: already-covered
    /// ranges are a no-op.
    async fn extend(&self, customer_id: &str, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<()>;
}

/// Resolver contract consumed by the orchestrator.
#[async_trait]
pub trait CoverageResolver: Send + Sync {
    /// Resolve current coverage for a customer at a point in time.
    async fn resolve(&self, customer_id: &str, as_of: DateTime<Utc>) -> Result<OnCallCoverage>;
}

/// Coverage resolver backed by a rotation store.
pub struct SliceCoverageResolver {
    rotations: Arc<dyn RotationStore>,
    default_policy: EscalationPolicy,
}

impl SliceCoverageResolver {
    pub fn new(rotations: Arc<dyn RotationStore>, default_policy: EscalationPolicy) -> Self {
        Self {
            rotations,
            default_policy,
        }
    }
}

#[async_trait]
impl CoverageResolver for SliceCoverageResolver {
    async fn resolve(&self, customer_id: &str, as_of: DateTime<Utc>) -> Result<OnCallCoverage> {
        match self.rotations.slice_at(customer_id, as_of).await? {
            Some(slice) => Ok(OnCallCoverage {
                primary_tier: slice.primary_tier,
                backup_tier: slice.backup_tier,
                policy: slice.policy.unwrap_or_else(|| self.default_policy.clone()),
            }),
            None => {
                warn!(customer_id, %as_of, "No rotation slice covers this instant");
                Ok(OnCallCoverage {
                    primary_tier: Vec::new(),
                    backup_tier: Vec::new(),
                    policy: self.default_policy.clone(),
                })
            }
        }
    }
}

/// In-memory rotation store for the CLI and tests.
#[derive(Default)]
pub struct MemoryRotationStore {
    slices: Mutex<HashMap<String, Vec<RotationSlice>>>,
}

impl MemoryRotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, slice: RotationSlice) {
        self.slices
            .lock()
            .expect("rotation store lock poisoned")
            .entry(slice.customer_id.clone())
            .or_default()
            .push(slice);
    }
}

#[async_trait]
impl RotationStore for MemoryRotationStore {
    async fn slice_at(
        &self,
        customer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<RotationSlice>> {
        let slices = self
            .slices
            .lock()
            .map_err(|_| anyhow::anyhow!("rotation store lock poisoned"))?;
        Ok(slices
            .get(customer_id)
            .and_then(|list| list.iter().find(|s| s.covers(at)).cloned()))
    }

    async fn horizon_end(&self, customer_id: &str) -> Result<Option<DateTime<Utc>>> {
        let slices = self
            .slices
            .lock()
            .map_err(|_| anyhow::anyhow!("rotation store lock poisoned"))?;
        Ok(slices
            .get(customer_id)
            .and_then(|list| list.iter().map(|s| s.end).max()))
    }

    async fn extend(
        &self,
        customer_id: &str,
        _from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let mut slices = self
            .slices
            .lock()
            .map_err(|_| anyhow::anyhow!("rotation store lock poisoned"))?;
        let Some(list) = slices.get_mut(customer_id) else {
            // Nothing to extend from: slice generation is the roster
            // layer's job, an empty customer stays empty.
            return Ok(());
        };
        // Stretch the latest slice forward. Safe to re-run: a horizon
        // already at or past `to` is left alone.
        if let Some(last) = list.iter_mut().max_by_key(|s| s.end) {
            if last.end < to {
                last.end = to;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member(user_id: &str) -> OnCallMember {
        OnCallMember {
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            email: Some(format!("{user_id}@example.com")),
            phone: None,
        }
    }

    fn slice(customer: &str, start_hour: u32, end_hour: u32) -> RotationSlice {
        RotationSlice {
            customer_id: customer.to_string(),
            start: Utc.with_ymd_and_hms(2026, 3, 1, start_hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 1, end_hour, 0, 0).unwrap(),
            primary_tier: vec![member("alice")],
            backup_tier: vec![member("bob")],
            policy: None,
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = EscalationPolicy::default();
        assert_eq!(policy.ack_timeout, Duration::from_secs(300));
        assert_eq!(policy.max_attempts_per_tier, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_resolver_uses_covering_slice() {
        let rotations = Arc::new(MemoryRotationStore::new());
        rotations.insert(slice("cust-1", 0, 12));

        let resolver =
            SliceCoverageResolver::new(rotations, EscalationPolicy::default());
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let coverage = resolver.resolve("cust-1", at).await.unwrap();

        assert_eq!(coverage.primary_tier[0].user_id, "alice");
        assert_eq!(coverage.backup_tier[0].user_id, "bob");
        assert_eq!(coverage.policy, EscalationPolicy::default());
        assert!(!coverage.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_gap_yields_empty_tiers_and_default_policy() {
        let rotations = Arc::new(MemoryRotationStore::new());
        rotations.insert(slice("cust-1", 0, 12));

        let resolver =
            SliceCoverageResolver::new(rotations, EscalationPolicy::default());
        let past_horizon = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let coverage = resolver.resolve("cust-1", past_horizon).await.unwrap();

        assert!(coverage.is_empty());
        assert_eq!(coverage.policy, EscalationPolicy::default());
    }

    #[tokio::test]
    async fn test_slice_boundaries_half_open() {
        let s = slice("cust-1", 0, 12);
        assert!(s.covers(s.start));
        assert!(!s.covers(s.end));
    }

    #[tokio::test]
    async fn test_extend_is_idempotent() {
        let rotations = MemoryRotationStore::new();
        rotations.insert(slice("cust-1", 0, 12));

        let target = Utc.with_ymd_and_hms(2026, 4, 15, 0, 0, 0).unwrap();
        rotations.extend("cust-1", Utc::now(), target).await.unwrap();
        assert_eq!(rotations.horizon_end("cust-1").await.unwrap(), Some(target));

        // Re-running over the covered range changes nothing.
        rotations
            .extend("cust-1", Utc::now(), target - chrono::Duration::days(10))
            .await
            .unwrap();
        assert_eq!(rotations.horizon_end("cust-1").await.unwrap(), Some(target));
    }
}
