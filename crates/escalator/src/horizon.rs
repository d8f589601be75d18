//! Schedule-horizon extension
//!
//! The coverage resolver only answers within the generated rotation
//! horizon, so a background job keeps that horizon rolling forward.
//! One pass walks every customer and asks the rotation store to cover
//! through `now + horizon_days`; a customer whose horizon already
//! reaches the target is skipped without touching the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::coverage::RotationStore;

/// Keeps rotation coverage generated ahead of the present.
pub struct HorizonExtender {
    rotations: Arc<dyn RotationStore>,
    horizon_days: i64,
}

impl HorizonExtender {
    pub fn new(rotations: Arc<dyn RotationStore>, horizon_days: i64) -> Self {
        Self {
            rotations,
            horizon_days,
        }
    }

    /// Extend one customer's horizon through `[from, to)` if it falls
    /// short. Safe to call repeatedly with the same target.
    pub async fn extend_customer(
        &self,
        customer_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(end) = self.rotations.horizon_end(customer_id).await? {
            if end >= to {
                debug!(customer_id, horizon_end = %end, "Horizon already covers target");
                return Ok(());
            }
        }
        self.rotations.extend(customer_id, from, to).await?;
        info!(customer_id, through = %to, "Extended rotation horizon");
        Ok(())
    }

    /// One maintenance pass over all customers at logical time `now`.
    ///
    /// A failing customer is logged and skipped; the pass keeps going
    /// so one bad roster cannot starve everyone else of coverage.
    pub async fn run_once(&self, customer_ids: &[String], now: DateTime<Utc>) -> usize {
        let target = now + chrono::Duration::days(self.horizon_days);
        let mut extended = 0;
        for customer_id in customer_ids {
            match self.extend_customer(customer_id, now, target).await {
                Ok(()) => extended += 1,
                Err(err) => {
                    error!(customer_id, error = %err, "Horizon extension failed for customer");
                }
            }
        }
        extended
    }

    /// Daily maintenance loop. Runs one pass immediately, then every 24h.
    pub async fn run_daily(&self, customer_ids: Vec<String>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            ticker.tick().await;
            let extended = self.run_once(&customer_ids, Utc::now()).await;
            info!(
                customers = customer_ids.len(),
                extended, "Horizon maintenance pass complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{MemoryRotationStore, OnCallMember, RotationSlice};
    use chrono::TimeZone;

    fn seeded_store(customer: &str, end: DateTime<Utc>) -> Arc<MemoryRotationStore> {
        let store = Arc::new(MemoryRotationStore::new());
        store.insert(RotationSlice {
            customer_id: customer.to_string(),
            start: end - chrono::Duration::days(7),
            end,
            primary_tier: vec![OnCallMember {
                user_id: "alice".to_string(),
                display_name: "Alice".to_string(),
                email: Some("alice@example.com".to_string()),
                phone: None,
            }],
            backup_tier: Vec::new(),
            policy: None,
        });
        store
    }

    #[tokio::test]
    async fn test_run_once_reaches_target_horizon() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let store = seeded_store("cust-1", now + chrono::Duration::days(3));
        let extender = HorizonExtender::new(store.clone(), 45);

        let extended = extender.run_once(&["cust-1".to_string()], now).await;
        assert_eq!(extended, 1);
        assert_eq!(
            store.horizon_end("cust-1").await.unwrap(),
            Some(now + chrono::Duration::days(45))
        );
    }

    #[tokio::test]
    async fn test_covered_customer_is_skipped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let far_end = now + chrono::Duration::days(90);
        let store = seeded_store("cust-1", far_end);
        let extender = HorizonExtender::new(store.clone(), 45);

        extender.run_once(&["cust-1".to_string()], now).await;
        // The generous existing horizon is left alone.
        assert_eq!(store.horizon_end("cust-1").await.unwrap(), Some(far_end));
    }

    #[tokio::test]
    async fn test_run_once_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let store = seeded_store("cust-1", now + chrono::Duration::days(3));
        let extender = HorizonExtender::new(store.clone(), 45);

        extender.run_once(&["cust-1".to_string()], now).await;
        extender.run_once(&["cust-1".to_string()], now).await;
        assert_eq!(
            store.horizon_end("cust-1").await.unwrap(),
            Some(now + chrono::Duration::days(45))
        );
    }

    #[tokio::test]
    async fn test_failing_customer_does_not_stop_the_pass() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl RotationStore for FailingStore {
            async fn slice_at(
                &self,
                _customer_id: &str,
                _at: DateTime<Utc>,
            ) -> anyhow::Result<Option<RotationSlice>> {
                Ok(None)
            }

            async fn horizon_end(
                &self,
                customer_id: &str,
            ) -> anyhow::Result<Option<DateTime<Utc>>> {
                if customer_id == "bad" {
                    anyhow::bail!("roster backend unavailable");
                }
                Ok(None)
            }

            async fn extend(
                &self,
                _customer_id: &str,
                _from: DateTime<Utc>,
                _to: DateTime<Utc>,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let extender = HorizonExtender::new(Arc::new(FailingStore), 45);
        let extended = extender
            .run_once(&["bad".to_string(), "good".to_string()], Utc::now())
            .await;
        assert_eq!(extended, 1);
    }
}
