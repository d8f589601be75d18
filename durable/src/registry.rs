//! Run registry — at most one live execution per run id
//!
//! Each alert has exactly one active orchestration run. The registry
//! hands out a lease per run id; a second acquire for the same id is
//! rejected, not queued. The lease is released when its guard drops,
//! including on panic unwind.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Run '{0}' is already active")]
    AlreadyRunning(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Shared reference to a run registry
pub type SharedRunRegistry = Arc<RunRegistry>;

/// In-process lease registry keyed by run id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    active: Mutex<HashSet<String>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> SharedRunRegistry {
        Arc::new(self)
    }

    /// Acquire the lease for `run_id`, failing if it is already held.
    pub fn acquire(self: &Arc<Self>, run_id: &str) -> Result<RunGuard, RegistryError> {
        let mut active = self.active.lock().map_err(|_| RegistryError::LockPoisoned)?;
        if !active.insert(run_id.to_string()) {
            return Err(RegistryError::AlreadyRunning(run_id.to_string()));
        }
        debug!(run_id, "Run lease acquired");
        Ok(RunGuard {
            registry: Arc::clone(self),
            run_id: run_id.to_string(),
        })
    }

    /// Whether a lease is currently held for `run_id`.
    pub fn is_active(&self, run_id: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(run_id))
            .unwrap_or(false)
    }

    fn release(&self, run_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(run_id);
            debug!(run_id, "Run lease released");
        }
    }
}

/// Lease on a run id; releases on drop.
#[derive(Debug)]
pub struct RunGuard {
    registry: SharedRunRegistry,
    run_id: String,
}

impl RunGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.release(&self.run_id);
    }
}
