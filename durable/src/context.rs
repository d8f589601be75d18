//! Run context — replay-safe execution primitives
//!
//! A `RunContext` makes an orchestration function resumable: the
//! function is re-executed from the top after a restart, and every
//! side-effecting primitive (`call_activity`, `delay`, `now`,
//! `new_id`) consults the journal before performing anything real.
//! Steps already journaled return their recorded result; only steps
//! past the end of the journal execute live.
//!
//! The orchestration function itself must be deterministic: no direct
//! wall-clock reads, no direct randomness, no I/O outside these
//! primitives. Divergent replays (a different step name or input at a
//! journaled position) fail fast with `NonDeterministic` instead of
//! silently corrupting the run.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::journal::{input_hash, StepKind, StepRecord};
use crate::store::{SharedJournalStore, StoreError};

/// Error type for durable execution
#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    #[error("Journal store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "Non-deterministic replay at step {index}: journal recorded '{recorded}', \
         code executed '{attempted}'"
    )]
    NonDeterministic {
        index: u64,
        recorded: String,
        attempted: String,
    },

    #[error("Delay duration out of range")]
    InvalidDelay,

    #[error("Activity '{name}' failed: {source}")]
    Activity {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for durable execution
pub type DurableResult<T> = Result<T, DurableError>;

/// Execution context for one orchestration run.
///
/// Holds the journal loaded at resume time and a cursor over it. Each
/// primitive either replays the record under the cursor or executes
/// live and appends a new record; in both cases the cursor advances by
/// exactly one, so the step sequence is identical across replays.
pub struct RunContext {
    run_id: String,
    store: SharedJournalStore,
    recorded: Vec<StepRecord>,
    cursor: usize,
}

impl RunContext {
    /// Start or resume the run identified by `run_id`.
    pub fn resume(store: SharedJournalStore, run_id: impl Into<String>) -> DurableResult<Self> {
        let run_id = run_id.into();
        let recorded = store.load(&run_id)?;
        if !recorded.is_empty() {
            debug!(
                run_id = %run_id,
                journaled = recorded.len(),
                "Resuming run with existing journal"
            );
        }
        Ok(Self {
            run_id,
            store,
            recorded,
            cursor: 0,
        })
    }

    /// The run id this context belongs to.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether the next step will be served from the journal.
    pub fn is_replaying(&self) -> bool {
        self.cursor < self.recorded.len()
    }

    /// Number of steps executed or replayed so far in this pass.
    pub fn step_count(&self) -> u64 {
        self.cursor as u64
    }

    /// Perform a side-effecting call exactly once per logical step.
    ///
    /// If the journal holds a record at the current position the
    /// recorded result is returned and `op` is never invoked.
    /// Otherwise `op` runs, its result is durably journaled, and only
    /// then does the run advance — a crash between the call and the
    /// append re-executes the call on the next resume (at-least-once).
    /// Failed calls are not journaled.
    pub async fn call_activity<I, O, F, Fut>(
        &mut self,
        name: &str,
        input: &I,
        op: F,
    ) -> DurableResult<O>
    where
        I: Serialize,
        O: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
    {
        let hash = input_hash(input);

        if let Some(record) = self.replayed_step(StepKind::Activity, name, &hash)? {
            let result: O = serde_json::from_value(record.payload.clone())?;
            debug!(run_id = %self.run_id, step = record.index, activity = name, "Replayed activity");
            self.cursor += 1;
            return Ok(result);
        }

        let result = op().await.map_err(|source| DurableError::Activity {
            name: name.to_string(),
            source,
        })?;

        let record = StepRecord {
            index: self.cursor as u64,
            kind: StepKind::Activity,
            name: name.to_string(),
            input_hash: hash,
            payload: serde_json::to_value(&result)?,
            completed: true,
            recorded_at: Utc::now(),
        };
        self.store.append(&self.run_id, &record)?;
        debug!(run_id = %self.run_id, step = record.index, activity = name, "Recorded activity");
        self.recorded.push(record);
        self.cursor += 1;
        Ok(result)
    }

    /// Suspend the run for `duration` without pinning a thread.
    ///
    /// The absolute deadline is journaled before the first sleep, so a
    /// restart waits only the remaining portion relative to the
    /// original deadline, never the full duration again.
    pub async fn delay(&mut self, duration: std::time::Duration) -> DurableResult<()> {
        let hash = input_hash(&duration.as_millis().to_string());

        let deadline: DateTime<Utc> =
            if let Some(record) = self.replayed_step(StepKind::Delay, "delay", &hash)? {
                if record.completed {
                    debug!(run_id = %self.run_id, step = record.index, "Replayed completed delay");
                    self.cursor += 1;
                    return Ok(());
                }
                serde_json::from_value(record.payload.clone())?
            } else {
                let chrono_duration =
                    chrono::Duration::from_std(duration).map_err(|_| DurableError::InvalidDelay)?;
                let deadline = Utc::now() + chrono_duration;
                let record = StepRecord {
                    index: self.cursor as u64,
                    kind: StepKind::Delay,
                    name: "delay".to_string(),
                    input_hash: hash,
                    payload: serde_json::to_value(deadline)?,
                    completed: false,
                    recorded_at: Utc::now(),
                };
                self.store.append(&self.run_id, &record)?;
                self.recorded.push(record);
                deadline
            };

        let remaining = deadline - Utc::now();
        if let Ok(remaining) = remaining.to_std() {
            debug!(
                run_id = %self.run_id,
                step = self.cursor,
                remaining_secs = remaining.as_secs(),
                "Waiting out durable delay"
            );
            tokio::time::sleep(remaining).await;
        } else {
            warn!(run_id = %self.run_id, step = self.cursor, "Delay deadline already passed");
        }

        let index = self.cursor as u64;
        self.store.mark_completed(&self.run_id, index)?;
        self.recorded[self.cursor].completed = true;
        self.cursor += 1;
        Ok(())
    }

    /// Logical clock: wall time journaled once, replayed thereafter.
    pub async fn now(&mut self) -> DurableResult<DateTime<Utc>> {
        let hash = input_hash(&());

        if let Some(record) = self.replayed_step(StepKind::Now, "now", &hash)? {
            let at: DateTime<Utc> = serde_json::from_value(record.payload.clone())?;
            self.cursor += 1;
            return Ok(at);
        }

        let at = Utc::now();
        let record = StepRecord {
            index: self.cursor as u64,
            kind: StepKind::Now,
            name: "now".to_string(),
            input_hash: hash,
            payload: serde_json::to_value(at)?,
            completed: true,
            recorded_at: at,
        };
        self.store.append(&self.run_id, &record)?;
        self.recorded.push(record);
        self.cursor += 1;
        Ok(at)
    }

    /// Deterministic id draw: a v4 uuid journaled once.
    pub async fn new_id(&mut self) -> DurableResult<Uuid> {
        let hash = input_hash(&());

        if let Some(record) = self.replayed_step(StepKind::Id, "id", &hash)? {
            let id: Uuid = serde_json::from_value(record.payload.clone())?;
            self.cursor += 1;
            return Ok(id);
        }

        let id = Uuid::new_v4();
        let record = StepRecord {
            index: self.cursor as u64,
            kind: StepKind::Id,
            name: "id".to_string(),
            input_hash: hash,
            payload: serde_json::to_value(id)?,
            completed: true,
            recorded_at: Utc::now(),
        };
        self.store.append(&self.run_id, &record)?;
        self.recorded.push(record);
        self.cursor += 1;
        Ok(id)
    }

    /// Return the journaled record under the cursor, validating that
    /// the step being executed matches what was recorded.
    fn replayed_step(
        &self,
        kind: StepKind,
        name: &str,
        hash: &str,
    ) -> DurableResult<Option<&StepRecord>> {
        let Some(record) = self.recorded.get(self.cursor) else {
            return Ok(None);
        };
        if !record.matches(kind, name, hash) {
            return Err(DurableError::NonDeterministic {
                index: record.index,
                recorded: format!("{}:{}", record.kind, record.name),
                attempted: format!("{kind}:{name}"),
            });
        }
        Ok(Some(record))
    }
}
