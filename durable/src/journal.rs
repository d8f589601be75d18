//! Step journal types for durable execution
//!
//! An orchestration run is recorded as an append-only sequence of
//! `StepRecord`s, one per side-effecting primitive the run performed.
//! On resume the run function is re-executed from the top and each
//! primitive consults the journal before doing anything real.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of journaled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// A call to an external activity; payload is the recorded result.
    Activity,
    /// A durable wait; payload is the absolute deadline.
    Delay,
    /// A logical-clock read; payload is the recorded timestamp.
    Now,
    /// A deterministic id draw; payload is the recorded uuid.
    Id,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activity => write!(f, "activity"),
            Self::Delay => write!(f, "delay"),
            Self::Now => write!(f, "now"),
            Self::Id => write!(f, "id"),
        }
    }
}

/// One journaled step of an orchestration run.
///
/// Records are appended in step order and never rewritten, except that
/// a `Delay` record flips `completed` once its deadline has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based position in the run's step sequence.
    pub index: u64,
    pub kind: StepKind,
    /// Activity name, or the kind name for non-activity steps.
    pub name: String,
    /// Hash of the step's input, used to detect divergent replays.
    pub input_hash: String,
    /// Kind-dependent payload (see `StepKind`).
    pub payload: serde_json::Value,
    /// Whether the step finished. Always true for recorded activities;
    /// false for a delay whose deadline has not passed yet.
    pub completed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    /// Whether a replayed step matches what the journal recorded.
    pub fn matches(&self, kind: StepKind, name: &str, input_hash: &str) -> bool {
        self.kind == kind && self.name == name && self.input_hash == input_hash
    }
}

/// Hash a step input as blake3 over its canonical JSON encoding.
///
/// Serialization failures fold into a sentinel hash rather than an
/// error: the same input fails the same way on replay, so the match
/// check still holds.
pub fn input_hash<T: Serialize>(input: &T) -> String {
    match serde_json::to_vec(input) {
        Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
        Err(_) => "unserializable".to_string(),
    }
}
