//! Durable execution substrate
//!
//! Generic infrastructure for deterministic, replayable execution of
//! long-running workflows:
//!
//! - an append-only **step journal** per run (`journal`, `store`),
//! - a **run context** whose primitives — `call_activity`, `delay`,
//!   `now`, `new_id` — replay journaled results instead of
//!   re-performing side effects (`context`),
//! - a **run registry** enforcing at most one live execution per run
//!   id (`registry`).
//!
//! Workflow code is written as an ordinary async function that takes a
//! `&mut RunContext` and routes every side effect, wall-clock read,
//! and id draw through it. After a process restart the function is
//! simply called again: journaled steps replay, the step past the end
//! of the journal executes live, and a half-finished delay waits only
//! until its original deadline.

pub mod context;
pub mod journal;
pub mod registry;
pub mod store;

pub use context::{DurableError, DurableResult, RunContext};
pub use journal::{input_hash, StepKind, StepRecord};
pub use registry::{RegistryError, RunGuard, RunRegistry, SharedRunRegistry};
pub use store::{
    FileJournalStore, JournalStore, MemoryJournalStore, SharedJournalStore, StoreError,
    StoreResult,
};
