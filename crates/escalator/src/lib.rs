//! Alert Escalation Engine
//!
//! This library provides:
//! - A tiered escalation state machine that pages on-call members and
//!   waits for acknowledgment between attempts
//! - A coverage resolver answering "who is on call right now" from
//!   pre-generated rotation slices
//! - A per-alert orchestrator running the whole flow on a durable
//!   journal, so a crashed run resumes without re-paging anyone
//! - A horizon extender keeping rotation data generated ahead of time
//!
//! # Flow
//!
//! ```text
//! alert -> AlertOrchestrator::run
//!            |- resolve coverage (primary/backup tiers + policy)
//!            |- nobody on call?  -> mark Escalated, stop
//!            '- EscalationEngine::run
//!                 per tier, per member:
//!                   liveness check -> record attempt -> dispatch
//!                   delivered? wait ack_timeout : next member
//! ```
//!
//! Every store write, notification send, and timer in the flow goes
//! through a [`durable::RunContext`] journal step.

pub mod alert;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod horizon;
pub mod notify;
pub mod orchestrator;

// Re-export key alert types
pub use alert::{Alert, AlertStatus, AlertStore, MemoryAlertStore, TimelineEntry, ENGINE_ACTOR};

// Re-export key coverage types
pub use coverage::{
    CoverageResolver, EscalationPolicy, MemoryRotationStore, OnCallCoverage, OnCallMember,
    RotationSlice, RotationStore, SliceCoverageResolver,
};

// Re-export engine and orchestrator types
pub use config::{EngineConfig, DEFAULT_HORIZON_DAYS};
pub use engine::{EscalationEngine, EscalationTier, RunOutcome};
pub use error::{EscalationError, EscalationResult};
pub use horizon::HorizonExtender;
pub use notify::{LogDispatcher, NotificationDispatcher, SendOutcome};
pub use orchestrator::{AlertOrchestrator, OrchestrationOutcome};
