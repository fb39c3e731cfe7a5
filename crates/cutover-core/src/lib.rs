//! Cutover Core Library
//!
//! Plan model, health checking, rollback trigger evaluation, and the
//! orchestration engine that executes a cutover plan step by step.

pub mod cancel;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod fakes;
pub mod health;
pub mod metrics;
pub mod obs;
pub mod telemetry;
pub mod triggers;

pub use cancel::{cancel_pair, CancelHandle, CancelReason, CancelSignal};
pub use config::{EngineConfig, HealthCheckerConfig};
pub use domain::{
    CheckKind, CutoverError, CutoverPlan, CutoverStep, HealthCheck, HealthCheckResult,
    PlanStatus, Result, RollbackTrigger, StepStatus, StepType, TriggerCondition,
};
pub use engine::{
    render_manual_instructions, CutoverEngine, ExecuteOptions, ExecutionHandle, ExecutionResult,
    PlanSnapshot, ProgressStream, RollbackReport,
};
pub use events::{ProgressEvent, ProgressKind};
pub use health::{HealthChecker, HealthProbe};
pub use triggers::{evaluate_triggers, StepFailure, TriggerMatch, TriggerVerdict};

/// DNS layer re-exported for engine callers.
pub use cutover_dns;
