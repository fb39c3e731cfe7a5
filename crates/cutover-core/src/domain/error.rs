//! Domain-level error taxonomy for cutover execution.

use cutover_dns::DnsError;

/// Cutover domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CutoverError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid health check {id}: {reason}")]
    InvalidHealthCheck { id: String, reason: String },

    #[error("invalid rollback trigger {id}: {reason}")]
    InvalidTrigger { id: String, reason: String },

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("plan {0} is already running")]
    PlanAlreadyRunning(String),

    #[error("plan {0} is not running")]
    PlanNotRunning(String),

    #[error("invalid status transition for plan {plan_id}: {from} -> {to}")]
    InvalidTransition {
        plan_id: String,
        from: String,
        to: String,
    },

    #[error("plan {plan_id} cannot be rolled back from status {status}")]
    RollbackNotAllowed { plan_id: String, status: String },

    #[error("step {index} references unknown {kind} {reference_id}")]
    UnknownReference {
        index: usize,
        kind: String,
        reference_id: String,
    },

    #[error("dns error: {0}")]
    Dns(#[from] DnsError),

    #[error("health checker setup failed: {0}")]
    HealthCheckerSetup(String),

    #[error("execution task failed: {0}")]
    TaskJoin(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cutover domain operations.
pub type Result<T> = std::result::Result<T, CutoverError>;
