//! Cutover domain model.

pub mod error;
pub mod health;
pub mod plan;
pub mod trigger;

pub use error::{CutoverError, Result};
pub use health::{CheckKind, HealthCheck, HealthCheckResult};
pub use plan::{CutoverPlan, CutoverStep, PlanStatus, StepStatus, StepType};
pub use trigger::{RollbackTrigger, TriggerCondition};
