//! Execution options and outcome records.

use serde::{Deserialize, Serialize};

use crate::domain::plan::{CutoverPlan, PlanStatus};

/// Per-execution overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Simulate every step; no probes run and no provider is called.
    #[serde(default)]
    pub dry_run: bool,
    /// Render operator instructions instead of executing.
    #[serde(default)]
    pub manual: bool,
    /// Plan-wide timeout; overrides the plan's own.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Provider name used for every DNS change.
    #[serde(default)]
    pub provider: Option<String>,
}

impl ExecuteOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Final outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub success: bool,
    pub status: PlanStatus,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub duration_ms: u64,
    pub rolled_back: bool,
    pub error: Option<String>,
    /// Timestamped log lines, in order.
    pub logs: Vec<String>,
    /// Rendered runbook (manual mode only).
    pub instructions: Option<String>,
}

impl ExecutionResult {
    /// Result snapshot of `plan` in its current state.
    pub fn from_plan(plan: &CutoverPlan, logs: Vec<String>, duration_ms: u64) -> Self {
        let (steps_completed, steps_failed) = plan.step_counts();
        Self {
            plan_id: plan.id.clone(),
            success: plan.status == PlanStatus::Completed,
            status: plan.status,
            steps_completed,
            steps_failed,
            duration_ms,
            rolled_back: plan.status == PlanStatus::RolledBack,
            error: plan.error.clone(),
            logs,
            instructions: None,
        }
    }

    /// Manual mode: nothing ran, the instructions are the outcome.
    pub fn manual(plan: &CutoverPlan, instructions: String) -> Self {
        Self {
            plan_id: plan.id.clone(),
            success: true,
            status: plan.status,
            steps_completed: 0,
            steps_failed: 0,
            duration_ms: 0,
            rolled_back: false,
            error: None,
            logs: Vec::new(),
            instructions: Some(instructions),
        }
    }
}

/// Point-in-time view of a tracked plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan: CutoverPlan,
    pub logs: Vec<String>,
}

/// Outcome of reverting a plan's applied DNS changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub plan_id: String,
    /// Change ids reverted, in the order they were reverted.
    pub reverted: Vec<String>,
    /// `(change_id, error)` for reverts that failed and were skipped.
    pub failures: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
