//! Progress events emitted while a plan runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::plan::{CutoverStep, PlanStatus, StepType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    StepStart,
    StepComplete,
    StepFailed,
    Rollback,
    Complete,
    Error,
}

impl ProgressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressKind::StepStart => "step_start",
            ProgressKind::StepComplete => "step_complete",
            ProgressKind::StepFailed => "step_failed",
            ProgressKind::Rollback => "rollback",
            ProgressKind::Complete => "complete",
            ProgressKind::Error => "error",
        }
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub plan_id: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(default)]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub step_type: Option<StepType>,
    #[serde(default)]
    pub description: Option<String>,
    /// Step status for step events, plan status otherwise.
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event describing `step` in its current state.
    pub fn for_step(plan_id: &str, kind: ProgressKind, step: &CutoverStep) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            kind,
            step_index: Some(step.index),
            step_type: Some(step.step_type),
            description: Some(step.description.clone()),
            status: step.status.to_string(),
            error: step.error.clone(),
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Plan-level event (`rollback`, `complete`, `error`).
    pub fn for_plan(plan_id: &str, kind: ProgressKind, status: PlanStatus) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            kind,
            step_index: None,
            step_type: None,
            description: None,
            status: status.to_string(),
            error: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// One-line rendering for terminal output.
    pub fn render(&self) -> String {
        let mut line = format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.kind);
        if let Some(index) = self.step_index {
            line.push_str(&format!(" #{}", index + 1));
        }
        if let Some(description) = &self.description {
            line.push_str(&format!(" {description}"));
        }
        if let Some(message) = &self.message {
            line.push_str(&format!(" - {message}"));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" (error: {error})"));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_event_serializes_kind_as_type() {
        let step = CutoverStep::new(0, StepType::PreCheck, "pre-1", "Pre-check: api");
        let event = ProgressEvent::for_step("plan-1", ProgressKind::StepStart, &step);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_start");
        assert_eq!(json["step_type"], "pre_check");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_render_includes_error() {
        let event = ProgressEvent::for_plan("plan-1", ProgressKind::Error, PlanStatus::Failed)
            .with_error("boom");
        let line = event.render();
        assert!(line.contains("error"));
        assert!(line.contains("boom"));
    }
}
