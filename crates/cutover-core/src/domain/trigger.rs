//! Rollback trigger model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{CutoverError, Result};

/// Condition under which a trigger fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// A specific post-check has failed `consecutive_failures` times in a row.
    HealthCheck {
        health_check_id: String,
        consecutive_failures: u32,
    },
    /// An observed error-rate metric exceeded `threshold`.
    ErrorRate {
        threshold: f64,
        #[serde(default)]
        unit: String,
        metric: String,
    },
    /// An observed latency metric exceeded `threshold` (`unit` is `ms` or `s`).
    Latency {
        threshold: f64,
        #[serde(default = "default_latency_unit")]
        unit: String,
        metric: String,
    },
    /// Plan-wide deadline; enforced by the engine itself.
    Timeout,
    /// Operator-initiated only.
    Manual,
    /// Free-form condition expression.
    Custom { expression: String },
}

fn default_latency_unit() -> String {
    "ms".to_string()
}

impl TriggerCondition {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerCondition::HealthCheck { .. } => "health_check",
            TriggerCondition::ErrorRate { .. } => "error_rate",
            TriggerCondition::Latency { .. } => "latency",
            TriggerCondition::Timeout => "timeout",
            TriggerCondition::Manual => "manual",
            TriggerCondition::Custom { .. } => "custom",
        }
    }
}

/// A condition that may force (or merely alert on) a rollback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackTrigger {
    pub id: String,
    #[serde(flatten)]
    pub condition: TriggerCondition,
    /// `false` means alert only.
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower values are evaluated first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub triggered_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

impl RollbackTrigger {
    pub fn new(id: impl Into<String>, condition: TriggerCondition) -> Self {
        Self {
            id: id.into(),
            condition,
            auto_rollback: true,
            enabled: true,
            priority: 0,
            triggered: false,
            triggered_at: None,
            triggered_reason: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn alert_only(mut self) -> Self {
        self.auto_rollback = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Record that this trigger fired.
    pub fn fire(&mut self, reason: impl Into<String>) {
        self.triggered = true;
        self.triggered_at = Some(Utc::now());
        self.triggered_reason = Some(reason.into());
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CutoverError::InvalidTrigger {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        match &self.condition {
            TriggerCondition::HealthCheck {
                health_check_id,
                consecutive_failures,
            } => {
                if health_check_id.trim().is_empty() {
                    return Err(invalid("health_check trigger requires a health check id"));
                }
                if *consecutive_failures == 0 {
                    return Err(invalid(
                        "health_check trigger requires a positive consecutive failure count",
                    ));
                }
            }
            TriggerCondition::ErrorRate {
                threshold, metric, ..
            }
            | TriggerCondition::Latency {
                threshold, metric, ..
            } => {
                if !(*threshold > 0.0) {
                    return Err(invalid("threshold must be positive"));
                }
                if metric.trim().is_empty() {
                    return Err(invalid("metric name must not be empty"));
                }
            }
            TriggerCondition::Custom { expression } => {
                if expression.trim().is_empty() {
                    return Err(invalid("custom trigger requires a condition expression"));
                }
            }
            TriggerCondition::Timeout | TriggerCondition::Manual => {}
        }
        Ok(())
    }
}
