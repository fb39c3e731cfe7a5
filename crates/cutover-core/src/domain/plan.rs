//! Cutover plan and step model.
//!
//! A plan aggregates pre-checks, DNS changes, and post-checks. Its `steps`
//! are derived from those lists in a fixed order (all pre-checks, then all
//! DNS changes, then all post-checks) and executed strictly sequentially.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use cutover_dns::DnsChange;
use serde::{Deserialize, Serialize};

use crate::domain::error::{CutoverError, Result};
use crate::domain::health::HealthCheck;
use crate::domain::trigger::{RollbackTrigger, TriggerCondition};

/// Overall plan status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, RolledBack)
                | (Completed, RolledBack)
        )
    }

    /// `Failed` and `RolledBack` admit no further transitions.
    pub fn is_final(self) -> bool {
        matches!(self, PlanStatus::Failed | PlanStatus::RolledBack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    PreCheck,
    DnsChange,
    PostCheck,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            StepType::PreCheck => "pre_check",
            StepType::DnsChange => "dns_change",
            StepType::PostCheck => "post_check",
        }
    }

    pub fn is_health_check(self) -> bool {
        matches!(self, StepType::PreCheck | StepType::PostCheck)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One executable unit of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutoverStep {
    pub index: usize,
    pub step_type: StepType,
    /// ID of the referenced health check or DNS change.
    pub reference_id: String,
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl CutoverStep {
    pub fn new(
        index: usize,
        step_type: StepType,
        reference_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            index,
            step_type,
            reference_id: reference_id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            output: String::new(),
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, output: impl Into<String>) {
        self.finish(StepStatus::Completed, output.into(), None);
    }

    pub fn fail(&mut self, error: impl Into<String>, output: impl Into<String>) {
        self.finish(StepStatus::Failed, output.into(), Some(error.into()));
    }

    fn finish(&mut self, status: StepStatus, output: String, error: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.output = output;
        self.error = error;
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        self.completed_at = Some(now);
    }
}

/// A complete cutover plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutoverPlan {
    pub id: String,
    /// Reference to the migration bundle this plan cuts over.
    #[serde(default)]
    pub bundle_id: String,
    pub name: String,
    #[serde(default)]
    pub pre_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub dns_changes: Vec<DnsChange>,
    #[serde(default)]
    pub post_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub rollback_triggers: Vec<RollbackTrigger>,
    #[serde(default)]
    pub steps: Vec<CutoverStep>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub dns_propagation_wait_secs: u64,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl CutoverPlan {
    /// New pending plan with a generated id.
    pub fn new(bundle_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), bundle_id, name)
    }

    pub fn with_id(
        id: impl Into<String>,
        bundle_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            bundle_id: bundle_id.into(),
            name: name.into(),
            pre_checks: Vec::new(),
            dns_changes: Vec::new(),
            post_checks: Vec::new(),
            rollback_triggers: Vec::new(),
            steps: Vec::new(),
            dry_run: false,
            dns_propagation_wait_secs: 0,
            timeout_secs: None,
            current_step_index: 0,
            status: PlanStatus::Pending,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            rolled_back_at: None,
        }
    }

    pub fn add_pre_check(&mut self, check: HealthCheck) -> &mut Self {
        self.pre_checks.push(check);
        self
    }

    pub fn add_dns_change(&mut self, change: DnsChange) -> &mut Self {
        self.dns_changes.push(change);
        self
    }

    pub fn add_post_check(&mut self, check: HealthCheck) -> &mut Self {
        self.post_checks.push(check);
        self
    }

    pub fn add_rollback_trigger(&mut self, trigger: RollbackTrigger) -> &mut Self {
        self.rollback_triggers.push(trigger);
        self
    }

    /// Derive `steps` from the pre-check, DNS change, and post-check lists.
    pub fn build_steps(&mut self) {
        let mut steps = Vec::with_capacity(
            self.pre_checks.len() + self.dns_changes.len() + self.post_checks.len(),
        );
        for check in &self.pre_checks {
            steps.push(CutoverStep::new(
                steps.len(),
                StepType::PreCheck,
                &check.id,
                format!("Pre-check: {}", check.name),
            ));
        }
        for change in &self.dns_changes {
            steps.push(CutoverStep::new(
                steps.len(),
                StepType::DnsChange,
                &change.id,
                format!(
                    "DNS change: {} {} -> {}",
                    change.record_type,
                    change.fqdn(),
                    change.new_value
                ),
            ));
        }
        for check in &self.post_checks {
            steps.push(CutoverStep::new(
                steps.len(),
                StepType::PostCheck,
                &check.id,
                format!("Post-check: {}", check.name),
            ));
        }
        self.steps = steps;
        self.current_step_index = 0;
    }

    pub fn find_health_check(&self, id: &str) -> Option<&HealthCheck> {
        self.pre_checks
            .iter()
            .chain(self.post_checks.iter())
            .find(|c| c.id == id)
    }

    pub fn find_dns_change(&self, id: &str) -> Option<&DnsChange> {
        self.dns_changes.iter().find(|c| c.id == id)
    }

    pub fn find_dns_change_mut(&mut self, id: &str) -> Option<&mut DnsChange> {
        self.dns_changes.iter_mut().find(|c| c.id == id)
    }

    /// Index of the last DNS-change step, if any.
    pub fn last_dns_step_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|s| s.step_type == StepType::DnsChange)
    }

    pub fn is_running(&self) -> bool {
        self.status == PlanStatus::Running
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: PlanStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CutoverError::InvalidTransition {
                plan_id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        match next {
            PlanStatus::Running => self.started_at = Some(now),
            PlanStatus::Completed | PlanStatus::Failed => self.completed_at = Some(now),
            PlanStatus::RolledBack => self.rolled_back_at = Some(now),
            PlanStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    /// Set the terminal error. The first error recorded wins.
    pub fn set_error(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    /// Steps that finished successfully / unsuccessfully.
    pub fn step_counts(&self) -> (usize, usize) {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let failed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count();
        (completed, failed)
    }

    /// Structural validation of the plan and every entity it contains.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CutoverError::InvalidPlan("plan id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(CutoverError::InvalidPlan("plan name must not be empty".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(CutoverError::InvalidPlan("timeout must be positive".into()));
        }

        let mut check_ids = HashSet::new();
        for check in self.pre_checks.iter().chain(self.post_checks.iter()) {
            check.validate()?;
            if !check_ids.insert(check.id.as_str()) {
                return Err(CutoverError::InvalidPlan(format!(
                    "duplicate health check id: {}",
                    check.id
                )));
            }
        }

        let mut change_ids = HashSet::new();
        for change in &self.dns_changes {
            change.validate()?;
            if !change_ids.insert(change.id.as_str()) {
                return Err(CutoverError::InvalidPlan(format!(
                    "duplicate DNS change id: {}",
                    change.id
                )));
            }
        }

        for trigger in &self.rollback_triggers {
            trigger.validate()?;
            if let TriggerCondition::HealthCheck {
                health_check_id, ..
            } = &trigger.condition
            {
                if !check_ids.contains(health_check_id.as_str()) {
                    return Err(CutoverError::InvalidTrigger {
                        id: trigger.id.clone(),
                        reason: format!("unknown health check {health_check_id}"),
                    });
                }
            }
        }

        self.validate_steps()
    }

    /// `(step type, reference id)` pairs in execution order.
    fn derived_order(&self) -> impl Iterator<Item = (StepType, &str)> {
        let pre = self
            .pre_checks
            .iter()
            .map(|c| (StepType::PreCheck, c.id.as_str()));
        let dns = self
            .dns_changes
            .iter()
            .map(|c| (StepType::DnsChange, c.id.as_str()));
        let post = self
            .post_checks
            .iter()
            .map(|c| (StepType::PostCheck, c.id.as_str()));
        pre.chain(dns).chain(post)
    }

    /// Supplied steps must reference entities of their own kind, carry
    /// their position as index, and follow the derived execution order.
    fn validate_steps(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Ok(());
        }
        let expected = self.pre_checks.len() + self.dns_changes.len() + self.post_checks.len();
        if self.steps.len() != expected {
            return Err(CutoverError::InvalidPlan(format!(
                "plan has {} steps but {} checks and changes; rebuild steps",
                self.steps.len(),
                expected
            )));
        }
        for (position, (step, (kind, reference_id))) in
            self.steps.iter().zip(self.derived_order()).enumerate()
        {
            let found = match step.step_type {
                StepType::PreCheck => self.pre_checks.iter().any(|c| c.id == step.reference_id),
                StepType::PostCheck => self.post_checks.iter().any(|c| c.id == step.reference_id),
                StepType::DnsChange => self.find_dns_change(&step.reference_id).is_some(),
            };
            if !found {
                return Err(CutoverError::UnknownReference {
                    index: position,
                    kind: step.step_type.to_string(),
                    reference_id: step.reference_id.clone(),
                });
            }
            if step.index != position {
                return Err(CutoverError::InvalidPlan(format!(
                    "step at position {position} has index {}",
                    step.index
                )));
            }
            if step.step_type != kind || step.reference_id != reference_id {
                return Err(CutoverError::InvalidPlan(format!(
                    "step {position} is {} {} but execution order requires {kind} {reference_id}",
                    step.step_type, step.reference_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_dns::RecordType;

    fn plan() -> CutoverPlan {
        let mut plan = CutoverPlan::with_id("plan-1", "bundle-1", "example cutover");
        plan.add_pre_check(HealthCheck::http("pre-1", "source up", "http://a", 200))
            .add_pre_check(HealthCheck::tcp("pre-2", "target port", "b:443"))
            .add_dns_change(DnsChange::new(
                "dns-1",
                "example.com",
                RecordType::A,
                "@",
                "1.1.1.1",
                "2.2.2.2",
            ))
            .add_post_check(HealthCheck::http("post-1", "target up", "http://c", 200));
        plan
    }

    #[test]
    fn test_build_steps_order_and_count() {
        let mut p = plan();
        p.build_steps();
        assert_eq!(p.steps.len(), 4);
        let kinds: Vec<StepType> = p.steps.iter().map(|s| s.step_type).collect();
        assert_eq!(
            kinds,
            vec![
                StepType::PreCheck,
                StepType::PreCheck,
                StepType::DnsChange,
                StepType::PostCheck
            ]
        );
        let refs: Vec<&str> = p.steps.iter().map(|s| s.reference_id.as_str()).collect();
        assert_eq!(refs, vec!["pre-1", "pre-2", "dns-1", "post-1"]);
        assert!(p.steps.iter().enumerate().all(|(i, s)| s.index == i));
        assert_eq!(p.last_dns_step_index(), Some(2));
    }

    #[test]
    fn test_transitions() {
        let mut p = plan();
        assert!(p.transition(PlanStatus::Completed).is_err());
        p.transition(PlanStatus::Running).unwrap();
        assert!(p.started_at.is_some());
        p.transition(PlanStatus::Completed).unwrap();
        p.transition(PlanStatus::RolledBack).unwrap();
        assert!(p.rolled_back_at.is_some());
        assert!(p.transition(PlanStatus::Running).is_err());
    }

    #[test]
    fn test_failed_is_final() {
        let mut p = plan();
        p.transition(PlanStatus::Running).unwrap();
        p.transition(PlanStatus::Failed).unwrap();
        for next in [
            PlanStatus::Running,
            PlanStatus::Completed,
            PlanStatus::RolledBack,
        ] {
            assert!(p.transition(next).is_err());
        }
    }

    #[test]
    fn test_error_set_once() {
        let mut p = plan();
        p.set_error("cancelled by user");
        p.set_error("post-check failed");
        assert_eq!(p.error.as_deref(), Some("cancelled by user"));
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let mut p = plan();
        p.add_post_check(HealthCheck::tcp("pre-1", "dup", "x:1"));
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate health check id"));
    }

    #[test]
    fn test_validate_trigger_reference() {
        let mut p = plan();
        p.add_rollback_trigger(RollbackTrigger::new(
            "t1",
            TriggerCondition::HealthCheck {
                health_check_id: "missing".to_string(),
                consecutive_failures: 1,
            },
        ));
        assert!(matches!(
            p.validate(),
            Err(CutoverError::InvalidTrigger { .. })
        ));
    }

    #[test]
    fn test_validate_stale_steps() {
        let mut p = plan();
        p.build_steps();
        assert!(p.validate().is_ok());
        p.add_post_check(HealthCheck::tcp("post-2", "late", "x:1"));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_step_index() {
        let mut p = plan();
        p.build_steps();
        p.steps[0].index = 7;
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("has index 7"));
    }

    #[test]
    fn test_validate_rejects_reordered_steps() {
        let mut p = plan();
        p.build_steps();
        p.steps.reverse();
        for (i, step) in p.steps.iter_mut().enumerate() {
            step.index = i;
        }
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("execution order requires"));

        // Swapping two pre-checks also breaks the derived order.
        let mut p = plan();
        p.build_steps();
        p.steps.swap(0, 1);
        p.steps[0].index = 0;
        p.steps[1].index = 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_step_lifecycle() {
        let mut step = CutoverStep::new(0, StepType::PreCheck, "pre-1", "Pre-check");
        step.start();
        assert_eq!(step.status, StepStatus::Running);
        step.fail("timeout", "no response");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("timeout"));
        assert!(step.completed_at.is_some());
    }
}
