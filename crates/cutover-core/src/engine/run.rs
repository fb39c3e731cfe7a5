//! One background run of a plan.

use std::sync::Arc;
use std::time::Instant;

use cutover_dns::{DnsChange, DnsChangeStatus, ProviderRegistry};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{log_line, EngineInner, ExecuteOptions, ExecutionResult, RollbackReport};
use crate::cancel::{CancelReason, CancelSignal};
use crate::domain::health::HealthCheckResult;
use crate::domain::plan::{CutoverPlan, CutoverStep, PlanStatus, StepType};
use crate::events::{ProgressEvent, ProgressKind};
use crate::metrics::METRICS;
use crate::obs;
use crate::triggers::{evaluate_triggers, record_matches, StepFailure};

/// How the step loop ended.
enum Outcome {
    Completed,
    Failed(String),
    Cancelled(CancelReason),
    RollBack(String),
}

/// Result of executing one step.
struct StepOutcome {
    output: String,
    failure: Option<StepFailure>,
    /// Whether a failure should stop the plan.
    critical: bool,
    cancelled: Option<CancelReason>,
}

impl StepOutcome {
    fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            failure: None,
            critical: true,
            cancelled: None,
        }
    }

    fn failed(output: impl Into<String>, failure: StepFailure, critical: bool) -> Self {
        Self {
            output: output.into(),
            failure: Some(failure),
            critical,
            cancelled: None,
        }
    }

    fn cancelled(step: &CutoverStep, reason: CancelReason) -> Self {
        Self {
            output: String::new(),
            failure: Some(StepFailure::new(
                step.step_type,
                &step.reference_id,
                reason.to_string(),
            )),
            critical: true,
            cancelled: Some(reason),
        }
    }
}

pub(super) struct PlanRun {
    inner: Arc<EngineInner>,
    plan_id: String,
    generation: u64,
    options: ExecuteOptions,
    cancel: CancelSignal,
    events: mpsc::UnboundedSender<ProgressEvent>,
    started: Instant,
}

impl PlanRun {
    pub(super) fn new(
        inner: Arc<EngineInner>,
        plan_id: String,
        generation: u64,
        options: ExecuteOptions,
        cancel: CancelSignal,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            inner,
            plan_id,
            generation,
            options,
            cancel,
            events,
            started: Instant::now(),
        }
    }

    /// Apply `f` to this run's plan under the write lock.
    async fn update<R>(&self, f: impl FnOnce(&mut CutoverPlan) -> R) -> Option<R> {
        let mut plans = self.inner.plans.write().await;
        let entry = plans
            .get_mut(&self.plan_id)
            .filter(|e| e.generation == self.generation)?;
        Some(f(&mut entry.plan))
    }

    async fn read<R>(&self, f: impl FnOnce(&CutoverPlan) -> R) -> Option<R> {
        let plans = self.inner.plans.read().await;
        let entry = plans
            .get(&self.plan_id)
            .filter(|e| e.generation == self.generation)?;
        Some(f(&entry.plan))
    }

    async fn log(&self, message: impl AsRef<str>) {
        let line = log_line(message.as_ref());
        let mut plans = self.inner.plans.write().await;
        if let Some(entry) = plans
            .get_mut(&self.plan_id)
            .filter(|e| e.generation == self.generation)
        {
            entry.logs.push(line);
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // The receiver may have been dropped; progress is best-effort.
        let _ = self.events.send(event);
    }

    fn dry_run(&self, plan_dry_run: bool) -> bool {
        self.options.dry_run || plan_dry_run
    }

    /// Run every step, then settle the plan's terminal state.
    pub(super) async fn execute(self) -> ExecutionResult {
        METRICS.inc_plans_started();
        let header = self
            .read(|plan| (plan.steps.len(), plan.dry_run, plan.name.clone()))
            .await;
        let Some((total_steps, dry_run, name)) = header else {
            return self.finish(Outcome::Cancelled(CancelReason::User)).await;
        };
        obs::emit_plan_started(&self.plan_id, total_steps, dry_run);
        let mode = if dry_run { " (dry run)" } else { "" };
        self.log(format!("Starting cutover '{name}' with {total_steps} step(s){mode}"))
            .await;

        let outcome = self.run_steps().await;
        self.finish(outcome).await
    }

    async fn run_steps(&self) -> Outcome {
        let Some((steps, last_dns, wait_secs, dry_run)) = self
            .read(|plan| {
                (
                    plan.steps.clone(),
                    plan.last_dns_step_index(),
                    plan.dns_propagation_wait_secs,
                    self.dry_run(plan.dry_run),
                )
            })
            .await
        else {
            return Outcome::Cancelled(CancelReason::User);
        };

        for step in steps {
            if let Some(reason) = self.cancel.reason() {
                return Outcome::Cancelled(reason);
            }
            let started = self
                .update(|plan| {
                    if !plan.is_running() {
                        return Err(Outcome::Cancelled(CancelReason::User));
                    }
                    plan.current_step_index = step.index;
                    let s = plan.steps.get_mut(step.index).ok_or_else(|| {
                        Outcome::Failed(format!("step index {} is out of range", step.index))
                    })?;
                    s.start();
                    Ok(s.clone())
                })
                .await
                .unwrap_or(Err(Outcome::Cancelled(CancelReason::User)));
            let started = match started {
                Ok(started) => started,
                Err(outcome) => return outcome,
            };
            self.emit(ProgressEvent::for_step(&self.plan_id, ProgressKind::StepStart, &started));
            self.log(format!("Step {}: {}", step.index + 1, step.description)).await;

            let outcome = match step.step_type {
                StepType::PreCheck | StepType::PostCheck => self.run_check(&step, dry_run).await,
                StepType::DnsChange => self.run_dns_change(&step, dry_run).await,
            };

            let finished = self
                .update(|plan| {
                    let s = plan.steps.get_mut(step.index)?;
                    match &outcome.failure {
                        None => s.complete(outcome.output.clone()),
                        Some(f) => s.fail(f.error.clone(), outcome.output.clone()),
                    }
                    Some(s.clone())
                })
                .await
                .flatten();
            if let Some(finished) = &finished {
                let kind = if outcome.failure.is_none() {
                    ProgressKind::StepComplete
                } else {
                    ProgressKind::StepFailed
                };
                self.emit(ProgressEvent::for_step(&self.plan_id, kind, finished));
                obs::emit_step_finished(
                    &self.plan_id,
                    step.index,
                    step.step_type.as_str(),
                    outcome.failure.is_none(),
                    finished.duration_ms,
                );
            }

            if let Some(reason) = outcome.cancelled {
                return Outcome::Cancelled(reason);
            }

            if let Some(failure) = &outcome.failure {
                self.log(format!("Step {} failed: {}", step.index + 1, failure.error))
                    .await;
                if let Some(decision) = self.on_failure(&step, failure, outcome.critical).await {
                    return decision;
                }
            } else {
                self.log(format!("Step {} completed: {}", step.index + 1, outcome.output))
                    .await;
            }

            if Some(step.index) == last_dns && outcome.failure.is_none() && wait_secs > 0 {
                if dry_run {
                    self.log(format!("Dry run: skipping {wait_secs}s DNS propagation wait"))
                        .await;
                } else {
                    self.log(format!("Waiting {wait_secs}s for DNS propagation")).await;
                    let wait = std::time::Duration::from_secs(wait_secs);
                    if let Err(reason) = self.cancel.sleep(wait).await {
                        return Outcome::Cancelled(reason);
                    }
                }
            }
        }
        Outcome::Completed
    }

    /// Decide what a failed step means for the plan. `None` continues.
    async fn on_failure(&self, step: &CutoverStep, failure: &StepFailure, critical: bool) -> Option<Outcome> {
        let verdict = self
            .read(|plan| evaluate_triggers(&plan.rollback_triggers, failure))
            .await
            .unwrap_or_default();
        if !verdict.is_empty() {
            self.update(|plan| record_matches(&mut plan.rollback_triggers, &verdict))
                .await;
            for alert in &verdict.alerts {
                warn!(plan_id = %self.plan_id, trigger_id = %alert.trigger_id, reason = %alert.reason, "Rollback trigger alert");
                self.log(format!("Trigger {} alert: {}", alert.trigger_id, alert.reason))
                    .await;
            }
        }

        let step_error = format!("{} failed: {}", step.description, failure.error);
        // Nothing has been applied before the DNS steps.
        let rollback_reason = match step.step_type {
            StepType::PreCheck => None,
            _ => verdict.reason(),
        };
        if let Some(reason) = rollback_reason {
            self.log(format!("Rollback triggered: {reason}")).await;
            return Some(Outcome::RollBack(format!("{step_error} ({reason})")));
        }

        match step.step_type {
            _ if !critical => {
                self.log("Non-critical check failed; continuing").await;
                None
            }
            StepType::PreCheck => Some(Outcome::Failed(step_error)),
            StepType::PostCheck => Some(Outcome::RollBack(step_error)),
            StepType::DnsChange => Some(Outcome::Failed(step_error)),
        }
    }

    async fn run_check(&self, step: &CutoverStep, dry_run: bool) -> StepOutcome {
        let check = self
            .read(|plan| plan.find_health_check(&step.reference_id).cloned())
            .await
            .flatten();
        let Some(check) = check else {
            let failure = StepFailure::new(
                step.step_type,
                &step.reference_id,
                format!("unknown health check {}", step.reference_id),
            );
            return StepOutcome::failed("", failure, true);
        };

        if !check.enabled {
            return StepOutcome::success(format!("skipped: {} is disabled", check.name));
        }
        if dry_run {
            if let Err(reason) = self.cancel.sleep(self.inner.config.dry_run_delay()).await {
                return StepOutcome::cancelled(step, reason);
            }
            return StepOutcome::success(format!("dry run: would run {}", check.describe()));
        }

        let result = self.inner.probe.execute(&check, &self.cancel).await;
        if result.passed {
            return StepOutcome::success(result.summary());
        }
        if let Some(reason) = self.cancel.reason() {
            return StepOutcome::cancelled(step, reason);
        }
        let failure = failure_from_result(step, &result);
        StepOutcome::failed(result.summary(), failure, check.critical)
    }

    async fn run_dns_change(&self, step: &CutoverStep, dry_run: bool) -> StepOutcome {
        let change = self
            .read(|plan| plan.find_dns_change(&step.reference_id).cloned())
            .await
            .flatten();
        let Some(change) = change else {
            let failure = StepFailure::new(
                step.step_type,
                &step.reference_id,
                format!("unknown DNS change {}", step.reference_id),
            );
            return StepOutcome::failed("", failure, true);
        };

        if dry_run {
            if let Err(reason) = self.cancel.sleep(self.inner.config.dry_run_delay()).await {
                return StepOutcome::cancelled(step, reason);
            }
            self.update(|plan| {
                if let Some(c) = plan.find_dns_change_mut(&change.id) {
                    c.mark_applied();
                }
            })
            .await;
            return StepOutcome::success(format!(
                "dry run: would update {} {} from {:?} to {:?}",
                change.record_type,
                change.fqdn(),
                change.old_value,
                change.new_value
            ));
        }

        let provider_name =
            ProviderRegistry::provider_name_for(self.options.provider.as_deref(), &change).to_string();
        let provider = match self.inner.providers.get(&provider_name) {
            Ok(p) => p,
            Err(e) => return self.dns_failure(step, change, e.to_string()).await,
        };

        let mut working = change.clone();
        let applied = tokio::select! {
            res = provider.update_record(&mut working) => res,
            reason = self.cancel.cancelled() => return StepOutcome::cancelled(step, reason),
        };
        match applied {
            Ok(()) => {
                if working.status != DnsChangeStatus::Applied {
                    working.mark_applied();
                }
                METRICS.inc_dns_changes_applied();
                info!(
                    plan_id = %self.plan_id,
                    change_id = %working.id,
                    provider = %provider_name,
                    "DNS change applied"
                );
                let output = format!(
                    "updated {} {} -> {} via {}",
                    working.record_type,
                    working.fqdn(),
                    working.new_value,
                    provider_name
                );
                self.store_change(working).await;
                StepOutcome::success(output)
            }
            Err(e) => self.dns_failure(step, working, e.to_string()).await,
        }
    }

    async fn dns_failure(&self, step: &CutoverStep, mut change: DnsChange, error: String) -> StepOutcome {
        warn!(plan_id = %self.plan_id, change_id = %change.id, error = %error, "DNS change failed");
        change.mark_failed(error.clone());
        self.store_change(change).await;
        let failure = StepFailure::new(StepType::DnsChange, &step.reference_id, error);
        StepOutcome::failed("", failure, true)
    }

    async fn store_change(&self, change: DnsChange) {
        self.update(|plan| {
            if let Some(slot) = plan.find_dns_change_mut(&change.id) {
                *slot = change;
            }
        })
        .await;
    }

    /// Revert every applied change, last first, through the same provider
    /// resolution used to apply it. Individual failures are logged and
    /// skipped.
    pub(super) async fn roll_back(&self, reason: &str) -> RollbackReport {
        let mut report = RollbackReport {
            plan_id: self.plan_id.clone(),
            ..RollbackReport::default()
        };
        let Some((changes, plan_dry_run, status)) = self
            .read(|plan| (plan.dns_changes.clone(), plan.dry_run, plan.status))
            .await
        else {
            return report;
        };
        let dry_run = self.dry_run(plan_dry_run);
        let to_revert: Vec<&DnsChange> = changes.iter().rev().filter(|c| c.can_rollback()).collect();

        obs::emit_rollback(&self.plan_id, reason, to_revert.len());
        self.emit(
            ProgressEvent::for_plan(&self.plan_id, ProgressKind::Rollback, status)
                .with_message(reason),
        );
        self.log(format!("Rolling back {} DNS change(s): {reason}", to_revert.len()))
            .await;

        for change in to_revert {
            let reverted = if dry_run {
                self.log(format!(
                    "Dry run: would revert {} {} to {:?}",
                    change.record_type,
                    change.fqdn(),
                    change.old_value
                ))
                .await;
                Ok(())
            } else {
                self.revert(change).await
            };

            match reverted {
                Ok(()) => {
                    self.update(|plan| {
                        if let Some(c) = plan.find_dns_change_mut(&change.id) {
                            c.mark_rolled_back();
                        }
                    })
                    .await;
                    self.log(format!("Reverted DNS change {}", change.id)).await;
                    report.reverted.push(change.id.clone());
                }
                Err(error) => {
                    warn!(plan_id = %self.plan_id, change_id = %change.id, error = %error, "Rollback of DNS change failed");
                    self.log(format!("Failed to revert DNS change {}: {error}", change.id))
                        .await;
                    report.failures.push((change.id.clone(), error));
                }
            }
        }
        report
    }

    async fn revert(&self, change: &DnsChange) -> std::result::Result<(), String> {
        let provider = self
            .inner
            .providers
            .resolve(self.options.provider.as_deref(), change)
            .map_err(|e| e.to_string())?;
        let mut reversed = change.reversed();
        provider
            .update_record(&mut reversed)
            .await
            .map_err(|e| e.to_string())
    }

    /// Mark the entry as rolling back, unless it stopped running meanwhile.
    /// Cancellation is refused from here on.
    async fn enter_rollback(&self) -> bool {
        let mut plans = self.inner.plans.write().await;
        match plans
            .get_mut(&self.plan_id)
            .filter(|e| e.generation == self.generation)
        {
            Some(entry) if entry.plan.is_running() => {
                entry.rolling_back = true;
                true
            }
            _ => false,
        }
    }

    async fn finish(&self, outcome: Outcome) -> ExecutionResult {
        let still_running = match outcome {
            Outcome::RollBack(_) => self.enter_rollback().await,
            _ => self.read(|plan| plan.is_running()).await.unwrap_or(false),
        };
        let outcome = match outcome {
            // Cancelled through the engine while a step was in flight.
            _ if !still_running => Outcome::Cancelled(CancelReason::User),
            other => other,
        };

        let terminal = match outcome {
            Outcome::Completed => {
                METRICS.inc_plans_completed();
                self.log("Cutover completed").await;
                (PlanStatus::Completed, None)
            }
            Outcome::Failed(error) => {
                self.log(format!("Cutover failed: {error}")).await;
                (PlanStatus::Failed, Some(error))
            }
            Outcome::Cancelled(reason) => {
                self.log(format!("Cutover stopped: {reason}")).await;
                (PlanStatus::Failed, Some(reason.to_string()))
            }
            Outcome::RollBack(error) => {
                let report = self.roll_back(&error).await;
                METRICS.inc_plans_rolled_back();
                self.log(format!(
                    "Rollback finished: {} reverted, {} failed",
                    report.reverted.len(),
                    report.failures.len()
                ))
                .await;
                (PlanStatus::RolledBack, Some(error))
            }
        };

        let (status, error) = terminal;
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.update(|plan| {
            if plan.is_running() {
                if let Some(error) = &error {
                    plan.set_error(error.clone());
                }
                if let Err(e) = plan.transition(status) {
                    warn!(plan_id = %plan.id, error = %e, "Could not settle plan status");
                }
            }
        })
        .await;

        let result = {
            let mut plans = self.inner.plans.write().await;
            match plans
                .get_mut(&self.plan_id)
                .filter(|e| e.generation == self.generation)
            {
                Some(entry) => {
                    let result = ExecutionResult::from_plan(&entry.plan, entry.logs.clone(), duration_ms);
                    entry.result = Some(result.clone());
                    entry.cancel = None;
                    entry.rolling_back = false;
                    result
                }
                None => orphaned_result(&self.plan_id, duration_ms),
            }
        };

        let kind = if result.success {
            ProgressKind::Complete
        } else {
            ProgressKind::Error
        };
        let mut event = ProgressEvent::for_plan(&self.plan_id, kind, result.status);
        if let Some(error) = &result.error {
            event = event.with_error(error.clone());
        }
        self.emit(event);

        obs::emit_plan_finished(&self.plan_id, result.status.as_str(), duration_ms, result.success);
        METRICS.flush();
        result
    }
}

/// Result for a run whose plan entry disappeared from the table.
fn orphaned_result(plan_id: &str, duration_ms: u64) -> ExecutionResult {
    ExecutionResult {
        plan_id: plan_id.to_string(),
        success: false,
        status: PlanStatus::Failed,
        steps_completed: 0,
        steps_failed: 0,
        duration_ms,
        rolled_back: false,
        error: Some(CancelReason::User.to_string()),
        logs: Vec::new(),
        instructions: None,
    }
}

/// Numeric observations of a failed check, for metric-based triggers.
fn failure_from_result(step: &CutoverStep, result: &HealthCheckResult) -> StepFailure {
    let error = result
        .error
        .clone()
        .unwrap_or_else(|| "health check failed".to_string());
    let mut failure = StepFailure::new(step.step_type, &step.reference_id, error)
        .with_attempts(result.attempts)
        .with_duration_ms(result.duration_ms)
        .with_metric("latency_ms", result.duration_ms as f64);
    for (key, value) in &result.details {
        if let Some(v) = value.as_f64() {
            failure = failure.with_metric(key.clone(), v);
        }
    }
    if let Some(code) = result.status_code {
        failure = failure.with_metric("status_code", f64::from(code));
    }
    failure
}
