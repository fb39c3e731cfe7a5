//! Cutover orchestration engine.
//!
//! [`CutoverEngine::execute`] validates a plan, registers it, and spawns one
//! tokio task that walks its steps in order. All tracked plans live in a
//! single `RwLock`ed table; the lock is taken per update and never held
//! across a probe or provider call.

pub mod handle;
pub mod instructions;
pub mod options;
mod run;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use cutover_dns::ProviderRegistry;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, Instrument};

use crate::cancel::{cancel_pair, CancelHandle, CancelReason, CancelSignal};
use crate::config::{EngineConfig, HealthCheckerConfig};
use crate::domain::error::{CutoverError, Result};
use crate::domain::plan::{CutoverPlan, PlanStatus};
use crate::health::{HealthChecker, HealthProbe};
use crate::metrics::METRICS;
use crate::obs;

pub use handle::{ExecutionHandle, ProgressStream};
pub use instructions::render_manual_instructions;
pub use options::{ExecuteOptions, ExecutionResult, PlanSnapshot, RollbackReport};

use run::PlanRun;

/// One tracked plan.
struct PlanEntry {
    plan: CutoverPlan,
    logs: Vec<String>,
    options: ExecuteOptions,
    /// Distinguishes runs when a finished plan id is executed again.
    generation: u64,
    cancel: Option<CancelHandle>,
    result: Option<ExecutionResult>,
    rolling_back: bool,
}

struct EngineInner {
    probe: Arc<dyn HealthProbe>,
    providers: ProviderRegistry,
    config: EngineConfig,
    plans: RwLock<HashMap<String, PlanEntry>>,
    generations: AtomicU64,
}

/// Executes cutover plans. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CutoverEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for CutoverEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CutoverEngine")
            .field("providers", &self.inner.providers)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// `[timestamp] message` log line.
pub(crate) fn log_line(message: &str) -> String {
    format!("[{}] {}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), message)
}

impl CutoverEngine {
    pub fn new(probe: Arc<dyn HealthProbe>, providers: ProviderRegistry, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                probe,
                providers,
                config,
                plans: RwLock::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Engine backed by the network/process [`HealthChecker`].
    pub fn with_health_checker(
        providers: ProviderRegistry,
        config: EngineConfig,
        checker: HealthCheckerConfig,
    ) -> Result<Self> {
        let probe = Arc::new(HealthChecker::new(checker)?);
        Ok(Self::new(probe, providers, config))
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Validate `plan` and start executing it in the background.
    ///
    /// In manual mode nothing is executed or tracked: the handle resolves
    /// immediately with the rendered instructions.
    pub async fn execute(&self, mut plan: CutoverPlan, options: ExecuteOptions) -> Result<ExecutionHandle> {
        if plan.steps.is_empty() {
            plan.build_steps();
        }
        plan.validate()?;

        if options.manual {
            let instructions = render_manual_instructions(&plan);
            info!(plan_id = %plan.id, "Rendered manual cutover instructions");
            let result = ExecutionResult::manual(&plan, instructions);
            let (_tx, rx) = mpsc::unbounded_channel();
            let join = tokio::spawn(async move { result });
            return Ok(ExecutionHandle::new(plan.id, ProgressStream::new(rx), join));
        }

        let timeout = options
            .timeout_secs
            .or(plan.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.inner.config.default_timeout());
        plan.dry_run = plan.dry_run || options.dry_run;
        plan.transition(PlanStatus::Running)?;

        let (cancel_handle, cancel_signal) = cancel_pair(Some(timeout));
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let plan_id = plan.id.clone();
        let span = obs::plan_span(&plan_id, &plan.name);
        {
            let mut plans = self.inner.plans.write().await;
            if let Some(existing) = plans.get(&plan_id) {
                if existing.plan.is_running() || existing.rolling_back {
                    return Err(CutoverError::PlanAlreadyRunning(plan_id));
                }
            }
            plans.insert(
                plan_id.clone(),
                PlanEntry {
                    plan,
                    logs: Vec::new(),
                    options: options.clone(),
                    generation,
                    cancel: Some(cancel_handle),
                    result: None,
                    rolling_back: false,
                },
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let run = PlanRun::new(
            self.inner.clone(),
            plan_id.clone(),
            generation,
            options,
            cancel_signal,
            tx,
        );
        let join = tokio::spawn(run.execute().instrument(span));
        Ok(ExecutionHandle::new(plan_id, ProgressStream::new(rx), join))
    }

    /// Current plan state and log lines.
    pub async fn status(&self, plan_id: &str) -> Result<PlanSnapshot> {
        let plans = self.inner.plans.read().await;
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| CutoverError::PlanNotFound(plan_id.to_string()))?;
        Ok(PlanSnapshot {
            plan: entry.plan.clone(),
            logs: entry.logs.clone(),
        })
    }

    /// Final result, once the run has finished.
    pub async fn result(&self, plan_id: &str) -> Result<Option<ExecutionResult>> {
        let plans = self.inner.plans.read().await;
        let entry = plans
            .get(plan_id)
            .ok_or_else(|| CutoverError::PlanNotFound(plan_id.to_string()))?;
        Ok(entry.result.clone())
    }

    /// Tracked plans and their status, ordered by id.
    pub async fn list_plans(&self) -> Vec<(String, PlanStatus)> {
        let plans = self.inner.plans.read().await;
        let mut listed: Vec<_> = plans
            .iter()
            .map(|(id, entry)| (id.clone(), entry.plan.status))
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        listed
    }

    /// Cancel a running plan. It ends `Failed` without rollback; the
    /// background task stops at its next suspension point. A plan that is
    /// already rolling back is reported as not running.
    pub async fn cancel(&self, plan_id: &str) -> Result<()> {
        let mut plans = self.inner.plans.write().await;
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| CutoverError::PlanNotFound(plan_id.to_string()))?;
        // A rollback in progress runs to completion.
        if !entry.plan.is_running() || entry.rolling_back {
            return Err(CutoverError::PlanNotRunning(plan_id.to_string()));
        }
        if let Some(handle) = &entry.cancel {
            handle.cancel(CancelReason::User);
        }
        entry.plan.set_error(CancelReason::User.to_string());
        entry.plan.transition(PlanStatus::Failed)?;
        entry.logs.push(log_line("Cancellation requested"));
        info!(plan_id = %plan_id, "Cutover cancelled");
        Ok(())
    }

    /// Revert the DNS changes of a `Completed` plan, last change first.
    pub async fn rollback(&self, plan_id: &str) -> Result<RollbackReport> {
        let (generation, options) = {
            let mut plans = self.inner.plans.write().await;
            let entry = plans
                .get_mut(plan_id)
                .ok_or_else(|| CutoverError::PlanNotFound(plan_id.to_string()))?;
            if entry.plan.status != PlanStatus::Completed || entry.rolling_back {
                return Err(CutoverError::RollbackNotAllowed {
                    plan_id: plan_id.to_string(),
                    status: entry.plan.status.to_string(),
                });
            }
            entry.rolling_back = true;
            (entry.generation, entry.options.clone())
        };

        let started = Instant::now();
        let (tx, _rx) = mpsc::unbounded_channel();
        let run = PlanRun::new(
            self.inner.clone(),
            plan_id.to_string(),
            generation,
            options,
            CancelSignal::never(),
            tx,
        );
        let report = run.roll_back("rollback requested by operator").await;

        let mut plans = self.inner.plans.write().await;
        let entry = plans
            .get_mut(plan_id)
            .ok_or_else(|| CutoverError::PlanNotFound(plan_id.to_string()))?;
        entry.rolling_back = false;
        entry.plan.transition(PlanStatus::RolledBack)?;
        METRICS.inc_plans_rolled_back();
        let duration_ms = entry
            .result
            .as_ref()
            .map(|r| r.duration_ms)
            .unwrap_or_default()
            + started.elapsed().as_millis() as u64;
        entry.result = Some(ExecutionResult::from_plan(
            &entry.plan,
            entry.logs.clone(),
            duration_ms,
        ));
        obs::emit_plan_finished(plan_id, PlanStatus::RolledBack.as_str(), duration_ms, false);
        Ok(report)
    }

    /// Check that `plan` is well-formed and every DNS provider it would use
    /// is registered and accepts its credentials. Nothing is mutated.
    pub async fn validate_plan(&self, plan: &CutoverPlan, options: &ExecuteOptions) -> Result<()> {
        let mut plan = plan.clone();
        if plan.steps.is_empty() {
            plan.build_steps();
        }
        plan.validate()?;
        if options.manual {
            return Ok(());
        }

        let mut checked = BTreeSet::new();
        for change in &plan.dns_changes {
            let name = ProviderRegistry::provider_name_for(options.provider.as_deref(), change);
            if checked.insert(name.to_string()) {
                let provider = self.inner.providers.get(name)?;
                provider.validate_credentials().await?;
            }
        }
        Ok(())
    }
}
