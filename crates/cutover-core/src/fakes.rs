//! Scripted health probe for driving the engine in tests.
//!
//! [`ScriptedProbe`] passes every check unless told otherwise, and records
//! the ids of the checks it executed, in order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::domain::health::{HealthCheck, HealthCheckResult};
use crate::health::HealthProbe;

#[derive(Debug, Clone)]
enum Script {
    Fail(String),
    /// Fail with these details (numeric metrics for trigger tests).
    FailWith(String, Vec<(String, f64)>),
    /// Block until the plan is cancelled, then fail.
    Hang,
}

#[derive(Debug, Default)]
struct ProbeState {
    scripts: HashMap<String, Script>,
    executed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedProbe {
    state: Mutex<ProbeState>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `check_id` fail on every attempt.
    pub fn fail(&self, check_id: &str, error: &str) {
        self.state()
            .scripts
            .insert(check_id.to_string(), Script::Fail(error.to_string()));
    }

    /// Make `check_id` fail and report `metrics` in its details.
    pub fn fail_with_metrics(&self, check_id: &str, error: &str, metrics: &[(&str, f64)]) {
        let metrics = metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        self.state().scripts.insert(
            check_id.to_string(),
            Script::FailWith(error.to_string(), metrics),
        );
    }

    /// Make `check_id` block until cancellation.
    pub fn hang(&self, check_id: &str) {
        self.state()
            .scripts
            .insert(check_id.to_string(), Script::Hang);
    }

    /// Ids of executed checks, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn execute(&self, check: &HealthCheck, cancel: &CancelSignal) -> HealthCheckResult {
        let script = {
            let mut state = self.state();
            state.executed.push(check.id.clone());
            state.scripts.get(&check.id).cloned()
        };
        let mut result = match script {
            None => HealthCheckResult::pass(&check.id),
            Some(Script::Fail(error)) => HealthCheckResult::fail(&check.id, error),
            Some(Script::FailWith(error, metrics)) => {
                metrics
                    .into_iter()
                    .fold(HealthCheckResult::fail(&check.id, error), |r, (k, v)| {
                        r.with_detail(&k, v)
                    })
            }
            Some(Script::Hang) => {
                let reason = cancel.cancelled().await;
                HealthCheckResult::fail(&check.id, reason.to_string())
            }
        };
        if !result.passed {
            result.attempts = check.max_attempts();
        }
        result
    }
}
