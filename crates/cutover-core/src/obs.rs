//! Structured observability hooks for the cutover lifecycle.
//!
//! Events are emitted at `info!` level with a stable `event` field so they
//! can be filtered out of JSON logs (`cutover --json`).

use tracing::{info, warn};

/// Span tagging everything a plan run logs with its `plan_id`.
///
/// The run is a spawned future, so attach the span with
/// `tracing::Instrument::instrument` rather than entering it.
pub fn plan_span(plan_id: &str, name: &str) -> tracing::Span {
    tracing::info_span!("cutover.plan", plan_id = %plan_id, plan_name = %name)
}

pub fn emit_plan_started(plan_id: &str, total_steps: usize, dry_run: bool) {
    info!(
        event = "cutover.plan_started",
        plan_id = %plan_id,
        total_steps = total_steps,
        dry_run = dry_run,
    );
}

pub fn emit_step_finished(plan_id: &str, index: usize, step_type: &str, success: bool, duration_ms: u64) {
    info!(
        event = "cutover.step_finished",
        plan_id = %plan_id,
        step_index = index,
        step_type = %step_type,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_rollback(plan_id: &str, reason: &str, changes: usize) {
    warn!(
        event = "cutover.rollback",
        plan_id = %plan_id,
        reason = %reason,
        changes = changes,
    );
}

pub fn emit_plan_finished(plan_id: &str, status: &str, duration_ms: u64, success: bool) {
    info!(
        event = "cutover.plan_finished",
        plan_id = %plan_id,
        status = %status,
        duration_ms = duration_ms,
        success = success,
    );
}
