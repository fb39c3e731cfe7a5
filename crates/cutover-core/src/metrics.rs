//! Global atomic counters for cutover observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, e.g. when a plan finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    plans_started: AtomicU64,
    plans_completed: AtomicU64,
    plans_rolled_back: AtomicU64,
    health_checks_run: AtomicU64,
    dns_changes_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            plans_started: AtomicU64::new(0),
            plans_completed: AtomicU64::new(0),
            plans_rolled_back: AtomicU64::new(0),
            health_checks_run: AtomicU64::new(0),
            dns_changes_applied: AtomicU64::new(0),
        }
    }

    pub fn inc_plans_started(&self) {
        self.plans_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "plans_started", "counter incremented");
    }

    pub fn inc_plans_completed(&self) {
        self.plans_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "plans_completed", "counter incremented");
    }

    pub fn inc_plans_rolled_back(&self) {
        self.plans_rolled_back.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "plans_rolled_back", "counter incremented");
    }

    pub fn inc_health_checks_run(&self) {
        self.health_checks_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "health_checks_run", "counter incremented");
    }

    pub fn inc_dns_changes_applied(&self) {
        self.dns_changes_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dns_changes_applied", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            plans_started = self.plans_started(),
            plans_completed = self.plans_completed(),
            plans_rolled_back = self.plans_rolled_back(),
            health_checks_run = self.health_checks_run(),
            dns_changes_applied = self.dns_changes_applied(),
        );
    }

    pub fn plans_started(&self) -> u64 {
        self.plans_started.load(Ordering::Relaxed)
    }

    pub fn plans_completed(&self) -> u64 {
        self.plans_completed.load(Ordering::Relaxed)
    }

    pub fn plans_rolled_back(&self) -> u64 {
        self.plans_rolled_back.load(Ordering::Relaxed)
    }

    pub fn health_checks_run(&self) -> u64 {
        self.health_checks_run.load(Ordering::Relaxed)
    }

    pub fn dns_changes_applied(&self) -> u64 {
        self.dns_changes_applied.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.plans_started.store(0, Ordering::Relaxed);
        self.plans_completed.store(0, Ordering::Relaxed);
        self.plans_rolled_back.store(0, Ordering::Relaxed);
        self.health_checks_run.store(0, Ordering::Relaxed);
        self.dns_changes_applied.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_plans_started();
        m.inc_plans_started();
        assert_eq!(m.plans_started(), 2);

        m.inc_health_checks_run();
        m.inc_dns_changes_applied();
        m.inc_dns_changes_applied();
        assert_eq!(m.health_checks_run(), 1);
        assert_eq!(m.dns_changes_applied(), 2);
        assert_eq!(m.plans_rolled_back(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_plans_started();
        m.inc_plans_completed();
        m.inc_plans_rolled_back();
        m.reset();
        assert_eq!(m.plans_started(), 0);
        assert_eq!(m.plans_completed(), 0);
        assert_eq!(m.plans_rolled_back(), 0);
    }
}
