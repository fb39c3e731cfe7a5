//! Retry loop shared by every probe strategy.

use std::future::Future;
use std::time::Instant;

use tracing::debug;

use crate::cancel::{CancelReason, CancelSignal};
use crate::domain::health::{HealthCheck, HealthCheckResult};

/// Run `attempt_fn` up to `check.retries + 1` times.
///
/// Each attempt races the cancellation signal, as does the `retry_delay`
/// wait between attempts. On cancellation the result is failed with the
/// cancellation reason, no further attempts are made, and the reason is
/// returned alongside. The returned `attempts` is the attempt at which
/// execution stopped; `duration_ms` covers all attempts and waits.
pub async fn run_with_retries<F, Fut>(
    check: &HealthCheck,
    cancel: &CancelSignal,
    mut attempt_fn: F,
) -> (HealthCheckResult, Option<CancelReason>)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = HealthCheckResult>,
{
    let started = Instant::now();
    let max_attempts = check.max_attempts();
    let mut attempt = 1;

    loop {
        let outcome = match cancel.reason() {
            Some(reason) => Err(reason),
            None => tokio::select! {
                result = attempt_fn(attempt) => Ok(result),
                reason = cancel.cancelled() => Err(reason),
            },
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(reason) => return stopped(check, reason, attempt, started),
        };
        result.attempts = attempt;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if result.passed || attempt >= max_attempts {
            return (result, None);
        }

        debug!(
            check_id = %check.id,
            attempt = attempt,
            max_attempts = max_attempts,
            error = result.error.as_deref().unwrap_or(""),
            "Health check attempt failed; retrying"
        );

        if let Err(reason) = cancel.sleep(check.retry_delay()).await {
            return stopped(check, reason, attempt, started);
        }
        attempt += 1;
    }
}

fn stopped(
    check: &HealthCheck,
    reason: CancelReason,
    attempt: u32,
    started: Instant,
) -> (HealthCheckResult, Option<CancelReason>) {
    let mut result = HealthCheckResult::fail(&check.id, reason.to_string());
    result.attempts = attempt;
    result.duration_ms = started.elapsed().as_millis() as u64;
    (result, Some(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn check(retries: u32) -> HealthCheck {
        HealthCheck::tcp("t1", "probe", "localhost:1").with_retries(retries, 5)
    }

    #[tokio::test]
    async fn test_always_failing_uses_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = check(3);
        let counter = calls.clone();
        let (result, cancelled) = run_with_retries(&c, &CancelSignal::never(), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                HealthCheckResult::fail("t1", "refused")
            }
        })
        .await;

        assert!(!result.passed);
        assert!(cancelled.is_none());
        assert_eq!(result.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_succeeds_after_k_failures() {
        let c = check(5);
        let (result, _) = run_with_retries(&c, &CancelSignal::never(), |attempt| async move {
            if attempt <= 2 {
                HealthCheckResult::fail("t1", "not yet")
            } else {
                HealthCheckResult::pass("t1")
            }
        })
        .await;

        assert!(result.passed);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let c = check(0);
        let (result, _) = run_with_retries(&c, &CancelSignal::never(), |_| async {
            HealthCheckResult::fail("t1", "down")
        })
        .await;
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_result_details_do_not_stop_retries() {
        let (result, cancelled) = run_with_retries(&check(2), &CancelSignal::never(), |_| async {
            HealthCheckResult::fail("t1", "interrupted").with_detail("cancelled", true)
        })
        .await;
        assert_eq!(result.attempts, 3);
        assert!(cancelled.is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_retry_wait_stops_immediately() {
        let c = HealthCheck::tcp("t1", "probe", "localhost:1").with_retries(10, 60_000);
        let (handle, signal) = cancel_pair(None);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let task = tokio::spawn(async move {
            run_with_retries(&c, &signal, move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    HealthCheckResult::fail("t1", "refused")
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel(CancelReason::User);
        let (result, cancelled) = task.await.unwrap();

        assert!(!result.passed);
        assert_eq!(cancelled, Some(CancelReason::User));
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error.as_deref(), Some("cancelled by user"));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_attempt() {
        let (handle, signal) = cancel_pair(None);
        handle.cancel(CancelReason::Timeout);
        let (result, cancelled) = run_with_retries(&check(2), &signal, |_| async {
            panic!("attempt must not run once cancelled")
        })
        .await;
        assert!(!result.passed);
        assert_eq!(cancelled, Some(CancelReason::Timeout));
        assert_eq!(result.error.as_deref(), Some("cutover timed out"));
    }
}
