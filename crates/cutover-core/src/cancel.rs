//! Plan cancellation signal.
//!
//! A [`CancelHandle`] / [`CancelSignal`] pair wraps a `tokio::sync::watch`
//! channel plus an optional deadline. Every suspension point in a running
//! plan (probe I/O, retry delay, propagation wait) races
//! [`CancelSignal::cancelled`] so that an explicit cancel or the plan-wide
//! timeout ends the wait immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a plan stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    User,
    Timeout,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::User => f.write_str("cancelled by user"),
            CancelReason::Timeout => f.write_str("cutover timed out"),
        }
    }
}

/// Sending half; owned by the engine's plan registry.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<Option<CancelReason>>,
}

impl CancelHandle {
    /// Signal cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: CancelReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// Receiving half; cheap to clone into probes.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<Option<CancelReason>>,
    deadline: Option<Instant>,
}

/// Create a linked handle/signal pair, optionally bounded by `timeout`.
pub fn cancel_pair(timeout: Option<Duration>) -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(None);
    let deadline = timeout.map(|t| Instant::now() + t);
    (CancelHandle { tx }, CancelSignal { rx, deadline })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_handle, signal) = cancel_pair(None);
        signal
    }

    pub fn reason(&self) -> Option<CancelReason> {
        let current = *self.rx.borrow();
        if current.is_some() {
            return current;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::Timeout),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolve once cancellation is signalled or the deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        let signalled = async move {
            loop {
                let current = *rx.borrow_and_update();
                if let Some(reason) = current {
                    return reason;
                }
                if rx.changed().await.is_err() {
                    // Handle dropped without cancelling: only the deadline remains.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                reason = signalled => reason,
                _ = tokio::time::sleep_until(deadline) => CancelReason::Timeout,
            },
            None => signalled.await,
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CancelReason> {
        if let Some(reason) = self.reason() {
            return Err(reason);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            reason = self.cancelled() => Err(reason),
        }
    }
}
