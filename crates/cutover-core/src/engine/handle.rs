//! Handle to a plan running in the background.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::error::{CutoverError, Result};
use crate::engine::options::ExecutionResult;
use crate::events::ProgressEvent;

/// Finite stream of progress events; ends when the run finishes.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ProgressEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the run has finished.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Returned by [`crate::CutoverEngine::execute`].
#[derive(Debug)]
pub struct ExecutionHandle {
    plan_id: String,
    events: ProgressStream,
    join: JoinHandle<ExecutionResult>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        plan_id: String,
        events: ProgressStream,
        join: JoinHandle<ExecutionResult>,
    ) -> Self {
        Self {
            plan_id,
            events,
            join,
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn events(&mut self) -> &mut ProgressStream {
        &mut self.events
    }

    /// Split into the event stream and a future for the final result.
    pub fn into_parts(self) -> (ProgressStream, JoinHandle<ExecutionResult>) {
        (self.events, self.join)
    }

    /// Wait for the run to finish. Unconsumed events are discarded.
    pub async fn wait(self) -> Result<ExecutionResult> {
        self.join
            .await
            .map_err(|e| CutoverError::TaskJoin(e.to_string()))
    }
}
