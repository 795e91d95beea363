//! Handle to a spawned subscription worker.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SubscriptionError;
use crate::worker::WorkerState;

/// Observes and stops a worker running on the tokio runtime.
///
/// Dropping the handle does not stop the worker; call
/// [`WorkerHandle::stop`] or cancel its token.
#[derive(Debug)]
pub struct WorkerHandle {
    group: String,
    cancel: CancellationToken,
    state: watch::Receiver<WorkerState>,
    task: JoinHandle<Result<(), SubscriptionError>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        group: String,
        cancel: CancellationToken,
        state: watch::Receiver<WorkerState>,
        task: JoinHandle<Result<(), SubscriptionError>>,
    ) -> Self {
        Self {
            group,
            cancel,
            state,
            task,
        }
    }

    /// Group name of the worker's subscription.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The latest published state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// A clone of the token that stops the worker.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns `true` once the worker task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the worker reaches a state matching `predicate`.
    ///
    /// Returns the last published state if the worker ends first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&WorkerState) -> bool) -> WorkerState {
        let reached = self.state.wait_for(predicate).await.map(|state| *state);
        reached.unwrap_or_else(|_| *self.state.borrow())
    }

    /// Cancels the worker and waits for it to end.
    ///
    /// # Errors
    ///
    /// Returns the worker's bootstrap failure, or
    /// `SubscriptionError::TaskFailed` if the task panicked.
    pub async fn stop(self) -> Result<(), SubscriptionError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| SubscriptionError::TaskFailed(err.to_string()))?
    }
}
