use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Busy,
}

/// Holds the orchestrator in `Busy` until dropped, whatever way the batch ends.
pub(crate) struct BusyGuard<'a> {
    state: &'a watch::Sender<BatchState>,
}

impl<'a> BusyGuard<'a> {
    /// Flips `Idle -> Busy`, or returns `None` if a batch is already running.
    pub(crate) fn acquire(state: &'a watch::Sender<BatchState>) -> Option<Self> {
        let acquired = state.send_if_modified(|current| {
            if *current == BatchState::Idle {
                *current = BatchState::Busy;
                true
            } else {
                false
            }
        });
        acquired.then(|| Self { state })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(BatchState::Idle);
    }
}
