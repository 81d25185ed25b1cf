use futures::future::select_all;
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation shared between a caller and the pipelines of a
/// batch. A child token is cancelled when it or any ancestor is cancelled;
/// cancelling a child leaves its ancestors untouched.
#[derive(Clone, Debug)]
pub struct CancelToken {
    // Ancestors first, this token's own flag last.
    flags: Vec<Arc<watch::Sender<bool>>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flags: vec![Arc::new(watch::Sender::new(false))],
        }
    }

    pub fn child(&self) -> Self {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(watch::Sender::new(false)));
        Self { flags }
    }

    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.send_replace(true);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| *flag.borrow())
    }

    /// Resolves once this token or an ancestor is cancelled.
    pub async fn cancelled(&self) {
        let waits = self.flags.iter().map(|flag| {
            let mut rx = flag.subscribe();
            Box::pin(async move {
                // The sender outlives this borrow of the token, so the
                // channel cannot close underneath us.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            })
        });
        select_all(waits).await;
    }

    /// Cancels the token when the returned guard is dropped.
    pub fn drop_guard(&self) -> DropGuard {
        DropGuard {
            token: self.clone(),
        }
    }
}

pub struct DropGuard {
    token: CancelToken,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
