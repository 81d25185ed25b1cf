use futures::stream::{FuturesUnordered, StreamExt};
use inspect_shared::{BatchResult, ImageResult, SkippedItem};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use super::cancel::CancelToken;
use super::error::{BatchError, BusyError, ItemError, SubmitError};
use super::pipeline;
use super::state::{BatchState, BusyGuard};
use super::FailurePolicy;
use crate::config::AnalysisConfig;
use crate::encoding::InputItem;
use crate::inference::Inferer;

/// Fans a batch of images out to concurrent pipelines and joins them.
///
/// Only one batch runs at a time; the current [`BatchState`] can be read or
/// watched through [`Orchestrator::subscribe`].
pub struct Orchestrator {
    inferer: Arc<dyn Inferer>,
    settings: AnalysisConfig,
    state: watch::Sender<BatchState>,
}

impl Orchestrator {
    pub fn new(inferer: Arc<dyn Inferer>, settings: AnalysisConfig) -> Self {
        Self {
            inferer,
            settings,
            state: watch::Sender::new(BatchState::Idle),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.inferer.name()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.settings.failure_policy
    }

    pub fn max_batch_size(&self) -> usize {
        self.settings.max_batch_size
    }

    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.state() == BatchState::Busy
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.subscribe()
    }

    pub async fn submit(&self, items: Vec<InputItem>) -> Result<BatchResult, SubmitError> {
        self.submit_with_cancel(items, CancelToken::new()).await
    }

    /// Runs every item through encode -> infer concurrently and returns the
    /// results in submission order. Dropping the returned future cancels
    /// whatever pipelines are still in flight.
    pub async fn submit_with_cancel(
        &self,
        items: Vec<InputItem>,
        cancel: CancelToken,
    ) -> Result<BatchResult, SubmitError> {
        let _busy = BusyGuard::acquire(&self.state).ok_or(BusyError)?;

        let total = items.len();
        if total > self.settings.max_batch_size {
            return Err(BatchError::TooManyItems {
                count: total,
                limit: self.settings.max_batch_size,
            }
            .into());
        }

        info!(
            "Analysing {} image(s) with the {} backend ({:?})",
            total,
            self.inferer.name(),
            self.settings.failure_policy
        );
        let started = Instant::now();

        let batch_cancel = cancel.child();
        let _abandon = batch_cancel.drop_guard();
        let timeout = self.settings.item_timeout();

        let names: Vec<String> = items.iter().map(|item| item.name.clone()).collect();
        let mut pending: FuturesUnordered<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let handle = tokio::spawn(pipeline::run(
                    index,
                    item,
                    Arc::clone(&self.inferer),
                    timeout,
                    batch_cancel.clone(),
                ));
                async move { (index, handle.await) }
            })
            .collect();

        let mut slots: Vec<Option<ImageResult>> = (0..total).map(|_| None).collect();
        let mut skipped = Vec::new();
        let mut first_failure = None;
        let mut interrupted = false;

        while let Some((index, joined)) = pending.next().await {
            let outcome = joined.unwrap_or_else(|e| Err(ItemError::Panicked(e.to_string())));
            if matches!(outcome, Err(ItemError::Cancelled)) {
                interrupted = true;
            }
            match outcome {
                Ok(result) => {
                    debug!(
                        "Image {} ({}) done: defect={}",
                        index,
                        names[index],
                        result.has_defect()
                    );
                    slots[index] = Some(result);
                }
                Err(err) => match self.settings.failure_policy {
                    FailurePolicy::FailFast => {
                        if first_failure.is_none() {
                            error!("Image {} ({}) failed, aborting batch: {}", index, names[index], err);
                            batch_cancel.cancel();
                            first_failure = Some(BatchError::ItemFailed {
                                index,
                                file_name: names[index].clone(),
                                source: err,
                            });
                        }
                    }
                    FailurePolicy::BestEffort => {
                        warn!("Image {} ({}) skipped: {}", index, names[index], err);
                        skipped.push(SkippedItem {
                            index,
                            file_name: names[index].clone(),
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        // A cancel that lands after every pipeline finished leaves nothing to abort.
        if interrupted && cancel.is_cancelled() {
            warn!("Batch cancelled after {:.2?}", started.elapsed());
            return Err(BatchError::Cancelled.into());
        }
        if let Some(failure) = first_failure {
            return Err(failure.into());
        }

        skipped.sort_by_key(|s| s.index);
        let batch = BatchResult {
            results: slots.into_iter().flatten().collect(),
            skipped,
        };

        info!(
            "Batch finished in {:.2?}: {} defective, {} passed, {} skipped",
            started.elapsed(),
            batch.defect_count(),
            batch.pass_count(),
            batch.skipped.len()
        );
        Ok(batch)
    }
}
