use chrono::Utc;
use inspect_shared::ImageResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::cancel::CancelToken;
use super::error::ItemError;
use crate::encoding::{encode, InputItem};
use crate::inference::Inferer;

/// Encode -> infer -> shape one image. Cancellation is checked before each
/// stage and raced against the whole run; the timeout covers both stages.
pub(crate) async fn run(
    index: usize,
    item: InputItem,
    inferer: Arc<dyn Inferer>,
    timeout: Duration,
    cancel: CancelToken,
) -> Result<ImageResult, ItemError> {
    let work = async {
        if cancel.is_cancelled() {
            return Err(ItemError::Cancelled);
        }
        let encoded = encode(item).await?;

        if cancel.is_cancelled() {
            return Err(ItemError::Cancelled);
        }
        log::debug!(
            "Image {} ({}, {} bytes) -> {}",
            index,
            encoded.file_name,
            encoded.byte_len,
            inferer.name()
        );
        let started = Instant::now();
        let mut outcome = inferer.infer(&encoded).await?;
        if outcome.processing_time_ms().is_none() {
            outcome = outcome.with_processing_time(started.elapsed().as_millis() as u64);
        }

        Ok::<_, ItemError>(ImageResult {
            id: Uuid::new_v4(),
            index,
            file_name: encoded.file_name,
            image_url: encoded.data_uri,
            image_hash: encoded.digest,
            outcome,
            analyzed_at: Utc::now(),
        })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ItemError::Cancelled),
        finished = tokio::time::timeout(timeout, work) => finished.unwrap_or(Err(ItemError::TimedOut {
            after_ms: timeout.as_millis() as u64,
        })),
    }
}
