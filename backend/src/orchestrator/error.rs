use crate::encoding::EncodeError;
use crate::inference::InferError;

/// Why a single image's pipeline failed.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("Inference failed: {0}")]
    Infer(#[from] InferError),
    #[error("Timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },
    #[error("Cancelled")]
    Cancelled,
    #[error("Pipeline task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Image {index} ({file_name}) failed: {source}")]
    ItemFailed {
        index: usize,
        file_name: String,
        #[source]
        source: ItemError,
    },
    #[error("Batch was cancelled")]
    Cancelled,
    #[error("Batch of {count} images exceeds the limit of {limit}")]
    TooManyItems { count: usize, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("An analysis batch is already running")]
pub struct BusyError;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Busy(#[from] BusyError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}
