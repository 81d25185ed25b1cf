mod batch;
pub mod cancel;
mod error;
mod pipeline;
mod state;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use batch::Orchestrator;
pub use error::{BatchError, BusyError, SubmitError};
pub use state::BatchState;

/// What a batch does when one of its images fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failed images and report them as skipped.
    BestEffort,
    /// Fail the whole batch on the first error and discard every result.
    FailFast,
}
