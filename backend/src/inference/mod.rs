pub mod remote;
pub mod simulated;

use async_trait::async_trait;
use inspect_shared::{AnalysisOutcome, OutcomeError};
use std::sync::Arc;

use crate::config::{AppConfig, BackendKind};
use crate::encoding::EncodedImage;

pub use remote::RemoteInferer;
pub use simulated::SimulatedInferer;

#[derive(Debug, thiserror::Error)]
pub enum InferError {
    #[error("Inference request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<OutcomeError> for InferError {
    fn from(err: OutcomeError) -> Self {
        InferError::InvalidResponse(err.to_string())
    }
}

/// Classifies one encoded image. Implementations must be safe to call from
/// many pipelines at once.
#[async_trait]
pub trait Inferer: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, image: &EncodedImage) -> Result<AnalysisOutcome, InferError>;
}

pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Inferer>, InferError> {
    match config.inference.backend {
        BackendKind::Remote => {
            let endpoint = config
                .inference
                .endpoint_url()
                .map_err(|e| InferError::Unavailable(e.to_string()))?;
            log::info!("Using remote inference at {}", endpoint);
            Ok(Arc::new(RemoteInferer::new(
                endpoint,
                config.inference.request_timeout(),
            )?))
        }
        BackendKind::Simulated => {
            log::warn!("Using simulated inference; results are random and only fit for demos");
            Ok(Arc::new(SimulatedInferer::new(config.simulation.clone())))
        }
    }
}
