use async_trait::async_trait;
use inspect_shared::{AnalysisOutcome, InferenceRequest, InferenceResponse};
use reqwest::Client as HttpClient;
use std::time::Duration;
use url::Url;

use super::{InferError, Inferer};
use crate::encoding::EncodedImage;

/// Sends each image to an HTTP model server. One attempt per image.
#[derive(Clone)]
pub struct RemoteInferer {
    http_client: HttpClient,
    endpoint: Url,
}

impl RemoteInferer {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InferError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

#[async_trait]
impl Inferer for RemoteInferer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn infer(&self, image: &EncodedImage) -> Result<AnalysisOutcome, InferError> {
        let request = InferenceRequest {
            image_data: image.data_uri.clone(),
            file_name: image.file_name.clone(),
        };

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "Inference for '{}' failed with {}: {}",
                image.file_name,
                status,
                body
            );
            return Err(InferError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| InferError::InvalidResponse(e.to_string()))?;

        Ok(AnalysisOutcome::try_from(body)?)
    }
}
