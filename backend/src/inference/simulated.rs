use async_trait::async_trait;
use inspect_shared::AnalysisOutcome;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use super::{InferError, Inferer};
use crate::config::SimulationConfig;
use crate::encoding::EncodedImage;

/// Stand-in classifier for running the service without a model: draws the
/// verdict, confidence, label and latency at random from [`SimulationConfig`].
pub struct SimulatedInferer {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedInferer {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> Result<(AnalysisOutcome, Duration), InferError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| InferError::Unavailable("simulator state poisoned".into()))?;

        let has_defect = rng.random::<f64>() > self.config.defect_threshold;
        let confidence = rng.random_range(self.config.confidence_min..=self.config.confidence_max);
        let latency = Duration::from_millis(
            rng.random_range(self.config.min_latency_ms..=self.config.max_latency_ms),
        );

        let outcome = if has_defect {
            let category = self
                .config
                .catalog
                .choose(&mut *rng)
                .ok_or_else(|| InferError::Unavailable("defect catalog is empty".into()))?;
            AnalysisOutcome::defect(confidence, category.to_string())?
        } else {
            AnalysisOutcome::pass(confidence)?
        };

        Ok((outcome, latency))
    }
}

#[async_trait]
impl Inferer for SimulatedInferer {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn infer(&self, image: &EncodedImage) -> Result<AnalysisOutcome, InferError> {
        let (outcome, latency) = self.draw()?;
        tokio::time::sleep(latency).await;
        log::debug!(
            "Simulated verdict for '{}': defect={} confidence={:.2}",
            image.file_name,
            outcome.has_defect(),
            outcome.confidence()
        );
        Ok(outcome.with_processing_time(latency.as_millis() as u64))
    }
}
