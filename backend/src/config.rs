use inspect_shared::DefectCategory;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::orchestrator::FailurePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid inference endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub inference: InferenceConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub failure_policy: FailurePolicy,
    pub max_batch_size: usize,
    pub item_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Remote,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: BackendKind,
    pub endpoint: Option<String>,
    pub request_timeout_ms: u64,
}

/// Parameters of the stand-in classifier used when no model is deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// A draw above this value marks the image as defective.
    pub defect_threshold: f64,
    pub confidence_min: f32,
    pub confidence_max: f32,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub catalog: Vec<DefectCategory>,
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::BestEffort,
            max_batch_size: 15,
            item_timeout_ms: 30_000,
        }
    }
}

impl AnalysisConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Remote,
            endpoint: Some("http://127.0.0.1:8000/predict".to_string()),
            request_timeout_ms: 20_000,
        }
    }
}

impl InferenceConfig {
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("remote backend needs inference.endpoint".into()))?;
        let url = Url::parse(raw)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "inference.endpoint must be http(s), got '{}'",
                other
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            defect_threshold: 0.6,
            confidence_min: 0.82,
            confidence_max: 0.99,
            min_latency_ms: 500,
            max_latency_ms: 1500,
            catalog: DefectCategory::catalog(),
            seed: None,
        }
    }
}

impl AppConfig {
    /// Loads `.env`, the YAML file and environment overrides, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = Self::config_path();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            log::info!("Loading configuration from {}", path.display());
            Self::from_yaml(&raw)?
        } else {
            log::warn!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = env::var("INSPECT_CONFIG") {
            return PathBuf::from(path);
        }
        match env::var("CARGO_MANIFEST_DIR") {
            Ok(manifest_dir) => PathBuf::from(format!("{}/../config/inspection.yaml", manifest_dir)),
            Err(_) => PathBuf::from("config/inspection.yaml"),
        }
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a port number: '{}'", port)))?;
        }
        if let Some(endpoint) = lookup("INFERENCE_ENDPOINT") {
            self.inference.endpoint = Some(endpoint);
        }
        if let Some(backend) = lookup("INFERENCE_BACKEND") {
            self.inference.backend = match backend.to_lowercase().as_str() {
                "remote" => BackendKind::Remote,
                "simulated" => BackendKind::Simulated,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "INFERENCE_BACKEND must be 'remote' or 'simulated', got '{}'",
                        other
                    )));
                }
            };
        }
        if let Some(policy) = lookup("FAILURE_POLICY") {
            self.analysis.failure_policy = match policy.to_lowercase().as_str() {
                "best_effort" => FailurePolicy::BestEffort,
                "fail_fast" => FailurePolicy::FailFast,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "FAILURE_POLICY must be 'best_effort' or 'fail_fast', got '{}'",
                        other
                    )));
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.max_batch_size == 0 {
            return Err(ConfigError::Invalid("analysis.max_batch_size must be > 0".into()));
        }
        if self.analysis.item_timeout_ms == 0 {
            return Err(ConfigError::Invalid("analysis.item_timeout_ms must be > 0".into()));
        }

        match self.inference.backend {
            BackendKind::Remote => {
                self.inference.endpoint_url()?;
            }
            BackendKind::Simulated => self.simulation.validate()?,
        }
        Ok(())
    }
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.defect_threshold) {
            return Err(ConfigError::Invalid("simulation.defect_threshold must be in [0, 1]".into()));
        }
        if !(0.0 <= self.confidence_min
            && self.confidence_min <= self.confidence_max
            && self.confidence_max <= 1.0)
        {
            return Err(ConfigError::Invalid(
                "simulation confidence range must satisfy 0 <= min <= max <= 1".into(),
            ));
        }
        if self.min_latency_ms > self.max_latency_ms {
            return Err(ConfigError::Invalid(
                "simulation.min_latency_ms exceeds max_latency_ms".into(),
            ));
        }
        if self.catalog.is_empty() {
            return Err(ConfigError::Invalid("simulation.catalog is empty".into()));
        }
        Ok(())
    }
}
