use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Defect labels a classifier can attach to a defective image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum DefectCategory {
    #[serde(rename = "hole")]
    #[strum(serialize = "hole")]
    Hole,
    #[serde(rename = "stain")]
    #[strum(serialize = "stain")]
    Stain,
    #[serde(rename = "color mismatch")]
    #[strum(serialize = "color mismatch")]
    ColorMismatch,
    #[serde(rename = "tear")]
    #[strum(serialize = "tear")]
    Tear,
}

impl DefectCategory {
    /// Every category, in catalog order.
    pub fn catalog() -> Vec<Self> {
        Self::iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutcomeError {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
    #[error("defect flagged without a defect type")]
    MissingDefectType,
    #[error("defect type '{0}' given for a defect-free image")]
    UnexpectedDefectType(String),
}

/// Body sent to a remote inference endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub image_data: String,
    pub file_name: String,
}

/// Raw inference answer as it travels over the wire. Nothing here is
/// validated; convert it into an [`AnalysisOutcome`] before trusting it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
    pub has_defect: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

/// Classification of a single image.
///
/// Only obtainable through the validating constructors (or by
/// deserialising, which runs the same checks), so `defect_type` is present
/// exactly when `has_defect` is set and `confidence` lies in `[0, 1]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "InferenceResponse")]
pub struct AnalysisOutcome {
    has_defect: bool,
    confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    defect_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_time_ms: Option<u64>,
}

impl AnalysisOutcome {
    pub fn new(
        has_defect: bool,
        confidence: f32,
        defect_type: Option<String>,
    ) -> Result<Self, OutcomeError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(OutcomeError::ConfidenceOutOfRange(confidence));
        }

        // An empty label counts as no label.
        let defect_type = defect_type
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());

        match (has_defect, defect_type) {
            (true, None) => Err(OutcomeError::MissingDefectType),
            (false, Some(label)) => Err(OutcomeError::UnexpectedDefectType(label)),
            (has_defect, defect_type) => Ok(Self {
                has_defect,
                confidence,
                defect_type,
                processing_time_ms: None,
            }),
        }
    }

    pub fn pass(confidence: f32) -> Result<Self, OutcomeError> {
        Self::new(false, confidence, None)
    }

    pub fn defect(confidence: f32, defect_type: impl Into<String>) -> Result<Self, OutcomeError> {
        Self::new(true, confidence, Some(defect_type.into()))
    }

    pub fn with_processing_time(mut self, millis: u64) -> Self {
        self.processing_time_ms = Some(millis);
        self
    }

    pub fn has_defect(&self) -> bool {
        self.has_defect
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn defect_type(&self) -> Option<&str> {
        self.defect_type.as_deref()
    }

    pub fn processing_time_ms(&self) -> Option<u64> {
        self.processing_time_ms
    }
}

impl TryFrom<InferenceResponse> for AnalysisOutcome {
    type Error = OutcomeError;

    fn try_from(response: InferenceResponse) -> Result<Self, Self::Error> {
        let outcome = Self::new(response.has_defect, response.confidence, response.defect_type)?;
        Ok(match response.processing_time_ms {
            Some(millis) => outcome.with_processing_time(millis),
            None => outcome,
        })
    }
}

impl From<AnalysisOutcome> for InferenceResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            has_defect: outcome.has_defect,
            confidence: outcome.confidence,
            defect_type: outcome.defect_type,
            processing_time_ms: outcome.processing_time_ms,
        }
    }
}

/// Externally visible record for one successfully analysed image.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub id: Uuid,
    /// Position of the image in the submitted batch.
    pub index: usize,
    pub file_name: String,
    /// Data URI of the submitted bytes.
    pub image_url: String,
    pub image_hash: String,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
    pub analyzed_at: DateTime<Utc>,
}

impl ImageResult {
    pub fn has_defect(&self) -> bool {
        self.outcome.has_defect()
    }
}

/// An image that was left out of a best-effort batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedItem {
    pub index: usize,
    pub file_name: String,
    pub reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<ImageResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
}

impl BatchResult {
    pub fn defect_count(&self) -> usize {
        self.results.iter().filter(|r| r.has_defect()).count()
    }

    pub fn pass_count(&self) -> usize {
        self.results.iter().filter(|r| !r.has_defect()).count()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.results.len(),
            defects: self.defect_count(),
            passed: self.pass_count(),
            skipped: self.skipped.len(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub defects: usize,
    pub passed: usize,
    pub skipped: usize,
}
