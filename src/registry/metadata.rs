use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::calibration::ThresholdSet;
use crate::features::{Encoders, Vectorizer};
use crate::ml::metrics::EvaluationMetrics;
use crate::ml::{Classifier, ModelKind, StoredModel};

/// Everything needed to interpret a stored model's input and output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    pub feature_order: Vec<String>,
    pub encoders: Encoders,
    pub thresholds: ThresholdSet,
    pub metrics: EvaluationMetrics,
    pub training_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_kind: Option<ModelKind>,
    /// First day (inclusive, `YYYY-MM-DD`) of the training window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_from: Option<String>,
    /// Last day (inclusive, `YYYY-MM-DD`) of the training window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_samples: Option<usize>,
    /// RFC 3339 UTC timestamp of the training run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Validation data held a single label class.
    #[serde(default)]
    pub low_confidence: bool,
}

impl ModelMetadata {
    /// Structural checks that make the feature order safe to score against.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_order.is_empty() {
            return Err("feature_order is empty".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.feature_order {
            if name.trim().is_empty() {
                return Err("feature_order contains an empty name".to_string());
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("feature_order repeats {name}"));
            }
        }
        self.thresholds.validate()
    }

    /// Checks that tie this metadata to a specific model.
    pub fn validate_against(&self, model: &StoredModel) -> Result<(), String> {
        self.validate()?;
        model.validate()?;
        if model.feature_len() != self.feature_order.len() {
            return Err(format!(
                "model expects {} inputs but feature_order has {}",
                model.feature_len(),
                self.feature_order.len()
            ));
        }
        if let Some(kind) = self.model_kind {
            if kind != model.kind() {
                return Err(format!(
                    "metadata names model kind {kind:?} but the model is {:?}",
                    model.kind()
                ));
            }
        }
        Ok(())
    }
}

/// A model together with the metadata it was published with.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub model: StoredModel,
    pub metadata: ModelMetadata,
}

impl LoadedArtifact {
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Vectorizer bound to this artifact's own feature order.
    pub fn vectorizer(&self, default_region: &str) -> Vectorizer {
        Vectorizer::new(&self.metadata.feature_order, default_region)
    }
}
