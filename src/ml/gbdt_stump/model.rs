use serde::{Deserialize, Serialize};

use crate::ml::{Classifier, sigmoid};

/// Single-node decision tree used as a weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature index used for the split.
    pub feature_index: u16,
    /// Threshold in feature units.
    pub threshold: f32,
    /// Prediction for `feature <= threshold`.
    pub left_value: f32,
    /// Prediction for `feature > threshold`.
    pub right_value: f32,
}

impl Stump {
    /// Predict the stump value for a feature vector.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let idx = self.feature_index as usize;
        let value = features.get(idx).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Gradient-boosted stump model producing a churn log-odds score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtStumpModel {
    /// Model format version.
    pub model_version: i64,
    /// Number of `f32` values per feature vector.
    pub feature_len_f32: usize,
    /// Learning rate applied to each stump prediction.
    pub learning_rate: f32,
    /// Initial log-odds (training base rate) before boosting rounds.
    pub init_raw: f32,
    /// One stump per boosting round.
    pub stumps: Vec<Stump>,
}

impl GbdtStumpModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_len_f32 == 0 {
            return Err("Model must accept at least one feature".to_string());
        }
        if !self.init_raw.is_finite() || !self.learning_rate.is_finite() {
            return Err("init_raw and learning_rate must be finite".to_string());
        }
        for (round_idx, stump) in self.stumps.iter().enumerate() {
            if stump.feature_index as usize >= self.feature_len_f32 {
                return Err(format!(
                    "Round {round_idx} splits on feature {} but the model has {} features",
                    stump.feature_index, self.feature_len_f32
                ));
            }
        }
        Ok(())
    }

    /// Raw log-odds for a feature vector.
    pub fn predict_raw(&self, features: &[f32]) -> f32 {
        self.stumps
            .iter()
            .fold(self.init_raw, |raw, stump| {
                raw + self.learning_rate * stump.predict(features)
            })
    }
}

impl Classifier for GbdtStumpModel {
    fn score(&self, features: &[f32]) -> f32 {
        sigmoid(self.predict_raw(features))
    }

    fn feature_len(&self) -> usize {
        self.feature_len_f32
    }

    /// Split counts per feature, the boosted-tree notion of importance.
    fn feature_importances(&self) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.feature_len_f32];
        for stump in &self.stumps {
            if let Some(count) = counts.get_mut(stump.feature_index as usize) {
                *count += 1.0;
            }
        }
        counts
    }
}
