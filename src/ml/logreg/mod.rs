//! Binary logistic regression over standardized churn features.

use serde::{Deserialize, Serialize};

use crate::ml::{Classifier, sigmoid};

mod train;
pub use train::{TrainOptions, train_logreg};

/// Versioned logistic regression model.
///
/// Inputs are standardized with the training `mean`/`scale` stored in the
/// model, so raw feature vectors can be scored directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    pub model_version: i64,
    pub feature_len_f32: usize,
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
    pub weights: Vec<f32>,
    pub bias: f32,
    pub temperature: f32,
}

impl LogRegModel {
    /// Validate the model dimensions.
    pub fn validate(&self) -> Result<(), String> {
        let dim = self.feature_len_f32;
        if dim == 0 {
            return Err("Model must accept at least one feature".to_string());
        }
        if self.weights.len() != dim {
            return Err("weights length mismatch".to_string());
        }
        if self.mean.len() != dim || self.scale.len() != dim {
            return Err("standardization length mismatch".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scale entries must be > 0".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    /// Raw log-odds for a feature vector; missing trailing inputs count as zero.
    pub fn predict_raw(&self, features: &[f32]) -> f32 {
        let mut sum = self.bias;
        for i in 0..self.feature_len_f32 {
            let value = features.get(i).copied().unwrap_or(0.0);
            sum += self.weights[i] * (value - self.mean[i]) / self.scale[i];
        }
        sum / self.temperature.max(1e-6)
    }
}

impl Classifier for LogRegModel {
    fn score(&self, features: &[f32]) -> f32 {
        sigmoid(self.predict_raw(features))
    }

    fn feature_len(&self) -> usize {
        self.feature_len_f32
    }

    /// Absolute standardized weights.
    fn feature_importances(&self) -> Vec<f32> {
        self.weights.iter().map(|w| w.abs()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LogRegModel {
        LogRegModel {
            model_version: 1,
            feature_len_f32: 2,
            mean: vec![10.0, 0.0],
            scale: vec![5.0, 1.0],
            weights: vec![2.0, -1.0],
            bias: 0.5,
            temperature: 1.0,
        }
    }

    #[test]
    fn scores_standardized_inputs() {
        let model = model();
        model.validate().unwrap();
        assert!((model.predict_raw(&[15.0, 1.0]) - 1.5).abs() < 1e-6);
        assert!((model.score(&[10.0, 0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(model.feature_importances(), vec![2.0f32, 1.0]);
    }

    #[test]
    fn rejects_non_positive_scale() {
        let mut model = model();
        model.scale[1] = 0.0;
        assert!(model.validate().is_err());
    }
}
