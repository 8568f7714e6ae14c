//! Binary churn classifiers and evaluation metrics.
//!
//! Every trained model is reached through [`Classifier`]; the registry and
//! the scoring path never look at the concrete adapter. [`StoredModel`] is
//! the persisted, kind-tagged form.

pub mod gbdt_stump;
pub mod logreg;
pub mod metrics;

use serde::{Deserialize, Serialize};

/// Scoring capability every trained churn model exposes.
pub trait Classifier: Send + Sync {
    /// Probability in `[0, 1]` that the customer churns.
    fn score(&self, features: &[f32]) -> f32;

    /// Number of `f32` inputs the model expects.
    fn feature_len(&self) -> usize;

    /// Relative importance per input slot, aligned with the feature order.
    fn feature_importances(&self) -> Vec<f32>;
}

/// Model families that can be trained and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    GbdtStumpV1,
    LogRegV1,
}

impl ModelKind {
    /// Short tag embedded in generated version strings.
    pub fn version_tag(self) -> &'static str {
        match self {
            Self::GbdtStumpV1 => "gbdt",
            Self::LogRegV1 => "logreg",
        }
    }
}

/// Persisted model, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredModel {
    GbdtStumpV1(gbdt_stump::GbdtStumpModel),
    LogRegV1(logreg::LogRegModel),
}

impl StoredModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::GbdtStumpV1(_) => ModelKind::GbdtStumpV1,
            Self::LogRegV1(_) => ModelKind::LogRegV1,
        }
    }

    /// Validate structural invariants of the wrapped model.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::GbdtStumpV1(model) => model.validate(),
            Self::LogRegV1(model) => model.validate(),
        }
    }

    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Self::GbdtStumpV1(model) => model,
            Self::LogRegV1(model) => model,
        }
    }
}

impl Classifier for StoredModel {
    fn score(&self, features: &[f32]) -> f32 {
        self.as_classifier().score(features)
    }

    fn feature_len(&self) -> usize {
        self.as_classifier().feature_len()
    }

    fn feature_importances(&self) -> Vec<f32> {
        self.as_classifier().feature_importances()
    }
}

/// Labeled feature matrix with binary targets.
#[derive(Debug, Clone, Default)]
pub struct TrainSet {
    /// Row-major feature vectors, all the same length.
    pub x: Vec<Vec<f32>>,
    /// `0` (retained) or `1` (churned), aligned with `x`.
    pub y: Vec<u8>,
}

impl TrainSet {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Shared shape checks; returns the row width.
    pub(crate) fn check_shape(&self) -> Result<usize, String> {
        if self.x.is_empty() || self.y.is_empty() {
            return Err("Empty training set".to_string());
        }
        if self.x.len() != self.y.len() {
            return Err("Mismatched training inputs/labels".to_string());
        }
        let dim = self.x[0].len();
        if dim == 0 {
            return Err("Training rows have no features".to_string());
        }
        if self.x.iter().any(|row| row.len() != dim) {
            return Err("Inconsistent feature row length".to_string());
        }
        if self.y.iter().any(|&label| label > 1) {
            return Err("Labels must be 0 or 1".to_string());
        }
        Ok(dim)
    }

    pub(crate) fn positive_rate(&self) -> f32 {
        let positives = self.y.iter().filter(|&&label| label == 1).count();
        positives as f32 / self.y.len().max(1) as f32
    }
}

/// Hyperparameters for every model family; only the selected one is used.
#[derive(Debug, Clone, Default)]
pub struct FitOptions {
    pub gbdt: gbdt_stump::TrainOptions,
    pub logreg: logreg::TrainOptions,
}

/// Train a model of the requested kind.
pub fn fit(kind: ModelKind, data: &TrainSet, options: &FitOptions) -> Result<StoredModel, String> {
    let model = match kind {
        ModelKind::GbdtStumpV1 => {
            StoredModel::GbdtStumpV1(gbdt_stump::train_gbdt_stump(data, &options.gbdt)?)
        }
        ModelKind::LogRegV1 => StoredModel::LogRegV1(logreg::train_logreg(data, &options.logreg)?),
    };
    model.validate()?;
    Ok(model)
}

/// Numerically-stable logistic function.
pub fn sigmoid(raw: f32) -> f32 {
    if raw >= 0.0 {
        1.0 / (1.0 + (-raw).exp())
    } else {
        let e = raw.exp();
        e / (1.0 + e)
    }
}

/// Log-odds of a probability clamped away from `0` and `1`.
pub(crate) fn logit(p: f32) -> f32 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> TrainSet {
        let mut data = TrainSet::default();
        for i in 0..40 {
            let v = i as f32;
            data.x.push(vec![v, 1.0]);
            data.y.push(u8::from(i >= 20));
        }
        data
    }

    #[test]
    fn sigmoid_is_symmetric_and_bounded() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid(3.0) + sigmoid(-3.0) - 1.0).abs() < 1e-6);
        assert!(sigmoid(200.0) <= 1.0);
        assert!(sigmoid(-200.0) >= 0.0);
    }

    #[test]
    fn stored_model_round_trips_with_kind_tag() {
        let model = fit(ModelKind::GbdtStumpV1, &separable(), &FitOptions::default()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains(r#""kind":"gbdt_stump_v1""#));
        let back: StoredModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ModelKind::GbdtStumpV1);
        assert_eq!(back.score(&[35.0, 1.0]), model.score(&[35.0, 1.0]));
    }

    #[test]
    fn both_kinds_rank_separable_data() {
        for kind in [ModelKind::GbdtStumpV1, ModelKind::LogRegV1] {
            let model = fit(kind, &separable(), &FitOptions::default()).unwrap();
            assert_eq!(model.feature_len(), 2);
            assert!(
                model.score(&[38.0, 1.0]) > model.score(&[2.0, 1.0]),
                "{kind:?} failed to rank"
            );
        }
    }

    #[test]
    fn shape_checks_reject_bad_inputs() {
        let mut data = separable();
        data.y[0] = 2;
        assert!(data.check_shape().is_err());
        assert!(TrainSet::default().check_shape().is_err());
    }
}
