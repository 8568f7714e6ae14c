use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::reasons::{ReasonTag, rule_based_reasons};
use super::tier::RiskTier;
use crate::features::{FeatureSnapshot, REQUIRED_FEATURES, Vectorizer};
use crate::ml::Classifier;
use crate::registry::{LoadedArtifact, ModelRegistry, RegistryError};

/// Decimal places kept in a returned risk.
const RISK_DECIMALS: i32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("invalid scoring request: {0}")]
    InvalidRequest(String),
}

/// Incoming scoring request as accepted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub features: Option<FeatureSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub risk: f64,
    pub tier: RiskTier,
    pub reasons: Vec<ReasonTag>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

/// Serving parameters supplied by the caller's configuration layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOptions {
    pub default_region: String,
    pub required_features: Vec<String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            default_region: crate::features::DEFAULT_REGION.to_string(),
            required_features: REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Immutable scoring context built once at startup.
///
/// Scoring takes `&self` only, so one instance can be shared across threads
/// behind an `Arc` without locking. Picking up a new artifact means building
/// a new service.
pub struct ScoringService {
    artifact: LoadedArtifact,
    vectorizer: Vectorizer,
    options: ServiceOptions,
}

impl ScoringService {
    pub fn new(artifact: LoadedArtifact, options: ServiceOptions) -> Self {
        let vectorizer = artifact.vectorizer(&options.default_region);
        Self {
            artifact,
            vectorizer,
            options,
        }
    }

    /// Load `version` (or the latest) from `registry` and bind it.
    pub fn from_registry(
        registry: &ModelRegistry,
        version: Option<&str>,
        options: ServiceOptions,
    ) -> Result<Self, RegistryError> {
        Ok(Self::new(registry.load(version)?, options))
    }

    pub fn artifact(&self) -> &LoadedArtifact {
        &self.artifact
    }

    pub fn model_version(&self) -> &str {
        self.artifact.version()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            model_version: self.model_version().to_string(),
        }
    }

    /// `features` padded the same way [`Self::score`] pads them.
    pub fn filled(&self, features: &FeatureSnapshot) -> FeatureSnapshot {
        let mut snapshot = features.clone();
        snapshot.fill_defaults(&self.options.required_features, &self.options.default_region);
        snapshot
    }

    pub fn score_request(&self, request: &ScoreRequest) -> Result<ScoreResponse, ScoreError> {
        let features = request.features.as_ref().ok_or_else(|| {
            ScoreError::InvalidRequest("features object is required".to_string())
        })?;
        self.score(&request.user_id, features)
    }

    /// Score one customer.
    ///
    /// Absent required features are defaulted before both vectorization and
    /// reason derivation, so the two always see the same inputs.
    pub fn score(
        &self,
        user_id: &str,
        features: &FeatureSnapshot,
    ) -> Result<ScoreResponse, ScoreError> {
        if features.is_empty() {
            return Err(ScoreError::InvalidRequest(
                "features object is required and must not be empty".to_string(),
            ));
        }
        let mut snapshot = features.clone();
        let filled = snapshot.fill_defaults(
            &self.options.required_features,
            &self.options.default_region,
        );
        if !filled.is_empty() {
            warn!("Request for {user_id} defaulted missing features: {filled:?}");
        }

        let vector = self.vectorizer.vectorize(&snapshot);
        let probability = f64::from(self.artifact.model.score(&vector));
        if !probability.is_finite() {
            return Err(ScoreError::InvalidRequest(format!(
                "features produced a non-finite score ({probability})"
            )));
        }
        let probability = probability.clamp(0.0, 1.0);
        // Tier on the exact probability, the same way training reports tiers.
        let tier = RiskTier::from_probability(probability, &self.artifact.metadata.thresholds);
        let risk = round_risk(probability);
        let reasons = rule_based_reasons(&snapshot);
        debug!("Scored {user_id}: risk={risk} tier={tier}");
        Ok(ScoreResponse {
            risk,
            tier,
            reasons,
            model_version: self.model_version().to_string(),
        })
    }
}

fn round_risk(risk: f64) -> f64 {
    let factor = 10f64.powi(RISK_DECIMALS);
    (risk * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::calibration::ThresholdSet;
    use crate::features::FeatureContract;
    use crate::ml::StoredModel;
    use crate::ml::logreg::LogRegModel;
    use crate::ml::metrics::EvaluationMetrics;
    use crate::registry::ModelMetadata;

    /// Logistic model driven by inactivity alone.
    fn artifact() -> LoadedArtifact {
        let dim = FeatureContract::churn_default().feature_order().len();
        let mut weights = vec![0.0f32; dim];
        weights[2] = 0.25;
        artifact_with(weights, -3.0, ThresholdSet { med: 0.4, high: 0.7 })
    }

    fn artifact_with(weights: Vec<f32>, bias: f32, thresholds: ThresholdSet) -> LoadedArtifact {
        let contract = FeatureContract::churn_default();
        let feature_order = contract.feature_order();
        let dim = feature_order.len();
        let model = StoredModel::LogRegV1(LogRegModel {
            model_version: 1,
            feature_len_f32: dim,
            mean: vec![0.0; dim],
            scale: vec![1.0; dim],
            weights,
            bias,
            temperature: 1.0,
        });
        let metadata = ModelMetadata {
            version: "risk-2024-01-01-000000-logreg".to_string(),
            feature_order,
            encoders: contract.encoders(),
            thresholds,
            metrics: EvaluationMetrics {
                auc_roc: 0.8,
                auc_pr: 0.5,
                brier: 0.1,
                positive_rate: 0.2,
                samples: 10,
                degenerate: false,
            },
            training_samples: 40,
            model_kind: None,
            trained_from: None,
            trained_to: None,
            validation_samples: None,
            created_at: None,
            low_confidence: false,
        };
        LoadedArtifact { model, metadata }
    }

    fn service() -> ScoringService {
        ScoringService::new(artifact(), ServiceOptions::default())
    }

    #[test]
    fn empty_or_absent_features_are_rejected() {
        let service = service();
        assert!(matches!(
            service.score("u1", &FeatureSnapshot::new()),
            Err(ScoreError::InvalidRequest(_))
        ));
        let request = ScoreRequest {
            user_id: "u1".to_string(),
            features: None,
        };
        assert!(matches!(
            service.score_request(&request),
            Err(ScoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn inactive_customer_is_high_risk_with_reasons() {
        let snapshot = FeatureSnapshot::new()
            .with("time_since_last_use_days", 30.0)
            .with("activity_7d", 0.0)
            .with("usage_score", 0.9);
        let response = service().score("u1", &snapshot).unwrap();
        // sigmoid(-3 + 7.5) ~= 0.989
        assert!(response.risk > 0.98);
        assert_eq!(response.tier, RiskTier::High);
        assert_eq!(
            response.reasons,
            vec![ReasonTag::Inactive14d, ReasonTag::NoRecentActivity]
        );
        assert_eq!(response.model_version, "risk-2024-01-01-000000-logreg");
    }

    #[test]
    fn defaults_are_visible_to_reasons() {
        let snapshot = FeatureSnapshot::new().with("activity_7d", 3.0);
        let response = service().score("u2", &snapshot).unwrap();
        assert_eq!(response.tier, RiskTier::Low);
        // usage_score is padded with 0 and therefore counts as low usage.
        assert_eq!(response.reasons, vec![ReasonTag::LowFeatureUsage]);
    }

    #[test]
    fn risk_is_rounded_and_wire_names_are_camel_case() {
        let snapshot = FeatureSnapshot::new().with("time_since_last_use_days", 12.0);
        let response = service().score("u3", &snapshot).unwrap();
        assert_eq!(response.risk, round_risk(response.risk));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("modelVersion").is_some());
        assert_eq!(json["tier"], "med");

        let health = serde_json::to_value(service().health()).unwrap();
        assert_eq!(health["ok"], true);
        assert_eq!(health["modelVersion"], "risk-2024-01-01-000000-logreg");
    }

    #[test]
    fn non_finite_inputs_keep_risk_in_range() {
        let request: ScoreRequest = serde_json::from_str(
            r#"{"userId":"u5","features":{"activity_7d":"NaN","tickets_7d":1e300,"time_since_last_use_days":1e300}}"#,
        )
        .unwrap();
        let response = service().score_request(&request).unwrap();
        assert!((0.0..=1.0).contains(&response.risk));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["risk"].is_f64());
        assert_eq!(response.tier, RiskTier::High);
    }

    #[test]
    fn non_finite_score_is_rejected() {
        let dim = FeatureContract::churn_default().feature_order().len();
        let mut weights = vec![0.0f32; dim];
        weights[2] = f32::MAX;
        weights[3] = -f32::MAX;
        let service = ScoringService::new(
            artifact_with(weights, 0.0, ThresholdSet { med: 0.4, high: 0.7 }),
            ServiceOptions::default(),
        );
        let snapshot = FeatureSnapshot::new()
            .with("time_since_last_use_days", 1e300)
            .with("failed_renewals_30d", 1e300);
        assert!(matches!(
            service.score("u6", &snapshot),
            Err(ScoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn tier_uses_unrounded_probability() {
        // Constant model just under 0.7, which rounds up to 0.7.
        let target = 0.69999975f64;
        let bias = (target / (1.0 - target)).ln() as f32;
        let dim = FeatureContract::churn_default().feature_order().len();
        let exact = f64::from(sigmoid_bias(bias));
        assert!(round_risk(exact) > exact);

        let high = round_risk(exact);
        let service = ScoringService::new(
            artifact_with(vec![0.0; dim], bias, ThresholdSet { med: 0.4, high }),
            ServiceOptions::default(),
        );
        let response = service
            .score("u7", &FeatureSnapshot::new().with("activity_7d", 1.0))
            .unwrap();
        assert_eq!(response.risk, high);
        assert_eq!(response.tier, RiskTier::Med);
    }

    fn sigmoid_bias(bias: f32) -> f32 {
        let dim = FeatureContract::churn_default().feature_order().len();
        artifact_with(vec![0.0; dim], bias, ThresholdSet { med: 0.4, high: 0.7 })
            .model
            .score(&vec![0.0; dim])
    }

    #[test]
    fn request_deserializes_mixed_feature_values() {
        let request: ScoreRequest = serde_json::from_str(
            r#"{"userId":"u9","features":{"region":"BR","activity_7d":2,"usage_score":"0.1"}}"#,
        )
        .unwrap();
        let response = service().score_request(&request).unwrap();
        assert_eq!(response.reasons, vec![ReasonTag::LowFeatureUsage]);
    }

    #[test]
    fn shared_service_scores_concurrently() {
        let service = Arc::new(service());
        let snapshot = FeatureSnapshot::new().with("time_since_last_use_days", 12.0);
        let expected = service.score("u", &snapshot).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let snapshot = snapshot.clone();
                std::thread::spawn(move || service.score("u", &snapshot).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
