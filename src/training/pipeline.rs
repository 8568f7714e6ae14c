use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::source::{LabeledSnapshot, SnapshotSource, SourceError, TrainingWindow};
use super::split::{split_by_group, weekly_group_key};
use crate::calibration::{CalibrationError, CalibrationOptions, ThresholdSet, choose_thresholds};
use crate::features::{DEFAULT_REGION, FeatureContract, Vectorizer};
use crate::ml::metrics::{EvaluationMetrics, evaluate};
use crate::ml::{Classifier, FitOptions, ModelKind, TrainSet, fit};
use crate::registry::{ModelMetadata, ModelRegistry, RegistryError, generate_version};
use crate::scoring::TierDistribution;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("no labeled snapshots between {start} and {end}")]
    EmptyDataset { start: String, end: String },
    #[error("snapshots span {groups} week(s); a group-aware split needs at least 2")]
    InsufficientGroups { groups: usize },
    #[error("model fit failed: {0}")]
    Fit(String),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to format version timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub kind: ModelKind,
    pub fit: FitOptions,
    pub contract: FeatureContract,
    pub default_region: String,
    pub validation_fraction: f64,
    pub split_seed: u64,
    pub calibration: CalibrationOptions,
    pub version_prefix: String,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            kind: ModelKind::GbdtStumpV1,
            fit: FitOptions::default(),
            contract: FeatureContract::churn_default(),
            default_region: DEFAULT_REGION.to_string(),
            validation_fraction: 0.2,
            split_seed: 42,
            calibration: CalibrationOptions::default(),
            version_prefix: "risk".to_string(),
        }
    }
}

/// Outcome of one published training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub version: String,
    pub model_path: PathBuf,
    pub window: TrainingWindow,
    pub training_samples: usize,
    pub train_rows: usize,
    pub validation_samples: usize,
    pub train_groups: Vec<String>,
    pub validation_groups: Vec<String>,
    pub metrics: EvaluationMetrics,
    pub thresholds: ThresholdSet,
    /// Validation rows per tier under the new thresholds.
    pub validation_tiers: TierDistribution,
    pub low_confidence: bool,
}

/// Rows vectorized against one feature order, with their week keys.
#[derive(Debug, Clone, Default)]
pub struct PreparedDataset {
    pub data: TrainSet,
    pub groups: Vec<String>,
}

/// Vectorize rows exactly as serving will.
pub fn prepare_dataset(rows: &[LabeledSnapshot], vectorizer: &Vectorizer) -> PreparedDataset {
    let mut prepared = PreparedDataset::default();
    for row in rows {
        prepared.data.x.push(vectorizer.vectorize(&row.features));
        prepared.data.y.push(row.label);
        prepared.groups.push(weekly_group_key(row.snapshot_ts));
    }
    prepared
}

/// Offline batch job: fetch, split by week, fit, calibrate, publish.
pub struct TrainingPipeline<'a> {
    source: &'a dyn SnapshotSource,
    registry: &'a ModelRegistry,
    options: TrainingOptions,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(
        source: &'a dyn SnapshotSource,
        registry: &'a ModelRegistry,
        options: TrainingOptions,
    ) -> Self {
        Self {
            source,
            registry,
            options,
        }
    }

    pub fn run(&self, window: &TrainingWindow) -> Result<TrainingReport, TrainingError> {
        self.run_at(window, OffsetDateTime::now_utc())
    }

    /// Run with an explicit clock, which determines the published version.
    ///
    /// Nothing is written to the registry unless every step succeeds.
    pub fn run_at(
        &self,
        window: &TrainingWindow,
        now: OffsetDateTime,
    ) -> Result<TrainingReport, TrainingError> {
        let options = &self.options;
        info!("Fetching training snapshots from {}", self.source.describe());
        let rows = self.source.fetch(window)?;
        if rows.is_empty() {
            return Err(TrainingError::EmptyDataset {
                start: window.start.to_string(),
                end: window.end.to_string(),
            });
        }

        let feature_order = options.contract.feature_order();
        let vectorizer = Vectorizer::new(&feature_order, &options.default_region);
        let prepared = prepare_dataset(&rows, &vectorizer);
        let positives = prepared.data.y.iter().filter(|&&y| y == 1).count();
        info!(
            "Loaded {} snapshots ({positives} churned, {} retained)",
            rows.len(),
            rows.len() - positives
        );
        if positives == 0 || positives == rows.len() {
            warn!("Only one label class present in the training window");
        }

        let split = split_by_group(
            &prepared.groups,
            options.validation_fraction,
            options.split_seed,
        )
        .ok_or_else(|| TrainingError::InsufficientGroups {
            groups: prepared
                .groups
                .iter()
                .collect::<std::collections::HashSet<_>>()
                .len(),
        })?;
        let train = subset(&prepared.data, &split.train);
        let validation = subset(&prepared.data, &split.validation);
        info!(
            "Split {} train rows ({} weeks) / {} validation rows ({} weeks)",
            train.len(),
            split.train_groups.len(),
            validation.len(),
            split.validation_groups.len()
        );

        let model = fit(options.kind, &train, &options.fit).map_err(TrainingError::Fit)?;
        let probs: Vec<f32> = validation.x.iter().map(|row| model.score(row)).collect();
        let metrics = evaluate(&validation.y, &probs);
        if metrics.degenerate {
            warn!(
                "Validation split has a single label class; AUC falls back to {} and the artifact is flagged low confidence",
                metrics.auc_roc
            );
        }
        let thresholds = choose_thresholds(&probs, &options.calibration)?;

        let version = generate_version(&options.version_prefix, options.kind, now)?;
        let metadata = ModelMetadata {
            version: version.clone(),
            feature_order,
            encoders: options.contract.encoders(),
            thresholds,
            metrics: metrics.clone(),
            training_samples: rows.len(),
            model_kind: Some(options.kind),
            trained_from: Some(window.start.to_string()),
            trained_to: Some(window.end.to_string()),
            validation_samples: Some(validation.len()),
            created_at: now.format(&Rfc3339).ok(),
            low_confidence: metrics.degenerate,
        };
        let model_path = self.registry.save(&model, &metadata)?;
        info!(
            "Trained {version}: auc_roc={:.4} auc_pr={:.4} brier={:.4} thresholds med={:.4} high={:.4}",
            metrics.auc_roc, metrics.auc_pr, metrics.brier, thresholds.med, thresholds.high
        );

        Ok(TrainingReport {
            version,
            model_path,
            window: *window,
            training_samples: rows.len(),
            train_rows: train.len(),
            validation_samples: validation.len(),
            train_groups: split.train_groups,
            validation_groups: split.validation_groups,
            validation_tiers: TierDistribution::from_scores(&probs, &thresholds),
            low_confidence: metrics.degenerate,
            metrics,
            thresholds,
        })
    }
}

fn subset(data: &TrainSet, indices: &[usize]) -> TrainSet {
    TrainSet {
        x: indices.iter().map(|&i| data.x[i].clone()).collect(),
        y: indices.iter().map(|&i| data.y[i]).collect(),
    }
}
