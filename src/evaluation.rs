//! Offline evaluation of a published artifact against labeled snapshots.
//!
//! Every row goes through [`ScoringService::score`], so probabilities, tiers
//! and reasons are exactly what serving would return for the same input.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::{info, warn};

use crate::atomic_file;
use crate::calibration::{CalibrationOptions, ThresholdSet, choose_thresholds};
use crate::features::{FeatureSnapshot, Slot, parse_slot};
use crate::ml::Classifier;
use crate::ml::metrics::{ClassificationReport, EvaluationMetrics, classification_at, evaluate};
use crate::scoring::reasons::rule_for;
use crate::scoring::{REASON_RULES, ReasonTag, ScoringService, TierDistribution};
use crate::training::{LabeledSnapshot, TrainingWindow};

/// Probability cutoff for the accuracy/precision/recall section.
pub const REPORT_CUTOFF: f32 = 0.5;
const TOP_FEATURES: usize = 5;
const REPORT_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceGrade {
    #[serde(rename = "EXCELLENT")]
    Excellent,
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "FAIR")]
    Fair,
    #[serde(rename = "NEEDS IMPROVEMENT")]
    NeedsImprovement,
}

impl PerformanceGrade {
    pub fn from_auc(auc_roc: f64) -> Self {
        if auc_roc >= 0.8 {
            Self::Excellent
        } else if auc_roc >= 0.7 {
            Self::Good
        } else if auc_roc >= 0.6 {
            Self::Fair
        } else {
            Self::NeedsImprovement
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataGrade {
    #[serde(rename = "CLEAN")]
    Clean,
    #[serde(rename = "MINOR ISSUES")]
    MinorIssues,
    #[serde(rename = "NEEDS ATTENTION")]
    NeedsAttention,
}

impl DataGrade {
    pub fn from_missing_fields(fields: usize) -> Self {
        match fields {
            0 => Self::Clean,
            1..=2 => Self::MinorIssues,
            _ => Self::NeedsAttention,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleGrade {
    #[serde(rename = "EXCELLENT")]
    Excellent,
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "NEEDS REVIEW")]
    NeedsReview,
}

impl RuleGrade {
    pub fn from_pass_rate(rate: f64) -> Self {
        if rate >= 0.95 {
            Self::Excellent
        } else if rate >= 0.90 {
            Self::Good
        } else {
            Self::NeedsReview
        }
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::NeedsImprovement => "NEEDS IMPROVEMENT",
        })
    }
}

impl fmt::Display for DataGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "CLEAN",
            Self::MinorIssues => "MINOR ISSUES",
            Self::NeedsAttention => "NEEDS ATTENTION",
        })
    }
}

impl fmt::Display for RuleGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::NeedsReview => "NEEDS REVIEW",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `0` with fewer than two values.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub positive_samples: usize,
    pub negative_samples: usize,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub total_samples: usize,
    /// Rows lacking a usable value, per schema field; only fields with gaps appear.
    pub missing_data: BTreeMap<String, usize>,
    pub feature_stats: BTreeMap<String, FeatureStats>,
    pub label_distribution: LabelDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub metrics: EvaluationMetrics,
    pub at_cutoff: ClassificationReport,
    /// Rows with no features, which serving would reject.
    pub unscorable_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub user_id: String,
    pub rule: ReasonTag,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAudit {
    pub rules_tested: usize,
    pub rules_passed: usize,
    pub rules_pass_rate: f64,
    pub tag_counts: BTreeMap<String, usize>,
    pub failed_cases: Vec<RuleFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub ranked: Vec<(String, f32)>,
    pub top_5_features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallGrades {
    pub performance: PerformanceGrade,
    pub data_quality: DataGrade,
    pub business_rules: RuleGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_version: String,
    pub test_period_start: String,
    pub test_period_end: String,
    pub generated_at: String,
    pub data_quality: DataQualityReport,
    pub performance: PerformanceReport,
    pub thresholds: ThresholdSet,
    /// Thresholds the calibrator would choose on this data, for drift checks.
    pub recalibrated_thresholds: Option<ThresholdSet>,
    pub tier_distribution: TierDistribution,
    pub business_rules: RuleAudit,
    pub feature_analysis: FeatureImportance,
    pub overall_status: OverallGrades,
}

/// Evaluate `service`'s artifact on `rows` drawn from `window`.
pub fn evaluate_artifact(
    service: &ScoringService,
    rows: &[LabeledSnapshot],
    window: &TrainingWindow,
    calibration: &CalibrationOptions,
) -> EvaluationReport {
    let artifact = service.artifact();
    let metadata = &artifact.metadata;

    let mut labels = Vec::with_capacity(rows.len());
    let mut probs = Vec::with_capacity(rows.len());
    let mut tiers = TierDistribution::default();
    let mut audit = RuleAudit {
        rules_tested: 0,
        rules_passed: 0,
        rules_pass_rate: 0.0,
        tag_counts: BTreeMap::new(),
        failed_cases: Vec::new(),
    };
    let mut unscorable_rows = 0usize;

    for row in rows {
        let response = match service.score(&row.user_id, &row.features) {
            Ok(response) => response,
            Err(_) => {
                unscorable_rows += 1;
                continue;
            }
        };
        labels.push(row.label);
        probs.push(response.risk as f32);
        tiers.record(response.tier);
        audit_reasons(&mut audit, row, &service.filled(&row.features), &response.reasons);
    }
    if unscorable_rows > 0 {
        warn!("{unscorable_rows} evaluation rows could not be scored and were skipped");
    }
    audit.rules_pass_rate = if audit.rules_tested == 0 {
        0.0
    } else {
        audit.rules_passed as f64 / audit.rules_tested as f64
    };

    let metrics = evaluate(&labels, &probs);
    let at_cutoff = classification_at(&labels, &probs, REPORT_CUTOFF);
    let recalibrated_thresholds = choose_thresholds(&probs, calibration).ok();
    let data_quality = data_quality(rows, &metadata.feature_order);
    let feature_analysis = feature_importance(&metadata.feature_order, &artifact.model.feature_importances());

    let overall_status = OverallGrades {
        performance: PerformanceGrade::from_auc(metrics.auc_roc),
        data_quality: DataGrade::from_missing_fields(data_quality.missing_data.len()),
        business_rules: RuleGrade::from_pass_rate(audit.rules_pass_rate),
    };
    info!(
        "Evaluated {} on {} rows: auc_roc={:.3} ({}), data {}, rules {}",
        metadata.version,
        labels.len(),
        metrics.auc_roc,
        overall_status.performance,
        overall_status.data_quality,
        overall_status.business_rules
    );

    EvaluationReport {
        model_version: metadata.version.clone(),
        test_period_start: window.start.to_string(),
        test_period_end: window.end.to_string(),
        generated_at: OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        data_quality,
        performance: PerformanceReport {
            metrics,
            at_cutoff,
            unscorable_rows,
        },
        thresholds: metadata.thresholds,
        recalibrated_thresholds,
        tier_distribution: tiers,
        business_rules: audit,
        feature_analysis,
        overall_status,
    }
}

/// Check every emitted tag against its rule on the serving-side inputs.
fn audit_reasons(
    audit: &mut RuleAudit,
    row: &LabeledSnapshot,
    filled: &FeatureSnapshot,
    reasons: &[ReasonTag],
) {
    audit.rules_tested += 1;
    let mut passed = true;
    for &tag in reasons {
        *audit.tag_counts.entry(tag.to_string()).or_default() += 1;
        let consistent = match rule_for(tag) {
            Some(rule) => rule.matches(filled),
            None => !REASON_RULES.iter().any(|rule| rule.matches(filled)),
        };
        if !consistent {
            passed = false;
            audit.failed_cases.push(RuleFailure {
                user_id: row.user_id.clone(),
                rule: tag,
                expected: rule_for(tag)
                    .map(|rule| rule.description.to_string())
                    .unwrap_or_else(|| "no specific rule matches".to_string()),
            });
        }
    }
    if passed {
        audit.rules_passed += 1;
    }
}

fn data_quality(rows: &[LabeledSnapshot], feature_order: &[String]) -> DataQualityReport {
    let mut numeric: Vec<&str> = Vec::new();
    let mut categorical: Vec<&str> = Vec::new();
    for name in feature_order {
        match parse_slot(name) {
            Slot::Numeric(feature) => numeric.push(feature),
            Slot::OneHot { field, .. } => {
                if !categorical.contains(&field) {
                    categorical.push(field);
                }
            }
        }
    }

    let mut missing_data = BTreeMap::new();
    let mut feature_stats = BTreeMap::new();
    for &feature in &numeric {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.features.get(feature).and_then(|value| value.as_f64()))
            .collect();
        let missing = rows.len() - values.len();
        if missing > 0 {
            missing_data.insert(feature.to_string(), missing);
        }
        if let Some(stats) = summarize(&values) {
            feature_stats.insert(feature.to_string(), stats);
        }
    }
    for &field in &categorical {
        let missing = rows
            .iter()
            .filter(|row| row.features.get(field).and_then(|value| value.as_str()).is_none())
            .count();
        if missing > 0 {
            missing_data.insert(field.to_string(), missing);
        }
    }

    let positive_samples = rows.iter().filter(|row| row.label == 1).count();
    DataQualityReport {
        total_samples: rows.len(),
        missing_data,
        feature_stats,
        label_distribution: LabelDistribution {
            positive_samples,
            negative_samples: rows.len() - positive_samples,
            positive_rate: if rows.is_empty() {
                0.0
            } else {
                positive_samples as f64 / rows.len() as f64
            },
        },
    }
}

fn summarize(values: &[f64]) -> Option<FeatureStats> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count < 2 {
        0.0
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (count - 1) as f64).sqrt()
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(FeatureStats {
        count,
        mean,
        std,
        min,
        max,
    })
}

fn feature_importance(feature_order: &[String], importances: &[f32]) -> FeatureImportance {
    let mut ranked: Vec<(String, f32)> = feature_order
        .iter()
        .cloned()
        .zip(importances.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let top_5_features = ranked
        .iter()
        .take(TOP_FEATURES)
        .map(|(name, _)| name.clone())
        .collect();
    FeatureImportance {
        ranked,
        top_5_features,
    }
}

/// Write `report` as `test_report_<stamp>.json` into `dir`.
pub fn save_report(report: &EvaluationReport, dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = OffsetDateTime::now_utc()
        .format(REPORT_STAMP)
        .map_err(std::io::Error::other)?;
    let path = dir.join(format!("test_report_{stamp}.json"));
    let data = serde_json::to_vec_pretty(report).map_err(std::io::Error::other)?;
    atomic_file::write_atomic(&path, &data)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands() {
        assert_eq!(PerformanceGrade::from_auc(0.8), PerformanceGrade::Excellent);
        assert_eq!(PerformanceGrade::from_auc(0.75), PerformanceGrade::Good);
        assert_eq!(PerformanceGrade::from_auc(0.6), PerformanceGrade::Fair);
        assert_eq!(PerformanceGrade::from_auc(0.5), PerformanceGrade::NeedsImprovement);
        assert_eq!(DataGrade::from_missing_fields(0), DataGrade::Clean);
        assert_eq!(DataGrade::from_missing_fields(2), DataGrade::MinorIssues);
        assert_eq!(DataGrade::from_missing_fields(3), DataGrade::NeedsAttention);
        assert_eq!(RuleGrade::from_pass_rate(0.95), RuleGrade::Excellent);
        assert_eq!(RuleGrade::from_pass_rate(0.9), RuleGrade::Good);
        assert_eq!(RuleGrade::from_pass_rate(0.5), RuleGrade::NeedsReview);
        assert_eq!(PerformanceGrade::NeedsImprovement.to_string(), "NEEDS IMPROVEMENT");
    }

    #[test]
    fn summary_uses_sample_deviation() {
        let stats = summarize(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        assert!(summarize(&[]).is_none());
        assert_eq!(summarize(&[7.0]).unwrap().std, 0.0);
    }

    #[test]
    fn missing_fields_are_counted_per_schema_field() {
        let order = vec![
            "activity_7d".to_string(),
            "usage_score".to_string(),
            "region__US".to_string(),
            "region__EU".to_string(),
        ];
        let rows = vec![
            LabeledSnapshot {
                user_id: "a".into(),
                snapshot_ts: OffsetDateTime::UNIX_EPOCH,
                features: FeatureSnapshot::new().with("activity_7d", 1.0).with("region", "EU"),
                label: 1,
            },
            LabeledSnapshot {
                user_id: "b".into(),
                snapshot_ts: OffsetDateTime::UNIX_EPOCH,
                features: FeatureSnapshot::new().with("activity_7d", 3.0),
                label: 0,
            },
        ];
        let report = data_quality(&rows, &order);
        assert_eq!(report.missing_data.get("usage_score"), Some(&2));
        assert_eq!(report.missing_data.get("region"), Some(&1));
        assert!(!report.missing_data.contains_key("activity_7d"));
        assert_eq!(report.feature_stats["activity_7d"].mean, 2.0);
        assert_eq!(report.label_distribution.positive_rate, 0.5);
    }

    #[test]
    fn importance_ranking_is_descending() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranking = feature_importance(&order, &[0.1, 0.7, 0.2]);
        assert_eq!(ranking.top_5_features, vec!["b", "c", "a"]);
    }
}
