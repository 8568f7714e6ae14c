//! Evaluation metrics for binary churn classifiers.

use serde::{Deserialize, Serialize};

/// AUC reported when the labels contain a single class.
pub const NEUTRAL_AUC: f64 = 0.5;

/// 2x2 confusion matrix (`truth * 2 + predicted`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub counts: [u32; 4],
}

impl ConfusionMatrix {
    pub fn add(&mut self, truth: u8, predicted: u8) {
        if truth > 1 || predicted > 1 {
            return;
        }
        let idx = truth as usize * 2 + predicted as usize;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: u8, predicted: u8) -> u32 {
        self.counts[truth as usize * 2 + predicted as usize]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Rows are truth, columns are predictions.
    pub fn rows(&self) -> [[u32; 2]; 2] {
        [
            [self.get(0, 0), self.get(0, 1)],
            [self.get(1, 0), self.get(1, 1)],
        ]
    }
}

/// Threshold-free summary stored in artifact metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub auc_roc: f64,
    pub auc_pr: f64,
    pub brier: f64,
    #[serde(default)]
    pub positive_rate: f64,
    #[serde(default)]
    pub samples: usize,
    /// Labels held a single class, so the AUCs are neutral defaults.
    #[serde(default)]
    pub degenerate: bool,
}

/// Metrics at a fixed probability cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub cutoff: f32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: [[u32; 2]; 2],
}

/// Compute AUC-ROC, average precision and Brier score.
///
/// With a single label class the ranking metrics fall back to
/// [`NEUTRAL_AUC`] and the base rate, and the result is flagged degenerate.
pub fn evaluate(labels: &[u8], probs: &[f32]) -> EvaluationMetrics {
    let n = labels.len().min(probs.len());
    let labels = &labels[..n];
    let probs = &probs[..n];
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let positive_rate = if n == 0 { 0.0 } else { positives as f64 / n as f64 };
    let brier = brier_score(labels, probs);

    if positives == 0 || positives == n {
        return EvaluationMetrics {
            auc_roc: NEUTRAL_AUC,
            auc_pr: positive_rate,
            brier,
            positive_rate,
            samples: n,
            degenerate: true,
        };
    }
    EvaluationMetrics {
        auc_roc: auc_roc(labels, probs),
        auc_pr: average_precision(labels, probs),
        brier,
        positive_rate,
        samples: n,
        degenerate: false,
    }
}

/// Accuracy, precision, recall and F1 for `prob >= cutoff` predictions.
pub fn classification_at(labels: &[u8], probs: &[f32], cutoff: f32) -> ClassificationReport {
    let mut cm = ConfusionMatrix::default();
    for (&truth, &p) in labels.iter().zip(probs) {
        cm.add(truth, u8::from(p >= cutoff));
    }
    let tp = cm.get(1, 1) as f64;
    let fp = cm.get(0, 1) as f64;
    let fn_ = cm.get(1, 0) as f64;
    let total = cm.total() as f64;
    let accuracy = if total == 0.0 {
        0.0
    } else {
        (tp + cm.get(0, 0) as f64) / total
    };
    let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
    let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassificationReport {
        cutoff,
        accuracy,
        precision,
        recall,
        f1_score,
        confusion_matrix: cm.rows(),
    }
}

fn brier_score(labels: &[u8], probs: &[f32]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let sum: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let d = p as f64 - y as f64;
            d * d
        })
        .sum();
    sum / labels.len() as f64
}

/// Rank-based AUC (Mann-Whitney U) with tied scores sharing their mean rank.
fn auc_roc(labels: &[u8], probs: &[f32]) -> f64 {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));
    let mut rank_sum_pos = 0.0f64;
    let mut i = 0usize;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] == 1 {
                rank_sum_pos += mean_rank;
            }
        }
        i = j + 1;
    }
    let pos = labels.iter().filter(|&&y| y == 1).count() as f64;
    let neg = labels.len() as f64 - pos;
    (rank_sum_pos - pos * (pos + 1.0) / 2.0) / (pos * neg)
}

/// Average precision: precision at each distinct score weighted by recall gain.
fn average_precision(labels: &[u8], probs: &[f32]) -> f64 {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    let total_pos = labels.iter().filter(|&&y| y == 1).count() as f64;
    let mut tp = 0.0f64;
    let mut seen = 0.0f64;
    let mut prev_recall = 0.0f64;
    let mut ap = 0.0f64;
    let mut i = 0usize;
    while i < order.len() {
        let score = probs[order[i]];
        while i < order.len() && probs[order[i]] == score {
            seen += 1.0;
            if labels[order[i]] == 1 {
                tp += 1.0;
            }
            i += 1;
        }
        let recall = tp / total_pos;
        ap += (recall - prev_recall) * (tp / seen);
        prev_recall = recall;
    }
    ap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ranking_scores_one() {
        let labels = [0, 0, 1, 1];
        let probs = [0.1, 0.2, 0.8, 0.9];
        let metrics = evaluate(&labels, &probs);
        assert!((metrics.auc_roc - 1.0).abs() < 1e-12);
        assert!((metrics.auc_pr - 1.0).abs() < 1e-12);
        assert!(!metrics.degenerate);
        assert_eq!(metrics.samples, 4);
    }

    #[test]
    fn auc_handles_ties_and_partial_order() {
        // One inversion out of four positive/negative pairs.
        let labels = [0, 1, 0, 1];
        let probs = [0.1, 0.3, 0.4, 0.9];
        assert!((auc_roc(&labels, &probs) - 0.75).abs() < 1e-12);
        let tied = [0.5f32; 4];
        assert!((auc_roc(&labels, &tied) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn average_precision_matches_hand_computation() {
        let labels = [1, 0, 1, 0];
        let probs = [0.9, 0.8, 0.7, 0.1];
        // Recall 0.5 at precision 1, recall 1.0 at precision 2/3.
        let expected = 0.5 * 1.0 + 0.5 * (2.0 / 3.0);
        assert!((average_precision(&labels, &probs) - expected).abs() < 1e-12);
    }

    #[test]
    fn single_class_falls_back_to_neutral_defaults() {
        let metrics = evaluate(&[1, 1, 1], &[0.2, 0.6, 0.9]);
        assert!(metrics.degenerate);
        assert_eq!(metrics.auc_roc, NEUTRAL_AUC);
        assert_eq!(metrics.auc_pr, 1.0);
        let expected_brier = (0.64 + 0.16 + 0.01) / 3.0;
        assert!((metrics.brier - expected_brier).abs() < 1e-6);

        let empty = evaluate(&[], &[]);
        assert!(empty.degenerate);
        assert_eq!(empty.brier, 0.0);
    }

    #[test]
    fn classification_report_counts_cutoff_inclusively() {
        let report = classification_at(&[0, 0, 1, 1], &[0.2, 0.5, 0.5, 0.9], 0.5);
        assert_eq!(report.confusion_matrix, [[1, 1], [0, 2]]);
        assert!((report.accuracy - 0.75).abs() < 1e-12);
        assert!((report.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.recall, 1.0);
    }

    #[test]
    fn zero_division_reports_zero() {
        let report = classification_at(&[0, 0], &[0.1, 0.2], 0.5);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.f1_score, 0.0);
    }
}
