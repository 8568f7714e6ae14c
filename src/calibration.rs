//! Decision thresholds derived from a validation score distribution.
//!
//! Training and offline evaluation both go through [`choose_thresholds`];
//! serving only reads the frozen [`ThresholdSet`] from artifact metadata.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default quantile of validation scores that starts the `med` tier.
pub const DEFAULT_MED_QUANTILE: f64 = 0.60;
/// Default quantile of validation scores that starts the `high` tier.
pub const DEFAULT_HIGH_QUANTILE: f64 = 0.85;

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no validation scores to calibrate against")]
    NoScores,
    #[error("invalid quantiles med={med_q} high={high_q} (expected 0 <= med <= high <= 1)")]
    InvalidQuantiles { med_q: f64, high_q: f64 },
    #[error("validation scores contain a non-finite value")]
    NonFiniteScore,
}

/// Two probability cut points with `med <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub med: f64,
    pub high: f64,
}

impl ThresholdSet {
    pub fn validate(&self) -> Result<(), String> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.med) || !in_range(self.high) {
            return Err(format!(
                "thresholds must lie in [0, 1] (med={}, high={})",
                self.med, self.high
            ));
        }
        if self.med > self.high {
            return Err(format!(
                "med threshold {} exceeds high threshold {}",
                self.med, self.high
            ));
        }
        Ok(())
    }
}

/// Target quantiles for the two cut points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOptions {
    pub med_q: f64,
    pub high_q: f64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            med_q: DEFAULT_MED_QUANTILE,
            high_q: DEFAULT_HIGH_QUANTILE,
        }
    }
}

/// Thresholds at the configured quantiles of `probs`.
///
/// Label diversity is not required; only the score distribution matters.
pub fn choose_thresholds(
    probs: &[f32],
    options: &CalibrationOptions,
) -> Result<ThresholdSet, CalibrationError> {
    let CalibrationOptions { med_q, high_q } = *options;
    if !(0.0..=1.0).contains(&med_q) || !(0.0..=1.0).contains(&high_q) || med_q > high_q {
        return Err(CalibrationError::InvalidQuantiles { med_q, high_q });
    }
    if probs.is_empty() {
        return Err(CalibrationError::NoScores);
    }
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(CalibrationError::NonFiniteScore);
    }
    let mut sorted: Vec<f64> = probs.iter().map(|&p| p as f64).collect();
    sorted.sort_by(f64::total_cmp);
    Ok(ThresholdSet {
        med: quantile_sorted(&sorted, med_q),
        high: quantile_sorted(&sorted, high_q),
    })
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
