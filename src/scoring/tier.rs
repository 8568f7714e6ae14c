use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calibration::ThresholdSet;

/// Discrete risk bucket shown to customer-success staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Med,
    High,
}

impl RiskTier {
    /// `high` at or above `thresholds.high`, `med` at or above `thresholds.med`, else `low`.
    pub fn from_probability(risk: f64, thresholds: &ThresholdSet) -> Self {
        if risk >= thresholds.high {
            Self::High
        } else if risk >= thresholds.med {
            Self::Med
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of scores per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub low: usize,
    pub med: usize,
    pub high: usize,
}

impl TierDistribution {
    pub fn from_scores(scores: &[f32], thresholds: &ThresholdSet) -> Self {
        let mut out = Self::default();
        for &score in scores {
            out.record(RiskTier::from_probability(score as f64, thresholds));
        }
        out
    }

    pub fn record(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Low => self.low += 1,
            RiskTier::Med => self.med += 1,
            RiskTier::High => self.high += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.med + self.high
    }
}
