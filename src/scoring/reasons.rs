use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::FeatureSnapshot;

/// Maximum number of reasons attached to a score.
pub const MAX_REASONS: usize = 3;

/// Human-readable explanation tag, derived from raw features only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    #[serde(rename = "inactive_14d")]
    Inactive14d,
    PaymentIssueRecent,
    NoRecentActivity,
    LowFeatureUsage,
    GeneralRiskFactors,
}

impl ReasonTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive14d => "inactive_14d",
            Self::PaymentIssueRecent => "payment_issue_recent",
            Self::NoRecentActivity => "no_recent_activity",
            Self::LowFeatureUsage => "low_feature_usage",
            Self::GeneralRiskFactors => "general_risk_factors",
        }
    }
}

impl fmt::Display for ReasonTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One auditable rule: a tag and the feature condition that triggers it.
pub struct ReasonRule {
    pub tag: ReasonTag,
    pub feature: &'static str,
    pub description: &'static str,
    matches: fn(&FeatureSnapshot) -> bool,
}

impl ReasonRule {
    pub fn matches(&self, snapshot: &FeatureSnapshot) -> bool {
        (self.matches)(snapshot)
    }
}

/// Rules in priority order.
pub const REASON_RULES: &[ReasonRule] = &[
    ReasonRule {
        tag: ReasonTag::Inactive14d,
        feature: "time_since_last_use_days",
        description: "time_since_last_use_days >= 14",
        matches: |s| s.numeric_or("time_since_last_use_days", 0.0) >= 14.0,
    },
    ReasonRule {
        tag: ReasonTag::PaymentIssueRecent,
        feature: "failed_renewals_30d",
        description: "failed_renewals_30d >= 1",
        matches: |s| s.numeric_or("failed_renewals_30d", 0.0) >= 1.0,
    },
    ReasonRule {
        tag: ReasonTag::NoRecentActivity,
        feature: "activity_7d",
        description: "activity_7d == 0",
        matches: |s| s.numeric_or("activity_7d", 0.0) == 0.0,
    },
    ReasonRule {
        tag: ReasonTag::LowFeatureUsage,
        feature: "usage_score",
        description: "usage_score < 0.3",
        matches: |s| s.numeric_or("usage_score", 1.0) < 0.3,
    },
];

/// Up to [`MAX_REASONS`] matching tags in priority order, or
/// `general_risk_factors` when nothing matches.
pub fn rule_based_reasons(snapshot: &FeatureSnapshot) -> Vec<ReasonTag> {
    let mut reasons: Vec<ReasonTag> = REASON_RULES
        .iter()
        .filter(|rule| rule.matches(snapshot))
        .map(|rule| rule.tag)
        .take(MAX_REASONS)
        .collect();
    if reasons.is_empty() {
        reasons.push(ReasonTag::GeneralRiskFactors);
    }
    reasons
}

/// The rule that produces `tag`, if any.
pub fn rule_for(tag: ReasonTag) -> Option<&'static ReasonRule> {
    REASON_RULES.iter().find(|rule| rule.tag == tag)
}
