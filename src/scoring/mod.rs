//! Online scoring: probability, tier and rule-based reasons for one request.

pub mod reasons;
mod service;
pub mod tier;

pub use reasons::{MAX_REASONS, REASON_RULES, ReasonRule, ReasonTag, rule_based_reasons};
pub use service::{
    HealthResponse, ScoreError, ScoreRequest, ScoreResponse, ScoringService, ServiceOptions,
};
pub use tier::{RiskTier, TierDistribution};
