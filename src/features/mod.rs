//! Canonical feature schema shared by training and serving.
//!
//! A schema is an ordered list of slot names: numeric passthrough slots
//! first, then one one-hot slot per categorical value named
//! `<field>__<value>`. Training derives the order from a [`FeatureContract`]
//! and freezes it into the artifact metadata; serving only ever reads it back
//! from there.

mod snapshot;
mod vectorize;

pub use snapshot::{FeatureSnapshot, FeatureValue};
pub use vectorize::{Slot, Vectorizer, parse_slot, vectorize};

use serde::{Deserialize, Serialize};

/// Separator between a categorical field and its value in a one-hot slot name.
pub const ONE_HOT_SEPARATOR: &str = "__";
/// Categorical field carrying the customer region.
pub const REGION_FIELD: &str = "region";
/// Region substituted for missing or out-of-vocabulary values.
pub const DEFAULT_REGION: &str = "US";
/// Closed region vocabulary, in one-hot column order.
pub const REGION_VOCAB: &[&str] = &["IN", "SG", "US", "EU"];
/// Numeric behavioral features, in column order.
pub const BASE_FEATURES: &[&str] = &[
    "activity_7d",
    "activity_30d",
    "time_since_last_use_days",
    "failed_renewals_30d",
    "tickets_7d",
    "tickets_30d",
    "plan_value",
    "usage_score",
];
/// Features a scoring request is padded with before vectorization.
pub const REQUIRED_FEATURES: &[&str] = &[
    "activity_7d",
    "activity_30d",
    "time_since_last_use_days",
    "failed_renewals_30d",
    "tickets_7d",
    "plan_value",
    "region",
    "usage_score",
];

/// Categorical vocabulary recorded next to the feature order in artifact metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoders {
    pub region_vocab: Vec<String>,
}

/// Numeric feature names plus one closed categorical vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    numeric: Vec<String>,
    category_field: String,
    vocabulary: Vec<String>,
}

impl FeatureContract {
    pub fn new(
        numeric: impl IntoIterator<Item = impl Into<String>>,
        category_field: impl Into<String>,
        vocabulary: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            numeric: numeric.into_iter().map(Into::into).collect(),
            category_field: category_field.into(),
            vocabulary: vocabulary.into_iter().map(Into::into).collect(),
        }
    }

    /// The churn feature set: [`BASE_FEATURES`] followed by region one-hots.
    pub fn churn_default() -> Self {
        Self::new(
            BASE_FEATURES.iter().copied(),
            REGION_FIELD,
            REGION_VOCAB.iter().copied(),
        )
    }

    pub fn numeric(&self) -> &[String] {
        &self.numeric
    }

    pub fn category_field(&self) -> &str {
        &self.category_field
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Ordered slot names: numeric features, then `<field>__<value>` per vocabulary entry.
    pub fn feature_order(&self) -> Vec<String> {
        self.numeric
            .iter()
            .cloned()
            .chain(
                self.vocabulary
                    .iter()
                    .map(|value| one_hot_name(&self.category_field, value)),
            )
            .collect()
    }

    pub fn encoders(&self) -> Encoders {
        Encoders {
            region_vocab: self.vocabulary.clone(),
        }
    }
}

/// Build the slot name for one categorical value.
pub fn one_hot_name(field: &str, value: &str) -> String {
    format!("{field}{ONE_HOT_SEPARATOR}{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn churn_order_puts_numeric_first_then_region_in_vocab_order() {
        let order = FeatureContract::churn_default().feature_order();
        assert_eq!(order.len(), BASE_FEATURES.len() + REGION_VOCAB.len());
        assert_eq!(&order[..BASE_FEATURES.len()], BASE_FEATURES);
        assert_eq!(
            &order[BASE_FEATURES.len()..],
            &["region__IN", "region__SG", "region__US", "region__EU"]
        );
    }

    #[test]
    fn encoders_mirror_vocabulary() {
        let contract = FeatureContract::new(["a"], "tier", ["x", "y"]);
        assert_eq!(contract.feature_order(), vec!["a", "tier__x", "tier__y"]);
        assert_eq!(contract.encoders().region_vocab, vec!["x", "y"]);
    }
}
