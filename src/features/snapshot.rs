use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::REGION_FIELD;

/// Loosely-typed feature value as it arrives from producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric view; numeric strings are parsed, anything else is `None`.
    ///
    /// Non-finite values (`"NaN"`, `"inf"`) count as absent.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
        }
        .filter(|value| value.is_finite())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Number(_) => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Point-in-time feature bag for one customer.
///
/// All defaulting goes through [`FeatureSnapshot::numeric_or`] and
/// [`FeatureSnapshot::category_or`] so absent keys never fail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSnapshot {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable insert used by tests and tools.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.values.iter()
    }

    /// Numeric value of `name`, or `default` when absent or non-numeric.
    pub fn numeric_or(&self, name: &str, default: f64) -> f64 {
        self.values
            .get(name)
            .and_then(FeatureValue::as_f64)
            .unwrap_or(default)
    }

    /// Categorical value of `name` if it is in `vocabulary`, else `default`.
    pub fn category_or<'a, S: AsRef<str>>(
        &'a self,
        name: &str,
        vocabulary: &[S],
        default: &'a str,
    ) -> &'a str {
        match self.values.get(name).and_then(FeatureValue::as_str) {
            Some(value) if vocabulary.iter().any(|v| v.as_ref() == value) => value,
            _ => default,
        }
    }

    /// Insert defaults for every absent required feature.
    ///
    /// The region field defaults to `default_region`, everything else to `0`.
    /// Returns the names that were filled in.
    pub fn fill_defaults<S: AsRef<str>>(
        &mut self,
        required: &[S],
        default_region: &str,
    ) -> Vec<String> {
        let mut filled = Vec::new();
        for name in required {
            let name = name.as_ref();
            if self.values.contains_key(name) {
                continue;
            }
            let value = if name == REGION_FIELD {
                FeatureValue::Text(default_region.to_string())
            } else {
                FeatureValue::Number(0.0)
            };
            self.values.insert(name.to_string(), value);
            filled.push(name.to_string());
        }
        filled
    }
}

impl FromIterator<(String, FeatureValue)> for FeatureSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, FeatureValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, FeatureValue>> for FeatureSnapshot {
    fn from(values: BTreeMap<String, FeatureValue>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_or_parses_numeric_text_and_defaults_the_rest() {
        let snapshot = FeatureSnapshot::new()
            .with("a", 3.5)
            .with("b", "7")
            .with("c", "seven");
        assert_eq!(snapshot.numeric_or("a", 0.0), 3.5);
        assert_eq!(snapshot.numeric_or("b", 0.0), 7.0);
        assert_eq!(snapshot.numeric_or("c", 1.0), 1.0);
        assert_eq!(snapshot.numeric_or("missing", 0.0), 0.0);
    }

    #[test]
    fn non_finite_values_fall_back_to_default() {
        let snapshot = FeatureSnapshot::new()
            .with("nan", "NaN")
            .with("inf", " inf ")
            .with("neg", f64::NEG_INFINITY);
        assert_eq!(snapshot.numeric_or("nan", 0.0), 0.0);
        assert_eq!(snapshot.numeric_or("inf", 2.0), 2.0);
        assert_eq!(snapshot.numeric_or("neg", 1.0), 1.0);
    }

    #[test]
    fn category_outside_vocabulary_uses_default() {
        let vocab = ["IN", "US"];
        let known = FeatureSnapshot::new().with("region", "IN");
        let unknown = FeatureSnapshot::new().with("region", "BR");
        let numeric = FeatureSnapshot::new().with("region", 4.0);
        assert_eq!(known.category_or("region", &vocab, "US"), "IN");
        assert_eq!(unknown.category_or("region", &vocab, "US"), "US");
        assert_eq!(numeric.category_or("region", &vocab, "US"), "US");
        assert_eq!(FeatureSnapshot::new().category_or("region", &vocab, "US"), "US");
    }

    #[test]
    fn fill_defaults_only_touches_absent_keys() {
        let mut snapshot = FeatureSnapshot::new().with("activity_7d", 4.0);
        let filled = snapshot.fill_defaults(&["activity_7d", "region", "usage_score"], "US");
        assert_eq!(filled, vec!["region", "usage_score"]);
        assert_eq!(snapshot.numeric_or("activity_7d", -1.0), 4.0);
        assert_eq!(snapshot.get("region"), Some(&FeatureValue::Text("US".into())));
        assert_eq!(snapshot.get("usage_score"), Some(&FeatureValue::Number(0.0)));
    }

    #[test]
    fn deserializes_mixed_json_mapping() {
        let snapshot: FeatureSnapshot =
            serde_json::from_str(r#"{"activity_7d": 3, "region": "EU", "usage_score": 0.25}"#)
                .unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.numeric_or("activity_7d", 0.0), 3.0);
        assert_eq!(snapshot.get("region").and_then(FeatureValue::as_str), Some("EU"));
    }
}
