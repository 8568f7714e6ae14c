use std::collections::BTreeMap;

use super::{FeatureSnapshot, ONE_HOT_SEPARATOR};

/// Interpretation of one schema slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'a> {
    /// Numeric passthrough of the named feature.
    Numeric(&'a str),
    /// `1.0` iff `field` equals `value`.
    OneHot { field: &'a str, value: &'a str },
}

/// Classify a slot name; `<field>__<value>` is one-hot, anything else numeric.
pub fn parse_slot(name: &str) -> Slot<'_> {
    match name.split_once(ONE_HOT_SEPARATOR) {
        Some((field, value)) if !field.is_empty() && !value.is_empty() => {
            Slot::OneHot { field, value }
        }
        _ => Slot::Numeric(name),
    }
}

/// Vectorizer compiled from a stored feature order.
///
/// The vocabulary of each categorical field is the set of values that appear
/// in the schema itself, so a value the artifact was not trained on falls
/// back to the default category instead of producing an all-zero group.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    feature_order: Vec<String>,
    vocabularies: BTreeMap<String, Vec<String>>,
    default_category: String,
}

impl Vectorizer {
    pub fn new(feature_order: &[String], default_category: &str) -> Self {
        let mut vocabularies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in feature_order {
            if let Slot::OneHot { field, value } = parse_slot(name) {
                vocabularies
                    .entry(field.to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
        Self {
            feature_order: feature_order.to_vec(),
            vocabularies,
            default_category: default_category.to_string(),
        }
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn len(&self) -> usize {
        self.feature_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_order.is_empty()
    }

    /// Map a snapshot to a vector with one entry per schema slot.
    pub fn vectorize(&self, snapshot: &FeatureSnapshot) -> Vec<f32> {
        let mut resolved: BTreeMap<&str, &str> = BTreeMap::new();
        for (field, vocabulary) in &self.vocabularies {
            resolved.insert(
                field.as_str(),
                snapshot.category_or(field, vocabulary.as_slice(), &self.default_category),
            );
        }
        self.feature_order
            .iter()
            .map(|name| match parse_slot(name) {
                Slot::Numeric(feature) => snapshot
                    .numeric_or(feature, 0.0)
                    .clamp(f64::from(f32::MIN), f64::from(f32::MAX))
                    as f32,
                Slot::OneHot { field, value } => {
                    if resolved.get(field).copied() == Some(value) {
                        1.0
                    } else {
                        0.0
                    }
                }
            })
            .collect()
    }
}

/// One-shot vectorization against `feature_order`.
pub fn vectorize(
    snapshot: &FeatureSnapshot,
    feature_order: &[String],
    default_category: &str,
) -> Vec<f32> {
    Vectorizer::new(feature_order, default_category).vectorize(snapshot)
}
