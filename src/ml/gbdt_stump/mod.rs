//! Deterministic gradient-boosted decision-stump classifier.
//!
//! A lightweight boosted-tree baseline with logistic loss:
//! - Binary churn probability via a sigmoid over the boosted raw score.
//! - Histogram split search over a fixed number of bins.
//! - Reproducible JSON export/load through [`crate::ml::StoredModel`].

mod model;
mod train;

pub use model::{GbdtStumpModel, Stump};
pub use train::{TrainOptions, train_gbdt_stump};
