//! Churn risk scoring: feature contract, versioned model registry, threshold
//! calibration, tier and reason rules, online scoring and offline training.
/// Application directory resolution.
pub mod app_dirs;
/// Crash-safe file writes.
pub mod atomic_file;
/// Quantile-based tier thresholds.
pub mod calibration;
/// Shared helpers for the command-line tools.
pub mod cli;
/// TOML configuration.
pub mod config;
/// Offline evaluation reports.
pub mod evaluation;
/// Feature schema and vectorization.
pub mod features;
/// HTTP client helpers.
pub mod http_client;
/// Logging setup.
pub mod logging;
/// Classifiers and metrics.
pub mod ml;
/// Versioned model artifact store.
pub mod registry;
/// Online scoring.
pub mod scoring;
/// Offline training pipeline.
pub mod training;
