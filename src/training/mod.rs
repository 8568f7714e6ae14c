//! Offline training: snapshot ingestion, week-grouped split and publishing.

mod pipeline;
pub mod source;
pub mod split;

pub use pipeline::{
    PreparedDataset, TrainingError, TrainingOptions, TrainingPipeline, TrainingReport,
    prepare_dataset,
};
pub use source::{
    HttpSnapshotSource, JsonFileSnapshotSource, LabeledSnapshot, SnapshotSource, SourceError,
    TrainingWindow,
};
pub use split::{GroupSplit, split_by_group, weekly_group_key};
