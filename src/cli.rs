//! Glue shared by the `churn-*` binaries: config loading, source selection
//! and operator-facing error messages.

use std::path::{Path, PathBuf};

use time::{Date, OffsetDateTime};

use crate::config::{self, ChurnConfig, TrainingSettings};
use crate::logging;
use crate::ml::ModelKind;
use crate::registry::{ModelRegistry, RegistryError};
use crate::training::{
    HttpSnapshotSource, JsonFileSnapshotSource, SnapshotSource, SourceError, TrainingError,
};

/// Config plus the registry it points at.
pub struct ToolContext {
    pub config: ChurnConfig,
    pub registry: ModelRegistry,
}

/// Install logging for `tool`, degrading to stderr when it cannot be set up.
pub fn init_logging(tool: &str) {
    if let Err(err) = logging::init(tool) {
        eprintln!("Logging disabled: {err}");
    }
}

/// Load `config_path` (or the default config file) and open its registry.
pub fn load_context(config_path: Option<&Path>) -> Result<ToolContext, String> {
    let config = match config_path {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| format!("{err}\nHint: fix or remove the config file."))?;
    let root = config
        .registry
        .resolve_model_dir()
        .map_err(|err| err.to_string())?;
    Ok(ToolContext {
        registry: ModelRegistry::new(root),
        config,
    })
}

/// A file source when `file` is given, otherwise the configured HTTP export.
pub fn snapshot_source(
    settings: &TrainingSettings,
    file: Option<&Path>,
) -> Result<Box<dyn SnapshotSource>, String> {
    if let Some(path) = file {
        return Ok(Box::new(JsonFileSnapshotSource::new(path)));
    }
    let url = settings.export_url.as_deref().ok_or_else(|| {
        "No snapshot source configured.\nHint: pass --source <file> or set [training] export_url in churn-risk.toml.".to_string()
    })?;
    Ok(Box::new(HttpSnapshotSource::new(
        url,
        settings.tenant_id.clone(),
        std::time::Duration::from_secs(settings.request_timeout_secs.max(1)),
    )))
}

pub fn parse_date(value: &str) -> Result<Date, String> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(value, format).map_err(|_| format!("Invalid date {value:?}; expected YYYY-MM-DD"))
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Value following `args[*idx]`, advancing the cursor.
pub fn take_value<'a>(args: &'a [String], idx: &mut usize, flag: &str) -> Result<&'a str, String> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

pub fn parse_flag<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

/// Accepts the version tag (`gbdt`, `logreg`) or the stored kind name.
pub fn parse_model_kind(value: &str) -> Result<ModelKind, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "gbdt" | "gbdt_stump_v1" => Ok(ModelKind::GbdtStumpV1),
        "logreg" | "log_reg_v1" => Ok(ModelKind::LogRegV1),
        other => Err(format!("Unknown model kind: {other} (expected gbdt or logreg)")),
    }
}

/// Error text with a concrete next step for the operator.
pub fn describe_registry_error(err: &RegistryError) -> String {
    let hint = match err {
        RegistryError::NotFound { .. } => {
            "train a model first with `churn-train`, or check [registry] model_dir"
        }
        RegistryError::SchemaMismatch { .. } => {
            "the artifact is incomplete or corrupt; retrain, or pick another version from `churn-models list`"
        }
        RegistryError::AlreadyExists { .. } => {
            "versions are stamped to the second; rerun in a moment"
        }
        RegistryError::InvalidVersion { .. } => "see `churn-models list` for valid versions",
        RegistryError::Io { .. } | RegistryError::Json { .. } => {
            "check that the model store is readable and writable"
        }
    };
    format!("{err}\nHint: {hint}.")
}

pub fn describe_training_error(err: &TrainingError) -> String {
    let hint = match err {
        TrainingError::Registry(inner) => return describe_registry_error(inner),
        TrainingError::Source(SourceError::UpstreamDataUnavailable(_)) => {
            "check the export service, the tenant id and the requested window"
        }
        TrainingError::Source(SourceError::Http { .. }) => {
            "check that [training] export_url is reachable and the backend is running"
        }
        TrainingError::Source(SourceError::Decode(_)) | TrainingError::Source(SourceError::Io { .. }) => {
            "check that the snapshot data is a JSON array or JSON lines of {userId, snapshot_ts, features, label}"
        }
        TrainingError::EmptyDataset { .. } => {
            "widen the window with --days or --end, or check that the tenant has labeled snapshots"
        }
        TrainingError::InsufficientGroups { .. } => {
            "use a window spanning at least two calendar weeks"
        }
        TrainingError::Fit(_) => "inspect the snapshot features for inconsistent values",
        TrainingError::Calibration(_) => "check [training] med_quantile and high_quantile",
        TrainingError::Timestamp(_) => "check the system clock",
    };
    format!("{err}\nHint: {hint}.")
}

/// Report directory from config, or `<app root>/test_results`.
pub fn report_dir(config: &ChurnConfig, explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(dir) = explicit.or_else(|| config.evaluation.report_dir.clone()) {
        return Ok(dir);
    }
    crate::app_dirs::reports_dir().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_parse_strictly() {
        assert_eq!(
            parse_date("2024-03-31").unwrap(),
            time::macros::date!(2024 - 03 - 31)
        );
        assert!(parse_date("31/03/2024").is_err());
    }

    #[test]
    fn take_value_advances_and_reports_missing() {
        let args = vec!["--days".to_string(), "30".to_string(), "--end".to_string()];
        let mut idx = 0;
        assert_eq!(take_value(&args, &mut idx, "--days").unwrap(), "30");
        assert_eq!(idx, 1);
        let mut idx = 2;
        assert_eq!(
            take_value(&args, &mut idx, "--end").unwrap_err(),
            "--end requires a value"
        );
        assert_eq!(parse_flag::<u32>("30", "--days"), Ok(30));
        assert!(parse_flag::<u32>("x", "--days").is_err());
    }

    #[test]
    fn model_kinds_accept_tags_and_names() {
        assert_eq!(parse_model_kind("GBDT"), Ok(ModelKind::GbdtStumpV1));
        assert_eq!(parse_model_kind("log_reg_v1"), Ok(ModelKind::LogRegV1));
        assert!(parse_model_kind("mlp").is_err());
    }

    #[test]
    fn hints_name_the_next_step() {
        let err = RegistryError::NotFound {
            requested: "latest".to_string(),
            root: PathBuf::from("/tmp/store"),
        };
        assert!(describe_registry_error(&err).contains("churn-train"));
        let err = TrainingError::InsufficientGroups { groups: 1 };
        assert!(describe_training_error(&err).contains("two calendar weeks"));
    }

    #[test]
    fn missing_export_url_points_at_config() {
        let settings = TrainingSettings::default();
        let message = snapshot_source(&settings, None).err().unwrap();
        assert!(message.contains("export_url"));
        assert!(snapshot_source(&settings, Some(Path::new("rows.json"))).is_ok());
    }
}
