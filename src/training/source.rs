//! Labeled snapshot ingestion for training and offline evaluation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{info, warn};
use url::Url;

use crate::features::{FeatureSnapshot, FeatureValue};
use crate::http_client::{self, RetryConfig};

/// Upper bound on one export response.
const MAX_EXPORT_BYTES: usize = 256 * 1024 * 1024;
/// Labels at or above this value count as churned.
const LABEL_CUTOFF: f64 = 0.5;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream data unavailable: {0}")]
    UpstreamDataUnavailable(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        source: Box<ureq::Error>,
    },
    #[error("could not decode snapshot export: {0}")]
    Decode(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingWindow {
    pub start: Date,
    pub end: Date,
}

impl TrainingWindow {
    /// The `days`-day window whose last day is `end`.
    pub fn ending(end: Date, days: u32) -> Self {
        let span = time::Duration::days(i64::from(days.max(1)) - 1);
        let start = end.checked_sub(span).unwrap_or(Date::MIN);
        Self { start, end }
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        let day = ts.to_offset(time::UtcOffset::UTC).date();
        self.start <= day && day <= self.end
    }

    /// Midnight UTC of the last day, used for rows without a timestamp.
    pub fn end_timestamp(&self) -> OffsetDateTime {
        PrimitiveDateTime::new(self.end, Time::MIDNIGHT).assume_utc()
    }
}

/// One labeled training or evaluation row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSnapshot {
    pub user_id: String,
    pub snapshot_ts: OffsetDateTime,
    pub features: FeatureSnapshot,
    /// `1` churned, `0` retained.
    pub label: u8,
}

/// Anything that can return labeled snapshots for a window.
pub trait SnapshotSource {
    fn fetch(&self, window: &TrainingWindow) -> Result<Vec<LabeledSnapshot>, SourceError>;

    /// Short description for logs and reports.
    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "userId", alias = "user_id", default)]
    user_id: Value,
    #[serde(default)]
    snapshot_ts: Option<String>,
    #[serde(default)]
    features: BTreeMap<String, Value>,
    #[serde(default)]
    label: Value,
}

/// Snapshot export behind an HTTP endpoint.
pub struct HttpSnapshotSource {
    export_url: String,
    tenant_id: Option<String>,
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl HttpSnapshotSource {
    pub fn new(export_url: impl Into<String>, tenant_id: Option<String>, timeout: Duration) -> Self {
        Self {
            export_url: export_url.into(),
            tenant_id,
            agent: http_client::build_agent(timeout),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Export URL with window and tenant query parameters.
    pub fn request_url(&self, window: &TrainingWindow) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.export_url)
            .map_err(|err| SourceError::Decode(format!("invalid export URL {}: {err}", self.export_url)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("startDate", &window.start.to_string());
            query.append_pair("endDate", &window.end.to_string());
            if let Some(tenant) = &self.tenant_id {
                query.append_pair("tenantId", tenant);
            }
        }
        Ok(url)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self, window: &TrainingWindow) -> Result<Vec<LabeledSnapshot>, SourceError> {
        let url = self.request_url(window)?;
        info!("Requesting snapshots {}..{} from {}", window.start, window.end, self.export_url);
        let response = http_client::retry_with_backoff(
            self.retry,
            || self.agent.request_url("GET", &url).call(),
            |err| {
                let transient = http_client::is_transient(err);
                if transient {
                    warn!("Snapshot export request failed, retrying: {err}");
                }
                transient
            },
        )
        .map_err(|source| SourceError::Http {
            url: url.to_string(),
            source: Box::new(source),
        })?;
        let bytes = http_client::read_response_bytes(response, MAX_EXPORT_BYTES)
            .map_err(|err| SourceError::Decode(format!("reading response body: {err}")))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|err| SourceError::Decode(format!("response is not JSON: {err}")))?;
        let rows = unwrap_envelope(body)?;
        decode_rows(rows, window)
    }

    fn describe(&self) -> String {
        self.export_url.clone()
    }
}

/// Snapshots stored in a JSON array or JSON-lines file.
///
/// Rows whose timestamp falls outside the requested window are dropped.
pub struct JsonFileSnapshotSource {
    path: PathBuf,
}

impl JsonFileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for JsonFileSnapshotSource {
    fn fetch(&self, window: &TrainingWindow) -> Result<Vec<LabeledSnapshot>, SourceError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let rows = match serde_json::from_str::<Value>(&text) {
            Ok(body @ Value::Array(_)) => unwrap_envelope(body)?,
            Ok(Value::Object(map)) if map.contains_key("data") || map.contains_key("success") => {
                unwrap_envelope(Value::Object(map))?
            }
            _ => text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(idx, line)| {
                    serde_json::from_str(line).map_err(|err| {
                        SourceError::Decode(format!("{} line {}: {err}", self.path.display(), idx + 1))
                    })
                })
                .collect::<Result<Vec<Value>, _>>()?,
        };
        let snapshots = decode_rows(rows, window)?;
        let total = snapshots.len();
        let kept: Vec<LabeledSnapshot> = snapshots
            .into_iter()
            .filter(|row| window.contains(row.snapshot_ts))
            .collect();
        if kept.len() < total {
            info!("Dropped {} rows outside {}..{}", total - kept.len(), window.start, window.end);
        }
        Ok(kept)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Accept a bare array or a `{success, message, data}` envelope.
fn unwrap_envelope(body: Value) -> Result<Vec<Value>, SourceError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => {
            if map.get("success").and_then(Value::as_bool) == Some(false) {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("export reported failure")
                    .to_string();
                return Err(SourceError::UpstreamDataUnavailable(message));
            }
            match map.remove("data") {
                Some(Value::Array(rows)) => Ok(rows),
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(other) => Err(SourceError::Decode(format!(
                    "expected `data` to be an array, found {}",
                    json_kind(&other)
                ))),
            }
        }
        other => Err(SourceError::Decode(format!(
            "expected an array of rows, found {}",
            json_kind(&other)
        ))),
    }
}

fn decode_rows(rows: Vec<Value>, window: &TrainingWindow) -> Result<Vec<LabeledSnapshot>, SourceError> {
    let mut out = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for (idx, row) in rows.into_iter().enumerate() {
        let raw: RawRow = serde_json::from_value(row)
            .map_err(|err| SourceError::Decode(format!("row {idx}: {err}")))?;
        let Some(label) = binarize_label(&raw.label) else {
            skipped += 1;
            continue;
        };
        let snapshot_ts = match raw.snapshot_ts.as_deref() {
            Some(text) => parse_timestamp(text)
                .ok_or_else(|| SourceError::Decode(format!("row {idx}: bad snapshot_ts {text:?}")))?,
            None => window.end_timestamp(),
        };
        out.push(LabeledSnapshot {
            user_id: user_id_text(&raw.user_id),
            snapshot_ts,
            features: feature_snapshot(raw.features),
            label,
        });
    }
    if skipped > 0 {
        warn!("Skipped {skipped} rows without a usable label");
    }
    Ok(out)
}

/// `0`/`1` from a numeric, boolean or numeric-text label; `None` if unusable.
pub fn binarize_label(value: &Value) -> Option<u8> {
    let numeric = match value {
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !numeric.is_finite() {
        return None;
    }
    Some(u8::from(numeric >= LABEL_CUTOFF))
}

/// RFC 3339, `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare `YYYY-MM-DD`.
pub fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(ts);
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(ts) = PrimitiveDateTime::parse(text, naive) {
        return Some(ts.assume_utc());
    }
    let day = format_description!("[year]-[month]-[day]");
    Date::parse(text, day)
        .ok()
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// Nulls and nested values are dropped so they fall back to feature defaults.
fn feature_snapshot(raw: BTreeMap<String, Value>) -> FeatureSnapshot {
    raw.into_iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Number(number) => FeatureValue::Number(number.as_f64()?),
                Value::String(text) => FeatureValue::Text(text),
                Value::Bool(flag) => FeatureValue::Number(if flag { 1.0 } else { 0.0 }),
                _ => return None,
            };
            Some((name, value))
        })
        .collect()
}

fn user_id_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
