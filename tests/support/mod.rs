#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

use churn_risk::calibration::ThresholdSet;
use churn_risk::features::{DEFAULT_REGION, FeatureContract, FeatureSnapshot, Vectorizer};
use churn_risk::ml::metrics::EvaluationMetrics;
use churn_risk::ml::{FitOptions, ModelKind, StoredModel, TrainSet, fit};
use churn_risk::registry::ModelMetadata;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::datetime;

/// First Monday used by the synthetic snapshot history.
pub const HISTORY_START: OffsetDateTime = datetime!(2024-01-01 09:00 UTC);

/// Deterministic churn history over `days` days, two customers per day.
///
/// Churners are inactive with failed renewals, so any working model
/// separates them from the rest.
pub fn history_rows(days: u32) -> Vec<Value> {
    let mut rows = Vec::new();
    for day in 0..days {
        let ts = HISTORY_START + time::Duration::days(i64::from(day));
        for slot in 0..2u32 {
            let churned = (day + slot) % 3 == 0;
            let region = ["IN", "SG", "US", "EU"][((day + slot) % 4) as usize];
            let features = if churned {
                json!({
                    "activity_7d": 0,
                    "activity_30d": 1 + day % 2,
                    "time_since_last_use_days": 18 + day % 6,
                    "failed_renewals_30d": 1,
                    "tickets_7d": 3,
                    "tickets_30d": 5,
                    "plan_value": 20,
                    "usage_score": 0.2,
                    "region": region,
                })
            } else {
                json!({
                    "activity_7d": 4 + day % 5,
                    "activity_30d": 20 + day % 7,
                    "time_since_last_use_days": day % 3,
                    "failed_renewals_30d": 0,
                    "tickets_7d": 0,
                    "tickets_30d": 1,
                    "plan_value": 50,
                    "usage_score": 0.8,
                    "region": region,
                })
            };
            rows.push(json!({
                "userId": format!("user-{day}-{slot}"),
                "snapshot_ts": ts.format(&time::format_description::well_known::Rfc3339).unwrap(),
                "features": features,
                "label": if churned { 1 } else { 0 },
            }));
        }
    }
    rows
}

pub fn write_json_lines(path: &Path, rows: &[Value]) {
    let text: Vec<String> = rows.iter().map(Value::to_string).collect();
    std::fs::write(path, text.join("\n")).expect("write snapshot file");
}

/// Small fitted artifact pair for registry tests.
pub fn fitted_artifact(version: &str, kind: ModelKind) -> (StoredModel, ModelMetadata) {
    let contract = FeatureContract::churn_default();
    let feature_order = contract.feature_order();
    let vectorizer = Vectorizer::new(&feature_order, DEFAULT_REGION);
    let mut data = TrainSet::default();
    for i in 0..40u32 {
        let churned = i % 2 == 0;
        let snapshot = FeatureSnapshot::new()
            .with("time_since_last_use_days", if churned { 20.0 } else { 1.0 })
            .with("activity_7d", if churned { 0.0 } else { f64::from(i % 6 + 1) });
        data.x.push(vectorizer.vectorize(&snapshot));
        data.y.push(u8::from(churned));
    }
    let model = fit(kind, &data, &FitOptions::default()).expect("fit");
    let metadata = ModelMetadata {
        version: version.to_string(),
        feature_order,
        encoders: contract.encoders(),
        thresholds: ThresholdSet {
            med: 0.35,
            high: 0.7,
        },
        metrics: EvaluationMetrics {
            auc_roc: 0.9,
            auc_pr: 0.75,
            brier: 0.125,
            positive_rate: 0.5,
            samples: 8,
            degenerate: false,
        },
        training_samples: data.len(),
        model_kind: Some(kind),
        trained_from: Some("2024-01-01".to_string()),
        trained_to: Some("2024-03-31".to_string()),
        validation_samples: Some(8),
        created_at: Some("2024-04-01T08:30:00Z".to_string()),
        low_confidence: false,
    };
    (model, metadata)
}

/// Serve canned HTTP responses on loopback, one per connection, in order.
///
/// Returns the base URL and a handle yielding the raw request lines seen.
pub fn serve_responses(responses: Vec<String>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let mut buf = [0u8; 4096];
            let read = stream.read(&mut buf).unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..read]);
            seen.push(request.lines().next().unwrap_or_default().to_string());
            let _ = stream.write_all(response.as_bytes());
        }
        seen
    });
    (format!("http://{addr}/export"), handle)
}

pub fn json_response(status: &str, body: &Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
