mod support;

use churn_risk::ml::{Classifier, ModelKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use churn_risk::registry::{ModelRegistry, RegistryError, generate_version};
use tempfile::tempdir;
use time::macros::datetime;

#[test]
fn saved_artifact_loads_back_field_for_field() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path().join("store"));
    let (model, metadata) = support::fitted_artifact("risk-2024-04-01-083000-gbdt", ModelKind::GbdtStumpV1);

    let path = registry.save(&model, &metadata).unwrap();
    assert_eq!(path, registry.model_path("risk-2024-04-01-083000-gbdt"));

    let loaded = registry.load(Some("risk-2024-04-01-083000-gbdt")).unwrap();
    assert_eq!(loaded.metadata, metadata);
    assert_eq!(loaded.model.kind(), ModelKind::GbdtStumpV1);
    let row = vec![0.0; metadata.feature_order.len()];
    assert!((loaded.model.score(&row) - model.score(&row)).abs() < 1e-6);
}

#[test]
fn latest_is_the_greatest_version() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    for version in [
        "risk-2024-03-01-000000-gbdt",
        "risk-2024-04-01-083000-gbdt",
        "risk-2024-03-15-120000-gbdt",
    ] {
        let (model, metadata) = support::fitted_artifact(version, ModelKind::GbdtStumpV1);
        registry.save(&model, &metadata).unwrap();
    }
    assert_eq!(
        registry.list_versions().unwrap(),
        vec![
            "risk-2024-03-01-000000-gbdt",
            "risk-2024-03-15-120000-gbdt",
            "risk-2024-04-01-083000-gbdt",
        ]
    );
    let latest = registry.load(None).unwrap();
    assert_eq!(latest.version(), "risk-2024-04-01-083000-gbdt");
}

#[test]
fn latest_is_the_newest_across_model_kinds() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let older = generate_version("risk", ModelKind::LogRegV1, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
    let newer = generate_version("risk", ModelKind::GbdtStumpV1, datetime!(2024-06-01 00:00:00 UTC)).unwrap();
    for (version, kind) in [(&older, ModelKind::LogRegV1), (&newer, ModelKind::GbdtStumpV1)] {
        let (model, metadata) = support::fitted_artifact(version, kind);
        registry.save(&model, &metadata).unwrap();
    }
    let latest = registry.load(None).unwrap();
    assert_eq!(latest.version(), newer);
    assert_eq!(latest.model.kind(), ModelKind::GbdtStumpV1);
}

#[test]
fn readers_never_see_a_half_published_artifact() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let registry = registry.clone();
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            let mut loads = 0usize;
            while !done.load(Ordering::Acquire) {
                match registry.load(None) {
                    Ok(_) => loads += 1,
                    Err(RegistryError::NotFound { .. }) => {}
                    Err(err) => panic!("reader saw a partial artifact: {err}"),
                }
            }
            loads
        })
    };

    for i in 0..30 {
        let (model, metadata) = support::fitted_artifact(&format!("burst-{i:02}"), ModelKind::GbdtStumpV1);
        registry.save(&model, &metadata).unwrap();
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();
    assert_eq!(registry.load(None).unwrap().version(), "burst-29");
}

#[test]
fn concurrent_saves_of_one_version_have_one_winner() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let handles: Vec<_> = [ModelKind::GbdtStumpV1, ModelKind::LogRegV1, ModelKind::GbdtStumpV1, ModelKind::LogRegV1]
        .into_iter()
        .map(|kind| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let (model, metadata) = support::fitted_artifact("v1", kind);
                registry.save(&model, &metadata).map(|_| kind)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    let winners: Vec<ModelKind> = results.iter().filter_map(|result| result.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, RegistryError::AlreadyExists { .. })));
    let loaded = registry.load(Some("v1")).unwrap();
    assert_eq!(loaded.model.kind(), winners[0]);
    assert_eq!(loaded.metadata.model_kind, Some(winners[0]));
}

#[test]
fn empty_or_missing_store_is_not_found() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path().join("never-created"));
    assert!(registry.list_versions().unwrap().is_empty());
    assert!(matches!(
        registry.load(None),
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        registry.load(Some("risk-2024-01-01-000000-gbdt")),
        Err(RegistryError::NotFound { .. })
    ));
}

#[test]
fn missing_or_malformed_metadata_is_a_schema_mismatch() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let (model, metadata) = support::fitted_artifact("v1", ModelKind::LogRegV1);
    registry.save(&model, &metadata).unwrap();

    std::fs::write(registry.metadata_path("v1"), "{\"version\": \"v1\"").unwrap();
    assert!(matches!(
        registry.load(Some("v1")),
        Err(RegistryError::SchemaMismatch { .. })
    ));

    std::fs::remove_file(registry.metadata_path("v1")).unwrap();
    assert!(matches!(
        registry.load(None),
        Err(RegistryError::SchemaMismatch { .. })
    ));
}

#[test]
fn metadata_must_match_model_width() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let (model, mut metadata) = support::fitted_artifact("v1", ModelKind::LogRegV1);
    metadata.feature_order.pop();
    assert!(matches!(
        registry.save(&model, &metadata),
        Err(RegistryError::SchemaMismatch { .. })
    ));
    assert!(registry.list_versions().unwrap().is_empty());
}

#[test]
fn published_versions_are_never_overwritten() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let (model, metadata) = support::fitted_artifact("v1", ModelKind::GbdtStumpV1);
    registry.save(&model, &metadata).unwrap();
    let before = std::fs::read(registry.model_path("v1")).unwrap();

    let (other, mut other_meta) = support::fitted_artifact("v1", ModelKind::LogRegV1);
    other_meta.training_samples = 1;
    assert!(matches!(
        registry.save(&other, &other_meta),
        Err(RegistryError::AlreadyExists { .. })
    ));
    assert_eq!(std::fs::read(registry.model_path("v1")).unwrap(), before);
}

#[test]
fn in_flight_and_orphaned_files_are_invisible() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let (model, metadata) = support::fitted_artifact("v1", ModelKind::GbdtStumpV1);
    registry.save(&model, &metadata).unwrap();

    // A writer that crashed mid-publish leaves a temp model and a lone metadata file.
    std::fs::write(dir.path().join(".v2.model.json.tmp-00ff"), "{").unwrap();
    std::fs::write(registry.metadata_path("v2"), "{}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    assert_eq!(registry.list_versions().unwrap(), vec!["v1"]);
    assert_eq!(registry.load(None).unwrap().version(), "v1");
}

#[test]
fn path_like_versions_are_rejected() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    assert!(matches!(
        registry.load(Some("../etc/passwd")),
        Err(RegistryError::InvalidVersion { .. })
    ));
}
