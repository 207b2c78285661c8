mod common;

use common::{publish, workspace, Recorder, MODEL};
use std::fs;
use std::path::Path;
use tracking_client::artifact::MODEL_FILE;
use tracking_client::Resolver;
use tracking_re::observer::NoopObserver;
use tracking_re::{TrackingConfig, TrackingError, TrackingStore};

const SAMPLE: [f64; 4] = [5.1, 3.5, 1.4, 0.2];

fn resolver(config: &TrackingConfig) -> Resolver<NoopObserver> {
    Resolver::with_observer(config.clone(), NoopObserver)
}

#[test]
fn test_resolve_prod_and_predict() {
    let (_dir, config) = workspace();
    let outcome = publish(&config);
    let store = TrackingStore::open_existing(&config).unwrap();
    store.set_alias(MODEL, "prod", outcome.version()).unwrap();

    let recorder = Recorder::default();
    let resolver = Resolver::with_observer(config, recorder);
    let loaded = resolver.resolve_and_load(MODEL, "prod").unwrap();
    assert_eq!(loaded.metadata().version, 1);
    assert_eq!(loaded.metadata().aliases, vec!["prod".to_string()]);
    assert_eq!(loaded.metadata().run_id, outcome.run_id);

    let labels = resolver.predict(&loaded, &[SAMPLE.to_vec()]).unwrap();
    assert_eq!(labels.len(), 1);
    assert!([0, 1, 2].contains(&labels[0]));
    assert_eq!(labels[0], 0);

    let recorder = resolver.observer();
    for field in ["name", "version", "run_id", "source", "current_stage", "status"] {
        assert!(recorder.saw(&format!("key: \"{field}\"")), "{field}");
    }
    assert!(recorder.saw("ModelLoaded"));
    assert!(recorder.saw("Predicted"));
}

#[test]
fn test_unassigned_alias_is_not_found() {
    let (_dir, config) = workspace();
    let outcome = publish(&config);
    TrackingStore::open_existing(&config)
        .unwrap()
        .set_alias(MODEL, "prod", outcome.version())
        .unwrap();

    let err = resolver(&config).resolve_and_load(MODEL, "staging").err().unwrap();
    assert!(matches!(err, TrackingError::NotFound(_)));
    assert_eq!(err.kind(), "NotFoundError");

    let err = resolver(&config).resolve_and_load("no-such-model", "prod").err().unwrap();
    assert!(matches!(err, TrackingError::NotFound(_)));
}

#[test]
fn test_alias_move_does_not_affect_loaded_handle() {
    let (_dir, config) = workspace();
    let first = publish(&config);
    let second = publish(&config);
    let store = TrackingStore::open_existing(&config).unwrap();
    store.set_alias(MODEL, "prod", first.version()).unwrap();

    let resolver = resolver(&config);
    let old = resolver.resolve_and_load(MODEL, "prod").unwrap();
    let before = old.predict(&[SAMPLE.to_vec()]).unwrap();

    store.set_alias(MODEL, "prod", second.version()).unwrap();
    let new = resolver.resolve_and_load(MODEL, "prod").unwrap();
    assert_eq!(new.metadata().version, 2);
    assert_eq!(old.metadata().version, 1);
    assert_eq!(old.predict(&[SAMPLE.to_vec()]).unwrap(), before);
}

#[test]
fn test_repeated_resolution_is_stable() {
    let (_dir, config) = workspace();
    let outcome = publish(&config);
    TrackingStore::open_existing(&config)
        .unwrap()
        .set_alias(MODEL, "prod", outcome.version())
        .unwrap();

    let resolver = resolver(&config);
    let a = resolver.resolve(MODEL, "prod").unwrap();
    let b = resolver.resolve(MODEL, "prod").unwrap();
    assert_eq!(a, b);
    let loaded = resolver.load_uri(&format!("models:/{MODEL}@prod")).unwrap();
    assert_eq!(loaded.metadata(), &a);
    let by_number = resolver.load_uri(&format!("models:/{MODEL}/1")).unwrap();
    assert_eq!(by_number.metadata().version, 1);
}

#[test]
fn test_prediction_checks_row_width() {
    let (_dir, config) = workspace();
    let outcome = publish(&config);
    TrackingStore::open_existing(&config)
        .unwrap()
        .set_alias(MODEL, "prod", outcome.version())
        .unwrap();

    let loaded = resolver(&config).resolve_and_load(MODEL, "prod").unwrap();
    let err = loaded.predict(&[vec![5.1, 3.5, 1.4]]).unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));
    let err = loaded.predict(&[]).unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));
}

#[test]
fn test_missing_database_is_a_connection_error() {
    let (dir, _) = workspace();
    let uri = format!("sqlite:///{}", dir.path().join("absent.db").display());
    let err = resolver(&TrackingConfig::new(uri)).resolve_and_load(MODEL, "prod").err().unwrap();
    assert!(matches!(err, TrackingError::Connection { .. }));
    assert!(!dir.path().join("absent.db").exists());
}

#[test]
fn test_missing_tracking_uri_is_a_configuration_error() {
    let err = resolver(&TrackingConfig::default())
        .resolve_and_load(MODEL, "prod")
        .err()
        .unwrap();
    assert!(matches!(err, TrackingError::Configuration(_)));
}

#[test]
fn test_corrupted_artifact_fails_to_load() {
    let (_dir, config) = workspace();
    let outcome = publish(&config);
    TrackingStore::open_existing(&config)
        .unwrap()
        .set_alias(MODEL, "prod", outcome.version())
        .unwrap();
    let path = Path::new(&outcome.model_version.source).join(MODEL_FILE);
    fs::write(&path, b"garbage").unwrap();

    let recorder = Recorder::default();
    let resolver = Resolver::with_observer(config, recorder);
    let err = resolver.resolve_and_load(MODEL, "prod").err().unwrap();
    assert!(matches!(err, TrackingError::Artifact(_)));
    assert!(resolver.observer().saw("Failed"));
}
