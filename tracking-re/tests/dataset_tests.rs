use std::collections::BTreeSet;
use ndarray::{Array1, Array2};
use tracking_re::dataset::Dataset;
use tracking_re::TrackingError;

#[test]
fn test_iris_shape() {
    let iris = Dataset::iris().unwrap();
    assert_eq!(iris.n_rows(), 150);
    assert_eq!(iris.n_features(), 4);
    let classes: BTreeSet<i64> = iris.targets.iter().copied().collect();
    assert_eq!(classes.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(iris.feature_names[0], "sepal_length");
    assert_eq!(iris.target_name(2), Some("virginica"));
    assert_eq!(iris.target_name(3), None);
}

#[test]
fn test_split_sizes_follow_test_fraction() {
    let iris = Dataset::iris().unwrap();
    let split = iris.train_test_split(0.2, 42).unwrap();
    assert_eq!(split.x_train.nrows(), 120);
    assert_eq!(split.y_train.len(), 120);
    assert_eq!(split.x_test.nrows(), 30);
    assert_eq!(split.y_test.len(), 30);
}

#[test]
fn test_split_is_deterministic_per_seed() {
    let iris = Dataset::iris().unwrap();
    let a = iris.train_test_split(0.2, 42).unwrap();
    let b = iris.train_test_split(0.2, 42).unwrap();
    assert_eq!(a.x_test, b.x_test);
    assert_eq!(a.y_train, b.y_train);

    let c = iris.train_test_split(0.2, 7).unwrap();
    assert_ne!(a.x_test, c.x_test);
}

#[test]
fn test_split_rejects_bad_fractions() {
    let iris = Dataset::iris().unwrap();
    for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
        assert!(iris.train_test_split(fraction, 42).is_err(), "{fraction}");
    }
}

#[test]
fn test_csv_errors_are_reported() {
    assert!(Dataset::from_csv("").is_err());
    assert!(Dataset::from_csv("a,target\n1.0,x\n").is_err());
    assert!(Dataset::from_csv("a,b,target\n1.0,0\n").is_err());
    let ds = Dataset::from_csv("a,b,target\n1.0,2.0,0\n3.0,4.0,1\n").unwrap();
    assert_eq!(ds.n_rows(), 2);
    assert_eq!(ds.features[[1, 0]], 3.0);
}

#[test]
fn test_new_checks_row_and_target_counts() {
    let err = Dataset::new(Array2::zeros((3, 2)), Array1::zeros(2)).unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));

    let ds = Dataset::new(Array2::zeros((3, 2)), Array1::from(vec![0, 1, 0])).unwrap();
    assert_eq!(ds.feature_names, vec!["x0", "x1"]);
    assert_eq!(ds.target_name(0), None);
}

#[test]
fn test_csv_fields_may_be_quoted() {
    let ds = Dataset::from_csv("\"a\",\"b\",target\n\"1.5\", 2.0 ,1\n").unwrap();
    assert_eq!(ds.feature_names, vec!["a", "b"]);
    assert_eq!(ds.features[[0, 0]], 1.5);
    assert_eq!(ds.features[[0, 1]], 2.0);
    assert_eq!(ds.targets[0], 1);
}
