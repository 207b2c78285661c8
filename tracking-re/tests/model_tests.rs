use ndarray::{array, Array1, Array2};
use tracking_re::dataset::Dataset;
use tracking_re::metrics::accuracy;
use tracking_re::model::{LogisticRegression, LogisticRegressionParams, Solver};
use tracking_re::run::{ParamValue, Params};
use tracking_re::TrackingError;

fn quickstart_params() -> Params {
    let mut params = Params::new();
    params.insert("solver".into(), ParamValue::from("gd"));
    params.insert("max_iter".into(), ParamValue::from(1000_i64));
    params.insert("random_state".into(), ParamValue::from(8888_i64));
    params
}

#[test]
fn test_params_from_logged_map() {
    let parsed = LogisticRegressionParams::from_params(&quickstart_params()).unwrap();
    assert_eq!(parsed.solver, Solver::Gd);
    assert_eq!(parsed.max_iter, 1000);
    assert_eq!(parsed.random_state, 8888);
    assert_eq!(parsed.solver.as_str(), "gd");
    assert_eq!(Solver::Sgd.as_str(), "sgd");
}

#[test]
fn test_invalid_hyperparameters_are_training_errors() {
    let cases: Vec<(&str, ParamValue)> = vec![
        ("solver", ParamValue::from("lbfgs")),
        ("max_iter", ParamValue::from(0_i64)),
        ("learning_rate", ParamValue::from(-0.5)),
        ("l2", ParamValue::from("lots")),
        ("penalty", ParamValue::from("l1")),
    ];
    for (key, value) in cases {
        let mut params = quickstart_params();
        params.insert(key.to_string(), value);
        let err = LogisticRegressionParams::from_params(&params).unwrap_err();
        assert!(matches!(err, TrackingError::Training(_)), "{key}");
    }
}

#[test]
fn test_iris_classifier_is_accurate() {
    let iris = Dataset::iris().unwrap();
    let split = iris.train_test_split(0.2, 42).unwrap();
    let params = LogisticRegressionParams::from_params(&quickstart_params()).unwrap();

    let model = LogisticRegression::fit(&split.x_train, &split.y_train, &params).unwrap();
    assert_eq!(model.n_features(), 4);
    assert_eq!(model.classes(), &[0, 1, 2]);

    let predictions = model.predict(&split.x_test).unwrap();
    assert_eq!(predictions.len(), split.y_test.len());
    let acc = accuracy(&split.y_test, &predictions).unwrap();
    assert!((0.0..=1.0).contains(&acc));
    assert!(acc > 0.8, "accuracy {acc}");
}

#[test]
fn test_sgd_solver_is_deterministic() {
    let iris = Dataset::iris().unwrap();
    let params = LogisticRegressionParams {
        solver: Solver::Sgd,
        max_iter: 50,
        ..Default::default()
    };
    let a = LogisticRegression::fit(&iris.features, &iris.targets, &params).unwrap();
    let b = LogisticRegression::fit(&iris.features, &iris.targets, &params).unwrap();
    assert_eq!(a.linear().weight(), b.linear().weight());
    assert_eq!(a.predict(&iris.features).unwrap(), b.predict(&iris.features).unwrap());
}

#[test]
fn test_probabilities_sum_to_one() {
    let iris = Dataset::iris().unwrap();
    let model =
        LogisticRegression::fit(&iris.features, &iris.targets, &Default::default()).unwrap();
    let proba = model.predict_proba(&array![[5.1, 3.5, 1.4, 0.2], [6.7, 3.0, 5.2, 2.3]]).unwrap();
    for row in proba.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }
    assert_eq!(model.predict(&array![[5.1, 3.5, 1.4, 0.2]]).unwrap()[0], 0);
}

#[test]
fn test_fit_rejects_degenerate_data() {
    let x = Array2::<f64>::ones((4, 2));
    let single_class = Array1::from(vec![1_i64; 4]);
    let err = LogisticRegression::fit(&x, &single_class, &Default::default()).unwrap_err();
    assert!(matches!(err, TrackingError::Training(_)));

    let short = array![0_i64, 1];
    assert!(LogisticRegression::fit(&x, &short, &Default::default()).is_err());
    let empty = Array2::<f64>::zeros((0, 2));
    assert!(LogisticRegression::fit(&empty, &Array1::zeros(0), &Default::default()).is_err());
}

#[test]
fn test_predict_checks_width() {
    let iris = Dataset::iris().unwrap();
    let model =
        LogisticRegression::fit(&iris.features, &iris.targets, &Default::default()).unwrap();
    let err = model.predict(&Array2::zeros((1, 3))).unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));
}
