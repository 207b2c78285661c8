//! Offline training job: split, fit, evaluate, then record the run and
//! register the model as a new version.

use std::collections::BTreeMap;
use std::fs;

use tracking_re::dataset::{Dataset, Split};
use tracking_re::metrics::accuracy;
use tracking_re::model::{LogisticRegression, LogisticRegressionParams};
use tracking_re::observer::{Event, Observer, TracingObserver};
use tracking_re::registry::ModelVersion;
use tracking_re::run::{default_run_name, ParamValue, Params, RunInfo, RunStatus};
use tracking_re::signature::ModelSignature;
use tracking_re::{Result, TrackingConfig, TrackingError, TrackingStore};

use crate::artifact::{ModelArtifact, FLAVOR, MODEL_FILE};

pub const DEFAULT_EXPERIMENT: &str = "MLflow Quickstart From Script";
pub const DEFAULT_REGISTERED_MODEL: &str = "script-tracking-quickstart";
pub const DEFAULT_ARTIFACT_PATH: &str = "iris_model";
pub const ACCURACY_METRIC: &str = "accuracy";

const INPUT_EXAMPLE_FILE: &str = "input_example.json";
const SIGNATURE_FILE: &str = "signature.json";
const INPUT_EXAMPLE_ROWS: usize = 5;

/// Everything one publish needs besides the tracking configuration.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub dataset: Dataset,
    pub test_size: f64,
    pub split_seed: u64,
    pub params: Params,
    pub experiment_name: String,
    pub registered_model_name: String,
    pub artifact_path: String,
    pub tags: BTreeMap<String, String>,
    /// Defaults to a timestamped name.
    pub run_name: Option<String>,
}

impl PublishRequest {
    /// The quickstart job: iris, 80/20 split with seed 42, gradient descent.
    pub fn quickstart() -> Result<Self> {
        let mut params = Params::new();
        params.insert("solver".into(), ParamValue::from("gd"));
        params.insert("max_iter".into(), ParamValue::from(1000_i64));
        params.insert("learning_rate".into(), ParamValue::from(0.1));
        params.insert("random_state".into(), ParamValue::from(8888_i64));

        let mut tags = BTreeMap::new();
        tags.insert("LR Info".to_string(), "LR model from script".to_string());

        Ok(Self {
            dataset: Dataset::iris()?,
            test_size: 0.2,
            split_seed: 42,
            params,
            experiment_name: DEFAULT_EXPERIMENT.to_string(),
            registered_model_name: DEFAULT_REGISTERED_MODEL.to_string(),
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            tags,
            run_name: None,
        })
    }
}

/// What a successful publish produced.
#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub experiment_id: i64,
    pub run_id: String,
    pub accuracy: f64,
    pub artifact_uri: String,
    pub model_version: ModelVersion,
}

impl PublishOutcome {
    pub fn version(&self) -> i64 {
        self.model_version.version
    }
}

pub struct Publisher<O = TracingObserver> {
    config: TrackingConfig,
    observer: O,
}

impl Publisher<TracingObserver> {
    pub fn new(config: TrackingConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl<O: Observer> Publisher<O> {
    pub fn with_observer(config: TrackingConfig, observer: O) -> Self {
        Self { config, observer }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    fn fail(&self, stage: &str, error: TrackingError) -> TrackingError {
        self.observer.on_event(&Event::Failed { stage, error: &error });
        error
    }

    /// Train, evaluate, record and register. Any failure after the run is
    /// created marks the run `FAILED`, removes the files written for it and
    /// leaves the registry untouched. Registration and ending the run commit
    /// together.
    pub fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome> {
        let split = request
            .dataset
            .train_test_split(request.test_size, request.split_seed)
            .map_err(|e| self.fail("split", e))?;
        self.observer.on_event(&Event::DatasetSplit {
            train_rows: split.x_train.nrows(),
            test_rows: split.x_test.nrows(),
        });

        let hyper = LogisticRegressionParams::from_params(&request.params)
            .map_err(|e| self.fail("train", e))?;
        let model = LogisticRegression::fit(&split.x_train, &split.y_train, &hyper)
            .map_err(|e| self.fail("train", e))?;
        self.observer.on_event(&Event::ModelFitted {
            n_features: model.n_features(),
            n_classes: model.n_classes(),
        });

        let acc = model
            .predict(&split.x_test)
            .and_then(|pred| accuracy(&split.y_test, &pred))
            .map_err(|e| self.fail("evaluate", e))?;
        self.observer.on_event(&Event::ModelEvaluated {
            metric: ACCURACY_METRIC,
            value: acc,
        });

        let store = TrackingStore::open(&self.config).map_err(|e| self.fail("connect", e))?;
        let experiment = store
            .get_or_create_experiment(&request.experiment_name)
            .map_err(|e| self.fail("experiment", e))?;
        self.observer.on_event(&Event::ExperimentReady {
            name: &experiment.name,
            experiment_id: experiment.experiment_id,
        });

        let run_name = request.run_name.clone().unwrap_or_else(default_run_name);
        let run = store
            .create_run(experiment.experiment_id, &run_name)
            .map_err(|e| self.fail("start_run", e))?;
        self.observer.on_event(&Event::RunStarted {
            run_id: &run.run_id,
            run_name: &run.run_name,
        });

        match self.record_run(&store, &run, request, &split, &model, acc) {
            Ok(model_version) => Ok(PublishOutcome {
                experiment_id: experiment.experiment_id,
                run_id: run.run_id,
                accuracy: acc,
                artifact_uri: run.artifact_uri,
                model_version,
            }),
            Err(err) => {
                let err = self.fail("log_run", err);
                // a failed run keeps no artifact files
                if let Ok(dir) = store.artifact_dir(&run.run_id, &request.artifact_path) {
                    if dir.exists() {
                        if let Err(e) = fs::remove_dir_all(&dir) {
                            let cleanup = TrackingError::from(e);
                            self.observer.on_event(&Event::Failed {
                                stage: "remove_artifacts",
                                error: &cleanup,
                            });
                        }
                    }
                }
                if let Err(mark) = store.finish_run(&run.run_id, RunStatus::Failed) {
                    self.observer.on_event(&Event::Failed {
                        stage: "mark_failed",
                        error: &mark,
                    });
                } else {
                    self.observer.on_event(&Event::RunFinished {
                        run_id: &run.run_id,
                        status: RunStatus::Failed.as_str(),
                    });
                }
                Err(err)
            }
        }
    }

    fn record_run(
        &self,
        store: &TrackingStore,
        run: &RunInfo,
        request: &PublishRequest,
        split: &Split,
        model: &LogisticRegression,
        acc: f64,
    ) -> Result<ModelVersion> {
        let run_id = run.run_id.as_str();

        store.log_params(run_id, &request.params)?;
        self.observer.on_event(&Event::ParamsLogged {
            count: request.params.len(),
        });
        store.log_metric(run_id, ACCURACY_METRIC, acc, 0)?;
        for (key, value) in &request.tags {
            store.set_tag(run_id, key, value)?;
        }

        let signature = ModelSignature::infer(&split.x_train, &model.predict(&split.x_train)?);
        let dir = store.artifact_dir(run_id, &request.artifact_path)?;
        fs::create_dir_all(&dir)?;
        ModelArtifact::from_model(model.clone()).save(&dir.join(MODEL_FILE))?;
        fs::write(dir.join(SIGNATURE_FILE), signature.to_json()?)?;
        let example: Vec<Vec<f64>> = split
            .x_train
            .rows()
            .into_iter()
            .take(INPUT_EXAMPLE_ROWS)
            .map(|row| row.to_vec())
            .collect();
        fs::write(dir.join(INPUT_EXAMPLE_FILE), serde_json::to_string(&example)?)?;

        store.log_model(run_id, &request.artifact_path, FLAVOR, &signature)?;
        self.observer.on_event(&Event::ModelLogged {
            artifact_path: &request.artifact_path,
            artifact_uri: &dir.to_string_lossy(),
        });

        let version = store.register_and_finish_run(
            &request.registered_model_name,
            run_id,
            &request.artifact_path,
        )?;
        self.observer.on_event(&Event::VersionRegistered {
            name: &version.name,
            version: version.version,
        });
        self.observer.on_event(&Event::RunFinished {
            run_id,
            status: RunStatus::Finished.as_str(),
        });
        Ok(version)
    }
}
