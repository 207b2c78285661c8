//! Workflow events and the observers that receive them.
//!
//! The publisher and resolver report progress and failures as [`Event`]s.
//! Control flow never depends on an observer; the default one turns events
//! into `tracing` records.

use tracing::{debug, error, info};

use crate::error::TrackingError;

/// Something that happened during a publish or resolve.
#[derive(Debug)]
pub enum Event<'a> {
    DatasetSplit { train_rows: usize, test_rows: usize },
    ModelFitted { n_features: usize, n_classes: usize },
    ModelEvaluated { metric: &'a str, value: f64 },
    ExperimentReady { name: &'a str, experiment_id: i64 },
    RunStarted { run_id: &'a str, run_name: &'a str },
    ParamsLogged { count: usize },
    ModelLogged { artifact_path: &'a str, artifact_uri: &'a str },
    VersionRegistered { name: &'a str, version: i64 },
    RunFinished { run_id: &'a str, status: &'a str },
    AliasResolved { name: &'a str, alias: &'a str, version: i64 },
    MetadataField { key: &'a str, value: &'a str },
    ModelLoaded { name: &'a str, version: i64, source: &'a str },
    Predicted { rows: usize },
    /// An error detected at `stage`; it is returned to the caller unchanged.
    Failed { stage: &'a str, error: &'a TrackingError },
}

pub trait Observer {
    fn on_event(&self, event: &Event<'_>);
}

/// Emits every event as a `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::DatasetSplit { train_rows, test_rows } => {
                debug!(train_rows, test_rows, "dataset split")
            }
            Event::ModelFitted { n_features, n_classes } => {
                info!(n_features, n_classes, "model training completed")
            }
            Event::ModelEvaluated { metric, value } => info!("model {metric}: {value:.2}"),
            Event::ExperimentReady { name, experiment_id } => {
                info!(experiment = %name, experiment_id, "experiment ready")
            }
            Event::RunStarted { run_id, run_name } => {
                info!(run_id = %run_id, run_name = %run_name, "run started")
            }
            Event::ParamsLogged { count } => debug!(count, "hyperparameters logged"),
            Event::ModelLogged { artifact_path, artifact_uri } => {
                info!(artifact_path = %artifact_path, artifact_uri = %artifact_uri, "model logged")
            }
            Event::VersionRegistered { name, version } => {
                info!(model = %name, version, "model version registered")
            }
            Event::RunFinished { run_id, status } => {
                info!(run_id = %run_id, status = %status, "run ended")
            }
            Event::AliasResolved { name, alias, version } => {
                info!(model = %name, alias = %alias, version, "alias resolved")
            }
            Event::MetadataField { key, value } => info!("\t{key}: {value}"),
            Event::ModelLoaded { name, version, source } => {
                info!(model = %name, version, source = %source, "model loaded")
            }
            Event::Predicted { rows } => debug!(rows, "prediction served"),
            Event::Failed { stage, error } => {
                error!(stage = %stage, kind = error.kind(), "{error}")
            }
        }
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event<'_>) {}
}
