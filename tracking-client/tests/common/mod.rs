#![allow(dead_code)]

use std::cell::RefCell;

use tempfile::TempDir;
use tracking_client::{PublishOutcome, PublishRequest, Publisher};
use tracking_re::observer::{Event, NoopObserver, Observer};
use tracking_re::TrackingConfig;

pub const MODEL: &str = "tracking-quickstart";

pub fn workspace() -> (TempDir, TrackingConfig) {
    let dir = TempDir::new().unwrap();
    let uri = format!("sqlite:///{}", dir.path().join("mlflow.db").display());
    let config = TrackingConfig::new(uri).with_artifact_root(dir.path().join("mlartifacts"));
    (dir, config)
}

pub fn request() -> PublishRequest {
    let mut request = PublishRequest::quickstart().unwrap();
    request.registered_model_name = MODEL.to_string();
    request
}

pub fn publish(config: &TrackingConfig) -> PublishOutcome {
    Publisher::with_observer(config.clone(), NoopObserver)
        .publish(&request())
        .unwrap()
}

/// Keeps a one-line rendering of every event it sees.
#[derive(Default)]
pub struct Recorder {
    pub events: RefCell<Vec<String>>,
    pub run_ids: RefCell<Vec<String>>,
}

impl Observer for Recorder {
    fn on_event(&self, event: &Event<'_>) {
        if let Event::RunStarted { run_id, .. } = event {
            self.run_ids.borrow_mut().push(run_id.to_string());
        }
        self.events.borrow_mut().push(format!("{event:?}"));
    }
}

impl Recorder {
    pub fn saw(&self, needle: &str) -> bool {
        self.events.borrow().iter().any(|e| e.contains(needle))
    }
}
