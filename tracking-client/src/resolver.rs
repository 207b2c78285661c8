//! Serving side: resolve a registered model by alias, load its artifact and
//! predict.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracking_re::model::LogisticRegression;
use tracking_re::observer::{Event, Observer, TracingObserver};
use tracking_re::registry::ModelVersion;
use tracking_re::signature::ModelSignature;
use tracking_re::{Result, TrackingConfig, TrackingError, TrackingStore};

use crate::artifact::{ModelArtifact, MODEL_FILE};

pub const DEFAULT_MODEL_NAME: &str = "tracking-quickstart";
pub const DEFAULT_ALIAS: &str = "prod";

const MODELS_SCHEME: &str = "models:/";

/// A `models:/` reference to a registered model version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelUri {
    /// `models:/<name>@<alias>`
    Alias { name: String, alias: String },
    /// `models:/<name>/<version>`
    Version { name: String, version: i64 },
}

impl FromStr for ModelUri {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s.strip_prefix(MODELS_SCHEME).ok_or_else(|| {
            TrackingError::validation(format!("'{s}' is not a {MODELS_SCHEME} URI"))
        })?;
        let bad = || TrackingError::validation(format!("malformed model URI '{s}'"));

        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || alias.is_empty() || alias.contains('/') {
                return Err(bad());
            }
            return Ok(ModelUri::Alias {
                name: name.to_string(),
                alias: alias.to_string(),
            });
        }
        let (name, version) = rest.rsplit_once('/').ok_or_else(bad)?;
        let version: i64 = version.parse().map_err(|_| bad())?;
        if name.is_empty() || version < 1 {
            return Err(bad());
        }
        Ok(ModelUri::Version {
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUri::Alias { name, alias } => write!(f, "{MODELS_SCHEME}{name}@{alias}"),
            ModelUri::Version { name, version } => write!(f, "{MODELS_SCHEME}{name}/{version}"),
        }
    }
}

/// A loaded model version. It owns its parameters, so later alias moves or
/// registry changes do not affect it.
#[derive(Clone, Debug)]
pub struct LoadedModel {
    model: LogisticRegression,
    signature: ModelSignature,
    metadata: ModelVersion,
}

impl LoadedModel {
    pub fn metadata(&self) -> &ModelVersion {
        &self.metadata
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }

    /// Predict one class label per row.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
        let x = self.signature.validate_rows(rows)?;
        Ok(self.model.predict(&x)?.to_vec())
    }
}

pub struct Resolver<O = TracingObserver> {
    config: TrackingConfig,
    observer: O,
}

impl Resolver<TracingObserver> {
    pub fn new(config: TrackingConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl<O: Observer> Resolver<O> {
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

    fn open_store(&self) -> Result<TrackingStore> {
        TrackingStore::open_existing(&self.config).map_err(|e| self.fail("connect", e))
    }

    /// Look up the version `alias` points at. Read only.
    pub fn resolve(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        let store = self.open_store()?;
        let version = store
            .get_version_by_alias(name, alias)
            .map_err(|e| self.fail("resolve", e))?;
        self.observer.on_event(&Event::AliasResolved {
            name,
            alias,
            version: version.version,
        });
        Ok(version)
    }

    /// Resolve `name@alias`, report its metadata and load the artifact.
    pub fn resolve_and_load(&self, name: &str, alias: &str) -> Result<LoadedModel> {
        let store = self.open_store()?;
        let version = store
            .get_version_by_alias(name, alias)
            .map_err(|e| self.fail("resolve", e))?;
        self.observer.on_event(&Event::AliasResolved {
            name,
            alias,
            version: version.version,
        });
        self.load_resolved(&store, version)
    }

    /// Load a specific version number.
    pub fn load_version(&self, name: &str, version: i64) -> Result<LoadedModel> {
        let store = self.open_store()?;
        let version = store
            .get_model_version(name, version)
            .map_err(|e| self.fail("resolve", e))?;
        self.load_resolved(&store, version)
    }

    pub fn load_uri(&self, uri: &str) -> Result<LoadedModel> {
        match uri.parse::<ModelUri>().map_err(|e| self.fail("parse_uri", e))? {
            ModelUri::Alias { name, alias } => self.resolve_and_load(&name, &alias),
            ModelUri::Version { name, version } => self.load_version(&name, version),
        }
    }

    /// Predict with a loaded model, reporting the call to the observer.
    pub fn predict(&self, loaded: &LoadedModel, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
        let labels = loaded.predict(rows).map_err(|e| self.fail("predict", e))?;
        self.observer.on_event(&Event::Predicted { rows: rows.len() });
        Ok(labels)
    }

    fn load_resolved(&self, store: &TrackingStore, version: ModelVersion) -> Result<LoadedModel> {
        for (key, value) in version.fields() {
            self.observer.on_event(&Event::MetadataField { key, value: &value });
        }

        let signature = store
            .get_logged_model_signature(&version.run_id, &version.artifact_path)
            .map_err(|e| self.fail("load", e))?;
        let path = Path::new(&version.source).join(MODEL_FILE);
        let artifact = ModelArtifact::load_mmap(&path)
            .or_else(|_| ModelArtifact::load(&path))
            .map_err(|e| self.fail("load", e))?;
        let model = artifact.into_model();

        if let Some(width) = signature.input_width() {
            if width != model.n_features() {
                let err = TrackingError::artifact(format!(
                    "artifact at {} has {} features but its signature declares {width}",
                    path.display(),
                    model.n_features()
                ));
                return Err(self.fail("load", err));
            }
        }

        self.observer.on_event(&Event::ModelLoaded {
            name: &version.name,
            version: version.version,
            source: &version.source,
        });
        Ok(LoadedModel {
            model,
            signature,
            metadata: version,
        })
    }
}
