//! Tracking configuration.
//!
//! The endpoint is an MLflow-style URI naming a SQLite database
//! (`sqlite:///relative.db`, `sqlite:////abs/path.db`) or a plain
//! filesystem path. The configuration is passed explicitly to the
//! publisher and resolver; `from_env` is a convenience for binaries.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackingError};

/// Environment variable naming the tracking endpoint.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
/// Environment variable overriding where model artifacts are written.
pub const ARTIFACT_ROOT_ENV: &str = "MLFLOW_ARTIFACT_ROOT";

const SQLITE_SCHEME: &str = "sqlite:///";
const DEFAULT_ARTIFACT_DIR: &str = "mlartifacts";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tracking endpoint. Absence is reported when the store is first opened.
    pub tracking_uri: Option<String>,
    /// Root directory for artifacts; defaults to `mlartifacts/` next to the database.
    pub artifact_root: Option<PathBuf>,
}

impl TrackingConfig {
    pub fn new(tracking_uri: impl Into<String>) -> Self {
        Self {
            tracking_uri: Some(tracking_uri.into()),
            artifact_root: None,
        }
    }

    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Snapshot the configuration from the process environment.
    pub fn from_env() -> Self {
        fn non_empty(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            tracking_uri: non_empty(TRACKING_URI_ENV),
            artifact_root: non_empty(ARTIFACT_ROOT_ENV).map(PathBuf::from),
        }
    }

    /// The configured endpoint, or a configuration error when unset.
    pub fn endpoint(&self) -> Result<&str> {
        self.tracking_uri.as_deref().ok_or_else(|| {
            TrackingError::Configuration(format!("{TRACKING_URI_ENV} is not set"))
        })
    }

    /// Filesystem path of the SQLite database behind the endpoint.
    pub fn database_path(&self) -> Result<PathBuf> {
        parse_tracking_uri(self.endpoint()?)
    }

    /// Directory under which run artifacts are written.
    pub fn artifact_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.artifact_root {
            return Ok(root.clone());
        }
        let db = self.database_path()?;
        let parent = db.parent().unwrap_or_else(|| Path::new(""));
        Ok(parent.join(DEFAULT_ARTIFACT_DIR))
    }
}

/// Map a tracking URI onto the database file it names.
pub fn parse_tracking_uri(uri: &str) -> Result<PathBuf> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(TrackingError::Configuration("tracking URI is empty".into()));
    }
    if let Some(path) = uri.strip_prefix(SQLITE_SCHEME) {
        if path.is_empty() {
            return Err(TrackingError::Configuration(format!(
                "tracking URI {uri} names no database file"
            )));
        }
        return Ok(PathBuf::from(path));
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(TrackingError::Configuration(format!(
            "unsupported tracking URI scheme '{scheme}'"
        )));
    }
    Ok(PathBuf::from(uri))
}
