//! Registered models, their numbered versions, and aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stage reported for versions that were never transitioned.
pub const DEFAULT_STAGE: &str = "None";
/// Status of a version whose artifact is in place.
pub const READY_STATUS: &str = "READY";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub creation_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    /// Alias name to version number.
    pub aliases: BTreeMap<String, i64>,
    pub latest_version: Option<i64>,
}

/// Metadata of one registered model version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: i64,
    pub creation_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    /// Run whose logged model this version points at.
    pub run_id: String,
    pub artifact_path: String,
    /// Location of the artifact directory.
    pub source: String,
    pub current_stage: String,
    pub status: String,
    pub tags: BTreeMap<String, String>,
    pub aliases: Vec<String>,
}

impl ModelVersion {
    /// Name/value pairs for every field, in a fixed order, for display and logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let tags = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ("name", self.name.clone()),
            ("version", self.version.to_string()),
            ("creation_time", self.creation_time.to_rfc3339()),
            ("last_updated_time", self.last_updated_time.to_rfc3339()),
            ("run_id", self.run_id.clone()),
            ("source", self.source.clone()),
            ("current_stage", self.current_stage.clone()),
            ("status", self.status.clone()),
            ("aliases", self.aliases.join(", ")),
            ("tags", tags),
        ]
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)?;
        if !self.aliases.is_empty() {
            write!(f, " (@{})", self.aliases.join(", @"))?;
        }
        Ok(())
    }
}
