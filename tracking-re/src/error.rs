//! Error type shared by the tracking store, the classifier and the
//! publish/resolve workflow.

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Missing or malformed tracking configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The tracking store behind the endpoint could not be opened.
    #[error("cannot reach tracking store at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Unknown experiment, run, registered model, version or alias.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input rejected, e.g. a feature row that does not match the signature.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid hyperparameters or a classifier that could not be fitted.
    #[error("training failed: {0}")]
    Training(String),

    #[error("tracking store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        TrackingError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        TrackingError::Validation(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        TrackingError::Training(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        TrackingError::Artifact(msg.into())
    }

    /// Short, stable name of the error class, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingError::Configuration(_) => "ConfigurationError",
            TrackingError::Connection { .. } => "ConnectionError",
            TrackingError::NotFound(_) => "NotFoundError",
            TrackingError::Validation(_) => "ValidationError",
            TrackingError::Training(_) => "TrainingError",
            TrackingError::Store(_) => "StoreError",
            TrackingError::Artifact(_) => "ArtifactError",
            TrackingError::Serialization(_) => "SerializationError",
        }
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(err: std::io::Error) -> Self {
        TrackingError::Artifact(err.to_string())
    }
}
