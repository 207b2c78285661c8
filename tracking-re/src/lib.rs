//! Core of the model publish/resolve workflow.
//!
//! Holds the pieces the client binaries are built from: datasets and the
//! deterministic split, the logistic regression classifier, metrics,
//! model signatures, and the SQLite tracking/registry store.

pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod model;
pub mod observer;
pub mod registry;
pub mod run;
pub mod signature;
pub mod store;

pub use config::TrackingConfig;
pub use error::{Result, TrackingError};
pub use store::TrackingStore;
